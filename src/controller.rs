use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::commands::CommandTable;
use crate::gateway::{Gateway, GatewayKind};
use crate::logger::{CommandLog, CommandLogMode, Entry};
use crate::profile::Profile;
use crate::state::AcState;
use crate::types::{FanSpeed, Mode, Settings, Temperature};
use crate::{Error, Result};

pub struct AcControllerBuilder<G> {
    name: String,
    gateway: G,
    table: Arc<CommandTable>,
    profile: Option<Profile>,
    initial: AcState,
    log_mode: Option<CommandLogMode>,
    log_path: Option<PathBuf>,
}

impl<G: Gateway> AcControllerBuilder<G> {
    pub fn new(name: impl Into<String>, gateway: G, table: Arc<CommandTable>) -> Self {
        Self {
            name: name.into(),
            gateway,
            table,
            profile: None,
            initial: AcState::default(),
            log_mode: None,
            log_path: None,
        }
    }

    /// Normalization applied before lookup. Defaults to the gateway's own profile.
    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn initial_state(mut self, state: AcState) -> Self {
        self.initial = state;
        self
    }

    pub fn command_log(mut self, mode: CommandLogMode, path: impl Into<PathBuf>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<AcController<G>> {
        let log = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(CommandLog::new(mode, path, &self.name)?),
            _ => None,
        };
        let kind = self.gateway.kind();
        let profile = self.profile.unwrap_or_else(|| match kind {
            GatewayKind::Local => Profile::local(),
            GatewayKind::Cloud => Profile::cloud(),
        });

        Ok(AcController {
            name: self.name,
            kind,
            table: self.table,
            profile,
            session: tokio::sync::Mutex::new(Session {
                gateway: self.gateway,
                log,
            }),
            state: parking_lot::Mutex::new(self.initial),
        })
    }
}

struct Session<G> {
    gateway: G,
    log: Option<CommandLog>,
}

/// One air conditioner: command table, gateway and state mirror behind one lock.
///
/// Every state-changing operation runs start to finish while holding the command lock,
/// including the outbound send, so operations on one unit form a single linear history.
/// Reads go through a separate short-lived lock and never wait for a send in flight; they
/// may observe the state from just before or just after a concurrent command.
///
/// There is no timeout at this level: a send that never completes keeps the lock.
pub struct AcController<G = Box<dyn Gateway>> {
    name: String,
    kind: GatewayKind,
    table: Arc<CommandTable>,
    profile: Profile,
    session: tokio::sync::Mutex<Session<G>>,
    state: parking_lot::Mutex<AcState>,
}

impl<G: Gateway> AcController<G> {
    pub fn builder(
        name: impl Into<String>,
        gateway: G,
        table: Arc<CommandTable>,
    ) -> AcControllerBuilder<G> {
        AcControllerBuilder::new(name, gateway, table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gateway_kind(&self) -> GatewayKind {
        self.kind
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn state(&self) -> AcState {
        *self.state.lock()
    }

    pub fn is_on(&self) -> bool {
        self.state().is_on()
    }

    pub fn mode(&self) -> Mode {
        self.state().mode()
    }

    pub fn fan_speed(&self) -> FanSpeed {
        self.state().fan_speed()
    }

    pub fn temp(&self) -> Temperature {
        self.state().temp()
    }

    /// Re-seeds the mirror from a previous session; see [`AcState::set_initial_state`].
    ///
    /// Waits for any command in flight, so a restore is ordered like any other operation.
    pub async fn set_initial_state(
        &self,
        is_on: Option<bool>,
        mode: Option<&str>,
        temp: Option<i64>,
        fan_speed: Option<&str>,
    ) -> Result<()> {
        let _session = self.session.lock().await;
        let restored = {
            let mut state = self.state.lock();
            state.set_initial_state(is_on, mode, temp, fan_speed)?;
            *state
        };
        debug!(unit = %self.name, state = ?restored, "restored initial state");
        Ok(())
    }

    pub async fn setup(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session.gateway.setup().await.map_err(Error::setup)?;
        info!(unit = %self.name, gateway = %self.kind, "controller ready");
        Ok(())
    }

    pub async fn toggle_power(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        self.toggle_locked(&mut session).await
    }

    /// No-op when already on.
    pub async fn turn_on(&self) -> Result<()> {
        self.set_power(true).await
    }

    /// No-op when already off.
    pub async fn turn_off(&self) -> Result<()> {
        self.set_power(false).await
    }

    /// Powers the unit on if needed, then sends the code for the new temperature.
    ///
    /// The value is validated before anything is sent. The mirror ends up holding the
    /// settings that were actually sent, which may differ from the request when the
    /// profile clamps the temperature.
    pub async fn update_temp(&self, temp: i64) -> Result<()> {
        let temp = Temperature::new(temp)?;
        self.update("update_temp", move |s| Settings { temp, ..s }).await
    }

    pub async fn update_mode(&self, mode: Mode) -> Result<()> {
        self.update("update_mode", move |s| Settings { mode, ..s }).await
    }

    pub async fn update_fan_speed(&self, fan_speed: FanSpeed) -> Result<()> {
        self.update("update_fan_speed", move |s| Settings { fan_speed, ..s }).await
    }

    async fn set_power(&self, on: bool) -> Result<()> {
        let mut session = self.session.lock().await;
        if self.is_on() == on {
            debug!(unit = %self.name, on, "power already in requested state");
            return Ok(());
        }
        self.toggle_locked(&mut session).await
    }

    async fn toggle_locked(&self, session: &mut Session<G>) -> Result<()> {
        let before = self.state();
        let command_id = self.table.lookup_power_toggle();

        let result = session.gateway.send(command_id).await;
        let after = match &result {
            Ok(()) => {
                let after = {
                    let mut state = self.state.lock();
                    state.set_is_on(!before.is_on());
                    *state
                };
                debug!(unit = %self.name, is_on = after.is_on(), "power toggled");
                after
            }
            Err(e) => {
                warn!(
                    unit = %self.name,
                    error = %e,
                    "power toggle failed, keeping is_on={}",
                    before.is_on()
                );
                before
            }
        };

        if let Some(log) = session.log.as_mut() {
            log.record(&Entry {
                action: "toggle_power",
                command_id: Some(command_id),
                before,
                after,
                error: result.as_ref().err(),
            });
        }
        result
    }

    async fn update(&self, action: &str, change: impl FnOnce(Settings) -> Settings) -> Result<()> {
        self.turn_on().await?;

        let mut session = self.session.lock().await;
        let before = self.state();
        let requested = change(before.settings());
        let resolved = self.profile.resolve(requested);
        if resolved != requested {
            debug!(unit = %self.name, %requested, %resolved, "request normalized");
        }

        let command_id = match self.table.lookup_settings(resolved) {
            Ok(id) => id,
            Err(e) => {
                warn!(unit = %self.name, %resolved, "no command for requested settings");
                if let Some(log) = session.log.as_mut() {
                    log.record(&Entry {
                        action,
                        command_id: None,
                        before,
                        after: before,
                        error: Some(&e),
                    });
                }
                return Err(e);
            }
        };

        let result = session
            .gateway
            .send(command_id)
            .await
            .map_err(|e| e.with_settings(resolved));
        let after = match &result {
            Ok(()) => {
                let mut state = self.state.lock();
                state.apply(resolved);
                *state
            }
            Err(e) => {
                warn!(unit = %self.name, error = %e, "{action} failed");
                before
            }
        };
        debug!(unit = %self.name, command_id, settings = %after.settings(), "{action} done");

        if let Some(log) = session.log.as_mut() {
            log.record(&Entry {
                action,
                command_id: Some(command_id),
                before,
                after,
                error: result.as_ref().err(),
            });
        }
        result
    }
}
