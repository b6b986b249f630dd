//! Host-facing climate entity: maps a controller onto the vocabulary a home-automation
//! host uses for thermostats (HVAC modes, fan modes, target temperature, feature flags).

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::commands::CommandTable;
use crate::config::PlatformConfig;
use crate::controller::AcController;
use crate::gateway::Gateway;
use crate::types::{FanSpeed, Mode, Temperature};
use crate::Result;

/// Time the unit is given to act on a command before the new state is published.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Cool,
    Heat,
    HeatCool,
    FanOnly,
    Dry,
}

impl HvacMode {
    pub const ALL: [HvacMode; 6] = [
        HvacMode::Off,
        HvacMode::Cool,
        HvacMode::Heat,
        HvacMode::HeatCool,
        HvacMode::FanOnly,
        HvacMode::Dry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Cool => "cool",
            HvacMode::Heat => "heat",
            HvacMode::HeatCool => "heat_cool",
            HvacMode::FanOnly => "fan_only",
            HvacMode::Dry => "dry",
        }
    }

    /// The controller mode this host mode selects; `None` for `Off`.
    pub fn to_mode(self) -> Option<Mode> {
        match self {
            HvacMode::Off => None,
            HvacMode::Cool => Some(Mode::Cool),
            HvacMode::Heat => Some(Mode::Heat),
            HvacMode::HeatCool => Some(Mode::Auto),
            HvacMode::FanOnly => Some(Mode::Fan),
            HvacMode::Dry => Some(Mode::Dry),
        }
    }
}

impl From<Mode> for HvacMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Cool => HvacMode::Cool,
            Mode::Heat => HvacMode::Heat,
            Mode::Auto => HvacMode::HeatCool,
            Mode::Fan => HvacMode::FanOnly,
            Mode::Dry => HvacMode::Dry,
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    Off,
    Low,
    Medium,
    High,
    Auto,
}

impl FanMode {
    pub const ALL: [FanMode; 5] = [
        FanMode::Off,
        FanMode::Low,
        FanMode::Medium,
        FanMode::High,
        FanMode::Auto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FanMode::Off => "off",
            FanMode::Low => "low",
            FanMode::Medium => "medium",
            FanMode::High => "high",
            FanMode::Auto => "auto",
        }
    }

    pub fn to_fan_speed(self) -> Option<FanSpeed> {
        match self {
            FanMode::Off => None,
            FanMode::Low => Some(FanSpeed::Low),
            FanMode::Medium => Some(FanSpeed::Medium),
            FanMode::High => Some(FanSpeed::High),
            FanMode::Auto => Some(FanSpeed::Auto),
        }
    }
}

impl From<FanSpeed> for FanMode {
    fn from(speed: FanSpeed) -> Self {
        match speed {
            FanSpeed::Low => FanMode::Low,
            FanSpeed::Medium => FanMode::Medium,
            FanSpeed::High => FanMode::High,
            FanSpeed::Auto => FanMode::Auto,
        }
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    Celsius,
}

/// Climate feature bit flags, numbered the way hosts expect them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClimateFeatures(u32);

impl ClimateFeatures {
    pub const TARGET_TEMPERATURE: ClimateFeatures = ClimateFeatures(1);
    pub const FAN_MODE: ClimateFeatures = ClimateFeatures(8);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: ClimateFeatures) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ClimateFeatures {
    type Output = ClimateFeatures;

    fn bitor(self, rhs: Self) -> Self {
        ClimateFeatures(self.0 | rhs.0)
    }
}

/// Raw mirror values published next to the host-facing state and persisted by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAttributes {
    pub internal_is_on: bool,
    pub internal_mode: Mode,
    pub internal_fan_speed: FanSpeed,
    pub internal_temp: Temperature,
}

/// Attributes handed back by the host after a restart. Values are untrusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoredAttributes {
    pub internal_is_on: Option<bool>,
    pub internal_mode: Option<String>,
    pub internal_fan_speed: Option<String>,
    pub internal_temp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySnapshot {
    pub unique_id: String,
    pub hvac_mode: HvacMode,
    pub fan_mode: FanMode,
    pub current_temperature: u8,
    pub target_temperature: Option<u8>,
    pub attributes: StateAttributes,
}

pub type StateListener = Arc<dyn Fn(&EntitySnapshot) + Send + Sync>;

pub struct ClimateEntity<G = Box<dyn Gateway>> {
    controller: Arc<AcController<G>>,
    settle_delay: Duration,
    listeners: Mutex<Vec<StateListener>>,
}

impl<G: Gateway> ClimateEntity<G> {
    pub fn new(controller: Arc<AcController<G>>) -> Self {
        Self {
            controller,
            settle_delay: DEFAULT_SETTLE_DELAY,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn controller(&self) -> &Arc<AcController<G>> {
        &self.controller
    }

    /// Listeners run on the task that performed the action and may subscribe further
    /// listeners; those are called from the next notification on.
    pub fn subscribe(&self, listener: impl Fn(&EntitySnapshot) + Send + Sync + 'static) {
        self.listeners.lock().push(Arc::new(listener));
    }

    pub fn name(&self) -> &str {
        self.controller.name()
    }

    pub fn unique_id(&self) -> String {
        format!("climate {}", self.controller.name())
    }

    /// State changes are pushed through listeners; the host never needs to poll.
    pub fn should_poll(&self) -> bool {
        false
    }

    pub fn min_temp(&self) -> u8 {
        Temperature::MIN
    }

    pub fn max_temp(&self) -> u8 {
        Temperature::MAX
    }

    pub fn target_temperature_step(&self) -> u8 {
        1
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        TemperatureUnit::Celsius
    }

    pub fn current_temperature(&self) -> u8 {
        self.controller.temp().celsius()
    }

    pub fn target_temperature(&self) -> Option<u8> {
        let state = self.controller.state();
        state.is_on().then(|| state.temp().celsius())
    }

    pub fn hvac_mode(&self) -> HvacMode {
        let state = self.controller.state();
        if state.is_on() {
            state.mode().into()
        } else {
            HvacMode::Off
        }
    }

    pub fn hvac_modes(&self) -> &'static [HvacMode] {
        &HvacMode::ALL
    }

    pub fn fan_mode(&self) -> FanMode {
        let state = self.controller.state();
        if state.is_on() {
            state.fan_speed().into()
        } else {
            FanMode::Off
        }
    }

    pub fn fan_modes(&self) -> &'static [FanMode] {
        &FanMode::ALL
    }

    pub fn supported_features(&self) -> ClimateFeatures {
        ClimateFeatures::TARGET_TEMPERATURE | ClimateFeatures::FAN_MODE
    }

    pub fn extra_state_attributes(&self) -> StateAttributes {
        let state = self.controller.state();
        StateAttributes {
            internal_is_on: state.is_on(),
            internal_mode: state.mode(),
            internal_fan_speed: state.fan_speed(),
            internal_temp: state.temp(),
        }
    }

    /// Host view of one consistent mirror read.
    pub fn snapshot(&self) -> EntitySnapshot {
        let state = self.controller.state();
        let (hvac_mode, fan_mode, target_temperature): (HvacMode, FanMode, Option<u8>) =
            if state.is_on() {
                (
                    state.mode().into(),
                    state.fan_speed().into(),
                    Some(state.temp().celsius()),
                )
            } else {
                (HvacMode::Off, FanMode::Off, None)
            };
        EntitySnapshot {
            unique_id: self.unique_id(),
            hvac_mode,
            fan_mode,
            current_temperature: state.temp().celsius(),
            target_temperature,
            attributes: StateAttributes {
                internal_is_on: state.is_on(),
                internal_mode: state.mode(),
                internal_fan_speed: state.fan_speed(),
                internal_temp: state.temp(),
            },
        }
    }

    /// Sets up the gateway, then restores the mirror from what the host persisted.
    ///
    /// Without persisted attributes the mirror is left as built. Unusable persisted
    /// values are logged and the defaults used instead.
    pub async fn added_to_host(&self, last: Option<&RestoredAttributes>) -> Result<()> {
        self.controller.setup().await?;

        let Some(last) = last else {
            info!(unit = %self.name(), "entity added without previous state");
            return Ok(());
        };
        let restored = self
            .controller
            .set_initial_state(
                last.internal_is_on,
                last.internal_mode.as_deref(),
                last.internal_temp,
                last.internal_fan_speed.as_deref(),
            )
            .await;
        if let Err(e) = restored {
            warn!(unit = %self.name(), error = %e, "ignoring persisted state");
            self.controller.set_initial_state(None, None, None, None).await?;
        }
        info!(unit = %self.name(), state = ?self.controller.state(), "entity added");
        Ok(())
    }

    /// `None` is ignored; fractional degrees are truncated.
    pub async fn set_temperature(&self, temperature: Option<f64>) -> Result<()> {
        let Some(temperature) = temperature else {
            debug!(unit = %self.name(), "set_temperature without a temperature");
            return Ok(());
        };
        self.controller.update_temp(temperature.trunc() as i64).await?;
        self.settle_and_notify().await;
        Ok(())
    }

    pub async fn set_hvac_mode(&self, hvac_mode: HvacMode) -> Result<()> {
        match hvac_mode.to_mode() {
            Some(mode) => self.controller.update_mode(mode).await?,
            None => self.controller.turn_off().await?,
        }
        self.settle_and_notify().await;
        Ok(())
    }

    pub async fn set_fan_mode(&self, fan_mode: FanMode) -> Result<()> {
        let Some(speed) = fan_mode.to_fan_speed() else {
            warn!(unit = %self.name(), "fan mode off is not supported, ignoring");
            return Ok(());
        };
        self.controller.update_fan_speed(speed).await?;
        self.settle_and_notify().await;
        Ok(())
    }

    async fn settle_and_notify(&self) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        let snapshot = self.snapshot();
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            listener(&snapshot);
        }
    }
}

/// One entity per configured unit, all sharing `table`.
pub fn setup_platform(
    config: &PlatformConfig,
    table: Arc<CommandTable>,
) -> Result<Vec<ClimateEntity>> {
    config
        .acs
        .iter()
        .map(|ac| {
            let controller = ac.build_controller(Arc::clone(&table))?;
            debug!(unit = %ac.name, gateway = %controller.gateway_kind(), "configured unit");
            Ok(ClimateEntity::new(Arc::new(controller)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_mappings_round_trip() {
        for mode in Mode::ALL {
            assert_eq!(HvacMode::from(mode).to_mode(), Some(mode));
        }
        assert_eq!(HvacMode::from(Mode::Auto), HvacMode::HeatCool);
        assert_eq!(HvacMode::from(Mode::Fan).as_str(), "fan_only");
        for speed in FanSpeed::ALL {
            assert_eq!(FanMode::from(speed).to_fan_speed(), Some(speed));
        }
        assert_eq!(FanMode::Off.to_fan_speed(), None);
    }

    #[test]
    fn feature_flags_combine() {
        let features = ClimateFeatures::TARGET_TEMPERATURE | ClimateFeatures::FAN_MODE;
        assert_eq!(features.bits(), 9);
        assert!(features.contains(ClimateFeatures::FAN_MODE));
        assert!(!ClimateFeatures::FAN_MODE.contains(features));
    }

    #[test]
    fn restored_attributes_tolerate_missing_fields() {
        let attrs: RestoredAttributes =
            serde_json::from_str(r#"{"internal_mode": "heat", "other": 1}"#).unwrap();
        assert_eq!(attrs.internal_mode.as_deref(), Some("heat"));
        assert_eq!(attrs.internal_temp, None);
    }
}
