use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{FanSpeed, Mode, Settings, Temperature};

/// Last-known state of one air conditioner.
///
/// Every field holds a legal value at all times: the typed setters cannot be given an
/// illegal value, and [`AcState::set_initial_state`] validates raw input before touching
/// anything. The mirror has no locking of its own; the controller serializes writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcState {
    is_on: bool,
    mode: Mode,
    fan_speed: FanSpeed,
    temp: Temperature,
}

impl Default for AcState {
    fn default() -> Self {
        Self {
            is_on: false,
            mode: Mode::Cool,
            fan_speed: FanSpeed::Low,
            temp: Temperature::DEFAULT,
        }
    }
}

impl AcState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn fan_speed(&self) -> FanSpeed {
        self.fan_speed
    }

    pub fn temp(&self) -> Temperature {
        self.temp
    }

    pub fn settings(&self) -> Settings {
        Settings::new(self.mode, self.fan_speed, self.temp)
    }

    pub fn set_is_on(&mut self, is_on: bool) {
        self.is_on = is_on;
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn set_fan_speed(&mut self, fan_speed: FanSpeed) {
        self.fan_speed = fan_speed;
    }

    pub fn set_temp(&mut self, temp: Temperature) {
        self.temp = temp;
    }

    /// Overwrites mode, fan speed and temperature together.
    pub fn apply(&mut self, settings: Settings) {
        self.mode = settings.mode;
        self.fan_speed = settings.fan_speed;
        self.temp = settings.temp;
    }

    /// Re-seeds the mirror from values persisted by a previous session.
    ///
    /// Missing values fall back to off, cool, 25 and low. All present values are
    /// validated first; on error the mirror is left untouched.
    pub fn set_initial_state(
        &mut self,
        is_on: Option<bool>,
        mode: Option<&str>,
        temp: Option<i64>,
        fan_speed: Option<&str>,
    ) -> Result<(), ValidationError> {
        let mode = mode.map(str::parse::<Mode>).transpose()?;
        let temp = temp.map(Temperature::new).transpose()?;
        let fan_speed = fan_speed.map(str::parse::<FanSpeed>).transpose()?;

        let defaults = AcState::default();
        self.is_on = is_on.unwrap_or(defaults.is_on);
        self.mode = mode.unwrap_or(defaults.mode);
        self.temp = temp.unwrap_or(defaults.temp);
        self.fan_speed = fan_speed.unwrap_or(defaults.fan_speed);
        Ok(())
    }
}
