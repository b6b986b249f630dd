use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Set-point in whole degrees Celsius, always within the unit's 16..=30 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Temperature(u8);

impl Temperature {
    pub const MIN: u8 = 16;
    pub const MAX: u8 = 30;
    pub const DEFAULT: Temperature = Temperature(25);

    pub fn new(degrees: i64) -> Result<Self, ValidationError> {
        if degrees < Self::MIN as i64 || degrees > Self::MAX as i64 {
            return Err(ValidationError::Temperature(degrees));
        }
        Ok(Self(degrees as u8))
    }

    /// Nearest legal temperature to `degrees`.
    pub const fn saturating(degrees: u8) -> Self {
        if degrees < Self::MIN {
            Self(Self::MIN)
        } else if degrees > Self::MAX {
            Self(Self::MAX)
        } else {
            Self(degrees)
        }
    }

    pub fn celsius(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Temperature {
    type Error = ValidationError;

    fn try_from(degrees: i64) -> Result<Self, Self::Error> {
        Temperature::new(degrees)
    }
}

impl From<Temperature> for i64 {
    fn from(t: Temperature) -> Self {
        t.0 as i64
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Cool,
    Heat,
    Dry,
    Fan,
    Auto,
}

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Cool, Mode::Heat, Mode::Dry, Mode::Fan, Mode::Auto];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Cool => "cool",
            Mode::Heat => "heat",
            Mode::Dry => "dry",
            Mode::Fan => "fan",
            Mode::Auto => "auto",
        }
    }
}

impl FromStr for Mode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cool" => Ok(Mode::Cool),
            "heat" => Ok(Mode::Heat),
            "dry" => Ok(Mode::Dry),
            "fan" => Ok(Mode::Fan),
            "auto" => Ok(Mode::Auto),
            other => Err(ValidationError::Mode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanSpeed {
    #[default]
    Low,
    Medium,
    High,
    Auto,
}

impl FanSpeed {
    pub const ALL: [FanSpeed; 4] = [
        FanSpeed::Low,
        FanSpeed::Medium,
        FanSpeed::High,
        FanSpeed::Auto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FanSpeed::Low => "low",
            FanSpeed::Medium => "medium",
            FanSpeed::High => "high",
            FanSpeed::Auto => "auto",
        }
    }
}

impl FromStr for FanSpeed {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(FanSpeed::Low),
            "medium" => Ok(FanSpeed::Medium),
            "high" => Ok(FanSpeed::High),
            "auto" => Ok(FanSpeed::Auto),
            other => Err(ValidationError::FanSpeed(other.to_string())),
        }
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (mode, fan speed, temperature) triple that one IR command encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Settings {
    pub mode: Mode,
    pub fan_speed: FanSpeed,
    pub temp: Temperature,
}

impl Settings {
    pub fn new(mode: Mode, fan_speed: FanSpeed, temp: Temperature) -> Self {
        Self {
            mode,
            fan_speed,
            temp,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(Mode::default(), FanSpeed::default(), Temperature::DEFAULT)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.mode, self.fan_speed, self.temp)
    }
}
