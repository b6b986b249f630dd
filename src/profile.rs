use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{FanSpeed, Mode, Settings, Temperature};

/// Inclusive temperature range a mode accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBand")]
pub struct TempBand {
    min: Temperature,
    max: Temperature,
}

#[derive(Deserialize)]
struct RawBand {
    min: i64,
    max: i64,
}

impl TryFrom<RawBand> for TempBand {
    type Error = ValidationError;

    fn try_from(raw: RawBand) -> Result<Self, Self::Error> {
        TempBand::new(raw.min, raw.max)
    }
}

impl TempBand {
    /// Builds a band; both ends must be legal temperatures and `min <= max`.
    pub fn new(min: i64, max: i64) -> Result<Self, ValidationError> {
        if min > max {
            return Err(ValidationError::Band { min, max });
        }
        Ok(Self {
            min: Temperature::new(min)?,
            max: Temperature::new(max)?,
        })
    }

    pub fn min(&self) -> Temperature {
        self.min
    }

    pub fn max(&self) -> Temperature {
        self.max
    }
}

pub fn clamp_temperature(temp: Temperature, band: TempBand) -> Temperature {
    temp.clamp(band.min, band.max)
}

/// Per-mode temperature bands. Modes without a band are passed through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TempClamp {
    bands: HashMap<Mode, TempBand>,
}

impl TempClamp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bands used by the cloud relay: cool 16..=28, heat 20..=30.
    pub fn cloud_default() -> Self {
        let mut clamp = Self::new();
        clamp.set_band(Mode::Cool, band(16, 28));
        clamp.set_band(Mode::Heat, band(20, 30));
        clamp
    }

    pub fn set_band(&mut self, mode: Mode, band: TempBand) {
        self.bands.insert(mode, band);
    }

    pub fn band(&self, mode: Mode) -> Option<TempBand> {
        self.bands.get(&mode).copied()
    }

    pub fn apply(&self, mode: Mode, temp: Temperature) -> Temperature {
        match self.band(mode) {
            Some(b) => clamp_temperature(temp, b),
            None => temp,
        }
    }
}

fn band(min: u8, max: u8) -> TempBand {
    TempBand {
        min: Temperature::saturating(min),
        max: Temperature::saturating(max),
    }
}

/// Normalization a transport applies before a command is looked up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub dry_forces_low_fan: bool,
    pub clamp: Option<TempClamp>,
}

impl Profile {
    /// LAN IR blaster: dry mode only has low fan codes.
    pub fn local() -> Self {
        Self {
            dry_forces_low_fan: true,
            clamp: None,
        }
    }

    pub fn cloud() -> Self {
        Self {
            dry_forces_low_fan: false,
            clamp: Some(TempClamp::cloud_default()),
        }
    }

    /// Settings that will actually be sent for a request.
    pub fn resolve(&self, requested: Settings) -> Settings {
        let mut resolved = requested;
        if self.dry_forces_low_fan && resolved.mode == Mode::Dry {
            resolved.fan_speed = FanSpeed::Low;
        }
        if let Some(clamp) = &self.clamp {
            resolved.temp = clamp.apply(resolved.mode, resolved.temp);
        }
        resolved
    }
}
