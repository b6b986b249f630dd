use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{FanSpeed, Mode, Settings, Temperature};
use crate::{Error, Result};

const POWER_KEY: &str = "power_on";

/// Immutable mapping from AC settings to the vendor's IR command identifiers.
///
/// The on-disk form is a JSON5 document keyed mode -> fan speed -> temperature, with a
/// top-level `power_on` entry holding the power toggle code.
#[derive(Debug, Clone)]
pub struct CommandTable {
    power_toggle: String,
    codes: HashMap<Settings, String>,
}

impl CommandTable {
    pub fn builder(power_toggle: impl Into<String>) -> CommandTableBuilder {
        CommandTableBuilder::new(power_toggle)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading command table");
        Self::from_json5_str(&text)
    }

    pub fn from_json5_str(text: &str) -> Result<Self> {
        let doc: Value =
            json5::from_str(text).map_err(|e| Error::CommandFile(e.to_string()))?;
        Self::from_value(&doc)
    }

    fn from_value(doc: &Value) -> Result<Self> {
        let root = doc
            .as_object()
            .ok_or_else(|| Error::CommandFile("top level is not an object".to_string()))?;

        let power_toggle = match root.get(POWER_KEY) {
            Some(Value::String(id)) => id.clone(),
            Some(_) => {
                return Err(Error::CommandFile(format!("{POWER_KEY} is not a string")));
            }
            None => return Err(Error::CommandFile(format!("missing {POWER_KEY}"))),
        };

        let mut builder = CommandTableBuilder::new(power_toggle);
        for (mode_key, fans) in root {
            if mode_key == POWER_KEY {
                continue;
            }
            let Ok(mode) = mode_key.parse::<Mode>() else {
                warn!(key = %mode_key, "skipping unknown mode in command table");
                continue;
            };
            let fans = fans
                .as_object()
                .ok_or_else(|| Error::CommandFile(format!("{mode_key} is not an object")))?;

            for (fan_key, temps) in fans {
                let Ok(fan_speed) = fan_key.parse::<FanSpeed>() else {
                    warn!(
                        mode = %mode_key,
                        key = %fan_key,
                        "skipping unknown fan speed in command table"
                    );
                    continue;
                };
                let temps = temps.as_object().ok_or_else(|| {
                    Error::CommandFile(format!("{mode_key}.{fan_key} is not an object"))
                })?;

                for (temp_key, id) in temps {
                    let temp = match temp_key.parse::<i64>().ok().map(Temperature::new) {
                        Some(Ok(t)) => t,
                        _ => {
                            warn!(
                                mode = %mode_key,
                                fan = %fan_key,
                                key = %temp_key,
                                "skipping unusable temperature in command table"
                            );
                            continue;
                        }
                    };
                    let id = id.as_str().ok_or_else(|| {
                        Error::CommandFile(format!(
                            "{mode_key}.{fan_key}.{temp_key} is not a string"
                        ))
                    })?;
                    builder = builder.code(mode, fan_speed, temp, id);
                }
            }
        }

        let table = builder.build();
        debug!(entries = table.len(), "command table loaded");
        Ok(table)
    }

    /// Command id for the exact settings, or a lookup error naming them.
    pub fn lookup(&self, mode: Mode, fan_speed: FanSpeed, temp: Temperature) -> Result<&str> {
        self.codes
            .get(&Settings::new(mode, fan_speed, temp))
            .map(String::as_str)
            .ok_or(Error::Lookup {
                mode,
                fan_speed,
                temp,
            })
    }

    pub fn lookup_settings(&self, settings: Settings) -> Result<&str> {
        self.lookup(settings.mode, settings.fan_speed, settings.temp)
    }

    pub fn lookup_power_toggle(&self) -> &str {
        &self.power_toggle
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

pub struct CommandTableBuilder {
    power_toggle: String,
    codes: HashMap<Settings, String>,
}

impl CommandTableBuilder {
    pub fn new(power_toggle: impl Into<String>) -> Self {
        Self {
            power_toggle: power_toggle.into(),
            codes: HashMap::new(),
        }
    }

    pub fn code(
        mut self,
        mode: Mode,
        fan_speed: FanSpeed,
        temp: Temperature,
        command_id: impl Into<String>,
    ) -> Self {
        self.codes
            .insert(Settings::new(mode, fan_speed, temp), command_id.into());
        self
    }

    pub fn build(self) -> CommandTable {
        CommandTable {
            power_toggle: self.power_toggle,
            codes: self.codes,
        }
    }
}
