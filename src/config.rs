use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::commands::CommandTable;
use crate::controller::AcController;
use crate::gateway::cloud::{CloudGateway, Region};
use crate::gateway::local::{DEFAULT_VERSION, LocalGateway};
use crate::gateway::{Gateway, GatewayKind};
use crate::profile::{Profile, TempBand, TempClamp};
use crate::types::Mode;
use crate::{Error, Result};

const DEFAULT_NAME: &str = "Tuya IR AC";
const DEFAULT_COMMANDS_PATH: &str = "ac-commands.json5";

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_commands_path() -> PathBuf {
    PathBuf::from(DEFAULT_COMMANDS_PATH)
}

/// Top-level configuration: the shared command file and one record per unit.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_commands_path")]
    pub commands_path: PathBuf,
    #[serde(default)]
    pub acs: Vec<AcConfig>,
}

impl PlatformConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading platform config");
        text.parse()
    }

    pub fn load_commands(&self) -> Result<Arc<CommandTable>> {
        CommandTable::from_path(&self.commands_path).map(Arc::new)
    }
}

impl FromStr for PlatformConfig {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(flatten)]
    pub gateway: GatewayConfig,
    /// Per-mode overrides of the profile's temperature bands.
    #[serde(default)]
    pub temperature_bands: HashMap<Mode, TempBand>,
}

/// Transport credentials; the variant follows from which fields are present.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GatewayConfig {
    Local {
        tuya_ir_device_id: String,
        tuya_device_local_key: String,
        tuya_device_ip: String,
        #[serde(default = "default_version")]
        tuya_device_version: String,
    },
    Cloud {
        tuya_region: String,
        tuya_api_key: String,
        tuya_api_secret: String,
        tuya_infrared_id: String,
        tuya_remote_id: String,
    },
}

impl GatewayConfig {
    pub fn kind(&self) -> GatewayKind {
        match self {
            GatewayConfig::Local { .. } => GatewayKind::Local,
            GatewayConfig::Cloud { .. } => GatewayKind::Cloud,
        }
    }

    pub fn build(&self) -> Result<Box<dyn Gateway>> {
        match self {
            GatewayConfig::Local {
                tuya_ir_device_id,
                tuya_device_local_key,
                tuya_device_ip,
                tuya_device_version,
            } => Ok(Box::new(
                LocalGateway::builder(tuya_ir_device_id, tuya_device_local_key, tuya_device_ip)
                    .version(tuya_device_version)
                    .build(),
            )),
            GatewayConfig::Cloud {
                tuya_region,
                tuya_api_key,
                tuya_api_secret,
                tuya_infrared_id,
                tuya_remote_id,
            } => {
                let region: Region = tuya_region.parse()?;
                let gateway = CloudGateway::builder(
                    region,
                    tuya_api_key,
                    tuya_api_secret,
                    tuya_infrared_id,
                    tuya_remote_id,
                )
                .build()?;
                Ok(Box::new(gateway))
            }
        }
    }
}

impl AcConfig {
    pub fn profile(&self) -> Profile {
        let mut profile = match self.gateway.kind() {
            GatewayKind::Local => Profile::local(),
            GatewayKind::Cloud => Profile::cloud(),
        };
        if !self.temperature_bands.is_empty() {
            let clamp = profile.clamp.get_or_insert_with(TempClamp::new);
            for (mode, band) in &self.temperature_bands {
                clamp.set_band(*mode, *band);
            }
        }
        profile
    }

    pub fn build_controller(&self, table: Arc<CommandTable>) -> Result<AcController> {
        let gateway = self.gateway.build()?;
        AcController::builder(&self.name, gateway, table)
            .profile(self.profile())
            .build()
    }
}
