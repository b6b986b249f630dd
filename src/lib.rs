mod commands;
mod config;
mod controller;
mod entity;
mod error;
pub mod gateway;
mod logger;
mod profile;
mod state;
mod types;

pub use commands::{CommandTable, CommandTableBuilder};
pub use config::{AcConfig, GatewayConfig, PlatformConfig};
pub use controller::{AcController, AcControllerBuilder};
pub use entity::{
    ClimateEntity, ClimateFeatures, DEFAULT_SETTLE_DELAY, EntitySnapshot, FanMode, HvacMode,
    RestoredAttributes, StateAttributes, StateListener, TemperatureUnit, setup_platform,
};
pub use error::{Error, Result, ValidationError};
pub use gateway::cloud::{CloudGateway, CloudGatewayBuilder, Region};
pub use gateway::frame::ProtocolVersion;
pub use gateway::local::{LocalGateway, LocalGatewayBuilder};
pub use gateway::{Gateway, GatewayKind};
pub use logger::CommandLogMode;
pub use profile::{Profile, TempBand, TempClamp, clamp_temperature};
pub use state::AcState;
pub use types::*;
