//! Transports that deliver one IR command id to the blaster.

pub mod cloud;
pub mod frame;
pub mod local;

use std::fmt;
use std::fmt::Write as _;

use async_trait::async_trait;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    Local,
    Cloud,
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayKind::Local => f.write_str("local"),
            GatewayKind::Cloud => f.write_str("cloud"),
        }
    }
}

/// An IR bridge session.
///
/// `setup` must succeed before `send`; until then `send` fails with
/// [`Error::NotSetUp`](crate::Error::NotSetUp). Implementations never retry.
#[async_trait]
pub trait Gateway: Send {
    async fn setup(&mut self) -> Result<()>;

    /// Transmits one command id. Any failure is reported as
    /// [`Error::Transmission`](crate::Error::Transmission).
    async fn send(&mut self, command_id: &str) -> Result<()>;

    fn kind(&self) -> GatewayKind;
}

#[async_trait]
impl Gateway for Box<dyn Gateway> {
    async fn setup(&mut self) -> Result<()> {
        (**self).setup().await
    }

    async fn send(&mut self, command_id: &str) -> Result<()> {
        (**self).send(command_id).await
    }

    fn kind(&self) -> GatewayKind {
        (**self).kind()
    }
}

/// Hex encoding of a digest, as both protocols put them on the wire.
pub(crate) fn hex(data: &[u8], upper: bool) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = if upper {
            write!(out, "{byte:02X}")
        } else {
            write!(out, "{byte:02x}")
        };
    }
    out
}
