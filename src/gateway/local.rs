use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

use super::frame::{
    CONTROL, Frame, LocalCipher, ProtocolVersion, STATUS, decode_frame, encode_frame,
};
use super::{Gateway, GatewayKind};
use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 6668;
pub const DEFAULT_VERSION: &str = "3.3";

/// Data point the IR blaster listens on for send commands.
const IR_DP: &str = "201";
const IR_DELAY_MS: u32 = 300;

pub struct LocalGatewayBuilder {
    device_id: String,
    local_key: String,
    ip: String,
    version: String,
    port: u16,
    response_timeout: Option<Duration>,
}

impl LocalGatewayBuilder {
    pub fn new(
        device_id: impl Into<String>,
        local_key: impl Into<String>,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            local_key: local_key.into(),
            ip: ip.into(),
            version: DEFAULT_VERSION.to_string(),
            port: DEFAULT_PORT,
            response_timeout: None,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Bounds the wait for the device's acknowledgement. Unbounded by default.
    pub fn response_timeout(mut self, limit: Duration) -> Self {
        self.response_timeout = Some(limit);
        self
    }

    pub fn build(self) -> LocalGateway {
        LocalGateway {
            device_id: self.device_id,
            local_key: self.local_key,
            ip: self.ip,
            version: self.version,
            port: self.port,
            response_timeout: self.response_timeout,
            session: None,
            seq: 0,
        }
    }
}

struct LocalSession {
    addr: SocketAddr,
    cipher: LocalCipher,
}

/// IR blaster reached directly on the LAN with its local key.
///
/// Each send opens a fresh TCP connection, writes one CONTROL frame and waits for the
/// device's acknowledgement. Some firmware answers with a STATUS frame instead of a
/// CONTROL one; either is checked the same way.
pub struct LocalGateway {
    device_id: String,
    local_key: String,
    ip: String,
    version: String,
    port: u16,
    response_timeout: Option<Duration>,
    session: Option<LocalSession>,
    seq: u32,
}

impl LocalGateway {
    pub fn builder(
        device_id: impl Into<String>,
        local_key: impl Into<String>,
        ip: impl Into<String>,
    ) -> LocalGatewayBuilder {
        LocalGatewayBuilder::new(device_id, local_key, ip)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_set_up(&self) -> bool {
        self.session.is_some()
    }

    fn control_payload(&self, command_id: &str) -> Result<Vec<u8>> {
        let ir = json!({
            "control": "send_ir",
            "head": "",
            "key1": command_id,
            "type": 0,
            "delay": IR_DELAY_MS,
        });
        let body = json!({
            "devId": self.device_id,
            "uid": self.device_id,
            "t": chrono::Utc::now().timestamp().to_string(),
            "dps": { IR_DP: serde_json::to_string(&ir)? },
        });
        Ok(serde_json::to_vec(&body)?)
    }

    async fn transmit(&mut self, command_id: &str) -> Result<()> {
        let payload = self.control_payload(command_id)?;
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;

        let session = self.session.as_ref().ok_or(Error::NotSetUp)?;
        let request = encode_frame(&Frame {
            seq,
            command: CONTROL,
            return_code: None,
            payload: session.cipher.seal(&payload),
        });

        debug!(addr = %session.addr, seq, command_id, "sending IR command over LAN");
        let mut stream = TcpStream::connect(session.addr).await?;
        stream.write_all(&request).await?;

        let reply = match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, read_reply(&mut stream))
                .await
                .map_err(|_| Error::Protocol(format!("no reply within {limit:?}")))??,
            None => read_reply(&mut stream).await?,
        };

        if let Some(rc) = reply.return_code
            && rc != 0
        {
            return Err(Error::Protocol(format!("device returned code {rc}")));
        }

        let body = session.cipher.open(&reply.payload)?;
        check_reply_body(&body)?;
        trace!(seq = reply.seq, "device acknowledged command");
        Ok(())
    }
}

async fn read_reply(stream: &mut TcpStream) -> Result<Frame> {
    let mut buffer = Vec::with_capacity(256);
    let mut chunk = [0u8; 1024];
    loop {
        while let Some(frame) = decode_frame(&mut buffer, true)? {
            if frame.command == CONTROL || frame.command == STATUS {
                return Ok(frame);
            }
            trace!(command = frame.command, "ignoring unsolicited frame");
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Protocol(
                "connection closed before acknowledgement".to_string(),
            ));
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}

/// An empty body is a plain ack; anything else must be JSON without an error field.
fn check_reply_body(body: &[u8]) -> Result<()> {
    if body.is_empty() {
        return Ok(());
    }
    let value: Value = serde_json::from_slice(body).map_err(|_| {
        Error::Protocol(format!(
            "unexpected reply: {}",
            String::from_utf8_lossy(body)
        ))
    })?;
    for key in ["Err", "Error"] {
        if let Some(err) = value.get(key) {
            return Err(Error::Protocol(format!("device reported error: {err}")));
        }
    }
    Ok(())
}

#[async_trait]
impl Gateway for LocalGateway {
    async fn setup(&mut self) -> Result<()> {
        let ip: IpAddr = self
            .ip
            .parse()
            .map_err(|_| Error::Setup(format!("invalid device ip: {}", self.ip)))?;
        let version: ProtocolVersion = self.version.parse()?;
        let cipher = LocalCipher::new(&self.local_key, version)?;

        self.session = Some(LocalSession {
            addr: SocketAddr::new(ip, self.port),
            cipher,
        });
        info!(
            device_id = %self.device_id,
            ip = %ip,
            version = version.as_str(),
            "local IR gateway ready"
        );
        Ok(())
    }

    async fn send(&mut self, command_id: &str) -> Result<()> {
        if self.session.is_none() {
            return Err(Error::NotSetUp);
        }
        self.transmit(command_id)
            .await
            .map_err(|e| Error::transmission(command_id, e))
    }

    fn kind(&self) -> GatewayKind {
        GatewayKind::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_payload_wraps_ir_command() {
        let gateway = LocalGateway::builder("dev1", "0123456789abcdef", "127.0.0.1").build();
        let payload = gateway.control_payload("KEY-42").unwrap();
        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["devId"], "dev1");
        assert_eq!(value["uid"], "dev1");
        assert!(value["t"].as_str().unwrap().parse::<i64>().is_ok());

        let ir: Value = serde_json::from_str(value["dps"]["201"].as_str().unwrap()).unwrap();
        assert_eq!(ir["control"], "send_ir");
        assert_eq!(ir["key1"], "KEY-42");
        assert_eq!(ir["head"], "");
        assert_eq!(ir["type"], 0);
        assert_eq!(ir["delay"], 300);
    }

    #[test]
    fn reply_body_checks() {
        assert!(check_reply_body(b"").is_ok());
        assert!(check_reply_body(br#"{"dps":{"201":"ok"}}"#).is_ok());
        assert!(check_reply_body(br#"{"Err":"905"}"#).is_err());
        assert!(check_reply_body(b"json obj data unvalid").is_err());
    }

    #[tokio::test]
    async fn setup_rejects_bad_credentials() {
        let mut gateway = LocalGateway::builder("dev1", "short", "127.0.0.1").build();
        assert!(matches!(gateway.setup().await, Err(Error::Setup(_))));

        let mut gateway =
            LocalGateway::builder("dev1", "0123456789abcdef", "not-an-ip").build();
        assert!(matches!(gateway.setup().await, Err(Error::Setup(_))));

        let mut gateway = LocalGateway::builder("dev1", "0123456789abcdef", "127.0.0.1")
            .version("3.4")
            .build();
        assert!(matches!(gateway.setup().await, Err(Error::Setup(_))));
        assert!(!gateway.is_set_up());
    }

    #[tokio::test]
    async fn send_before_setup_fails() {
        let mut gateway =
            LocalGateway::builder("dev1", "0123456789abcdef", "127.0.0.1").build();
        assert!(matches!(gateway.send("x").await, Err(Error::NotSetUp)));
    }
}
