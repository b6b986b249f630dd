//! Tuya LAN framing and payload encryption (protocol 3.1 and 3.3).

use std::str::FromStr;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use crc32fast::Hasher as Crc32;
use md5::{Digest, Md5};
use tracing::debug;

use crate::{Error, Result};

type Aes128EcbEnc = ecb::Encryptor<aes::Aes128>;
type Aes128EcbDec = ecb::Decryptor<aes::Aes128>;

const PREFIX: [u8; 4] = [0x00, 0x00, 0x55, 0xAA];
const SUFFIX: [u8; 4] = [0x00, 0x00, 0xAA, 0x55];
const HEADER_LEN: usize = 16;
const TRAILER_LEN: usize = 8;
const MAX_FRAME_LEN: usize = 64 * 1024;
const VERSION_HEADER_LEN: usize = 15;

pub const CONTROL: u32 = 7;
pub const STATUS: u32 = 8;
pub const HEART_BEAT: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V31,
    V33,
}

impl ProtocolVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V31 => "3.1",
            ProtocolVersion::V33 => "3.3",
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = Error;

    /// Accepts any spelling that reads as 3.1 or 3.3 ("3.3", "3.30").
    fn from_str(s: &str) -> Result<Self> {
        let parsed: f64 = s
            .trim()
            .parse()
            .map_err(|_| Error::Setup(format!("invalid protocol version: {s}")))?;
        if (parsed - 3.1).abs() < 1e-9 {
            Ok(ProtocolVersion::V31)
        } else if (parsed - 3.3).abs() < 1e-9 {
            Ok(ProtocolVersion::V33)
        } else {
            Err(Error::Setup(format!("unsupported protocol version: {s}")))
        }
    }
}

/// One message on the wire. Frames sent by a device carry a return code ahead of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub seq: u32,
    pub command: u32,
    pub return_code: Option<u32>,
    pub payload: Vec<u8>,
}

pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let rc_len = if frame.return_code.is_some() { 4 } else { 0 };
    let len = rc_len + frame.payload.len() + TRAILER_LEN;

    let mut out = Vec::with_capacity(HEADER_LEN + len);
    out.extend_from_slice(&PREFIX);
    out.extend_from_slice(&frame.seq.to_be_bytes());
    out.extend_from_slice(&frame.command.to_be_bytes());
    out.extend_from_slice(&(len as u32).to_be_bytes());
    if let Some(rc) = frame.return_code {
        out.extend_from_slice(&rc.to_be_bytes());
    }
    out.extend_from_slice(&frame.payload);
    let crc = crc32(&out);
    out.extend_from_slice(&crc.to_be_bytes());
    out.extend_from_slice(&SUFFIX);
    out
}

/// Takes the first complete frame off the front of `buffer`.
///
/// Returns `Ok(None)` while more bytes are needed. Garbage ahead of a frame prefix is dropped.
pub fn decode_frame(buffer: &mut Vec<u8>, with_return_code: bool) -> Result<Option<Frame>> {
    match buffer.windows(4).position(|w| w == PREFIX) {
        Some(0) => {}
        Some(idx) => {
            debug!("tuya resync: skipping {idx} bytes");
            buffer.drain(..idx);
        }
        None => {
            let keep = buffer.len().min(3);
            buffer.drain(..buffer.len() - keep);
            return Ok(None);
        }
    }

    if buffer.len() < HEADER_LEN {
        return Ok(None);
    }

    let seq = read_u32(&buffer[4..8]);
    let command = read_u32(&buffer[8..12]);
    let len = read_u32(&buffer[12..16]) as usize;
    let min_len = TRAILER_LEN + if with_return_code { 4 } else { 0 };
    if len < min_len || len > MAX_FRAME_LEN {
        buffer.drain(..4);
        return Err(Error::Protocol(format!("implausible frame length {len}")));
    }
    if buffer.len() < HEADER_LEN + len {
        return Ok(None);
    }

    let frame: Vec<u8> = buffer.drain(..HEADER_LEN + len).collect();
    let crc_at = frame.len() - TRAILER_LEN;
    if frame[crc_at + 4..] != SUFFIX {
        return Err(Error::Protocol("missing frame suffix".to_string()));
    }
    let expected = read_u32(&frame[crc_at..crc_at + 4]);
    let computed = crc32(&frame[..crc_at]);
    if expected != computed {
        return Err(Error::Protocol(format!(
            "crc mismatch: expected {expected:08x}, computed {computed:08x}"
        )));
    }

    let mut body = &frame[HEADER_LEN..crc_at];
    let return_code = if with_return_code {
        let rc = read_u32(&body[..4]);
        body = &body[4..];
        Some(rc)
    } else {
        None
    };

    Ok(Some(Frame {
        seq,
        command,
        return_code,
        payload: body.to_vec(),
    }))
}

/// Payload encryption keyed by the device's local key.
#[derive(Clone)]
pub struct LocalCipher {
    key: [u8; 16],
    version: ProtocolVersion,
}

impl LocalCipher {
    pub fn new(local_key: &str, version: ProtocolVersion) -> Result<Self> {
        let key: [u8; 16] = local_key.as_bytes().try_into().map_err(|_| {
            Error::Setup(format!(
                "local key must be 16 bytes, got {}",
                local_key.len()
            ))
        })?;
        Ok(Self { key, version })
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Encrypts a CONTROL payload and prepends the version header.
    pub fn seal(&self, plaintext: &[u8]) -> Vec<u8> {
        let encrypted = self.encrypt(plaintext);
        match self.version {
            ProtocolVersion::V33 => {
                let mut out = Vec::with_capacity(VERSION_HEADER_LEN + encrypted.len());
                out.extend_from_slice(b"3.3");
                out.extend_from_slice(&[0u8; 12]);
                out.extend_from_slice(&encrypted);
                out
            }
            ProtocolVersion::V31 => {
                let encoded = BASE64.encode(&encrypted);
                let signature = self.v31_signature(encoded.as_bytes());
                let mut out = Vec::with_capacity(VERSION_HEADER_LEN + 4 + encoded.len());
                out.extend_from_slice(b"3.1");
                out.extend_from_slice(signature.as_bytes());
                out.extend_from_slice(encoded.as_bytes());
                out
            }
        }
    }

    /// Decrypts a payload received from the device. Plain JSON is passed through.
    pub fn open(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        if payload.starts_with(b"3.1") {
            let encoded = payload.get(3 + 16..).unwrap_or_default();
            let encrypted = BASE64
                .decode(encoded)
                .map_err(|e| Error::Protocol(format!("bad base64 payload: {e}")))?;
            return self.decrypt(&encrypted);
        }
        if payload.starts_with(b"3.3") {
            return self.decrypt(payload.get(VERSION_HEADER_LEN..).unwrap_or_default());
        }
        if payload.starts_with(b"{") {
            return Ok(payload.to_vec());
        }
        self.decrypt(payload)
    }

    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes128EcbEnc::new(&self.key.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Aes128EcbDec::new(&self.key.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| Error::Protocol("payload decryption failed".to_string()))
    }

    fn v31_signature(&self, encoded: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(b"data=");
        hasher.update(encoded);
        hasher.update(b"||lpv=3.1||");
        hasher.update(self.key);
        let hex = super::hex(&hasher.finalize(), false);
        hex[8..24].to_string()
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(raw)
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(data);
    hasher.finalize()
}
