use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Gateway, GatewayKind, hex};
use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

const SIGN_METHOD: &str = "HMAC-SHA256";
const TOKEN_PATH: &str = "/v1.0/token?grant_type=1";
/// Refresh this long before the token actually expires.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

/// Tuya OpenAPI data centers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    China,
    WesternAmerica,
    EasternAmerica,
    CentralEurope,
    WesternEurope,
    India,
}

impl Region {
    pub fn base_url(&self) -> &'static str {
        match self {
            Region::China => "https://openapi.tuyacn.com",
            Region::WesternAmerica => "https://openapi.tuyaus.com",
            Region::EasternAmerica => "https://openapi-ueaz.tuyaus.com",
            Region::CentralEurope => "https://openapi.tuyaeu.com",
            Region::WesternEurope => "https://openapi-weaz.tuyaeu.com",
            Region::India => "https://openapi.tuyain.com",
        }
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cn" => Ok(Region::China),
            "us" => Ok(Region::WesternAmerica),
            "us-e" => Ok(Region::EasternAmerica),
            "eu" => Ok(Region::CentralEurope),
            "eu-w" => Ok(Region::WesternEurope),
            "in" => Ok(Region::India),
            other => Err(Error::Config(format!("unknown Tuya region: {other}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Value,
    code: Option<i64>,
    msg: Option<String>,
}

impl ApiResponse {
    fn failure(&self) -> String {
        format!(
            "code {} ({})",
            self.code.map_or_else(|| "?".to_string(), |c| c.to_string()),
            self.msg.as_deref().unwrap_or("no message")
        )
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_MARGIN < self.expires_at
    }
}

pub struct CloudGatewayBuilder {
    region: Region,
    api_key: String,
    api_secret: String,
    infrared_id: String,
    remote_id: String,
    base_url: Option<String>,
}

impl CloudGatewayBuilder {
    pub fn new(
        region: Region,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        infrared_id: impl Into<String>,
        remote_id: impl Into<String>,
    ) -> Self {
        Self {
            region,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            infrared_id: infrared_id.into(),
            remote_id: remote_id.into(),
            base_url: None,
        }
    }

    /// Overrides the region's API host.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<CloudGateway> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| self.region.base_url().to_string());

        Ok(CloudGateway {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            region: self.region,
            api_key: self.api_key,
            api_secret: self.api_secret,
            infrared_id: self.infrared_id,
            remote_id: self.remote_id,
            token: None,
        })
    }
}

/// IR blaster driven through the Tuya cloud: learned codes are relayed by the
/// OpenAPI to a remote registered on the blaster.
pub struct CloudGateway {
    http: reqwest::Client,
    base_url: String,
    region: Region,
    api_key: String,
    api_secret: String,
    infrared_id: String,
    remote_id: String,
    token: Option<AccessToken>,
}

impl CloudGateway {
    pub fn builder(
        region: Region,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        infrared_id: impl Into<String>,
        remote_id: impl Into<String>,
    ) -> CloudGatewayBuilder {
        CloudGatewayBuilder::new(region, api_key, api_secret, infrared_id, remote_id)
    }

    pub fn region(&self) -> Region {
        self.region
    }

    fn learning_code_path(&self) -> String {
        format!(
            "/v2.0/infrareds/{}/remotes/{}/learning-codes",
            self.infrared_id, self.remote_id
        )
    }

    async fn fetch_token(&mut self) -> Result<()> {
        let resp = self.request(Method::GET, TOKEN_PATH, None, None).await?;
        if !resp.success {
            return Err(Error::Setup(format!("token request rejected: {}", resp.failure())));
        }

        let value = resp
            .result
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Setup("token response without access_token".to_string()))?
            .to_string();
        let expire_secs = resp
            .result
            .get("expire_time")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        debug!(expire_secs, "obtained Tuya access token");
        self.token = Some(AccessToken {
            value,
            expires_at: Instant::now() + Duration::from_secs(expire_secs),
        });
        Ok(())
    }

    async fn transmit(&mut self, command_id: &str) -> Result<()> {
        if !self.token.as_ref().is_some_and(AccessToken::is_fresh) {
            debug!("Tuya access token expired, refreshing");
            self.fetch_token().await?;
        }
        let token = self
            .token
            .as_ref()
            .map(|t| t.value.clone())
            .ok_or(Error::NotSetUp)?;

        let path = self.learning_code_path();
        let body = json!({ "code": command_id });
        debug!(path = %path, command_id, "sending IR command through Tuya cloud");
        let resp = self
            .request(Method::POST, &path, Some(&body), Some(&token))
            .await?;

        if !resp.success || resp.result == Value::Bool(false) {
            return Err(Error::Protocol(format!(
                "cloud rejected command: {}",
                resp.failure()
            )));
        }
        Ok(())
    }

    async fn request(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<&Value>,
        access_token: Option<&str>,
    ) -> Result<ApiResponse> {
        let body_bytes = match body {
            Some(b) => serde_json::to_vec(b)?,
            None => Vec::new(),
        };
        let t = chrono::Utc::now().timestamp_millis().to_string();
        let nonce = Uuid::new_v4().to_string();
        let to_sign = string_to_sign(method.as_str(), &body_bytes, path_and_query);
        let sign = sign_request(
            &self.api_key,
            &self.api_secret,
            access_token,
            &t,
            &nonce,
            &to_sign,
        )?;

        let url = format!("{}{}", self.base_url, path_and_query);
        let mut req = self
            .http
            .request(method, &url)
            .header("client_id", &self.api_key)
            .header("sign", sign)
            .header("t", &t)
            .header("nonce", &nonce)
            .header("sign_method", SIGN_METHOD);
        if let Some(token) = access_token {
            req = req.header("access_token", token);
        }
        if body.is_some() {
            req = req
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body_bytes);
        }

        let resp = req.send().await?.error_for_status()?;
        Ok(resp.json::<ApiResponse>().await?)
    }
}

/// `METHOD \n sha256(body) \n <no signed headers> \n path?query`
pub(crate) fn string_to_sign(method: &str, body: &[u8], path_and_query: &str) -> String {
    let digest = Sha256::digest(body);
    format!("{method}\n{}\n\n{path_and_query}", hex(&digest, false))
}

/// HMAC-SHA256 of `client_id [+ access_token] + t + nonce + string_to_sign`, upper-case hex.
pub(crate) fn sign_request(
    client_id: &str,
    secret: &str,
    access_token: Option<&str>,
    t: &str,
    nonce: &str,
    string_to_sign: &str,
) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Config(format!("unusable API secret: {e}")))?;
    mac.update(client_id.as_bytes());
    if let Some(token) = access_token {
        mac.update(token.as_bytes());
    }
    mac.update(t.as_bytes());
    mac.update(nonce.as_bytes());
    mac.update(string_to_sign.as_bytes());
    Ok(hex(&mac.finalize().into_bytes(), true))
}

#[async_trait]
impl Gateway for CloudGateway {
    async fn setup(&mut self) -> Result<()> {
        self.token = None;
        self.fetch_token().await.map_err(Error::setup)?;
        info!(
            region = ?self.region,
            infrared_id = %self.infrared_id,
            remote_id = %self.remote_id,
            "cloud IR gateway ready"
        );
        Ok(())
    }

    async fn send(&mut self, command_id: &str) -> Result<()> {
        if self.token.is_none() {
            return Err(Error::NotSetUp);
        }
        self.transmit(command_id).await.map_err(|e| {
            warn!(command_id, error = %e, "cloud send failed");
            Error::transmission(command_id, e)
        })
    }

    fn kind(&self) -> GatewayKind {
        GatewayKind::Cloud
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn string_to_sign_for_get_without_body() {
        let s = string_to_sign("GET", b"", TOKEN_PATH);
        assert_eq!(s, format!("GET\n{EMPTY_SHA256}\n\n/v1.0/token?grant_type=1"));
    }

    #[test]
    fn string_to_sign_hashes_body() {
        let s = string_to_sign("POST", br#"{"code":"x"}"#, "/p");
        let hash = s.lines().nth(1).unwrap();
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, EMPTY_SHA256);
    }

    #[test]
    fn signature_is_upper_hex_and_depends_on_token() {
        let without =
            sign_request("id", "secret", None, "1700000000000", "n", "GET\n\n\n/").unwrap();
        let with = sign_request("id", "secret", Some("tok"), "1700000000000", "n", "GET\n\n\n/")
            .unwrap();
        assert_eq!(without.len(), 64);
        assert!(without.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_ne!(without, with);
    }

    #[test]
    fn token_request_signature_matches_known_value() {
        let sts = string_to_sign("GET", b"", TOKEN_PATH);
        let sign = sign_request("client-id", "secret", None, "1700000000000", "nonce-1", &sts);
        assert_eq!(
            sign.unwrap(),
            "A009067EE1401F411B80F38E5BDAC6ABB6A4E7238868ED24A134A5398A1FC02C"
        );

        let sign = sign_request(
            "client-id",
            "secret",
            Some("token-1"),
            "1700000000000",
            "nonce-1",
            &sts,
        );
        assert_eq!(
            sign.unwrap(),
            "5B3BB27B2EE2DA8F4E33689CCE27C2EB2FA6009EC6B04E5472095F849ADC648A"
        );
    }

    #[test]
    fn region_codes() {
        assert_eq!("eu".parse::<Region>().unwrap(), Region::CentralEurope);
        assert_eq!(
            "us-e".parse::<Region>().unwrap().base_url(),
            "https://openapi-ueaz.tuyaus.com"
        );
        assert!(matches!("mars".parse::<Region>(), Err(Error::Config(_))));
    }
}
