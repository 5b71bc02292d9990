//! Client configuration.
//!
//! Loaded from defaults, a JSON document, or `SIGREST_*` environment
//! variables. The debug flag lives here, per client, rather than in any
//! process-wide state.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ApiError, Result};
use crate::method::{methods, MethodDescriptor};

pub const DEFAULT_ENDPOINT: &str = "http://api.facebook.com/restserver.php";
pub const DEFAULT_SECURE_ENDPOINT: &str = "https://api.facebook.com/restserver.php";

const ENV_PREFIX: &str = "SIGREST_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Endpoint for every call except the desktop session handshake.
    pub endpoint: String,
    /// Endpoint for the session handshake in desktop mode.
    pub secure_endpoint: String,
    /// Connect timeout in milliseconds; the platform default when unset.
    pub connect_timeout_ms: Option<u64>,
    /// Installed-application mode: session calls are signed with the
    /// per-session secret.
    pub desktop: bool,
    /// Log full parameter sets and raw responses at debug level.
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            secure_endpoint: DEFAULT_SECURE_ENDPOINT.to_string(),
            connect_timeout_ms: None,
            desktop: false,
            debug: false,
        }
    }
}

impl ClientConfig {
    /// Defaults pointing both endpoints at `endpoint`.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            secure_endpoint: endpoint.clone(),
            endpoint,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ApiError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from a variable lookup; unset variables keep their defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = Self::default();
        if let Some(endpoint) = var("ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(endpoint) = var("SECURE_ENDPOINT") {
            config.secure_endpoint = endpoint;
        }
        if let Some(ms) = var("CONNECT_TIMEOUT_MS") {
            let ms = ms.trim().parse().map_err(|_| {
                ApiError::Config(format!("{ENV_PREFIX}CONNECT_TIMEOUT_MS is not a number: {ms:?}"))
            })?;
            config.connect_timeout_ms = Some(ms);
        }
        if let Some(flag) = var("DESKTOP") {
            config.desktop = parse_flag("DESKTOP", &flag)?;
        }
        if let Some(flag) = var("DEBUG") {
            config.debug = parse_flag("DEBUG", &flag)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.endpoint)?;
        Url::parse(&self.secure_endpoint)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// The session handshake of an installed application must travel over
    /// the secure endpoint.
    pub fn endpoint_for(&self, method: &MethodDescriptor) -> &str {
        if self.desktop && *method == methods::AUTH_GET_SESSION {
            &self.secure_endpoint
        } else {
            &self.endpoint
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ApiError::Config(format!(
            "{ENV_PREFIX}{name} is not a boolean: {value:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_use_public_endpoints() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.connect_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config =
            ClientConfig::from_json(r#"{"desktop":true,"connect_timeout_ms":2500}"#).unwrap();
        assert!(config.desktop);
        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.secure_endpoint, DEFAULT_SECURE_ENDPOINT);
    }

    #[test]
    fn json_with_bad_url_is_rejected() {
        let err = ClientConfig::from_json(r#"{"endpoint":"not a url"}"#).unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }

    #[test]
    fn vars_override_defaults() {
        let vars: HashMap<&str, &str> = [
            ("SIGREST_ENDPOINT", "http://localhost:3000/restserver.php"),
            ("SIGREST_CONNECT_TIMEOUT_MS", "100"),
            ("SIGREST_DEBUG", "true"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_vars(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.endpoint, "http://localhost:3000/restserver.php");
        assert_eq!(config.connect_timeout_ms, Some(100));
        assert!(config.debug);
        assert!(!config.desktop);
    }

    #[test]
    fn vars_reject_bad_numbers() {
        let err = ClientConfig::from_vars(|k| {
            (k == "SIGREST_CONNECT_TIMEOUT_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn secure_endpoint_only_for_desktop_handshake() {
        let mut config = ClientConfig::default();
        assert_eq!(config.endpoint_for(&methods::AUTH_GET_SESSION), DEFAULT_ENDPOINT);
        config.desktop = true;
        assert_eq!(config.endpoint_for(&methods::AUTH_GET_SESSION), DEFAULT_SECURE_ENDPOINT);
        assert_eq!(config.endpoint_for(&methods::AUTH_CREATE_TOKEN), DEFAULT_ENDPOINT);
    }
}
