//! Auditor configuration
//!
//! Loaded once at startup from environment variables:
//!
//! - `AUDITOR_API_BASE_URL` - Registry API base URL (default: `http://localhost:3001/api`)
//! - `AUDITOR_GATEWAY_BASE_URL` - Evidence gateway base URL (default: `https://gateway.pinata.cloud/ipfs`)
//! - `AUDITOR_POLL_INTERVAL_MS` - Interval between audit cycles (default: 15000)
//! - `AUDITOR_USERNAME` / `AUDITOR_PASSWORD` - Auditor identity (required)
//! - `AUDITOR_STRICTNESS` - `standard` or `strict` (default: standard)
//! - `AUDITOR_HTTP_TIMEOUT_SECS` - Transport timeout for every outbound call (default: 30)
//! - `AUDITOR_MAX_EVIDENCE_BYTES` - Largest evidence document accepted (default: 20 MiB)
//! - `AUDITOR_DRAIN_TIMEOUT_SECS` - How long shutdown waits for a running cycle (default: 60)
//! - `TESSERACT_BIN` / `TESSERACT_LANG` / `TESSERACT_TIMEOUT_SECS` - OCR engine

use std::fmt;
use std::time::Duration;

use crate::error::{AuditError, Result};
use crate::extraction::OcrConfig;
use crate::validation::Strictness;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001/api";
pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://gateway.pinata.cloud/ipfs";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_MAX_EVIDENCE_BYTES: usize = 20 * 1024 * 1024;

/// Complete auditor configuration.
#[derive(Clone)]
pub struct AuditorConfig {
    /// Registry API base URL, without trailing slash
    pub api_base_url: String,
    /// Content-addressed storage gateway, without trailing slash
    pub gateway_base_url: String,
    /// Interval between audit cycles
    pub poll_interval: Duration,
    /// Auditor identity
    pub auditor_username: String,
    pub auditor_password: String,
    /// Validation rule set
    pub strictness: Strictness,
    /// Transport timeout for registry and gateway calls
    pub request_timeout: Duration,
    /// Largest evidence document accepted
    pub max_evidence_bytes: usize,
    /// How long shutdown waits for an in-flight cycle
    pub drain_timeout: Duration,
    /// OCR engine settings
    pub ocr: OcrConfig,
}

impl fmt::Debug for AuditorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditorConfig")
            .field("api_base_url", &self.api_base_url)
            .field("gateway_base_url", &self.gateway_base_url)
            .field("poll_interval", &self.poll_interval)
            .field("auditor_username", &self.auditor_username)
            .field("auditor_password", &"<redacted>")
            .field("strictness", &self.strictness)
            .field("request_timeout", &self.request_timeout)
            .field("max_evidence_bytes", &self.max_evidence_bytes)
            .field("drain_timeout", &self.drain_timeout)
            .field("ocr", &self.ocr)
            .finish()
    }
}

impl AuditorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_base_url = trim_base_url(
            var("AUDITOR_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        );
        let gateway_base_url = trim_base_url(
            var("AUDITOR_GATEWAY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GATEWAY_BASE_URL.to_string()),
        );
        for (name, url) in [
            ("AUDITOR_API_BASE_URL", &api_base_url),
            ("AUDITOR_GATEWAY_BASE_URL", &gateway_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(AuditError::Configuration(format!(
                    "{name} must be an http(s) URL, got {url:?}"
                )));
            }
        }

        let poll_interval_ms: u64 = parse_var(&var, "AUDITOR_POLL_INTERVAL_MS")?
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if poll_interval_ms == 0 {
            return Err(AuditError::Configuration(
                "AUDITOR_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        let auditor_username = var("AUDITOR_USERNAME").ok_or_else(|| {
            AuditError::Configuration("AUDITOR_USERNAME is required".to_string())
        })?;
        // Passwords are not trimmed.
        let auditor_password = lookup("AUDITOR_PASSWORD")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AuditError::Configuration("AUDITOR_PASSWORD is required".to_string())
            })?;

        let strictness = match var("AUDITOR_STRICTNESS") {
            Some(s) => s.parse()?,
            None => Strictness::default(),
        };

        let request_timeout = Duration::from_secs(
            parse_var(&var, "AUDITOR_HTTP_TIMEOUT_SECS")?
                .unwrap_or(30)
                .max(1),
        );
        let max_evidence_bytes = parse_var(&var, "AUDITOR_MAX_EVIDENCE_BYTES")?
            .unwrap_or(DEFAULT_MAX_EVIDENCE_BYTES);
        let drain_timeout =
            Duration::from_secs(parse_var(&var, "AUDITOR_DRAIN_TIMEOUT_SECS")?.unwrap_or(60));

        let defaults = OcrConfig::default();
        let ocr = OcrConfig {
            binary: var("TESSERACT_BIN").unwrap_or(defaults.binary),
            language: var("TESSERACT_LANG").unwrap_or(defaults.language),
            timeout: parse_var(&var, "TESSERACT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        };

        Ok(Self {
            api_base_url,
            gateway_base_url,
            poll_interval: Duration::from_millis(poll_interval_ms),
            auditor_username,
            auditor_password,
            strictness,
            request_timeout,
            max_evidence_bytes,
            drain_timeout,
            ocr,
        })
    }
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| {
                AuditError::Configuration(format!("invalid value {raw:?} for {key}: {e}"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const CREDENTIALS: [(&str, &str); 2] = [
        ("AUDITOR_USERNAME", "admin1"),
        ("AUDITOR_PASSWORD", "password123"),
    ];

    #[test]
    fn test_defaults() {
        let config = AuditorConfig::from_lookup(lookup(&CREDENTIALS)).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.gateway_base_url, DEFAULT_GATEWAY_BASE_URL);
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.strictness, Strictness::Standard);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_evidence_bytes, DEFAULT_MAX_EVIDENCE_BYTES);
        assert_eq!(config.ocr.language, "eng");
    }

    #[test]
    fn test_overrides_and_trailing_slash() {
        let config = AuditorConfig::from_lookup(lookup(&[
            ("AUDITOR_USERNAME", "auditor"),
            ("AUDITOR_PASSWORD", "secret"),
            ("AUDITOR_API_BASE_URL", "https://registry.example/api/"),
            ("AUDITOR_GATEWAY_BASE_URL", "https://ipfs.example/ipfs/"),
            ("AUDITOR_POLL_INTERVAL_MS", "2500"),
            ("AUDITOR_STRICTNESS", "strict"),
            ("TESSERACT_LANG", "eng+spa"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url, "https://registry.example/api");
        assert_eq!(config.gateway_base_url, "https://ipfs.example/ipfs");
        assert_eq!(config.poll_interval, Duration::from_millis(2500));
        assert_eq!(config.strictness, Strictness::Strict);
        assert_eq!(config.ocr.language, "eng+spa");
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let err = AuditorConfig::from_lookup(lookup(&[("AUDITOR_USERNAME", "admin1")]))
            .unwrap_err();
        assert!(matches!(err, AuditError::Configuration(msg) if msg.contains("AUDITOR_PASSWORD")));

        let err = AuditorConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, AuditError::Configuration(msg) if msg.contains("AUDITOR_USERNAME")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("AUDITOR_POLL_INTERVAL_MS", "0"));
        assert!(AuditorConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("AUDITOR_POLL_INTERVAL_MS", "soon"));
        assert!(AuditorConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("AUDITOR_STRICTNESS", "paranoid"));
        assert!(AuditorConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = CREDENTIALS.to_vec();
        pairs.push(("AUDITOR_API_BASE_URL", "localhost:3001"));
        assert!(AuditorConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = AuditorConfig::from_lookup(lookup(&CREDENTIALS)).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("password123"));
        assert!(rendered.contains("<redacted>"));
    }
}
