//! Auditor session
//!
//! Holds the auditor's bearer credential for the life of the process and
//! attaches it to every privileged registry call. The credential is acquired
//! once at startup and re-acquired when it is known to be expired or when the
//! registry answers a privileged call with 401/403.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::Result;
use crate::registry::RegistryClient;

/// Refresh a credential this long before its recorded expiry
const EXPIRY_SKEW_SECS: i64 = 30;

/// Bearer token plus best-effort expiry. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct AuditCredential {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

impl AuditCredential {
    /// Wrap a raw token, reading `exp` when the token is a JWT.
    ///
    /// The signature is not checked; the registry is the only party that
    /// validates the token.
    pub fn from_token(token: impl Into<String>) -> Self {
        let token = token.into();
        let expires_at = jwt_expiry(&token);
        Self { token, expires_at }
    }

    pub fn with_expiry(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Expired, or about to expire, at `now`. Unknown expiry never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|exp| exp - Duration::seconds(EXPIRY_SKEW_SECS) <= now)
    }
}

impl fmt::Debug for AuditCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    Utc.timestamp_opt(data.claims.exp?, 0).single()
}

/// Authenticated identity of the auditor
pub struct AuditSession {
    registry: Arc<dyn RegistryClient>,
    username: String,
    password: String,
    credential: RwLock<Option<AuditCredential>>,
}

impl AuditSession {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            username: username.into(),
            password: password.into(),
            credential: RwLock::new(None),
        }
    }

    /// Log in and replace the held credential.
    pub async fn authenticate(&self) -> Result<AuditCredential> {
        info!(username = %self.username, "Authenticating auditor identity");
        let token = self.registry.login(&self.username, &self.password).await?;
        let credential = AuditCredential::from_token(token);

        info!(
            username = %self.username,
            expires_at = ?credential.expires_at(),
            "Auditor authenticated"
        );
        *self.credential.write().await = Some(credential.clone());
        Ok(credential)
    }

    /// Current credential, authenticating first if none is held or it expired.
    pub async fn credential(&self) -> Result<AuditCredential> {
        {
            let held = self.credential.read().await;
            if let Some(credential) = held.as_ref() {
                if !credential.is_expired_at(Utc::now()) {
                    return Ok(credential.clone());
                }
                info!("Auditor credential expired, re-authenticating");
            }
        }
        self.authenticate().await
    }

    /// Drop the held credential so the next call logs in again
    pub async fn invalidate(&self) {
        *self.credential.write().await = None;
    }

    /// Run a privileged operation with the current credential.
    ///
    /// On an auth failure the session re-authenticates once and repeats the
    /// operation once; a second auth failure is returned to the caller.
    pub async fn with_credential<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn(AuditCredential) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let credential = self.credential().await?;
        match operation(credential).await {
            Err(err) if err.is_auth() => {
                warn!(error = %err, "Privileged call rejected, re-authenticating");
                self.invalidate().await;
                let credential = self.authenticate().await?;
                operation(credential).await
            }
            other => other,
        }
    }
}
