//! Caller identity resolution.
//!
//! Authentication itself lives with the hosted identity provider. All the
//! chat endpoint needs is an opaque user id, or nothing for anonymous callers.
//! A bad or missing credential is never an error here: the request simply
//! proceeds without an identity and nothing gets stored.

use std::sync::Arc;

use agora_core::config::{IdentityConfig, IdentityMode};
use agora_core::Identity;
use axum::http::header::{InvalidHeaderName, AUTHORIZATION};
use axum::http::{HeaderMap, HeaderName};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Session secret not set (expected in ${env})")]
    MissingSecret { env: String },

    #[error("Invalid identity header name: {0}")]
    InvalidHeader(#[from] InvalidHeaderName),
}

pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity>;

    /// Resolver name for logging.
    fn name(&self) -> &str;
}

/// Treats every caller as anonymous.
pub struct AnonymousResolver;

impl IdentityResolver for AnonymousResolver {
    fn resolve(&self, _headers: &HeaderMap) -> Option<Identity> {
        None
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Trusts a header injected by the auth gateway in front of this service.
pub struct HeaderIdentityResolver {
    header: HeaderName,
}

impl HeaderIdentityResolver {
    pub fn new(header: &str) -> Result<Self, IdentityError> {
        Ok(Self {
            header: HeaderName::try_from(header.to_ascii_lowercase())?,
        })
    }
}

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .and_then(Identity::new)
    }

    fn name(&self) -> &str {
        "header"
    }
}

/// Verifies `Authorization: Bearer <user_id>.<hex hmac-sha256(user_id)>`.
pub struct SignedTokenResolver {
    secret: Vec<u8>,
}

impl SignedTokenResolver {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn signature(&self, user_id: &str) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(user_id.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Issue a token for `user_id`. Used by tooling and tests.
    pub fn sign(&self, user_id: &str) -> Option<String> {
        let id = Identity::new(user_id)?;
        let sig = self.signature(id.as_str())?;
        Some(format!("{}.{}", id, sig))
    }

    pub fn verify(&self, token: &str) -> Option<Identity> {
        let (user_id, sig_hex) = token.trim().rsplit_once('.')?;
        let expected = self.signature(user_id)?;

        if expected.as_bytes().ct_eq(sig_hex.as_bytes()).unwrap_u8() != 1 {
            tracing::debug!("Rejected session token with bad signature");
            return None;
        }
        Identity::new(user_id)
    }
}

impl IdentityResolver for SignedTokenResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let token = auth.strip_prefix("Bearer ")?;
        self.verify(token)
    }

    fn name(&self) -> &str {
        "signed_token"
    }
}

/// Build the resolver selected by `[identity] mode`.
pub fn resolver_from_config(
    config: &IdentityConfig,
) -> Result<Arc<dyn IdentityResolver>, IdentityError> {
    match config.mode {
        IdentityMode::None => Ok(Arc::new(AnonymousResolver)),
        IdentityMode::Header => Ok(Arc::new(HeaderIdentityResolver::new(&config.header)?)),
        IdentityMode::SignedToken => {
            let secret = std::env::var(&config.secret_env).unwrap_or_default();
            if secret.is_empty() {
                return Err(IdentityError::MissingSecret {
                    env: config.secret_env.clone(),
                });
            }
            Ok(Arc::new(SignedTokenResolver::new(secret)))
        }
    }
}
