//! Shared-secret authentication for scheduler-triggered endpoints.
//!
//! External cron runners present the secret either as `x-cron-secret: <secret>`
//! or as `Authorization: Bearer <secret>`.

use std::fmt;
use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use http::header::AUTHORIZATION;
use http::request::Parts;
use http::{HeaderMap, StatusCode};

pub const X_CRON_SECRET: &str = "x-cron-secret";

/// The configured cron secret. Exposed to extractors through `FromRef`.
#[derive(Clone)]
pub struct CronSecret(Arc<str>);

impl CronSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::from(secret.into()))
    }

    /// Compare without short-circuiting on the first differing byte.
    /// An empty configured secret matches nothing.
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.0.as_bytes();
        let presented = presented.as_bytes();
        if expected.is_empty() || expected.len() != presented.len() {
            return false;
        }
        expected
            .iter()
            .zip(presented)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for CronSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CronSecret(<redacted>)")
    }
}

/// Proof that the request carried the cron secret. Rejects with 401 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct CronAuth;

fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(X_CRON_SECRET).and_then(|v| v.to_str().ok()) {
        return Some(value.trim());
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

impl<S> FromRequestParts<S> for CronAuth
where
    CronSecret: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let secret = CronSecret::from_ref(state);
        let authorized = presented_secret(&parts.headers).is_some_and(|p| secret.matches(p));
        if !authorized {
            tracing::warn!(uri = %parts.uri, "rejected cron request without valid secret");
        }

        async move {
            if authorized {
                Ok(CronAuth)
            } else {
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}
