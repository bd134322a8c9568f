//! Request header helpers for integration tests.
//!
//! Services behind the gateway receive identity headers injected by the
//! gateway, and cron endpoints receive the shared secret from the external
//! scheduler. These helpers build both so tests need no real gateway.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

use clipcast_auth_types::cron::X_CRON_SECRET;
use clipcast_auth_types::identity::{X_CLIPCAST_USER_ID, X_CLIPCAST_USER_ROLE};

/// Configurable identity injected into test requests.
pub struct MockAuth {
    pub user_id: Uuid,
    pub user_role: u8,
}

impl MockAuth {
    pub fn new(user_id: Uuid, user_role: u8) -> Self {
        Self { user_id, user_role }
    }

    /// Return headers as if the gateway injected them.
    pub fn headers(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(
            HeaderName::from_static(X_CLIPCAST_USER_ID),
            HeaderValue::from_str(&self.user_id.to_string()).unwrap(),
        );
        map.insert(
            HeaderName::from_static(X_CLIPCAST_USER_ROLE),
            HeaderValue::from_str(&self.user_role.to_string()).unwrap(),
        );
        map
    }
}

/// Headers an external cron runner sends with the shared secret.
pub fn cron_headers(secret: &str) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(
        HeaderName::from_static(X_CRON_SECRET),
        HeaderValue::from_str(secret).unwrap(),
    );
    map
}
