//! Caller identity resolution.

use std::{collections::HashMap, sync::Arc};

use axum::http::{HeaderMap, HeaderName, header::AUTHORIZATION};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{DEFAULT_IDENTITY_HEADER, IdentitySettings};

/// Authenticated caller of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
}

/// Maps request metadata to the calling user.
///
/// Returning `None` means no identity could be established; the command surface
/// turns that into an unauthorized error.
pub trait IdentityProvider: Send + Sync {
    fn current_actor(&self, headers: &HeaderMap) -> Option<Actor>;
}

/// Trusts a header injected by an upstream authenticating proxy.
pub struct TrustedHeaderIdentity {
    header: HeaderName,
}

impl TrustedHeaderIdentity {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl IdentityProvider for TrustedHeaderIdentity {
    fn current_actor(&self, headers: &HeaderMap) -> Option<Actor> {
        let raw = headers.get(&self.header)?.to_str().ok()?;
        match Uuid::parse_str(raw.trim()) {
            Ok(user_id) => Some(Actor { user_id }),
            Err(err) => {
                debug!(header = %self.header, error = %err, "ignoring malformed identity header");
                None
            }
        }
    }
}

/// Resolves `Authorization: Bearer <token>` against a fixed token table.
pub struct StaticTokenIdentity {
    tokens: HashMap<String, Uuid>,
}

impl StaticTokenIdentity {
    pub fn new(tokens: HashMap<String, Uuid>) -> Self {
        Self { tokens }
    }
}

impl IdentityProvider for StaticTokenIdentity {
    fn current_actor(&self, headers: &HeaderMap) -> Option<Actor> {
        let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let token = raw.strip_prefix("Bearer ")?.trim();
        self.tokens
            .get(token)
            .map(|&user_id| Actor { user_id })
    }
}

/// Build the provider described by the configuration.
pub fn from_settings(settings: &IdentitySettings) -> Arc<dyn IdentityProvider> {
    match settings {
        IdentitySettings::Header { name } => {
            let header = HeaderName::from_bytes(name.as_bytes()).unwrap_or_else(|err| {
                warn!(header = %name, error = %err, "invalid identity header; using default");
                HeaderName::from_static(DEFAULT_IDENTITY_HEADER)
            });
            Arc::new(TrustedHeaderIdentity::new(header))
        }
        IdentitySettings::Tokens { tokens } => Arc::new(StaticTokenIdentity::new(tokens.clone())),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn header_identity_parses_uuid() {
        let provider = TrustedHeaderIdentity::new(HeaderName::from_static("x-user-id"));
        let user = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        assert_eq!(provider.current_actor(&headers), None);

        headers.insert("x-user-id", HeaderValue::from_str(&user.to_string()).unwrap());
        assert_eq!(provider.current_actor(&headers), Some(Actor { user_id: user }));

        headers.insert("x-user-id", HeaderValue::from_static("not-a-uuid"));
        assert_eq!(provider.current_actor(&headers), None);
    }

    #[test]
    fn token_identity_requires_known_bearer_token() {
        let user = Uuid::new_v4();
        let provider =
            StaticTokenIdentity::new(HashMap::from([("s3cret".to_string(), user)]));
        let mut headers = HeaderMap::new();

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(provider.current_actor(&headers), Some(Actor { user_id: user }));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer other"));
        assert_eq!(provider.current_actor(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("s3cret"));
        assert_eq!(provider.current_actor(&headers), None);
    }
}
