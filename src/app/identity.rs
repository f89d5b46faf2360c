use anyhow::anyhow;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashSet,
    fmt,
};

/// Opaque stable identifier supplied by the external identity provider. The
/// core never inspects it beyond using it as a key, so construction bans the
/// `|` storage-key delimiter: an id containing it could sit inside another
/// user's key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> crate::Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(anyhow!("user id must not be empty"));
        }
        if raw.contains('|') {
            return Err(anyhow!("user id must not contain '|', got '{raw}'"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stand-in for the external identity provider. The interactive login flow
/// stays outside this service; all the core needs is to turn a presented
/// credential into a stable user id, or nothing when the credential is
/// unknown.
pub trait IdentityProvider {
    fn resolve(&self, credential: &str) -> crate::Result<Option<UserId>>;
}

/// Accepts any non-empty id, optionally restricted to an allow-list. With no
/// list configured this mirrors a managed auth service that has already
/// vetted the caller upstream.
#[derive(Debug, Clone, Default)]
pub struct AllowListIdentity {
    allowed: Option<HashSet<String>>,
}

impl AllowListIdentity {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn restricted_to(users: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: Some(users.into_iter().collect()),
        }
    }
}

impl IdentityProvider for AllowListIdentity {
    fn resolve(&self, credential: &str) -> crate::Result<Option<UserId>> {
        if credential.trim().is_empty() {
            return Ok(None);
        }
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(credential) {
                return Ok(None);
            }
        }
        // a credential that cannot form a valid id is unknown, not a fault
        match UserId::new(credential) {
            Ok(user) => Ok(Some(user)),
            Err(_) => Ok(None),
        }
    }
}
