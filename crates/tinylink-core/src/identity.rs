use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of the caller that owns a set of short URLs.
///
/// Issued by the authentication layer in front of the service; the core only
/// requires it to be a UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// Mints a fresh random owner id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an owner id from its textual form.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|e| CoreError::InvalidOwnerId(format!("'{value}': {e}")))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for OwnerId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for OwnerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Per-request data handed from the transport layer to the service.
///
/// The owner is optional: redirects are anonymous, while creating, listing
/// and deleting URLs require an identity.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    owner: Option<OwnerId>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self { owner: None }
    }

    pub fn for_owner(owner: OwnerId) -> Self {
        Self { owner: Some(owner) }
    }

    /// Returns the caller identity, or `MissingIdentity` for anonymous requests.
    pub fn owner_id(&self) -> Result<&OwnerId, CoreError> {
        self.owner.as_ref().ok_or(CoreError::MissingIdentity)
    }
}
