use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised while validating caller input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("invalid owner id: {0}")]
    InvalidOwnerId(String),
    #[error("request carries no owner identity")]
    MissingIdentity,
}

impl CoreError {
    /// HTTP-style status hint for callers translating this error.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::InvalidShortCode(_) | CoreError::InvalidOwnerId(_) => 400,
            CoreError::MissingIdentity => 401,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A live mapping for the same original URL exists; carries its short URL.
    #[error("url already shortened: {0}")]
    AlreadyExists(String),
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("short code is gone: {0}")]
    Gone(String),
    #[error("health check is not supported by the {0} backend")]
    WrongMode(&'static str),
    #[error("no free short code after {attempts} attempts")]
    ExhaustedKeyspace { attempts: usize },
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage io failed: {0}")]
    Io(String),
    #[error("storage serialization failed: {0}")]
    Serialization(String),
}

impl StorageError {
    /// HTTP-style status hint for callers translating this error.
    ///
    /// `NotFound` maps to 400 rather than 404: an unknown code is treated as
    /// invalid input by the redirect endpoint.
    pub fn status_code(&self) -> u16 {
        match self {
            StorageError::AlreadyExists(_) => 409,
            StorageError::NotFound(_) => 400,
            StorageError::Gone(_) => 410,
            StorageError::WrongMode(_)
            | StorageError::ExhaustedKeyspace { .. }
            | StorageError::Unavailable(_)
            | StorageError::Timeout(_)
            | StorageError::Query(_)
            | StorageError::InvalidData(_)
            | StorageError::Io(_)
            | StorageError::Serialization(_) => 500,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_status_codes() {
        assert_eq!(StorageError::AlreadyExists("u".into()).status_code(), 409);
        assert_eq!(StorageError::NotFound("c".into()).status_code(), 400);
        assert_eq!(StorageError::Gone("c".into()).status_code(), 410);
        assert_eq!(StorageError::WrongMode("in-memory").status_code(), 500);
        assert_eq!(StorageError::Io("disk".into()).status_code(), 500);
    }

    #[test]
    fn core_status_codes() {
        assert_eq!(CoreError::InvalidShortCode("x".into()).status_code(), 400);
        assert_eq!(CoreError::MissingIdentity.status_code(), 401);
    }
}
