use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A short code identifying one stored URL.
///
/// Codes are 1-32 ASCII alphanumeric characters. Generated codes are always
/// exactly as long as the generator is configured for (8 by default).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortCode(String);

const MIN_LENGTH: usize = 1;
const MAX_LENGTH: usize = 32;

impl ShortCode {
    /// Creates a new `ShortCode` after validating the input.
    ///
    /// Valid codes are 1-32 characters and contain only `[a-zA-Z0-9]`.
    pub fn new(code: impl Into<String>) -> std::result::Result<Self, CoreError> {
        let code = code.into();
        Self::validate(&code)?;
        Ok(Self(code))
    }

    /// Creates a `ShortCode` without validation.
    ///
    /// Use this only for codes produced by trusted internal sources
    /// (generators, rows already persisted by a backend).
    pub fn new_unchecked(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Accepts either a bare code or a full short URL such as
    /// `http://localhost:8080/AbC123xy` and extracts the code.
    pub fn from_url_or_code(input: &str) -> std::result::Result<Self, CoreError> {
        let trimmed = input.trim().trim_end_matches('/');
        let code = match trimmed.rsplit_once('/') {
            Some((_, last)) => last,
            None => trimmed,
        };
        Self::new(code)
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    /// Returns the short code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(code: &str) -> std::result::Result<(), CoreError> {
        if code.len() < MIN_LENGTH || code.len() > MAX_LENGTH {
            return Err(CoreError::InvalidShortCode(format!(
                "length must be between {} and {}, got {}",
                MIN_LENGTH,
                MAX_LENGTH,
                code.len()
            )));
        }

        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidShortCode(format!(
                "must contain only alphanumeric characters: '{}'",
                code
            )));
        }

        Ok(())
    }
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShortCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_codes() {
        assert!(ShortCode::new("a").is_ok());
        assert!(ShortCode::new("AbC123xy").is_ok());
        assert!(ShortCode::new("a".repeat(32)).is_ok());
    }

    #[test]
    fn empty_or_too_long() {
        assert!(ShortCode::new("").is_err());
        assert!(ShortCode::new("a".repeat(33)).is_err());
    }

    #[test]
    fn invalid_characters() {
        assert!(ShortCode::new("abc def").is_err());
        assert!(ShortCode::new("abc/def").is_err());
        assert!(ShortCode::new("abc-def").is_err());
        assert!(ShortCode::new("abc_def").is_err());
    }

    #[test]
    fn to_url_trims_trailing_slash() {
        let code = ShortCode::new("abc123").unwrap();
        assert_eq!(
            code.to_url("http://localhost:8080"),
            "http://localhost:8080/abc123"
        );
        assert_eq!(
            code.to_url("http://localhost:8080/"),
            "http://localhost:8080/abc123"
        );
    }

    #[test]
    fn from_url_or_code_accepts_both_forms() {
        let bare = ShortCode::from_url_or_code("AbC123xy").unwrap();
        let full = ShortCode::from_url_or_code("http://localhost:8080/AbC123xy").unwrap();
        let slash = ShortCode::from_url_or_code("http://localhost:8080/AbC123xy/").unwrap();

        assert_eq!(bare.as_str(), "AbC123xy");
        assert_eq!(full, bare);
        assert_eq!(slash, bare);
    }

    #[test]
    fn from_url_or_code_rejects_garbage() {
        assert!(ShortCode::from_url_or_code("http://localhost:8080/").is_err());
        assert!(ShortCode::from_url_or_code("   ").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let code = ShortCode::new_unchecked("abc");
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"abc\"");
    }
}
