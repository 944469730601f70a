//! Errors surfaced by the service operations.

use crate::storage::StorageError;

/// Failure of a profile, chat, complaint or account operation.
///
/// Validation failures are raised before any storage call. Storage failures
/// are logged where they happen and never retried.
#[derive(Debug)]
pub enum SocialError {
    /// A referenced user, chat or request does not exist.
    NotFound(String),
    /// Input rejected before touching storage.
    Validation(String),
    /// The operation is not allowed from the current view.
    Forbidden(String),
    /// Password did not match the one the chat was hidden with.
    WrongPassword,
    /// The viewer has blocked the other user.
    Blocked,
    Storage(StorageError),
}

impl std::fmt::Display for SocialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocialError::NotFound(what) => write!(f, "not found: {what}"),
            SocialError::Validation(msg) => write!(f, "invalid input: {msg}"),
            SocialError::Forbidden(msg) => write!(f, "not allowed: {msg}"),
            SocialError::WrongPassword => write!(f, "incorrect password"),
            SocialError::Blocked => write!(f, "user is blocked"),
            SocialError::Storage(e) => write!(f, "storage failure: {e}"),
        }
    }
}

impl std::error::Error for SocialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SocialError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for SocialError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => SocialError::NotFound(what),
            other => SocialError::Storage(other),
        }
    }
}

pub type SocialResult<T> = Result<T, SocialError>;

/// Log a failed storage call under `context` and convert it.
pub(crate) fn logged<T>(context: &str, result: Result<T, StorageError>) -> SocialResult<T> {
    result.map_err(|e| {
        crate::slog!("{}: {}", context, e);
        SocialError::from(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_not_found_maps_to_not_found() {
        let err: SocialError = StorageError::NotFound("like a -> b".to_string()).into();
        assert!(matches!(err, SocialError::NotFound(_)));
        assert_eq!(err.to_string(), "not found: like a -> b");
    }
}
