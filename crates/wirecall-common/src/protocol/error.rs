use thiserror::Error;

use crate::wire::WireToken;

#[derive(Error, Debug)]
pub enum WirecallError {
    /// Malformed token nesting or an undecodable byte sequence.
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: WireToken },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// The interface shape cannot be mapped to requests or adapters.
    #[error("Composition error: {0}")]
    Composition(String),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Connection pool acquisition timed out after {0}ms")]
    PoolTimeout(u64),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A successful exchange whose response carries a non-zero result code.
    #[error("Application error {code}: {message}")]
    Application { code: i64, message: String },
}

impl WirecallError {
    pub fn unexpected(expected: impl Into<String>, found: WireToken) -> Self {
        WirecallError::UnexpectedToken {
            expected: expected.into(),
            found,
        }
    }

    /// Returns `true` for failures of the byte exchange itself.
    ///
    /// Transport failures abort a whole batch; everything else is scoped to
    /// the single request that produced it.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            WirecallError::Transport(_)
                | WirecallError::Timeout(_)
                | WirecallError::PoolTimeout(_)
                | WirecallError::Connection(_)
                | WirecallError::Io(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WirecallError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, WirecallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(WirecallError::Timeout(5000).is_transport());
        assert!(WirecallError::Connection("reset".into()).is_transport());
        assert!(WirecallError::Io(std::io::Error::other("boom")).is_transport());
        assert!(!WirecallError::Cancelled.is_transport());
        assert!(!WirecallError::Application {
            code: 3,
            message: "denied".into()
        }
        .is_transport());
    }

    #[test]
    fn test_unexpected_token_message() {
        let err = WirecallError::unexpected("a string", WireToken::Number);
        assert_eq!(
            err.to_string(),
            "Unexpected token: expected a string, found NUMBER"
        );
    }
}
