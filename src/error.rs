// Error handling module
// Defines the failure modes of credential resolution and token acquisition

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving an access token
#[derive(Error, Debug)]
pub enum AuthError {
    /// No authentication method configured, or a required field is missing
    #[error("Configuration error: {0}")]
    Config(String),

    /// A file-based secret, certificate or assertion could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The client certificate bundle is malformed
    #[error("Certificate parse error: {0}")]
    CertificateParse(String),

    /// The CI OIDC federation endpoint was unreachable or answered badly
    #[error("OIDC federation fetch failed: {0}")]
    FederationFetch(String),

    /// The identity provider credential could not be built
    #[error("Credential construction failed: {0}")]
    CredentialConstruction(String),

    /// The identity provider rejected the token request
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,
}

impl AuthError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AuthError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;
