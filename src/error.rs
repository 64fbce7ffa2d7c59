/// Boxed error returned by consumer-provided storage backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Network, DNS, TLS or body-decoding failure talking to the provider.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("{operation} failed with status {status}: {message}")]
    Provider {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("Invalid authorization URL from provider: {0}")]
    InvalidAuthorizationUrl(String),

    #[error("Malformed identity token: {0}")]
    MalformedToken(String),

    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Stored session is corrupt: {0}")]
    CorruptStoredSession(String),

    #[error("Session store error: {0}")]
    Store(BoxError),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("A refresh is already in flight")]
    RefreshInFlight,

    /// A provider response arrived after the session it belonged to was replaced or destroyed.
    #[error("Operation superseded by a newer session transition")]
    Superseded,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    #[must_use]
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }

    /// HTTP status of a provider rejection, if this is one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }
}
