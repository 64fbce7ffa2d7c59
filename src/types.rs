use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Stable identifier of the authenticated subject (OIDC `sub` claim).
///
/// The empty string is reserved as the "claims unavailable" sentinel.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct Subject(pub String);

impl Subject {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Subject {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Subset of standard OIDC identity claims.
///
/// Decoded without verification: treat as display data, never as an
/// authorization input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserClaims {
    #[serde(rename = "sub")]
    pub subject: Subject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(rename = "picture", default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
}

impl UserClaims {
    /// Create claims with only the required subject.
    #[must_use]
    pub fn new(subject: impl Into<Subject>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// Claims for a session whose provider response carried no identity token.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new("")
    }

    /// Claims for an identity token that could not be decoded.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new("unknown")
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_given_name(mut self, given_name: impl Into<String>) -> Self {
        self.given_name = Some(given_name.into());
        self
    }

    #[must_use]
    pub fn with_family_name(mut self, family_name: impl Into<String>) -> Self {
        self.family_name = Some(family_name.into());
        self
    }

    #[must_use]
    pub fn with_picture_url(mut self, url: impl Into<String>) -> Self {
        self.picture_url = Some(url.into());
        self
    }
}

/// The unit of authenticated identity.
///
/// Created only from a successful code exchange or refresh, replaced
/// wholesale on refresh, destroyed on logout.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Session {
    pub access_token: String,
    #[serde(rename = "id_token", default, skip_serializing_if = "Option::is_none")]
    pub identity_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(rename = "user_info")]
    pub claims: UserClaims,
}

impl Session {
    /// Assemble a session from a provider token response and decoded claims.
    #[must_use]
    pub fn new(tokens: RawTokenResponse, claims: UserClaims) -> Self {
        Self {
            access_token: tokens.access_token,
            identity_token: tokens.identity_token,
            refresh_token: tokens.refresh_token,
            claims,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[redacted]")
            .field("identity_token", &self.identity_token.as_ref().map(|_| "[redacted]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("claims", &self.claims)
            .finish()
    }
}

/// Token response from the provider's callback and refresh endpoints.
#[derive(Clone, Deserialize)]
#[non_exhaustive]
pub struct RawTokenResponse {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(rename = "id_token", alias = "identityToken", default)]
    pub identity_token: Option<String>,
    #[serde(alias = "refreshToken", default)]
    pub refresh_token: Option<String>,
}

impl RawTokenResponse {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            identity_token: None,
            refresh_token: None,
        }
    }

    #[must_use]
    pub fn with_identity_token(mut self, token: impl Into<String>) -> Self {
        self.identity_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }
}

impl std::fmt::Debug for RawTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawTokenResponse")
            .field("identity_token", &self.identity_token.is_some())
            .field("refresh_token", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Why the lifecycle landed in [`LifecycleState::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
#[non_exhaustive]
pub enum FailureReason {
    /// The provider redirected back with an `error` parameter.
    AuthorizationDenied(String),
    /// Callback `state` did not match the one recorded at login.
    StateMismatch,
    /// Code exchange (or committing its result) failed.
    ExchangeFailed(String),
}

/// Session lifecycle as published by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Booting,
    Unauthenticated,
    PendingCallback,
    Authenticated,
    Refreshing,
    Error(FailureReason),
}

impl LifecycleState {
    /// True while a live session is held in memory.
    #[must_use]
    pub fn has_session(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Refreshing)
    }

    /// True for states the guard must render as loading.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Booting | Self::PendingCallback)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Booting => "booting",
            Self::Unauthenticated => "unauthenticated",
            Self::PendingCallback => "pending_callback",
            Self::Authenticated => "authenticated",
            Self::Refreshing => "refreshing",
            Self::Error(_) => "error",
        };
        f.write_str(name)
    }
}

/// Authorization redirect target returned by the provider.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct AuthorizationUrl {
    #[serde(rename = "authUrl", alias = "auth_url")]
    pub auth_url: String,
}

/// Acknowledgement from the provider's logout endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[non_exhaustive]
pub struct RevokeResponse {
    #[serde(default)]
    pub message: String,
}

/// Provider-side verdict on an access token.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}
