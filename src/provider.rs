use std::future::Future;

use serde::Serialize;
use url::Url;

use crate::error::Error;
use crate::types::{AuthorizationUrl, RawTokenResponse, RevokeResponse, TokenValidation};

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const MAX_ERROR_BODY: usize = 512;

/// Identity-provider endpoints.
///
/// Paths are resolved against the base URL, keeping any path prefix the
/// base carries (`https://idp/api` + `/auth/refresh` → `https://idp/api/auth/refresh`).
///
/// ```rust,ignore
/// use oidc_session::ProviderConfig;
///
/// let config = ProviderConfig::new("https://idp.example.com".parse()?)
///     .with_refresh_path("/oauth/refresh");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProviderConfig {
    pub(crate) base_url: Url,
    pub(crate) authorize_path: String,
    pub(crate) callback_path: String,
    pub(crate) refresh_path: String,
    pub(crate) logout_path: String,
    pub(crate) validate_path: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL.parse().expect("valid default URL"))
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            authorize_path: "/auth/authorize".into(),
            callback_path: "/auth/callback".into(),
            refresh_path: "/auth/refresh".into(),
            logout_path: "/auth/logout".into(),
            validate_path: "/auth/validate".into(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Env vars
    /// - `OIDC_PROVIDER_URL`: provider base URL (default `http://localhost:8080`)
    /// - `OIDC_AUTHORIZE_PATH`, `OIDC_CALLBACK_PATH`, `OIDC_REFRESH_PATH`,
    ///   `OIDC_LOGOUT_PATH`, `OIDC_VALIDATE_PATH`: endpoint path overrides
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `OIDC_PROVIDER_URL` is not a valid URL.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = match std::env::var("OIDC_PROVIDER_URL") {
            Ok(url_str) => {
                let url: Url = url_str
                    .parse()
                    .map_err(|e| Error::Config(format!("OIDC_PROVIDER_URL: {e}")))?;
                Self::new(url)
            }
            Err(_) => Self::default(),
        };

        if let Ok(path) = std::env::var("OIDC_AUTHORIZE_PATH") {
            config = config.with_authorize_path(path);
        }
        if let Ok(path) = std::env::var("OIDC_CALLBACK_PATH") {
            config = config.with_callback_path(path);
        }
        if let Ok(path) = std::env::var("OIDC_REFRESH_PATH") {
            config = config.with_refresh_path(path);
        }
        if let Ok(path) = std::env::var("OIDC_LOGOUT_PATH") {
            config = config.with_logout_path(path);
        }
        if let Ok(path) = std::env::var("OIDC_VALIDATE_PATH") {
            config = config.with_validate_path(path);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_authorize_path(mut self, path: impl Into<String>) -> Self {
        self.authorize_path = path.into();
        self
    }

    #[must_use]
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    #[must_use]
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = path.into();
        self
    }

    #[must_use]
    pub fn with_validate_path(mut self, path: impl Into<String>) -> Self {
        self.validate_path = path.into();
        self
    }

    /// Provider base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint path against the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL cannot carry a path.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("{path}: {e}")))
    }
}

/// The four remote lifecycle operations, plus provider-side token validation.
///
/// [`AuthClient`] is the HTTP implementation; tests and alternative
/// transports implement this directly.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Fetch the URL to send the user agent to for login.
    fn authorization_url(&self) -> impl Future<Output = Result<AuthorizationUrl, Error>> + Send;

    /// Exchange an authorization code for tokens. Must be called at most once per code.
    fn exchange_code(
        &self,
        code: &str,
        state: Option<&str>,
    ) -> impl Future<Output = Result<RawTokenResponse, Error>> + Send;

    /// Obtain fresh tokens with a refresh token.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RawTokenResponse, Error>> + Send;

    /// Revoke the session server-side. Accepts a missing token.
    fn revoke(
        &self,
        access_token: Option<&str>,
    ) -> impl Future<Output = Result<RevokeResponse, Error>> + Send;

    /// Ask the provider whether a token is currently valid.
    fn validate_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<TokenValidation, Error>> + Send;
}

/// HTTP client for the identity provider's JSON endpoints.
pub struct AuthClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct RevokeRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

impl AuthClient {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        let url = self.config.endpoint(path)?;
        tracing::debug!(operation, %url, "Provider request");
        let response = self.http.post(url).json(body).send().await?;
        Self::ensure_success(response, operation).await
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Provider {
            operation,
            status,
            message: truncate(body, MAX_ERROR_BODY),
        })
    }
}

impl IdentityProvider for AuthClient {
    async fn authorization_url(&self) -> Result<AuthorizationUrl, Error> {
        let url = self.config.endpoint(&self.config.authorize_path)?;
        tracing::debug!(operation = "authorize", %url, "Provider request");
        let response = self.http.get(url).send().await?;
        let response = Self::ensure_success(response, "authorize").await?;
        response.json::<AuthorizationUrl>().await.map_err(Into::into)
    }

    async fn exchange_code(
        &self,
        code: &str,
        state: Option<&str>,
    ) -> Result<RawTokenResponse, Error> {
        let body = ExchangeRequest { code, state };
        let response = self
            .post_json(&self.config.callback_path, &body, "token exchange")
            .await?;
        response.json::<RawTokenResponse>().await.map_err(Into::into)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RawTokenResponse, Error> {
        let body = RefreshRequest { refresh_token };
        let response = self
            .post_json(&self.config.refresh_path, &body, "token refresh")
            .await?;
        response.json::<RawTokenResponse>().await.map_err(Into::into)
    }

    async fn revoke(&self, access_token: Option<&str>) -> Result<RevokeResponse, Error> {
        let body = RevokeRequest { access_token };
        let response = self
            .post_json(&self.config.logout_path, &body, "logout")
            .await?;
        // Some providers answer logout with an empty body.
        let text = response.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }

    async fn validate_token(&self, token: &str) -> Result<TokenValidation, Error> {
        let body = ValidateRequest { token };
        let response = self
            .post_json(&self.config.validate_path, &body, "token validation")
            .await?;
        response.json::<TokenValidation>().await.map_err(Into::into)
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}
