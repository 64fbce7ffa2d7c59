#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use oidc_session::{
    AuthorizationUrl, Error, IdentityProvider, MemoryStore, RawTokenResponse, RevokeResponse,
    SessionController, TokenValidation, UrlNavigation,
};
use tokio::sync::Notify;

pub type TestController = SessionController<FakeProvider, Arc<MemoryStore>, UrlNavigation>;

/// Scripted identity provider. Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct FakeProvider {
    inner: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    auth_url: Option<String>,
    exchange: VecDeque<Result<RawTokenResponse, Error>>,
    refresh: VecDeque<Result<RawTokenResponse, Error>>,
    revoke_error: Option<Error>,
    exchange_gate: Option<Arc<Notify>>,
    refresh_gate: Option<Arc<Notify>>,
    calls: Vec<String>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth_url(self, url: &str) -> Self {
        self.script().auth_url = Some(url.to_owned());
        self
    }

    pub fn on_exchange(self, result: Result<RawTokenResponse, Error>) -> Self {
        self.script().exchange.push_back(result);
        self
    }

    pub fn on_refresh(self, result: Result<RawTokenResponse, Error>) -> Self {
        self.script().refresh.push_back(result);
        self
    }

    pub fn failing_revoke(self, error: Error) -> Self {
        self.script().revoke_error = Some(error);
        self
    }

    /// Hold exchange responses until the returned notifier fires.
    pub fn gate_exchange(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script().exchange_gate = Some(gate.clone());
        gate
    }

    /// Hold refresh responses until the returned notifier fires.
    pub fn gate_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script().refresh_gate = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.script().calls.clone()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.inner.lock().unwrap()
    }

    fn record(&self, call: String) {
        self.script().calls.push(call);
    }
}

impl IdentityProvider for FakeProvider {
    async fn authorization_url(&self) -> Result<AuthorizationUrl, Error> {
        self.record("authorize".into());
        let url = self
            .script()
            .auth_url
            .clone()
            .unwrap_or_else(|| "https://idp.example.com/authorize?client_id=app".into());
        Ok(serde_json::from_value(serde_json::json!({ "authUrl": url })).unwrap())
    }

    async fn exchange_code(
        &self,
        code: &str,
        state: Option<&str>,
    ) -> Result<RawTokenResponse, Error> {
        self.record(format!("exchange:{code}:{}", state.unwrap_or("-")));
        let gate = self.script().exchange_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.script()
            .exchange
            .pop_front()
            .expect("unscripted exchange_code call")
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RawTokenResponse, Error> {
        self.record(format!("refresh:{refresh_token}"));
        let gate = self.script().refresh_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.script()
            .refresh
            .pop_front()
            .expect("unscripted refresh call")
    }

    async fn revoke(&self, access_token: Option<&str>) -> Result<RevokeResponse, Error> {
        self.record(format!("revoke:{}", access_token.unwrap_or("-")));
        match self.script().revoke_error.take() {
            Some(error) => Err(error),
            None => Ok(RevokeResponse::default()),
        }
    }

    async fn validate_token(&self, token: &str) -> Result<TokenValidation, Error> {
        self.record(format!("validate:{token}"));
        Ok(serde_json::from_value(serde_json::json!({ "valid": true })).unwrap())
    }
}

pub fn provider_error(operation: &'static str, status: u16) -> Error {
    Error::Provider {
        operation,
        status,
        message: "rejected".into(),
    }
}

/// Unsigned JWT-shaped token carrying `claims` as its payload.
pub fn identity_token(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

pub fn navigation(url: &str) -> UrlNavigation {
    UrlNavigation::new(url.parse().unwrap())
}

pub fn controller(provider: FakeProvider, store: Arc<MemoryStore>, url: &str) -> TestController {
    SessionController::new(provider, store, navigation(url))
}

/// Seed the store with a session as a previous run would have left it.
pub fn seed_session(store: &MemoryStore, access_token: &str, refresh_token: Option<&str>) {
    let mut session = serde_json::json!({
        "access_token": access_token,
        "user_info": { "sub": "u1", "email": "a@b.com" },
    });
    if let Some(rt) = refresh_token {
        session["refresh_token"] = rt.into();
    }
    store.insert("authTokens", session.to_string());
    store.insert("user", r#"{"sub":"u1","email":"a@b.com"}"#);
}
