#![doc = include_str!("../README.md")]

pub mod claims;
pub mod controller;
pub mod csrf;
pub mod error;
pub mod guard;
pub mod navigation;
pub mod provider;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use claims::decode_claims;
pub use controller::{ControllerConfig, SessionController};
pub use csrf::{generate_state, state_from_url};
pub use error::{BoxError, Error};
pub use guard::{AccessGuard, GuardView, Rendered, classify};
pub use navigation::{Navigation, UrlNavigation};
pub use provider::{AuthClient, IdentityProvider, ProviderConfig};
#[cfg(feature = "file-store")]
pub use store::FileStore;
pub use store::{KeyValueStore, MemoryStore, SessionStore, StoreKeys};
pub use types::{
    AuthorizationUrl, FailureReason, LifecycleState, RawTokenResponse, RevokeResponse, Session,
    Subject, TokenValidation, UserClaims,
};
