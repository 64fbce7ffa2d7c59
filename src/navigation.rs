use std::sync::{Mutex, PoisonError};

use url::Url;

/// Query parameters the authorization server appends to the redirect URI.
pub const AUTHORIZATION_PARAMS: [&str; 4] = ["code", "state", "error", "error_description"];

/// The user agent's current location.
///
/// A browser binding reads `window.location` and uses `history.replaceState`;
/// a CLI or desktop app usually wraps the loopback redirect it received.
pub trait Navigation: Send + Sync + 'static {
    /// Value of a query parameter on the current location.
    fn query_param(&self, name: &str) -> Option<String>;

    /// Remove the authorization parameters from the visible location
    /// without reloading or adding a history entry.
    fn strip_authorization_params(&self);

    /// Send the user agent to `url` (login redirect).
    fn redirect(&self, url: &Url);
}

/// [`Navigation`] over an in-memory [`Url`].
///
/// Redirects are recorded rather than followed; read them back with
/// [`UrlNavigation::last_redirect`].
#[derive(Debug)]
pub struct UrlNavigation {
    current: Mutex<Url>,
    redirected_to: Mutex<Option<Url>>,
}

impl UrlNavigation {
    #[must_use]
    pub fn new(current: Url) -> Self {
        Self {
            current: Mutex::new(current),
            redirected_to: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn current(&self) -> Url {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last_redirect(&self) -> Option<Url> {
        self.redirected_to
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigation for UrlNavigation {
    fn query_param(&self, name: &str) -> Option<String> {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    fn strip_authorization_params(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let kept: Vec<(String, String)> = current
            .query_pairs()
            .filter(|(k, _)| !AUTHORIZATION_PARAMS.contains(&k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            current.set_query(None);
        } else {
            current.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    fn redirect(&self, url: &Url) {
        *self
            .redirected_to
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(url.clone());
    }
}
