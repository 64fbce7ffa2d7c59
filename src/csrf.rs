use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use url::Url;

/// Generates a cryptographically random `state` parameter for `OAuth2`.
///
/// Returns a 22-character URL-safe string (16 random bytes → base64url).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Returns the `state` query parameter of an authorization URL, if any.
#[must_use]
pub fn state_from_url(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Makes sure an authorization URL carries a `state`, appending a fresh one
/// when the provider left it out. Returns the state that must be echoed back.
pub(crate) fn ensure_state(url: &mut Url) -> String {
    if let Some(state) = state_from_url(url) {
        return state;
    }
    let state = generate_state();
    url.query_pairs_mut().append_pair("state", &state);
    state
}
