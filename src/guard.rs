use url::Url;

use crate::controller::SessionController;
use crate::error::Error;
use crate::navigation::Navigation;
use crate::provider::IdentityProvider;
use crate::store::KeyValueStore;
use crate::types::LifecycleState;

/// What a protected view should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardView {
    Loading,
    LoginPrompt,
    Content,
}

/// Project a lifecycle state onto the three guard outcomes.
///
/// `Refreshing` renders as content: the previous session is still live.
#[must_use]
pub fn classify(state: &LifecycleState) -> GuardView {
    match state {
        LifecycleState::Booting | LifecycleState::PendingCallback => GuardView::Loading,
        LifecycleState::Unauthenticated | LifecycleState::Error(_) => GuardView::LoginPrompt,
        LifecycleState::Authenticated | LifecycleState::Refreshing => GuardView::Content,
    }
}

/// Result of [`AccessGuard::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered<T> {
    Loading,
    LoginPrompt,
    Content(T),
}

/// Gate for protected views. Holds no state of its own.
///
/// ```rust,ignore
/// let guard = AccessGuard::new(&controller);
/// match guard.render(|| dashboard(&controller)) {
///     Rendered::Loading => spinner(),
///     Rendered::LoginPrompt => login_button(|| guard.login()),
///     Rendered::Content(page) => page,
/// }
/// ```
pub struct AccessGuard<'a, P, K, N> {
    controller: &'a SessionController<P, K, N>,
}

impl<'a, P, K, N> AccessGuard<'a, P, K, N>
where
    P: IdentityProvider,
    K: KeyValueStore,
    N: Navigation,
{
    #[must_use]
    pub fn new(controller: &'a SessionController<P, K, N>) -> Self {
        Self { controller }
    }

    #[must_use]
    pub fn view(&self) -> GuardView {
        classify(&self.controller.state())
    }

    /// Build the protected content only when access is granted.
    pub fn render<T>(&self, content: impl FnOnce() -> T) -> Rendered<T> {
        match self.view() {
            GuardView::Loading => Rendered::Loading,
            GuardView::LoginPrompt => Rendered::LoginPrompt,
            GuardView::Content => Rendered::Content(content()),
        }
    }

    /// The login prompt's trigger: start the authorization redirect.
    ///
    /// # Errors
    ///
    /// See [`SessionController::login`].
    pub async fn login(&self) -> Result<Url, Error> {
        self.controller.login().await
    }

    /// Wait until the controller leaves the loading states.
    pub async fn ready(&self) -> GuardView {
        let mut rx = self.controller.subscribe();
        match rx.wait_for(|state| !state.is_loading()).await {
            Ok(state) => classify(&state),
            Err(_) => self.view(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureReason;

    #[test]
    fn maps_every_state_to_one_bucket() {
        let cases = [
            (LifecycleState::Booting, GuardView::Loading),
            (LifecycleState::PendingCallback, GuardView::Loading),
            (LifecycleState::Unauthenticated, GuardView::LoginPrompt),
            (
                LifecycleState::Error(FailureReason::AuthorizationDenied("access_denied".into())),
                GuardView::LoginPrompt,
            ),
            (LifecycleState::Authenticated, GuardView::Content),
            (LifecycleState::Refreshing, GuardView::Content),
        ];
        for (state, expected) in cases {
            assert_eq!(classify(&state), expected, "state {state}");
        }
    }
}
