//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` wires the backend adapter, session store, recovery controller,
//! and provisioning service together once at startup. Clone is cheap: every
//! field is Arc-wrapped or Clone. The auth facade, route guard, and data
//! fetches all read from the one `SessionStore` held here.

use std::sync::Arc;

use uuid::Uuid;

use crate::backend::AuthBackend;
use crate::config::Timings;
use crate::guard::{self, GuardDecision, Navigator};
use crate::gyms::GymRepository;
use crate::members::MemberRepository;
use crate::notify::Notifier;
use crate::services::auth::AuthFacade;
use crate::services::onboarding::OnboardingTracker;
use crate::services::provisioning::GymProvisioner;
use crate::services::recovery::RecoveryController;
use crate::services::session::{SessionStore, StoreSubscription};
use crate::storage::LocalStore;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn AuthBackend>,
    pub store: Arc<SessionStore>,
    pub notifier: Notifier,
    pub navigator: Arc<dyn Navigator>,
    pub storage: Arc<dyn LocalStore>,
    pub provisioner: Arc<GymProvisioner>,
    pub recovery: Arc<RecoveryController>,
    pub members: Arc<dyn MemberRepository>,
    pub timings: Timings,
    /// Base URL used to build password-reset redirects.
    pub site_url: String,
}

impl AppState {
    #[must_use]
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        gyms: Arc<dyn GymRepository>,
        members: Arc<dyn MemberRepository>,
        storage: Arc<dyn LocalStore>,
        navigator: Arc<dyn Navigator>,
        timings: Timings,
        site_url: &str,
    ) -> Self {
        let store = Arc::new(SessionStore::new());
        let notifier = Notifier::new();
        let provisioner = Arc::new(GymProvisioner::new(gyms, notifier.clone()));
        let recovery = Arc::new(RecoveryController::new(
            Arc::clone(&backend),
            Arc::clone(&store),
            notifier.clone(),
            Arc::clone(&navigator),
            timings,
        ));
        Self {
            backend,
            store,
            notifier,
            navigator,
            storage,
            provisioner,
            recovery,
            members,
            timings,
            site_url: site_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Start mirroring backend auth state into the session store.
    #[must_use]
    pub fn mount(&self) -> StoreSubscription {
        self.store
            .mount(Arc::clone(&self.backend), self.timings.session_init_timeout)
    }

    #[must_use]
    pub fn auth(&self) -> AuthFacade {
        AuthFacade::new(self.clone())
    }

    /// Route-guard decision for the navigator's current route.
    #[must_use]
    pub fn guard(&self) -> GuardDecision {
        guard::enforce(&self.store.snapshot(), self.navigator.as_ref())
    }

    #[must_use]
    pub fn onboarding(&self, user_id: Uuid) -> OnboardingTracker {
        OnboardingTracker::load(Arc::clone(&self.storage), user_id)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::time::Duration;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::guard::{HistoryNavigator, Route};
    use crate::gyms::MemoryGymRepository;
    use crate::members::MemoryMemberRepository;
    use crate::storage::MemoryStore;

    /// `AppState` over in-memory collaborators, with handles to drive them.
    pub struct Harness {
        pub state: AppState,
        pub backend: Arc<MemoryBackend>,
        pub gyms: Arc<MemoryGymRepository>,
        pub members: Arc<MemoryMemberRepository>,
        pub storage: Arc<MemoryStore>,
        pub nav: Arc<HistoryNavigator>,
    }

    #[must_use]
    pub fn test_timings() -> Timings {
        Timings {
            session_init_timeout: Duration::from_millis(500),
            session_wait_timeout: Duration::from_millis(500),
            ..Timings::default()
        }
    }

    #[must_use]
    pub fn memory_harness(start: Route) -> Harness {
        let backend = Arc::new(MemoryBackend::new());
        let gyms = Arc::new(MemoryGymRepository::new());
        let members = Arc::new(MemoryMemberRepository::new());
        let storage = Arc::new(MemoryStore::new());
        let nav = Arc::new(HistoryNavigator::new(start));
        let state = AppState::new(
            Arc::clone(&backend) as Arc<dyn AuthBackend>,
            Arc::clone(&gyms) as Arc<dyn GymRepository>,
            Arc::clone(&members) as Arc<dyn MemberRepository>,
            Arc::clone(&storage) as Arc<dyn LocalStore>,
            Arc::clone(&nav) as Arc<dyn Navigator>,
            test_timings(),
            "http://localhost:5173/",
        );
        Harness { state, backend, gyms, members, storage, nav }
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
