//! Auth lifecycle services.
//!
//! ARCHITECTURE
//! ============
//! `session` mirrors backend auth state, `recovery` keeps the connection
//! usable, `provisioning` guarantees each identity a gym, and `auth` composes
//! them into the operations the UI calls. `onboarding` tracks per-user setup
//! progress alongside them.

pub mod auth;
pub mod onboarding;
pub mod provisioning;
pub mod recovery;
pub mod session;
