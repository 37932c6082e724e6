//! Session lifecycle: credential store, refresh coordination, route
//! guarding and sign-in.

mod guard;
mod refresh;
mod sign_in;
mod store;

pub use guard::RouteGuard;
pub use refresh::{ClearReason, RefreshOutcome, SessionRefreshCoordinator};
pub use sign_in::SignIn;
pub use store::{CredentialStore, StoreError};
