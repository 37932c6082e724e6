//! Navigator for a terminal session.

use parking_lot::Mutex;
use seletivo_application::ports::Navigator;
use tracing::info;

/// Records guard redirects so the command can report them.
#[derive(Debug, Default)]
pub struct CliNavigator {
    last_redirect: Mutex<Option<String>>,
}

impl CliNavigator {
    /// Creates a navigator with no recorded redirect.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route of the most recent redirect, if any.
    #[must_use]
    pub fn last_redirect(&self) -> Option<String> {
        self.last_redirect.lock().clone()
    }
}

impl Navigator for CliNavigator {
    fn redirect(&self, route: &str) {
        info!(route, "redirecting");
        *self.last_redirect.lock() = Some(route.to_string());
    }
}
