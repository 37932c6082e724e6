//! Navigation port used by the route guard.

/// Router collaborator that moves the user away from protected content.
pub trait Navigator: Send + Sync {
    /// Navigates to `route`.
    fn redirect(&self, route: &str);
}
