//! Lifecycle control exposed to the operator surface.
//!
//! HTTP handlers that need to restart or stop the DLNA stack go through the
//! [`Lifecycle`] trait rather than holding the supervisor directly; the
//! supervisor is built after the HTTP layer and owns it.

/// Trait for lifecycle operations on the DLNA stack.
///
/// Both calls return immediately; the work happens on the supervisor's task.
///
/// # Example
///
/// ```ignore
/// async fn restart(State(state): State<AppState>) -> StatusCode {
///     state.lifecycle.request_restart("operator request");
///     StatusCode::ACCEPTED
/// }
/// ```
pub trait Lifecycle: Send + Sync {
    /// Requests a supervised restart of the DLNA stack.
    fn request_restart(&self, reason: &str);

    /// Requests an orderly stop of the DLNA stack.
    fn request_shutdown(&self);
}

/// No-op lifecycle for tests or for embedding without a supervisor.
pub struct NoopLifecycle;

impl Lifecycle for NoopLifecycle {
    fn request_restart(&self, reason: &str) {
        tracing::debug!("Restart requested (no-op): {}", reason);
    }

    fn request_shutdown(&self) {
        tracing::debug!("Shutdown requested (no-op)");
    }
}
