/// Callbacks fired at iteration boundaries of a deconvolution run.
///
/// All methods have no-op defaults. `should_cancel` is polled between
/// iterations, never mid-iteration, so a cancelled run always stops with
/// its buffers in a well-defined state.
pub trait RunObserver: Send + Sync {
    /// Called once after buffers are uploaded, before the first iteration.
    fn begin(&self, _total_iterations: usize) {}

    /// Called after each completed iteration with its 1-based index.
    fn iteration_complete(&self, _index: usize) {}

    /// Return true to stop the run at the next iteration boundary.
    fn should_cancel(&self) -> bool {
        false
    }
}

/// Observer that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpObserver;

impl RunObserver for NoOpObserver {}
