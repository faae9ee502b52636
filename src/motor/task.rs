//! Background task handle with cooperative cancellation.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Cancellation flag handed to a background action.
#[derive(Debug, Clone)]
pub(crate) struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[cfg(test)]
    pub(crate) fn new(cancelled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(cancelled)))
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Clears the async-action flag when the background action ends, even by panicking.
pub(crate) struct AsyncDone(pub(crate) Arc<AtomicBool>);

impl Drop for AsyncDone {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The background action of one motor.
///
/// At most one action runs at a time; the state machine gates every start.
#[derive(Debug, Default)]
pub(crate) struct BackgroundTask {
    cancel: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundTask {
    /// Spawn `action` on a named thread with a fresh cancellation flag.
    pub(crate) fn spawn<F>(&self, name: &str, action: F) -> io::Result<()>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        self.cancel.store(false, Ordering::Release);
        let token = CancelToken(Arc::clone(&self.cancel));
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || action(token))?;

        // The previous action already cleared its async flag; let its thread finish detached.
        let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(handle);
        Ok(())
    }

    /// Ask the running action to stop at its next check.
    pub(crate) fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.cancel();
        let handle = self
            .handle
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("background action panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_reaches_running_action() {
        let task = BackgroundTask::default();
        let done = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&done);
        task.spawn("test-action", move |cancel| {
            let _done = AsyncDone(flag);
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();

        assert!(done.load(Ordering::Acquire));
        task.cancel();
        drop(task);
        assert!(!done.load(Ordering::Acquire));
    }

    #[test]
    fn test_async_done_clears_flag_on_panic() {
        let flag = Arc::new(AtomicBool::new(true));
        let inner = Arc::clone(&flag);
        let result = thread::spawn(move || {
            let _done = AsyncDone(inner);
            panic!("boom");
        })
        .join();
        assert!(result.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }
}
