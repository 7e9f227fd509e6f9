use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};
use tokio::sync::watch;

use crate::{Error, Result};

/// Tracks the single blocking operation (such as waiting for a heading) a boat may have
/// outstanding. Beginning a new operation cancels the previous one.
#[derive(Debug, Default)]
pub struct OperationManager {
    current: Mutex<Option<Running>>,
    next_id: AtomicU64,
}

#[derive(Debug)]
struct Running {
    id: u64,
    cancel: watch::Sender<bool>,
}

impl OperationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new operation, cancelling the one in progress.
    pub fn begin(&self) -> Operation<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cancel, cancelled) = watch::channel(false);

        let previous = self.lock().replace(Running { id, cancel });
        if let Some(previous) = previous {
            previous.cancel.send_replace(true);
        }

        Operation {
            manager: self,
            id,
            cancelled,
        }
    }

    /// Cancel the operation in progress, returning `true` if there was one.
    pub fn cancel_running(&self) -> bool {
        match self.lock().take() {
            Some(running) => {
                running.cancel.send_replace(true);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A running operation. Dropping it marks the operation as finished.
pub struct Operation<'a> {
    manager: &'a OperationManager,
    id: u64,
    cancelled: watch::Receiver<bool>,
}

impl Operation<'_> {
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once this operation is cancelled.
    pub async fn cancelled(&mut self) {
        cancelled(&mut self.cancelled).await
    }

    /// Sleep for `duration`, or fail with [`Error::Cancelled`] if cancelled first.
    pub async fn sleep(&mut self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Poll `check` every `interval` until it reports success, fails, or this operation is
    /// cancelled.
    pub async fn wait_for_success<F, Fut>(&mut self, interval: Duration, mut check: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        loop {
            let done = tokio::select! {
                _ = self.cancelled() => return Err(Error::Cancelled),
                done = check() => done?,
            };
            if done {
                return Ok(());
            }
            self.sleep(interval).await?;
        }
    }
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        let mut current = self.manager.lock();
        if current.as_ref().is_some_and(|running| running.id == self.id) {
            *current = None;
        }
    }
}

/// Resolves once `flag` is set, or once its sender is dropped.
pub(crate) async fn cancelled(flag: &mut watch::Receiver<bool>) {
    while !*flag.borrow_and_update() {
        if flag.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn new_operation_cancels_previous() {
        let manager = OperationManager::new();
        let mut first = manager.begin();
        assert!(!first.is_cancelled());

        let second = manager.begin();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(matches!(
            first.sleep(Duration::from_secs(10)).await,
            Err(Error::Cancelled)
        ));

        // Finishing the superseded operation leaves the new one running
        drop(first);
        assert!(manager.is_running());
        drop(second);
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn cancel_running() {
        let manager = OperationManager::new();
        assert!(!manager.cancel_running());

        let operation = manager.begin();
        assert!(manager.cancel_running());
        assert!(operation.is_cancelled());
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn wait_for_success_polls_until_done() {
        let manager = OperationManager::new();
        let calls = AtomicUsize::new(0);

        let mut operation = manager.begin();
        operation
            .wait_for_success(Duration::from_millis(1), || async {
                Ok(calls.fetch_add(1, Ordering::SeqCst) == 2)
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn wait_for_success_propagates_errors() {
        let manager = OperationManager::new();
        let mut operation = manager.begin();
        let result = operation
            .wait_for_success(Duration::from_millis(1), || async { Err(Error::NoMovementSensor) })
            .await;
        assert!(matches!(result, Err(Error::NoMovementSensor)));
    }

    #[tokio::test]
    async fn wait_is_cancelled_by_another_task() {
        let manager = std::sync::Arc::new(OperationManager::new());
        let mut operation = manager.begin();

        let canceller = manager.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel_running();
        });

        let result = operation
            .wait_for_success(Duration::from_millis(5), || async { Ok(false) })
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
