//! Single-assignment asynchronous result cells.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::CallError;

/// A single-assignment result cell: resolvable or rejectable exactly once,
/// awaitable any number of times from any number of clones.
///
/// The first `resolve`/`reject` wins; later attempts are no-ops and report
/// `false`. This is what makes a late terminal error harmless for futures
/// that already carry a value.
pub(crate) struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    cell: Mutex<Option<Result<T, CallError>>>,
    notify: Notify,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Deferred<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cell: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// Store a success value. Returns `false` if the cell was already set.
    pub(crate) fn resolve(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// Store a failure. Returns `false` if the cell was already set.
    pub(crate) fn reject(&self, error: CallError) -> bool {
        self.complete(Err(error))
    }

    fn complete(&self, result: Result<T, CallError>) -> bool {
        {
            let mut cell = self.inner.cell.lock().expect("deferred lock poisoned");
            if cell.is_some() {
                return false;
            }
            *cell = Some(result);
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// Whether the cell holds a result.
    pub(crate) fn is_complete(&self) -> bool {
        self.inner
            .cell
            .lock()
            .expect("deferred lock poisoned")
            .is_some()
    }

    /// The stored result, if any, without waiting.
    pub(crate) fn peek(&self) -> Option<Result<T, CallError>> {
        self.inner
            .cell
            .lock()
            .expect("deferred lock poisoned")
            .clone()
    }

    /// Wait for the result.
    pub(crate) async fn wait(&self) -> Result<T, CallError> {
        loop {
            // Register interest before checking, so a completion landing
            // between the check and the await still wakes us.
            let mut notified = std::pin::pin!(self.inner.notify.notified());
            notified.as_mut().enable();

            if let Some(result) = self.peek() {
                return result;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolve_then_wait() {
        let deferred = Deferred::new();
        assert!(deferred.resolve(7));
        assert_eq!(deferred.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_wait_then_resolve() {
        let deferred = Deferred::new();
        let waiter = deferred.clone();
        let task = tokio::spawn(async move { waiter.wait().await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(deferred.resolve("done"));
        assert_eq!(task.await.unwrap().unwrap(), "done");
    }

    #[tokio::test]
    async fn test_first_write_wins() {
        let deferred = Deferred::new();
        assert!(deferred.resolve(1));
        assert!(!deferred.resolve(2));
        assert!(!deferred.reject(CallError::Cancelled));
        assert_eq!(deferred.wait().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reject_observed_by_all_waiters() {
        let deferred: Deferred<u8> = Deferred::new();
        let a = deferred.clone();
        let b = deferred.clone();
        let task_a = tokio::spawn(async move { a.wait().await });
        let task_b = tokio::spawn(async move { b.wait().await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(deferred.reject(CallError::Cancelled));

        assert!(task_a.await.unwrap().unwrap_err().is_cancelled());
        assert!(task_b.await.unwrap().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_multiple_awaits_on_same_cell() {
        let deferred = Deferred::new();
        deferred.resolve(3);
        assert_eq!(deferred.wait().await.unwrap(), 3);
        assert_eq!(deferred.wait().await.unwrap(), 3);
    }

    #[test]
    fn test_peek_and_is_complete() {
        let deferred: Deferred<u8> = Deferred::new();
        assert!(!deferred.is_complete());
        assert!(deferred.peek().is_none());
        deferred.resolve(9);
        assert!(deferred.is_complete());
        assert_eq!(deferred.peek().unwrap().unwrap(), 9);
    }
}
