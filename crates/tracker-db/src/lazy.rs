//! # Lazy Values
//!
//! Deferred, memoized values for payloads that should not travel with the
//! row that owns them (avatars, logos, attachments).
//!
//! ## Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Lazy::deferred(loader)           Lazy::ready(value)                   │
//! │       │  unresolved                    │  resolved                      │
//! │       ▼                                │                                │
//! │  get() ─ caller 1 runs loader ──┐      │                                │
//! │  get() ─ caller 2 waits ────────┤      │                                │
//! │                                 ▼      ▼                                │
//! │                       resolved: every get() returns the cached &T      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A loader that fails leaves the value unresolved; the error goes to the
//! caller and the next `get` tries again.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::OnceCell;

use crate::error::{DbError, DbResult};

/// Future returned by a loader.
pub type LoadFuture<T> = Pin<Box<dyn Future<Output = DbResult<T>> + Send>>;

/// Retrieval function of a deferred value.
pub type Loader<T> = Box<dyn Fn() -> LoadFuture<T> + Send + Sync>;

/// Boxes a closure into a [`Loader`].
pub fn loader<T, F, Fut>(f: F) -> Loader<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DbResult<T>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// A value computed at most once, on first access.
pub struct Lazy<T> {
    cell: OnceCell<T>,
    loader: Option<Loader<T>>,
}

impl<T> Lazy<T> {
    /// Already-resolved value.
    pub fn ready(value: T) -> Self {
        Lazy {
            cell: OnceCell::new_with(Some(value)),
            loader: None,
        }
    }

    /// Value produced by `f` on first `get`.
    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DbResult<T>> + Send + 'static,
    {
        Lazy {
            cell: OnceCell::new(),
            loader: Some(loader(f)),
        }
    }

    /// General constructor. An eager value wins over a loader.
    ///
    /// ## Returns
    /// * `Err(DbError::InvalidArgument)` - neither a value nor a loader
    pub fn new(value: Option<T>, loader: Option<Loader<T>>) -> DbResult<Self> {
        match (value, loader) {
            (Some(value), _) => Ok(Lazy::ready(value)),
            (None, Some(loader)) => Ok(Lazy {
                cell: OnceCell::new(),
                loader: Some(loader),
            }),
            (None, None) => Err(DbError::InvalidArgument(
                "lazy value needs a value or a loader".to_string(),
            )),
        }
    }

    /// Returns the value, running the loader if this is the first access.
    ///
    /// Concurrent callers are serialized: one runs the loader, the rest wait
    /// for its result.
    pub async fn get(&self) -> DbResult<&T> {
        self.cell
            .get_or_try_init(|| async {
                match &self.loader {
                    Some(load) => load().await,
                    None => Err(DbError::InvalidArgument(
                        "lazy value has no loader".to_string(),
                    )),
                }
            })
            .await
    }

    /// Whether the value has been resolved.
    pub fn is_present(&self) -> bool {
        self.cell.initialized()
    }

    /// The value if already resolved, without loading.
    pub fn peek(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Consumes the wrapper, yielding the value if resolved.
    pub fn into_inner(self) -> Option<T> {
        self.cell.into_inner()
    }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(value) => f.debug_tuple("Lazy").field(value).finish(),
            None => f.write_str("Lazy(<unresolved>)"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ready_value_is_present() {
        let lazy = Lazy::ready(7);
        assert!(lazy.is_present());
        assert_eq!(*lazy.get().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_deferred_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = Lazy::deferred(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(String::from("payload"))
            }
        });

        assert!(!lazy.is_present());
        assert_eq!(lazy.peek(), None);
        for _ in 0..5 {
            assert_eq!(lazy.get().await.unwrap(), "payload");
        }
        assert!(lazy.is_present());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_runs_loader_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = Arc::new(Lazy::deferred(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(vec![1u8, 2, 3])
            }
        }));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let lazy = lazy.clone();
            handles.push(tokio::spawn(async move { lazy.get().await.unwrap().clone() }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_can_be_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = Lazy::deferred(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(DbError::Store("disk I/O error".into()))
                } else {
                    Ok(42)
                }
            }
        });

        assert!(matches!(lazy.get().await, Err(DbError::Store(_))));
        assert!(!lazy.is_present());
        assert_eq!(*lazy.get().await.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_new_requires_value_or_loader() {
        let err = Lazy::<i32>::new(None, None).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));

        let eager = Lazy::new(Some(1), None).unwrap();
        assert!(eager.is_present());

        let deferred = Lazy::new(None, Some(loader(|| async { Ok(2) }))).unwrap();
        assert!(!deferred.is_present());
        assert_eq!(deferred.into_inner(), None);
    }
}
