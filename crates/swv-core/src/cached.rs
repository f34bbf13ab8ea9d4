//! Lazily fetched, cached remote handles.

use std::cell::{Cell, RefCell};
use std::fmt;

use crate::{ForkState, ForkedFuture};

/// A remote object reference fetched once and shared by every caller.
///
/// The handle belongs to the object that created it (typically a backend
/// wrapper); there is no process-wide cache.
pub struct CachedHandle<T> {
    fetch: Box<dyn Fn() -> ForkedFuture<T>>,
    slot: RefCell<Option<ForkedFuture<T>>>,
    fetches: Cell<u64>,
}

impl<T: Clone + 'static> CachedHandle<T> {
    /// `fetch` issues the request for the handle. It is called at most once
    /// while a fetch is in flight or after one succeeded.
    pub fn new<F>(fetch: F) -> Self
    where
        F: Fn() -> ForkedFuture<T> + 'static,
    {
        Self {
            fetch: Box::new(fetch),
            slot: RefCell::new(None),
            fetches: Cell::new(0),
        }
    }

    /// The cached handle, the in-flight fetch, or a new fetch.
    ///
    /// A failed fetch is forgotten, so the call after a failure issues a new
    /// one.
    pub fn get(&self) -> ForkedFuture<T> {
        if let Some(fork) = self.slot.borrow().as_ref() {
            if fork.state() != ForkState::Rejected {
                return fork.clone();
            }
            tracing::debug!("cached handle fetch had failed, fetching again");
        }

        // `fetch` runs with the slot unborrowed, so it may call back into
        // this handle. Nothing here awaits between the check and the store.
        let fork = (self.fetch)();
        self.fetches.set(self.fetches.get() + 1);
        *self.slot.borrow_mut() = Some(fork.clone());
        fork
    }

    /// The handle, if a fetch already succeeded.
    pub fn peek(&self) -> Option<T> {
        self.slot
            .borrow()
            .as_ref()
            .and_then(|fork| fork.peek())
            .and_then(Result::ok)
    }

    pub fn is_cached(&self) -> bool {
        self.slot
            .borrow()
            .as_ref()
            .is_some_and(|fork| fork.state() == ForkState::Resolved)
    }

    /// How many fetches were issued so far.
    pub fn fetches(&self) -> u64 {
        self.fetches.get()
    }
}

impl<T> fmt::Debug for CachedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedHandle")
            .field("slot", &self.slot.borrow())
            .field("fetches", &self.fetches.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorCode, RemoteError, RpcError};
    use std::rc::Rc;
    use tokio::sync::oneshot;
    use tokio::task::LocalSet;

    #[tokio::test]
    async fn concurrent_gets_share_one_fetch() {
        LocalSet::new()
            .run_until(async {
                let (tx, rx) = oneshot::channel::<u32>();
                let rx = RefCell::new(Some(rx));
                let handle = CachedHandle::new(move || {
                    let rx = rx.borrow_mut().take();
                    ForkedFuture::new(async move {
                        match rx {
                            Some(rx) => rx.await.map_err(|_| RpcError::invalid_request("dropped")),
                            None => Err(RpcError::invalid_request("fetched twice")),
                        }
                    })
                });

                let branches: Vec<_> = (0..4).map(|_| handle.get().add_branch()).collect();
                assert_eq!(handle.fetches(), 1);
                assert!(!handle.is_cached());

                tx.send(42).unwrap();
                for branch in branches {
                    assert_eq!(branch.await, Ok(42));
                }
                assert_eq!(handle.peek(), Some(42));

                // Served from the cache without another fetch.
                assert_eq!(handle.get().add_branch().await, Ok(42));
                assert_eq!(handle.fetches(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        LocalSet::new()
            .run_until(async {
                let attempts = Rc::new(Cell::new(0u32));
                let handle = {
                    let attempts = attempts.clone();
                    CachedHandle::new(move || {
                        attempts.set(attempts.get() + 1);
                        if attempts.get() == 1 {
                            ForkedFuture::rejected(RpcError::Remote(RemoteError::new(
                                ErrorCode::Internal,
                                "not yet",
                            )))
                        } else {
                            ForkedFuture::resolved(attempts.get())
                        }
                    })
                };

                assert!(handle.get().add_branch().await.is_err());
                assert_eq!(handle.peek(), None);
                assert_eq!(handle.get().add_branch().await, Ok(2));
                assert_eq!(handle.fetches(), 2);
                assert!(handle.is_cached());
            })
            .await;
    }

    #[tokio::test]
    async fn fetch_may_consult_its_own_handle() {
        LocalSet::new()
            .run_until(async {
                let handle: Rc<CachedHandle<u32>> = Rc::new_cyclic(|weak| {
                    let weak = weak.clone();
                    CachedHandle::new(move || {
                        let cached = weak
                            .upgrade()
                            .is_some_and(|handle: Rc<CachedHandle<u32>>| handle.is_cached());
                        ForkedFuture::resolved(if cached { 0 } else { 10 })
                    })
                });

                assert_eq!(handle.get().add_branch().await, Ok(10));
                assert_eq!(handle.get().add_branch().await, Ok(10));
                assert_eq!(handle.fetches(), 1);
            })
            .await;
    }
}
