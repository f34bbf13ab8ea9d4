//! Fork/join over a single producer.
//!
//! A [`ForkedFuture`] owns one producer computation, spawned on the local
//! event loop the moment the fork is created. Any number of consumers attach
//! to it afterwards, either as futures ([`ForkedFuture::add_branch`]) or as
//! callbacks ([`ForkedFuture::on_settled`]); the producer never runs twice.
//!
//! The settlement cell is a tagged variant: pending with an ordered observer
//! list, notifying (settled, with observers attached during notification
//! queued behind the ones already being run), or settled with the terminal
//! result. Everything runs on one thread, so the cell is an `Rc<RefCell<_>>`
//! and needs no lock.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::{RpcError, TransportError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkState {
    Pending,
    Resolved,
    Rejected,
}

type Callback<T> = Box<dyn FnOnce(Result<&T, &RpcError>)>;

enum Observer<T> {
    Branch(oneshot::Sender<Result<T, RpcError>>),
    Callback(Callback<T>),
}

enum Slot<T> {
    /// Observers in attachment order.
    Pending(Vec<Observer<T>>),
    /// Settled, but earlier observers are still being run. Observers attached
    /// meanwhile wait in `queue` so they fire after those.
    Notifying {
        result: Result<T, RpcError>,
        queue: Vec<Observer<T>>,
    },
    Settled(Result<T, RpcError>),
}

impl<T> Slot<T> {
    fn result(&self) -> Option<&Result<T, RpcError>> {
        match self {
            Slot::Pending(_) => None,
            Slot::Notifying { result, .. } | Slot::Settled(result) => Some(result),
        }
    }
}

/// A cloneable handle on one shared computation.
pub struct ForkedFuture<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> Clone for ForkedFuture<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T: Clone + 'static> ForkedFuture<T> {
    /// Spawn `source` on the current `LocalSet` and return a handle on it.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a `tokio::task::LocalSet`.
    pub fn new<F>(source: F) -> Self
    where
        F: Future<Output = Result<T, RpcError>> + 'static,
    {
        let slot = Rc::new(RefCell::new(Slot::Pending(Vec::new())));
        let producer = Producer {
            slot: Some(slot.clone()),
        };
        tokio::task::spawn_local(async move {
            let result = source.await;
            producer.finish(result);
        });
        Self { slot }
    }

    /// A fork that is already resolved; branches replay `value` immediately.
    pub fn resolved(value: T) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot::Settled(Ok(value)))),
        }
    }

    /// A fork that is already rejected.
    pub fn rejected(error: RpcError) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot::Settled(Err(error)))),
        }
    }

    /// Attach a new consumer. The returned future settles with the same
    /// value or error as the source, independently of every other branch.
    pub fn add_branch(&self) -> Branch<T> {
        let mut slot = self.slot.borrow_mut();
        match &mut *slot {
            Slot::Settled(result) => Branch {
                state: BranchState::Ready(Some(result.clone())),
            },
            Slot::Pending(observers) | Slot::Notifying { queue: observers, .. } => {
                let (tx, rx) = oneshot::channel();
                observers.push(Observer::Branch(tx));
                Branch {
                    state: BranchState::Waiting(rx),
                }
            }
        }
    }

    /// Run `callback` once the source settles, after every observer that was
    /// attached before it. Runs immediately if the source already settled.
    pub fn on_settled<F>(&self, callback: F)
    where
        F: FnOnce(Result<&T, &RpcError>) + 'static,
    {
        let settled = {
            let mut slot = self.slot.borrow_mut();
            match &mut *slot {
                Slot::Settled(result) => result.clone(),
                Slot::Pending(observers) | Slot::Notifying { queue: observers, .. } => {
                    observers.push(Observer::Callback(Box::new(callback)));
                    return;
                }
            }
        };
        callback(settled.as_ref());
    }

    pub fn state(&self) -> ForkState {
        match self.slot.borrow().result() {
            None => ForkState::Pending,
            Some(Ok(_)) => ForkState::Resolved,
            Some(Err(_)) => ForkState::Rejected,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.state() != ForkState::Pending
    }

    /// The terminal result, if the source has settled.
    pub fn peek(&self) -> Option<Result<T, RpcError>> {
        self.slot.borrow().result().cloned()
    }

    /// Number of observers still waiting for settlement.
    pub fn waiting(&self) -> usize {
        match &*self.slot.borrow() {
            Slot::Pending(observers) | Slot::Notifying { queue: observers, .. } => {
                observers.len()
            }
            Slot::Settled(_) => 0,
        }
    }
}

impl<T> fmt::Debug for ForkedFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.slot.borrow().result() {
            None => "pending".to_owned(),
            Some(Ok(_)) => "resolved".to_owned(),
            Some(Err(e)) => format!("rejected ({})", e),
        };
        f.debug_struct("ForkedFuture").field("state", &state).finish()
    }
}

/// Owned by the spawned task. If the task is dropped before the source
/// completes (the event loop went away), observers are failed instead of
/// being left waiting forever.
struct Producer<T: Clone + 'static> {
    slot: Option<Rc<RefCell<Slot<T>>>>,
}

impl<T: Clone + 'static> Producer<T> {
    fn finish(mut self, result: Result<T, RpcError>) {
        if let Some(slot) = self.slot.take() {
            settle(&slot, result);
        }
    }
}

impl<T: Clone + 'static> Drop for Producer<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            tracing::debug!("fork producer abandoned before settling");
            settle(&slot, Err(TransportError::Closed.into()));
        }
    }
}

fn settle<T: Clone>(slot: &RefCell<Slot<T>>, result: Result<T, RpcError>) {
    let mut batch = {
        let mut guard = slot.borrow_mut();
        let notifying = Slot::Notifying {
            result: result.clone(),
            queue: Vec::new(),
        };
        match std::mem::replace(&mut *guard, notifying) {
            Slot::Pending(observers) => observers,
            previous => {
                *guard = previous;
                return;
            }
        }
    };

    tracing::trace!(
        observers = batch.len(),
        ok = result.is_ok(),
        "fork settled"
    );
    // The borrow is released while observers run. Anything they attach lands
    // in the queue and runs after the current batch.
    while !batch.is_empty() {
        for observer in batch {
            match observer {
                Observer::Branch(tx) => {
                    let _ = tx.send(result.clone());
                }
                Observer::Callback(callback) => callback(result.as_ref()),
            }
        }
        batch = match &mut *slot.borrow_mut() {
            Slot::Notifying { queue, .. } => std::mem::take(queue),
            _ => Vec::new(),
        };
    }
    *slot.borrow_mut() = Slot::Settled(result);
}

/// One consumer of a [`ForkedFuture`].
#[must_use = "futures do nothing unless polled"]
pub struct Branch<T> {
    state: BranchState<T>,
}

enum BranchState<T> {
    Ready(Option<Result<T, RpcError>>),
    Waiting(oneshot::Receiver<Result<T, RpcError>>),
}

// The value is only ever moved out, never pinned.
impl<T> Unpin for Branch<T> {}

impl<T> Future for Branch<T> {
    type Output = Result<T, RpcError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            BranchState::Ready(result) => match result.take() {
                Some(result) => Poll::Ready(result),
                None => panic!("`Branch` polled after completion"),
            },
            BranchState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(TransportError::Closed.into()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorCode, RemoteError};
    use std::cell::Cell;
    use tokio::task::LocalSet;

    fn controlled() -> (
        oneshot::Sender<Result<u32, RpcError>>,
        ForkedFuture<u32>,
    ) {
        let (tx, rx) = oneshot::channel();
        let fork = ForkedFuture::new(async move {
            rx.await.unwrap_or(Err(TransportError::Closed.into()))
        });
        (tx, fork)
    }

    fn remote(message: &str) -> RpcError {
        RpcError::Remote(RemoteError::new(ErrorCode::Internal, message))
    }

    #[tokio::test]
    async fn producer_runs_once_for_every_branch() {
        LocalSet::new()
            .run_until(async {
                let runs = Rc::new(Cell::new(0));
                let fork = {
                    let runs = runs.clone();
                    ForkedFuture::new(async move {
                        runs.set(runs.get() + 1);
                        Ok(7u32)
                    })
                };
                let before: Vec<_> = (0..3).map(|_| fork.add_branch()).collect();
                for branch in before {
                    assert_eq!(branch.await, Ok(7));
                }
                // Added after settlement: replayed immediately.
                for _ in 0..3 {
                    assert_eq!(fork.add_branch().await, Ok(7));
                }
                assert_eq!(runs.get(), 1);
                assert_eq!(fork.state(), ForkState::Resolved);
            })
            .await;
    }

    #[tokio::test]
    async fn rejection_reaches_every_branch() {
        LocalSet::new()
            .run_until(async {
                let (tx, fork) = controlled();
                let early = fork.add_branch();
                tx.send(Err(remote("boom"))).unwrap();
                assert_eq!(early.await, Err(remote("boom")));
                assert_eq!(fork.add_branch().await, Err(remote("boom")));
                assert_eq!(fork.state(), ForkState::Rejected);
            })
            .await;
    }

    #[tokio::test]
    async fn zero_branches_still_settle() {
        LocalSet::new()
            .run_until(async {
                let (tx, fork) = controlled();
                tx.send(Ok(1)).unwrap();
                while !fork.is_settled() {
                    tokio::task::yield_now().await;
                }
                assert_eq!(fork.peek(), Some(Ok(1)));
            })
            .await;
    }

    #[tokio::test]
    async fn callbacks_fire_once_in_attachment_order() {
        LocalSet::new()
            .run_until(async {
                let (tx, fork) = controlled();
                let seen = Rc::new(RefCell::new(Vec::new()));

                for i in 0..3 {
                    let seen = seen.clone();
                    fork.on_settled(move |r| seen.borrow_mut().push((i, r.copied().ok())));
                }
                // Attaches another observer while notifications are running.
                {
                    let seen = seen.clone();
                    let reentrant = fork.clone();
                    fork.on_settled(move |_| {
                        let seen = seen.clone();
                        reentrant.on_settled(move |r| seen.borrow_mut().push((99, r.copied().ok())));
                    });
                }

                tx.send(Ok(5)).unwrap();
                fork.add_branch().await.unwrap();

                assert_eq!(
                    *seen.borrow(),
                    vec![(0, Some(5)), (1, Some(5)), (2, Some(5)), (99, Some(5))]
                );

                // Late callbacks run immediately, exactly once.
                let late = Rc::new(Cell::new(0));
                let counter = late.clone();
                fork.on_settled(move |_| counter.set(counter.get() + 1));
                assert_eq!(late.get(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn observers_attached_while_notifying_run_after_earlier_ones() {
        LocalSet::new()
            .run_until(async {
                let (tx, fork) = controlled();
                let order = Rc::new(RefCell::new(Vec::new()));

                {
                    let order = order.clone();
                    let reentrant = fork.clone();
                    fork.on_settled(move |_| {
                        order.borrow_mut().push("first");
                        let order = order.clone();
                        let nested = reentrant.clone();
                        reentrant.on_settled(move |_| {
                            order.borrow_mut().push("third");
                            let order = order.clone();
                            nested.on_settled(move |_| order.borrow_mut().push("fourth"));
                        });
                    });
                }
                {
                    let order = order.clone();
                    fork.on_settled(move |_| order.borrow_mut().push("second"));
                }

                tx.send(Ok(1)).unwrap();
                assert_eq!(fork.add_branch().await, Ok(1));
                assert_eq!(*order.borrow(), ["first", "second", "third", "fourth"]);
                assert_eq!(fork.waiting(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn branch_added_while_notifying_still_settles() {
        LocalSet::new()
            .run_until(async {
                let (tx, fork) = controlled();
                let late = Rc::new(RefCell::new(None));
                {
                    let late = late.clone();
                    let reentrant = fork.clone();
                    fork.on_settled(move |_| *late.borrow_mut() = Some(reentrant.add_branch()));
                }

                tx.send(Ok(8)).unwrap();
                fork.add_branch().await.unwrap();
                let branch = late.borrow_mut().take().unwrap();
                assert_eq!(branch.await, Ok(8));
            })
            .await;
    }

    #[tokio::test]
    async fn dropped_branch_does_not_disturb_others() {
        LocalSet::new()
            .run_until(async {
                let (tx, fork) = controlled();
                let kept = fork.add_branch();
                drop(fork.add_branch());
                assert_eq!(fork.waiting(), 2);
                tx.send(Ok(3)).unwrap();
                assert_eq!(kept.await, Ok(3));
            })
            .await;
    }

    #[tokio::test]
    async fn abandoned_producer_fails_branches() {
        let local = LocalSet::new();
        let branch = local
            .run_until(async {
                let fork: ForkedFuture<u32> = ForkedFuture::new(std::future::pending());
                fork.add_branch()
            })
            .await;
        drop(local);
        assert_eq!(branch.await, Err(RpcError::Transport(TransportError::Closed)));
    }

    #[test]
    fn presettled_forks_replay() {
        let fork = ForkedFuture::resolved("cached");
        assert_eq!(fork.peek(), Some(Ok("cached")));
        let fork: ForkedFuture<u8> = ForkedFuture::rejected(remote("gone"));
        assert_eq!(fork.state(), ForkState::Rejected);
    }
}
