//! Coalescing of concurrent refresh calls.
//!
//! Retrying clients often fire several refreshes with the same secret at
//! once. Only the first caller per secret runs the rotation; everyone else
//! waits on a process-local watch channel and receives a clone of the same
//! outcome, so a burst settles as one rotation instead of a reuse alarm.
//! Coalescing is per process; replicas fall back to the row lock inside the
//! rotation transaction.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

use crate::auth::error::AuthError;
use crate::auth::token::TokenPair;

/// What a waiter observed.
#[derive(Debug)]
enum Joined<T> {
    Completed(T),
    /// The leader went away without settling, usually a dropped connection.
    LeaderGone,
}

/// One-shot fan-out map: the first caller per key runs the work, later
/// callers subscribe to its outcome.
struct Inflight<T: Clone> {
    map: Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
}

impl<T: Clone> Inflight<T> {
    fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, watch::Receiver<Option<T>>>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_or_join<F>(&self, key: &str, work: F) -> Joined<T>
    where
        F: Future<Output = T>,
    {
        // The guard must not live across an await, so the lock scope only
        // decides between joining an existing entry and leading a new one.
        let joined = {
            let mut map = self.lock();
            match map.get(key).cloned() {
                Some(rx) => Ok(rx),
                None => {
                    let (tx, rx) = watch::channel(None);
                    map.insert(key.to_string(), rx);
                    Err(tx)
                }
            }
        };
        let mut rx = match joined {
            Ok(rx) => rx,
            Err(tx) => return self.lead(key, tx, work).await,
        };

        // The stored receiver never observes the settled value itself, so a
        // clone taken even after the send still sees it as unseen.
        match rx.changed().await {
            Ok(()) => match rx.borrow().clone() {
                Some(outcome) => Joined::Completed(outcome),
                None => Joined::LeaderGone,
            },
            Err(_) => Joined::LeaderGone,
        }
    }

    async fn lead<F>(&self, key: &str, tx: watch::Sender<Option<T>>, work: F) -> Joined<T>
    where
        F: Future<Output = T>,
    {
        // Removes the entry even when the leader future is dropped mid-work,
        // so waiters are released instead of parking forever.
        let _cleanup = InflightGuard { owner: self, key };
        let outcome = work.await;
        let _ = tx.send(Some(outcome.clone()));
        Joined::Completed(outcome)
    }
}

struct InflightGuard<'a, T: Clone> {
    owner: &'a Inflight<T>,
    key: &'a str,
}

impl<T: Clone> Drop for InflightGuard<'_, T> {
    fn drop(&mut self) {
        self.owner.lock().remove(self.key);
    }
}

/// Serializes refreshes of the same secret within this process.
pub struct RefreshCoordinator {
    inflight: Inflight<Result<TokenPair, AuthError>>,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflight: Inflight::new(),
        }
    }

    /// Runs `rotate` for this secret hash, unless a rotation for the same
    /// hash is already in flight, in which case its outcome is shared.
    ///
    /// # Errors
    /// `AuthError::RefreshInProgress` when the in-flight leader disappears
    /// without settling; otherwise whatever the rotation produced.
    pub async fn rotate<F>(&self, token_hash: &str, rotate: F) -> Result<TokenPair, AuthError>
    where
        F: Future<Output = Result<TokenPair, AuthError>>,
    {
        match self.inflight.run_or_join(token_hash, rotate).await {
            Joined::Completed(outcome) => outcome,
            Joined::LeaderGone => Err(AuthError::RefreshInProgress),
        }
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    #[tokio::test]
    async fn leader_runs_the_work_and_clears_the_entry() {
        let inflight = Inflight::new();
        let joined = inflight.run_or_join("key", async { 7_u32 }).await;
        assert!(matches!(joined, Joined::Completed(7)));
        assert!(inflight.lock().is_empty());
    }

    #[tokio::test]
    async fn followers_share_the_leader_outcome_without_running() {
        let inflight = Arc::new(Inflight::new());
        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let follower_ran = Arc::new(AtomicBool::new(false));

        let leader = tokio::spawn({
            let inflight = Arc::clone(&inflight);
            let gate = Arc::clone(&gate);
            let started = Arc::clone(&started);
            async move {
                inflight
                    .run_or_join("key", async {
                        started.notify_one();
                        gate.notified().await;
                        42_u32
                    })
                    .await
            }
        });
        started.notified().await;

        let follower = tokio::spawn({
            let inflight = Arc::clone(&inflight);
            let follower_ran = Arc::clone(&follower_ran);
            async move {
                inflight
                    .run_or_join("key", async {
                        follower_ran.store(true, Ordering::SeqCst);
                        0_u32
                    })
                    .await
            }
        });

        // Let the follower reach the wait before releasing the leader.
        sleep(Duration::from_millis(50)).await;
        gate.notify_one();

        assert!(matches!(leader.await.unwrap(), Joined::Completed(42)));
        assert!(matches!(follower.await.unwrap(), Joined::Completed(42)));
        assert!(!follower_ran.load(Ordering::SeqCst));
        assert!(inflight.lock().is_empty());
    }

    #[tokio::test]
    async fn cancelled_leader_releases_followers() {
        let inflight = Arc::new(Inflight::<u32>::new());
        let started = Arc::new(Notify::new());

        let leader = tokio::spawn({
            let inflight = Arc::clone(&inflight);
            let started = Arc::clone(&started);
            async move {
                inflight
                    .run_or_join("key", async {
                        started.notify_one();
                        std::future::pending::<u32>().await
                    })
                    .await
            }
        });
        started.notified().await;

        let follower = tokio::spawn({
            let inflight = Arc::clone(&inflight);
            async move { inflight.run_or_join("key", async { 5_u32 }).await }
        });
        sleep(Duration::from_millis(50)).await;

        leader.abort();
        assert!(matches!(follower.await.unwrap(), Joined::LeaderGone));

        // The slot is free again; the next caller leads.
        let joined = inflight.run_or_join("key", async { 9_u32 }).await;
        assert!(matches!(joined, Joined::Completed(9)));
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let inflight = Arc::new(Inflight::new());
        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());

        let blocked = tokio::spawn({
            let inflight = Arc::clone(&inflight);
            let gate = Arc::clone(&gate);
            let started = Arc::clone(&started);
            async move {
                inflight
                    .run_or_join("one", async {
                        started.notify_one();
                        gate.notified().await;
                        1_u32
                    })
                    .await
            }
        });
        started.notified().await;

        let joined = inflight.run_or_join("two", async { 2_u32 }).await;
        assert!(matches!(joined, Joined::Completed(2)));

        gate.notify_one();
        assert!(matches!(blocked.await.unwrap(), Joined::Completed(1)));
    }

    #[tokio::test]
    async fn coordinator_maps_a_vanished_leader_to_refresh_in_progress() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let started = Arc::new(Notify::new());

        let leader = tokio::spawn({
            let coordinator = Arc::clone(&coordinator);
            let started = Arc::clone(&started);
            async move {
                coordinator
                    .rotate("hash", async {
                        started.notify_one();
                        std::future::pending().await
                    })
                    .await
            }
        });
        started.notified().await;

        let follower = tokio::spawn({
            let coordinator = Arc::clone(&coordinator);
            async move {
                coordinator
                    .rotate("hash", async { Err(AuthError::InvalidToken) })
                    .await
            }
        });
        sleep(Duration::from_millis(50)).await;
        leader.abort();

        let outcome = follower.await.unwrap();
        assert!(matches!(outcome, Err(AuthError::RefreshInProgress)));
    }
}
