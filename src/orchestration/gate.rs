//! Session gate
//!
//! While a re-authentication wave runs, new requests park here instead of
//! hitting the backend with a session that is known to be dead. Ending the
//! wave releases every parked request at once with the same outcome.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

/// Something holding requests that belong to the session being replaced
pub trait PendingInvalidation: Send + Sync {
    fn invalidate_pending(&self);
}

impl<T> PendingInvalidation for super::dedup::RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn invalidate_pending(&self) {
        self.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Open,
    Authenticating,
}

#[derive(Default)]
struct GateInner {
    authenticating: bool,
    waiters: Vec<oneshot::Sender<bool>>,
}

/// Gate that suspends requests during re-authentication
pub struct SessionGate {
    inner: Mutex<GateInner>,
    pending: Arc<dyn PendingInvalidation>,
}

impl SessionGate {
    pub fn new(pending: Arc<dyn PendingInvalidation>) -> Self {
        Self {
            inner: Mutex::new(GateInner::default()),
            pending,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateInner> {
        // the state stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> GateState {
        if self.lock().authenticating {
            GateState::Authenticating
        } else {
            GateState::Open
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.state() == GateState::Authenticating
    }

    /// Number of requests currently parked at the gate
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Start an authentication wave.
    ///
    /// Returns `false` without side effects when a wave is already running.
    pub fn begin_auth(&self) -> bool {
        let mut inner = self.lock();
        if inner.authenticating {
            log::debug!("Authentication already in progress");
            return false;
        }
        inner.authenticating = true;
        log::info!("Authentication started, holding new requests");
        true
    }

    /// Finish the current wave and release every parked request with `success`.
    ///
    /// On success the pending-request table is cleared so that calls made with
    /// the old session cannot satisfy new requests.
    pub fn end_auth(&self, success: bool) {
        let waiters = {
            let mut inner = self.lock();
            if !inner.authenticating {
                log::debug!("end_auth called while gate is open");
            }
            inner.authenticating = false;
            std::mem::take(&mut inner.waiters)
        };

        if success {
            log::info!("Auth complete, clearing pending requests");
            self.pending.invalidate_pending();
        } else {
            log::warn!("Authentication failed, releasing {} waiter(s)", waiters.len());
        }

        for waiter in waiters {
            // a waiter that gave up has dropped its receiver
            let _ = waiter.send(success);
        }
    }

    /// Wait until the gate is open.
    ///
    /// Returns immediately with `true` when no wave is running, otherwise the
    /// outcome passed to [`SessionGate::end_auth`].
    pub async fn await_release(&self) -> bool {
        let receiver = {
            let mut inner = self.lock();
            if !inner.authenticating {
                return true;
            }
            let (sender, receiver) = oneshot::channel();
            inner.waiters.push(sender);
            receiver
        };

        log::debug!("Waiting for authentication...");
        // the gate never drops a sender without sending
        receiver.await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    #[derive(Default)]
    struct CountingTable {
        cleared: AtomicUsize,
    }

    impl PendingInvalidation for CountingTable {
        fn invalidate_pending(&self) {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn gate() -> (Arc<SessionGate>, Arc<CountingTable>) {
        let table = Arc::new(CountingTable::default());
        (Arc::new(SessionGate::new(table.clone())), table)
    }

    #[tokio::test]
    async fn test_open_gate_does_not_block() {
        let (gate, _) = gate();
        assert!(!gate.is_blocking());
        assert!(gate.await_release().await);
    }

    #[test]
    fn test_begin_auth_is_idempotent() {
        let (gate, _) = gate();
        assert!(gate.begin_auth());
        assert!(!gate.begin_auth());
        assert_eq!(gate.state(), GateState::Authenticating);

        gate.end_auth(true);
        assert_eq!(gate.state(), GateState::Open);
        assert!(gate.begin_auth());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_released_together_on_success() {
        let (gate, table) = gate();
        gate.begin_auth();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move { gate.await_release().await }));
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gate.waiting(), 3);
        assert!(handles.iter().all(|h| !h.is_finished()));

        gate.end_auth(true);
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(gate.waiting(), 0);
        assert_eq!(table.cleared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_see_failure() {
        let (gate, table) = gate();
        gate.begin_auth();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.await_release().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        gate.end_auth(false);
        assert!(!waiter.await.unwrap());
        assert_eq!(table.cleared.load(Ordering::SeqCst), 0);
        assert!(!gate.is_blocking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_waiter_does_not_break_release() {
        let (gate, _) = gate();
        gate.begin_auth();

        let abandoned = tokio::time::timeout(Duration::from_millis(5), gate.await_release()).await;
        assert!(abandoned.is_err());

        gate.end_auth(true);
        assert!(gate.await_release().await);
    }
}
