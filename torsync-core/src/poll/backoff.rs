//! Per-peer failure backoff.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::peer::PeerKey;

#[derive(Debug, Default)]
struct PeerState {
    last_failure: Option<u64>,
    in_flight: bool,
}

/// Time of each peer's most recent failed fetch, plus the fetches running
/// right now.
///
/// Lives as long as the process that owns it; shared by all concurrent
/// polls of one or more cycles.
#[derive(Debug, Default)]
pub struct FailureBackoff {
    peers: Mutex<HashMap<PeerKey, PeerState>>,
}

impl FailureBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the right to contact `key`.
    ///
    /// Returns `None` while the peer failed less than `window_secs` before
    /// `now` or another fetch of it is still running. Check and claim happen
    /// under one lock.
    pub fn try_begin(
        &self,
        key: &PeerKey,
        now: u64,
        window_secs: u64,
    ) -> Option<FetchPermit<'_>> {
        let mut peers = self.peers.lock();
        let state = peers.entry(key.clone()).or_default();
        if state.in_flight || suppressed(state, now, window_secs) {
            return None;
        }
        state.in_flight = true;
        Some(FetchPermit {
            backoff: self,
            key: key.clone(),
        })
    }

    /// True if `key` failed less than `window_secs` before `now`.
    pub fn is_suppressed(&self, key: &PeerKey, now: u64, window_secs: u64) -> bool {
        self.peers
            .lock()
            .get(key)
            .is_some_and(|state| suppressed(state, now, window_secs))
    }

    pub fn last_failure(&self, key: &PeerKey) -> Option<u64> {
        self.peers.lock().get(key).and_then(|state| state.last_failure)
    }
}

fn suppressed(state: &PeerState, now: u64, window_secs: u64) -> bool {
    state
        .last_failure
        .is_some_and(|failed_at| now.saturating_sub(failed_at) < window_secs)
}

/// An in-progress fetch of one peer. Dropping it ends the fetch.
#[derive(Debug)]
pub struct FetchPermit<'a> {
    backoff: &'a FailureBackoff,
    key: PeerKey,
}

impl FetchPermit<'_> {
    /// Ends the fetch as failed at `at` (epoch seconds).
    pub fn fail(self, at: u64) {
        if let Some(state) = self.backoff.peers.lock().get_mut(&self.key) {
            state.last_failure = Some(at);
        }
    }
}

impl Drop for FetchPermit<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.backoff.peers.lock().get_mut(&self.key) {
            state.in_flight = false;
        }
    }
}
