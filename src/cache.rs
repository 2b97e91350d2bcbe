use crate::dispatch::CancelToken;
use crate::error::CardPressError;
use crate::pipeline::{ContentRequest, PipelineResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Outcome shared by every handle waiting on the same request.
pub type SharedResult = std::result::Result<Arc<PipelineResult>, Arc<CardPressError>>;

/// SHA-256 of the request's canonical JSON form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey([u8; 32]);

impl RequestKey {
    pub fn for_request(request: &ContentRequest) -> Self {
        let canonical = serde_json::to_vec(request)
            .unwrap_or_else(|_| format!("{request:?}").into_bytes());
        let digest = Sha256::digest(&canonical);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex()[..12])
    }
}

impl fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestKey({self})")
    }
}

enum SlotState {
    Pending,
    Ready(SharedResult),
}

/// One execution's result, published once and read by any number of waiters.
pub struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
    cancel: CancelToken,
    handles: AtomicUsize,
}

impl Slot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
            cancel: CancelToken::new(),
            handles: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the result and wakes all waiters. Later calls are ignored.
    pub(crate) fn publish(&self, result: SharedResult) {
        let mut state = self.lock();
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Ready(result);
            self.ready.notify_all();
        }
    }

    pub fn try_result(&self) -> Option<SharedResult> {
        match &*self.lock() {
            SlotState::Pending => None,
            SlotState::Ready(result) => Some(result.clone()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.try_result().is_some()
    }

    pub fn wait(&self) -> SharedResult {
        let mut state = self.lock();
        loop {
            if let SlotState::Ready(result) = &*state {
                return result.clone();
            }
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<SharedResult> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let SlotState::Ready(result) = &*state {
                return Some(result.clone());
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            state = self
                .ready
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub(crate) fn attach(&self) {
        self.handles.fetch_add(1, Ordering::SeqCst);
    }

    /// Drops one interested handle; returns how many remain.
    pub(crate) fn detach(&self) -> usize {
        let previous = self
            .handles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        previous.saturating_sub(1)
    }
}

/// In-flight and completed executions by request key. Entries are added
/// when an execution starts and removed only when it fails or is cancelled.
#[derive(Default)]
pub struct ResultCache {
    slots: Mutex<HashMap<RequestKey, Arc<Slot>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestKey, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the live slot for `key` with one handle attached, creating it
    /// when absent or cancelled. The flag is true when the caller created the
    /// slot and must start the execution.
    pub fn get_or_insert(&self, key: RequestKey) -> (Arc<Slot>, bool) {
        let mut slots = self.lock();
        if let Some(slot) = slots.get(&key).filter(|slot| !slot.cancel_token().is_cancelled()) {
            slot.attach();
            return (slot.clone(), false);
        }
        let slot = Arc::new(Slot::new());
        slot.attach();
        slots.insert(key, slot.clone());
        (slot, true)
    }

    /// Detaches one handle. When it was the last one and the slot is still
    /// pending, the execution is cancelled and evicted. Holding the map lock
    /// keeps `get_or_insert` from joining a slot that is being cancelled.
    pub(crate) fn release(&self, key: &RequestKey, slot: &Arc<Slot>) -> bool {
        let mut slots = self.lock();
        if slot.detach() > 0 || slot.is_finished() {
            return false;
        }
        slot.cancel_token().cancel();
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
        true
    }

    pub fn get(&self, key: &RequestKey) -> Option<Arc<Slot>> {
        self.lock().get(key).cloned()
    }

    /// Removes `key` if it still maps to `slot`.
    pub fn evict(&self, key: &RequestKey, slot: &Arc<Slot>) -> bool {
        let mut slots = self.lock();
        match slots.get(key) {
            Some(current) if Arc::ptr_eq(current, slot) => {
                slots.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageGeometry;
    use std::thread;

    #[test]
    fn identical_requests_share_a_key() {
        let a = RequestKey::for_request(&ContentRequest::inline("# Title"));
        let b = RequestKey::for_request(&ContentRequest::inline("# Title"));
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn any_field_change_changes_the_key() {
        let base = ContentRequest::inline("# Title");
        let key = RequestKey::for_request(&base);
        let text = RequestKey::for_request(&ContentRequest::inline("# Title!"));
        let dpr = RequestKey::for_request(&base.clone().with_device_pixel_ratio(1.0));
        let geometry = RequestKey::for_request(&base.clone().with_geometry(PageGeometry {
            gap: 10.0,
            ..PageGeometry::default()
        }));
        let source = RequestKey::for_request(&ContentRequest::from_source("# Title"));
        for other in [text, dpr, geometry, source] {
            assert_ne!(key, other);
        }
    }

    #[test]
    fn second_insert_reuses_the_slot() {
        let cache = ResultCache::new();
        let key = RequestKey::for_request(&ContentRequest::inline("x"));
        let (first, created) = cache.get_or_insert(key);
        assert!(created);
        let (second, created) = cache.get_or_insert(key);
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evict_ignores_replaced_slots() {
        let cache = ResultCache::new();
        let key = RequestKey::for_request(&ContentRequest::inline("x"));
        let (old, _) = cache.get_or_insert(key);
        assert!(cache.evict(&key, &old));
        let (_new, created) = cache.get_or_insert(key);
        assert!(created);
        assert!(!cache.evict(&key, &old));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn last_release_cancels_and_evicts() {
        let cache = ResultCache::new();
        let key = RequestKey::for_request(&ContentRequest::inline("x"));
        let (slot, _) = cache.get_or_insert(key);
        let (same, _) = cache.get_or_insert(key);
        assert!(!cache.release(&key, &slot));
        assert!(!slot.cancel_token().is_cancelled());
        assert!(cache.release(&key, &same));
        assert!(slot.cancel_token().is_cancelled());
        assert!(cache.is_empty());
    }

    #[test]
    fn finished_slots_survive_their_last_release() {
        let cache = ResultCache::new();
        let key = RequestKey::for_request(&ContentRequest::inline("x"));
        let (slot, _) = cache.get_or_insert(key);
        slot.publish(Ok(Arc::new(PipelineResult::default())));
        assert!(!cache.release(&key, &slot));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cancelled_slots_are_never_joined() {
        let cache = ResultCache::new();
        let key = RequestKey::for_request(&ContentRequest::inline("x"));
        let (stale, _) = cache.get_or_insert(key);
        stale.cancel_token().cancel();
        let (fresh, created) = cache.get_or_insert(key);
        assert!(created);
        assert!(!Arc::ptr_eq(&stale, &fresh));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn slot_publishes_once_to_every_waiter() {
        let slot = Arc::new(Slot::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let slot = slot.clone();
                thread::spawn(move || slot.wait().map(|r| r.card_count()))
            })
            .collect();
        slot.publish(Ok(Arc::new(PipelineResult::default())));
        slot.publish(Err(Arc::new(CardPressError::Cancelled)));
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap().unwrap(), 0);
        }
        assert!(slot.is_finished());
    }

    #[test]
    fn wait_timeout_expires_on_pending_slot() {
        let slot = Slot::new();
        assert!(slot.wait_timeout(Duration::from_millis(10)).is_none());
        assert!(slot.try_result().is_none());
    }

    #[test]
    fn detach_counts_remaining_handles() {
        let slot = Slot::new();
        slot.attach();
        slot.attach();
        assert_eq!(slot.detach(), 1);
        assert_eq!(slot.detach(), 0);
        assert_eq!(slot.detach(), 0);
    }
}
