use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::task::JoinHandle;

use super::link::VoiceLink;
use crate::error::FetchError;

/// A track waiting to be played on one destination. Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub media_id: String,
    pub destination: GuildId,
    pub display_text: String,
    pub duration: Option<Duration>,
    /// Text channel that receives status messages for this request.
    pub status_channel: Option<ChannelId>,
    pub requested_at: DateTime<Utc>,
}

impl PlaybackRequest {
    pub fn new(media_id: impl Into<String>, destination: GuildId, display_text: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            destination,
            display_text: display_text.into(),
            duration: None,
            status_channel: None,
            requested_at: Utc::now(),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_status_channel(mut self, channel: ChannelId) -> Self {
        self.status_channel = Some(channel);
        self
    }

    /// Time spent between enqueueing and `now`.
    pub fn waited(&self, now: DateTime<Utc>) -> Duration {
        (now - self.requested_at).to_std().unwrap_or_default()
    }
}

/// The item after the current one, already dequeued and being fetched in the background.
pub(crate) struct Prefetch {
    pub request: PlaybackRequest,
    pub handle: JoinHandle<Result<PathBuf, FetchError>>,
}

/// Queue and worker bookkeeping for one destination.
///
/// `active` is the worker slot: whoever flips it from `false` to `true` owns
/// the destination until it flips it back. Both transitions happen while the
/// queue lock is held, so an enqueue can never slip in between "queue is empty"
/// and "slot released" and be left without a worker.
///
/// `generation` counts [`set_link`](Self::set_link) calls, so a worker can
/// tell whether an enqueue brought a new link while it was busy leaving.
pub struct DestinationState {
    id: GuildId,
    active: AtomicBool,
    workers: AtomicUsize,
    #[cfg(test)]
    peak_workers: AtomicUsize,
    queue: Mutex<VecDeque<PlaybackRequest>>,
    prefetched: Mutex<Option<Prefetch>>,
    link: RwLock<Option<Arc<dyn VoiceLink>>>,
    generation: AtomicU64,
}

impl DestinationState {
    pub fn new(id: GuildId) -> Self {
        Self {
            id,
            active: AtomicBool::new(false),
            workers: AtomicUsize::new(0),
            #[cfg(test)]
            peak_workers: AtomicUsize::new(0),
            queue: Mutex::new(VecDeque::new()),
            prefetched: Mutex::new(None),
            link: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> GuildId {
        self.id
    }

    /// Whether a worker currently owns this destination.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Requests waiting in the queue, not counting a prefetched one.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Display texts of the queued requests, in play order.
    pub fn pending(&self) -> Vec<String> {
        self.queue
            .lock()
            .iter()
            .map(|request| request.display_text.clone())
            .collect()
    }

    /// Registers a running worker and returns how many are running now, itself included.
    pub(crate) fn worker_started(&self) -> usize {
        let running = self.workers.fetch_add(1, Ordering::AcqRel) + 1;
        #[cfg(test)]
        self.peak_workers.fetch_max(running, Ordering::AcqRel);
        running
    }

    pub(crate) fn worker_stopped(&self) {
        self.workers.fetch_sub(1, Ordering::AcqRel);
    }

    /// Most workers ever seen running at the same time.
    #[cfg(test)]
    pub(crate) fn peak_workers(&self) -> usize {
        self.peak_workers.load(Ordering::Acquire)
    }

    pub(crate) fn set_link(&self, link: Arc<dyn VoiceLink>) {
        let mut current = self.link.write();
        *current = Some(link);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn link(&self) -> Option<Arc<dyn VoiceLink>> {
        self.link.read().clone()
    }

    /// The current link together with its generation.
    pub(crate) fn versioned_link(&self) -> (u64, Option<Arc<dyn VoiceLink>>) {
        let current = self.link.read();
        (self.generation.load(Ordering::Acquire), current.clone())
    }

    pub(crate) fn link_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Appends `request` and tries to take the worker slot without blocking.
    /// Returns `true` when the caller now owns the slot and must start a worker.
    pub(crate) fn push_and_try_activate(&self, request: PlaybackRequest) -> bool {
        let mut queue = self.queue.lock();
        queue.push_back(request);
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn pop(&self) -> Option<PlaybackRequest> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn push_front(&self, request: PlaybackRequest) {
        self.queue.lock().push_front(request);
    }

    /// Releases the worker slot if the queue is empty. Returns `false`, keeping
    /// the slot, when requests arrived in the meantime.
    pub(crate) fn release_if_empty(&self) -> bool {
        let queue = self.queue.lock();
        if queue.is_empty() {
            self.active.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Releases the worker slot, keeping pending requests queued, unless a
    /// link newer than `generation` was installed. Returns `false`, keeping the
    /// slot, in that case.
    pub(crate) fn release_unless_relinked(&self, generation: u64) -> bool {
        let _queue = self.queue.lock();
        if self.link_generation() != generation {
            return false;
        }
        self.active.store(false, Ordering::Release);
        true
    }

    pub(crate) fn store_prefetch(&self, prefetch: Prefetch) {
        *self.prefetched.lock() = Some(prefetch);
    }

    pub(crate) fn take_prefetch(&self) -> Option<Prefetch> {
        self.prefetched.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(media_id: &str) -> PlaybackRequest {
        PlaybackRequest::new(media_id, GuildId::new(1), media_id.to_uppercase())
    }

    #[test]
    fn test_only_first_push_takes_the_slot() {
        let state = DestinationState::new(GuildId::new(1));

        assert!(state.push_and_try_activate(request("a")));
        assert!(!state.push_and_try_activate(request("b")));
        assert!(state.is_active());
        assert_eq!(state.pending(), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_release_only_when_empty() {
        let state = DestinationState::new(GuildId::new(1));
        state.push_and_try_activate(request("a"));

        assert!(!state.release_if_empty());
        assert!(state.is_active());

        assert_eq!(state.pop().map(|r| r.media_id), Some("a".to_string()));
        assert!(state.release_if_empty());
        assert!(!state.is_active());

        // Tras liberar, el siguiente push vuelve a tomar el slot
        assert!(state.push_and_try_activate(request("b")));
    }

    #[test]
    fn test_release_is_refused_after_a_new_link() {
        let state = DestinationState::new(GuildId::new(1));
        state.push_and_try_activate(request("a"));
        let generation = state.link_generation();

        state.set_link(crate::audio::testing::FakeLink::new());
        assert!(!state.release_unless_relinked(generation));
        assert!(state.is_active());

        let (current, link) = state.versioned_link();
        assert_eq!(current, generation + 1);
        assert!(link.is_some());
        assert!(state.release_unless_relinked(current));
        assert!(!state.is_active());
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_push_front_restores_order() {
        let state = DestinationState::new(GuildId::new(1));
        state.push_and_try_activate(request("a"));
        state.push_and_try_activate(request("b"));

        let first = state.pop().unwrap();
        state.push_front(first);

        assert_eq!(state.len(), 2);
        assert_eq!(state.pop().map(|r| r.media_id), Some("a".to_string()));
    }

    #[test]
    fn test_request_builder() {
        let channel = ChannelId::new(7);
        let request = request("a")
            .with_duration(Duration::from_secs(180))
            .with_status_channel(channel);

        assert_eq!(request.duration, Some(Duration::from_secs(180)));
        assert_eq!(request.status_channel, Some(channel));
    }

    #[test]
    fn test_waited_since_enqueue() {
        let request = request("a");

        let later = request.requested_at + chrono::Duration::seconds(42);
        assert_eq!(request.waited(later), Duration::from_secs(42));

        // Un reloj que retrocede no da tiempos negativos
        let earlier = request.requested_at - chrono::Duration::seconds(5);
        assert_eq!(request.waited(earlier), Duration::ZERO);
    }

    #[test]
    fn test_worker_counter_tracks_peak() {
        let state = DestinationState::new(GuildId::new(1));

        assert_eq!(state.worker_started(), 1);
        state.worker_stopped();
        assert_eq!(state.worker_started(), 1);
        assert_eq!(state.worker_started(), 2);
        state.worker_stopped();
        state.worker_stopped();

        assert_eq!(state.peak_workers(), 2);
    }
}
