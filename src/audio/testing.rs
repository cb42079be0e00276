//! Fakes shared by the playback tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::{
    collections::HashSet,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use super::{
    link::{PlaybackEvents, StreamEnd, VoiceLink},
    queue::PlaybackRequest,
};
use crate::{cache::fetcher::Downloader, error::PlaybackError};

type Log = Arc<Mutex<Vec<String>>>;

/// Polls `condition` until it holds or five seconds pass.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Writes a small file for every ID except the ones configured to fail.
///
/// Logs `download:<id>` when a download starts and `done:<id>` when it ends.
#[derive(Default)]
pub struct FakeDownloader {
    failing: HashSet<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Log,
}

impl FakeDownloader {
    pub fn failing<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            failing: ids.into_iter().map(str::to_string).collect(),
            ..Self::default()
        }
    }

    /// Makes every download take `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Most downloads seen running at the same time.
    pub fn max_parallel_downloads(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Log {
        self.log.clone()
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// IDs the fetcher asked for, in call order.
    pub fn requested(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|entry| entry.strip_prefix("download:").map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, media_id: &str, destination: &Path) -> anyhow::Result<()> {
        self.log.lock().push(format!("download:{media_id}"));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        let result = if self.failing.contains(media_id) {
            Err(anyhow::anyhow!("video {media_id} unavailable"))
        } else {
            tokio::fs::write(destination, media_id.as_bytes())
                .await
                .map_err(anyhow::Error::from)
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.log.lock().push(format!("done:{media_id}"));
        result
    }
}

/// Records what would have been streamed, by media ID.
///
/// Leaving takes the link down, like removing a songbird call shared by every
/// link of the guild; `rejoin` brings it back.
pub struct FakeLink {
    live: AtomicBool,
    stream_delay: Mutex<Duration>,
    failing: Mutex<HashSet<String>>,
    started: Mutex<Vec<String>>,
    played: Mutex<Vec<String>>,
    speaking: Mutex<Vec<bool>>,
    streaming: AtomicUsize,
    max_streaming: AtomicUsize,
    leave_delay: Mutex<Duration>,
    leaving: AtomicUsize,
    left: AtomicUsize,
    rejoined: AtomicUsize,
    log: Mutex<Option<Log>>,
}

impl FakeLink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            live: AtomicBool::new(true),
            stream_delay: Mutex::new(Duration::ZERO),
            failing: Mutex::new(HashSet::new()),
            started: Mutex::new(Vec::new()),
            played: Mutex::new(Vec::new()),
            speaking: Mutex::new(Vec::new()),
            streaming: AtomicUsize::new(0),
            max_streaming: AtomicUsize::new(0),
            leave_delay: Mutex::new(Duration::ZERO),
            leaving: AtomicUsize::new(0),
            left: AtomicUsize::new(0),
            rejoined: AtomicUsize::new(0),
            log: Mutex::new(None),
        })
    }

    pub fn set_stream_delay(&self, delay: Duration) {
        *self.stream_delay.lock() = delay;
    }

    pub fn set_leave_delay(&self, delay: Duration) {
        *self.leave_delay.lock() = delay;
    }

    pub fn fail_stream_of(&self, media_id: &str) {
        self.failing.lock().insert(media_id.to_string());
    }

    /// Also writes `end:<id>` entries into `log` when a stream finishes.
    pub fn share_log(&self, log: Log) {
        *self.log.lock() = Some(log);
    }

    pub fn disconnect(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    /// Streams that ran to completion or failed, in order.
    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    pub fn speaking_history(&self) -> Vec<bool> {
        self.speaking.lock().clone()
    }

    pub fn max_concurrent_streams(&self) -> usize {
        self.max_streaming.load(Ordering::SeqCst)
    }

    /// Leaves that have started, finished or not.
    pub fn leaves_started(&self) -> usize {
        self.leaving.load(Ordering::SeqCst)
    }

    pub fn leave_count(&self) -> usize {
        self.left.load(Ordering::SeqCst)
    }

    pub fn rejoin_count(&self) -> usize {
        self.rejoined.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceLink for FakeLink {
    async fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn set_speaking(&self, speaking: bool) {
        self.speaking.lock().push(speaking);
    }

    async fn stream(&self, artifact: &Path) -> StreamEnd {
        let media_id = artifact
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.started.lock().push(media_id.clone());
        let now = self.streaming.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_streaming.fetch_max(now, Ordering::SeqCst);

        let delay = *self.stream_delay.lock();
        tokio::time::sleep(delay).await;

        self.streaming.fetch_sub(1, Ordering::SeqCst);
        self.played.lock().push(media_id.clone());
        if let Some(log) = self.log.lock().as_ref() {
            log.lock().push(format!("end:{media_id}"));
        }

        if self.failing.lock().contains(&media_id) {
            StreamEnd::Failed(anyhow::anyhow!("stream failed for {media_id}"))
        } else {
            StreamEnd::EndOfInput
        }
    }

    async fn leave(&self) {
        self.leaving.fetch_add(1, Ordering::SeqCst);
        let delay = *self.leave_delay.lock();
        tokio::time::sleep(delay).await;

        self.live.store(false, Ordering::SeqCst);
        self.left.fetch_add(1, Ordering::SeqCst);
    }

    async fn rejoin(&self) -> bool {
        self.rejoined.fetch_add(1, Ordering::SeqCst);
        self.live.store(true, Ordering::SeqCst);
        true
    }
}

/// Keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingEvents {
    now_playing: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, String)>>,
    idle: AtomicUsize,
}

impl RecordingEvents {
    /// Media IDs announced as now playing.
    pub fn announced(&self) -> Vec<String> {
        self.now_playing.lock().clone()
    }

    /// `(media_id, error message)` pairs.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.failures.lock().clone()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackEvents for RecordingEvents {
    async fn now_playing(&self, request: &PlaybackRequest) {
        self.now_playing.lock().push(request.media_id.clone());
    }

    async fn failed(&self, request: &PlaybackRequest, error: &PlaybackError) {
        self.failures
            .lock()
            .push((request.media_id.clone(), error.to_string()));
    }

    async fn idle(&self, _destination: GuildId) {
        self.idle.fetch_add(1, Ordering::SeqCst);
    }
}
