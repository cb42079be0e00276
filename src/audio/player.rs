use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

use super::{
    link::{PlaybackEvents, VoiceLink},
    queue::{DestinationState, PlaybackRequest},
    worker::PlaybackWorker,
};
use crate::{cache::fetcher::MediaFetcher, error::PlaybackError};

/// Per-destination playback queues with one worker per busy destination.
pub struct PlaybackService {
    destinations: DashMap<GuildId, Arc<DestinationState>>,
    fetcher: Arc<MediaFetcher>,
    events: Arc<dyn PlaybackEvents>,
    max_duration: Duration,
}

impl PlaybackService {
    pub fn new(fetcher: Arc<MediaFetcher>, events: Arc<dyn PlaybackEvents>, max_duration: Duration) -> Self {
        Self {
            destinations: DashMap::new(),
            fetcher,
            events,
            max_duration,
        }
    }

    /// Checks `request` against the duration limit without queueing it.
    /// Tracks of unknown length are admitted.
    pub fn admit(&self, request: &PlaybackRequest) -> Result<(), PlaybackError> {
        match request.duration {
            Some(duration) if duration > self.max_duration => {
                info!(
                    "🚫 Rechazado {} ({}): supera {}",
                    request.display_text,
                    humantime::format_duration(duration),
                    humantime::format_duration(self.max_duration)
                );
                Err(PlaybackError::Rejected {
                    title: request.display_text.clone(),
                    duration,
                    limit: self.max_duration,
                })
            }
            _ => Ok(()),
        }
    }

    /// Queues `request` on its destination and starts a worker if none is running.
    ///
    /// Requests that fail [`admit`](Self::admit) are rejected before touching the
    /// queue. `link` replaces the destination's current voice link, so a
    /// reconnect before enqueueing is picked up by the running worker.
    pub fn enqueue(&self, request: PlaybackRequest, link: Arc<dyn VoiceLink>) -> Result<(), PlaybackError> {
        self.admit(&request)?;

        let state = self.get_or_create(request.destination);
        state.set_link(link);

        debug!("➕ {} en cola de {}", request.display_text, request.destination);
        if state.push_and_try_activate(request) {
            let worker = PlaybackWorker::new(state, self.fetcher.clone(), self.events.clone());
            tokio::spawn(worker.run());
        }

        Ok(())
    }

    /// Requests waiting on `destination`, excluding the one playing.
    pub fn queue_len(&self, destination: GuildId) -> usize {
        self.get(destination).map(|state| state.len()).unwrap_or(0)
    }

    pub fn is_active(&self, destination: GuildId) -> bool {
        self.get(destination).is_some_and(|state| state.is_active())
    }

    pub fn pending(&self, destination: GuildId) -> Vec<String> {
        self.get(destination).map(|state| state.pending()).unwrap_or_default()
    }

    /// Destinations that have received at least one request.
    pub fn destinations(&self) -> Vec<GuildId> {
        self.destinations.iter().map(|entry| *entry.key()).collect()
    }

    pub fn get(&self, destination: GuildId) -> Option<Arc<DestinationState>> {
        self.destinations.get(&destination).map(|state| state.clone())
    }

    fn get_or_create(&self, destination: GuildId) -> Arc<DestinationState> {
        self.destinations
            .entry(destination)
            .or_insert_with(|| Arc::new(DestinationState::new(destination)))
            .clone()
    }
}
