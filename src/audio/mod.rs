//! # Audio Module
//!
//! Per-destination playback: every voice destination (a guild) owns a FIFO
//! queue of [`queue::PlaybackRequest`]s and at most one worker draining it.
//!
//! ## Architecture
//!
//! ### [`player`] - Playback Service
//! - Registry of destinations, created on first use
//! - Duration limit enforced at enqueue time
//! - Starts a worker when a destination goes from idle to busy
//!
//! ### [`queue`] - Destination State
//! - FIFO queue, worker slot and the prefetched next item
//! - Slot transitions happen under the queue lock, so no request is left
//!   queued without a worker
//!
//! ### [`worker`] - Playback Worker
//! - Fetches the next track while the current one plays
//! - Reports per-track failures and keeps going
//! - Leaves the voice channel once the queue is empty, and re-joins when a
//!   request shows up while it was leaving
//!
//! ### [`link`] - Collaborators
//! - [`link::VoiceLink`]: the voice transport the worker streams into
//! - [`link::PlaybackEvents`]: status notifications for requesters
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pickup_bot::audio::{link::VoiceLink, player::PlaybackService, queue::PlaybackRequest};
//! use serenity::all::GuildId;
//! use std::{sync::Arc, time::Duration};
//!
//! # fn example(service: &PlaybackService, link: Arc<dyn VoiceLink>) -> anyhow::Result<()> {
//! let request = PlaybackRequest::new("dQw4w9WgXcQ", GuildId::new(123456789), "Never Gonna Give You Up")
//!     .with_duration(Duration::from_secs(213));
//! service.enqueue(request, link)?;
//! # Ok(())
//! # }
//! ```

pub mod link;
pub mod player;
pub mod queue;
mod worker;

#[cfg(test)]
pub(crate) mod testing;
