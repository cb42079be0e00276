//! # Pickup Bot
//!
//! Discord bot that plays requested tracks per guild, downloading each track
//! once and keeping it on disk while it keeps being requested.
//!
//! - [`cache`] - persisted artifact index, single-flight fetcher and janitor
//! - [`audio`] - per-guild FIFO queues with one playback worker each
//! - [`sources`] - turning chat input into media IDs (yt-dlp)
//! - [`bot`] - serenity / songbird wiring

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
