pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::cache::is_valid_media_id;

pub use ytdlp::YtDlpClient;

/// Metadata needed to enqueue a track.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub media_id: String,
    pub title: String,
    /// `None` for live streams or when the source does not report it.
    pub duration: Option<Duration>,
}

/// Turns user input into a [`ResolvedTrack`].
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack>;
}

/// Extrae el ID de un video de YouTube desde una URL o un ID pelado
pub fn extract_media_id(input: &str) -> Option<String> {
    let input = input.trim();
    if is_valid_media_id(input) {
        return Some(input.to_string());
    }

    let parsed = Url::parse(input).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    let candidate = match host {
        // youtu.be/VIDEO_ID
        "youtu.be" => parsed.path_segments()?.next().map(str::to_string),
        // youtube.com/watch?v=VIDEO_ID y music.youtube.com/watch?v=VIDEO_ID
        "youtube.com" | "music.youtube.com" => {
            let from_query = parsed
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned());

            // youtube.com/shorts/VIDEO_ID
            from_query.or_else(|| {
                let mut segments = parsed.path_segments()?;
                match segments.next() {
                    Some("shorts") | Some("embed") | Some("live") => segments.next().map(str::to_string),
                    _ => None,
                }
            })
        }
        _ => None,
    }?;

    is_valid_media_id(&candidate).then_some(candidate)
}
