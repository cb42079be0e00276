use chrono::Utc;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use super::{
    link::{PlaybackEvents, StreamEnd, VoiceLink},
    queue::{DestinationState, PlaybackRequest, Prefetch},
};
use crate::{
    cache::fetcher::MediaFetcher,
    error::{FetchError, PlaybackError},
};

/// Why a drain pass stopped.
enum Exit {
    Empty,
    /// The link of this generation was found dead.
    Disconnected { generation: u64 },
}

/// Drains one destination's queue, one track at a time.
///
/// Only spawned by whoever won the destination's worker slot, so at most one
/// `PlaybackWorker` streams into a destination at any moment.
///
/// The worker keeps the slot while it leaves the voice channel. Requests that
/// arrive during the leave find the slot taken, so they are drained by this
/// same worker after it re-joins through the newest link.
pub(crate) struct PlaybackWorker {
    state: Arc<DestinationState>,
    fetcher: Arc<MediaFetcher>,
    events: Arc<dyn PlaybackEvents>,
}

impl PlaybackWorker {
    pub fn new(state: Arc<DestinationState>, fetcher: Arc<MediaFetcher>, events: Arc<dyn PlaybackEvents>) -> Self {
        Self { state, fetcher, events }
    }

    pub async fn run(self) {
        let destination = self.state.id();
        let running = self.state.worker_started();
        if running > 1 {
            error!("🚨 {} workers simultáneos en {}", running, destination);
        }
        debug!("▶️ Worker iniciado para {}", destination);

        // Un worker nuevo viene de un pedido recién hecho: puede reconectar
        let mut may_rejoin = true;
        loop {
            let exit = self.drain(may_rejoin).await;
            may_rejoin = false;

            match exit {
                Exit::Empty => {
                    if !self.state.is_empty() {
                        continue;
                    }

                    // Salir del canal mientras aún tenemos el slot
                    if let Some(link) = self.state.link() {
                        link.leave().await;
                    }
                    if self.state.release_if_empty() {
                        self.events.idle(destination).await;
                        break;
                    }
                    debug!("🔁 Llegaron canciones a {} durante la salida", destination);
                    may_rejoin = true;
                }
                Exit::Disconnected { generation } => {
                    if let Some(prefetch) = self.state.take_prefetch() {
                        prefetch.handle.abort();
                        self.state.push_front(prefetch.request);
                    }

                    // No cerrar un enlace que trajo un pedido más nuevo
                    let (current, link) = self.state.versioned_link();
                    if current == generation {
                        if let Some(link) = link {
                            link.leave().await;
                        }
                    }
                    if self.state.release_unless_relinked(generation) {
                        warn!(
                            "🔌 Desconectado de {}, {} canciones quedan en cola",
                            destination,
                            self.state.len()
                        );
                        break;
                    }
                    debug!("🔁 Nuevo enlace para {} durante la desconexión", destination);
                    may_rejoin = true;
                }
            }
        }

        self.state.worker_stopped();
        debug!("⏹️ Worker terminado para {}", destination);
    }

    /// Plays queued requests until the queue is empty or the link drops.
    ///
    /// With `may_rejoin`, a dead link on the first pass is re-joined instead of
    /// ending the pass. Later passes treat a dead link as a disconnection.
    async fn drain(&self, mut may_rejoin: bool) -> Exit {
        loop {
            let (generation, link) = self.state.versioned_link();
            let Some(link) = link else {
                return Exit::Disconnected { generation };
            };
            if !link.is_live().await {
                if !may_rejoin || !link.rejoin().await {
                    return Exit::Disconnected { generation };
                }
                info!("🔊 Reconectado a {}", self.state.id());
            }
            may_rejoin = false;

            let current = match self.state.take_prefetch() {
                Some(prefetch) => prefetch,
                None => match self.state.pop() {
                    Some(request) => self.start_fetch(request),
                    None => return Exit::Empty,
                },
            };

            // La siguiente se descarga mientras esperamos la actual
            self.prefetch_next();

            let Prefetch { request, handle } = current;
            let artifact = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!("❌ Tarea de descarga abortada: {}", e);
                    Err(FetchError::PrefetchAborted(request.media_id.clone()))
                }
            };

            match artifact {
                Ok(path) => self.play(&link, &request, path).await,
                Err(e) => {
                    warn!("❌ No se pudo obtener {}: {}", request.media_id, e);
                    self.events.failed(&request, &PlaybackError::Fetch(e)).await;
                }
            }
        }
    }

    /// Dequeues the next request and starts fetching it in the background.
    fn prefetch_next(&self) {
        let Some(request) = self.state.pop() else {
            return;
        };

        debug!("⏩ Precargando {}", request.media_id);
        let prefetch = self.start_fetch(request);
        self.state.store_prefetch(prefetch);
    }

    fn start_fetch(&self, request: PlaybackRequest) -> Prefetch {
        let fetcher = self.fetcher.clone();
        let media_id = request.media_id.clone();
        let handle = tokio::spawn(async move { fetcher.fetch(&media_id).await });
        Prefetch { request, handle }
    }

    async fn play(&self, link: &Arc<dyn VoiceLink>, request: &PlaybackRequest, artifact: PathBuf) {
        info!(
            "🎵 {} -> {} (esperó {})",
            request.display_text,
            request.destination,
            humantime::format_duration(Duration::from_secs(request.waited(Utc::now()).as_secs()))
        );
        self.events.now_playing(request).await;

        link.set_speaking(true).await;
        let end = link.stream(&artifact).await;
        link.set_speaking(false).await;

        match end {
            StreamEnd::EndOfInput => debug!("✅ Terminó {}", request.media_id),
            StreamEnd::Failed(e) => {
                warn!("❌ Falló la transmisión de {}: {}", request.media_id, e);
                self.events.failed(request, &PlaybackError::Stream(e)).await;
            }
        }
    }
}
