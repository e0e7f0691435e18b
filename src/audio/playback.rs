use std::sync::Arc;
use tracing::{debug, warn};

use super::decode::PayloadDecoder;
use super::output::AudioOutput;
use crate::error::PlaybackError;
use crate::protocol::AudioPayload;

/// Callback used to report playback failures
pub type PlaybackReporter = Arc<dyn Fn(PlaybackError) + Send + Sync>;

/// Fire-and-forget playback of assistant audio.
///
/// Every payload is decoded on the blocking pool and rendered on its own.
/// Nothing is queued, so closely spaced payloads may overlap.
#[derive(Clone)]
pub struct PlaybackPipeline {
    decoder: PayloadDecoder,
    output: Arc<dyn AudioOutput>,
    report: PlaybackReporter,
}

impl PlaybackPipeline {
    pub fn new(decoder: PayloadDecoder, output: Arc<dyn AudioOutput>, report: PlaybackReporter) -> Self {
        Self {
            decoder,
            output,
            report,
        }
    }

    /// Decode and play `payload` without waiting for it.
    pub fn play(&self, payload: AudioPayload) -> tokio::task::JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.play_now(payload).await {
                warn!("Playback failed: {}", e);
                (pipeline.report)(e);
            }
        })
    }

    /// Decode and hand `payload` to the output, returning any failure.
    pub async fn play_now(&self, payload: AudioPayload) -> Result<(), PlaybackError> {
        let decoder = self.decoder.clone();
        let size = payload.len();

        let audio = tokio::task::spawn_blocking(move || decoder.decode(payload.as_bytes()))
            .await
            .map_err(|e| PlaybackError::Decode(format!("Decoder task failed: {}", e)))??;

        debug!(
            "Playing {} bytes as {:.2}s of audio ({}Hz, {}ch) on {}",
            size,
            audio.duration_secs(),
            audio.sample_rate,
            audio.channels,
            self.output.name()
        );

        self.output.render(audio)
    }
}
