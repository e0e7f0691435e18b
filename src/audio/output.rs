// Audio output seam
//
// `RodioOutput` keeps the rodio stream on its own thread and adds every
// decoded buffer to the stream's mixer, so buffers may overlap.

use std::sync::mpsc;
use std::thread::JoinHandle;
use tracing::{info, warn};

use super::decode::DecodedAudio;
use crate::error::PlaybackError;

/// Something that can render decoded audio immediately.
pub trait AudioOutput: Send + Sync {
    /// Schedule `audio` for immediate playback. Must not block on playback.
    fn render(&self, audio: DecodedAudio) -> Result<(), PlaybackError>;

    /// Get output name for logging
    fn name(&self) -> &str;
}

/// Default output device via rodio
pub struct RodioOutput {
    buffers: mpsc::Sender<DecodedAudio>,
    _thread: JoinHandle<()>,
}

impl RodioOutput {
    /// Open the default output device.
    pub fn open() -> Result<Self, PlaybackError> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), PlaybackError>>(1);
        let (buffers_tx, buffers_rx) = mpsc::channel::<DecodedAudio>();

        let thread = std::thread::Builder::new()
            .name("loqa-voice-output".to_string())
            .spawn(move || {
                let mut stream = match rodio::OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(PlaybackError::OutputUnavailable(e.to_string())));
                        return;
                    }
                };
                stream.log_on_drop(false);
                let _ = ready_tx.send(Ok(()));

                // Ends once every sender is gone
                for audio in buffers_rx {
                    let source =
                        rodio::buffer::SamplesBuffer::new(audio.channels, audio.sample_rate, audio.samples);
                    stream.mixer().add(source);
                }
            })
            .map_err(|e| PlaybackError::OutputUnavailable(format!("Failed to spawn output thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Audio output opened");
                Ok(Self {
                    buffers: buffers_tx,
                    _thread: thread,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PlaybackError::OutputUnavailable(
                "Output thread exited before opening the device".to_string(),
            )),
        }
    }
}

impl AudioOutput for RodioOutput {
    fn render(&self, audio: DecodedAudio) -> Result<(), PlaybackError> {
        self.buffers
            .send(audio)
            .map_err(|_| PlaybackError::OutputUnavailable("Output thread has stopped".to_string()))
    }

    fn name(&self) -> &str {
        "rodio:default"
    }
}

/// Output used when no device could be opened; every render fails.
pub struct UnavailableOutput {
    reason: String,
}

impl UnavailableOutput {
    pub fn new(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!("Audio output disabled: {}", reason);
        Self { reason }
    }
}

impl AudioOutput for UnavailableOutput {
    fn render(&self, _audio: DecodedAudio) -> Result<(), PlaybackError> {
        Err(PlaybackError::OutputUnavailable(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
