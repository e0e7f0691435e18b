use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::chunk::{AudioChunk, DEFAULT_BLOCK_SIZE};
use crate::error::DeviceError;

/// Chunks a capture stream may hold before new ones are dropped
pub const CAPTURE_QUEUE_DEPTH: usize = 8;

/// Configuration for microphone capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Sample rate of emitted chunks in Hz
    pub sample_rate: u32,
    /// Channel count of emitted chunks (always mono on the wire)
    pub channels: u16,
    /// Samples per emitted chunk
    pub block_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl CaptureConfig {
    /// Wall-clock span of one chunk
    pub fn block_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.block_size as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Events emitted by an active capture
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// One full block of audio
    Chunk(AudioChunk),
    /// The device stopped delivering audio; no further chunks will follow
    Failed(DeviceError),
}

/// Producer side of a capture stream, used from device threads.
///
/// Chunks never block the producer: when the queue is full they are dropped
/// and counted. The terminal failure waits for room instead, so it cannot be
/// lost behind a full queue.
#[derive(Debug)]
pub struct ChunkSender {
    events: mpsc::Sender<CaptureEvent>,
    dropped: u64,
}

impl ChunkSender {
    pub fn new(events: mpsc::Sender<CaptureEvent>) -> Self {
        Self { events, dropped: 0 }
    }

    /// Queue a chunk, returning `false` if it was dropped.
    pub fn offer(&mut self, chunk: AudioChunk) -> bool {
        match self.events.try_send(CaptureEvent::Chunk(chunk)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped == 1 || self.dropped % 100 == 0 {
                    warn!("Capture queue full, {} chunks dropped so far", self.dropped);
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Capture stream has no consumer, dropping chunk");
                false
            }
        }
    }

    /// Chunks dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Deliver the terminal failure, waiting for queue space.
    ///
    /// Must be called from a plain thread, never from inside the async runtime.
    /// Returns `false` only when nobody listens anymore.
    pub fn fail_blocking(&self, error: DeviceError) -> bool {
        self.events.blocking_send(CaptureEvent::Failed(error)).is_ok()
    }
}

impl Clone for ChunkSender {
    fn clone(&self) -> Self {
        Self::new(self.events.clone())
    }
}

/// Latest input level, shared between the capture callback and the level meter.
#[derive(Debug, Clone)]
pub struct LevelTap {
    inner: Arc<LevelInner>,
}

#[derive(Debug)]
struct LevelInner {
    level_bits: AtomicU32,
    active: AtomicBool,
}

impl LevelTap {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LevelInner {
                level_bits: AtomicU32::new(0f32.to_bits()),
                active: AtomicBool::new(true),
            }),
        }
    }

    /// Store a level in [0, 1].
    pub fn store(&self, level: f32) {
        let level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
        self.inner.level_bits.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.inner.level_bits.load(Ordering::Relaxed))
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn deactivate(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }
}

impl Default for LevelTap {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the hardware behind a capture stream.
///
/// `release` runs synchronously and may be called more than once.
pub trait CaptureGuard: Send {
    fn release(&mut self);
}

/// An acquired microphone stream
pub struct CaptureStream {
    /// Chunks and terminal failures, in device order
    pub events: mpsc::Receiver<CaptureEvent>,
    /// Level tap fed by the capture callback
    pub level: LevelTap,
    /// Hardware release handle
    pub guard: Box<dyn CaptureGuard>,
}

/// Microphone capture backend trait
///
/// Implementations:
/// - cpal microphone (all desktop platforms)
/// - in-memory fakes in tests
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device and start emitting chunks
    async fn acquire(&self, config: &CaptureConfig) -> Result<CaptureStream, DeviceError>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}
