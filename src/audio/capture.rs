use tokio::sync::mpsc;
use tracing::{debug, info};

use super::backend::{CaptureConfig, CaptureDevice, CaptureEvent, CaptureGuard, LevelTap};
use crate::error::DeviceError;

/// Handle to one acquired microphone stream.
///
/// Owned by exactly one session. Dropping it releases the device.
pub struct CapturePipeline {
    device_name: String,
    config: CaptureConfig,
    events: Option<mpsc::Receiver<CaptureEvent>>,
    level: LevelTap,
    guard: Box<dyn CaptureGuard>,
    released: bool,
}

impl CapturePipeline {
    /// Acquire the microphone described by `config`.
    pub async fn acquire(device: &dyn CaptureDevice, config: &CaptureConfig) -> Result<Self, DeviceError> {
        info!(
            "Acquiring microphone via {} ({}Hz, {} channel, {} samples/block)",
            device.name(),
            config.sample_rate,
            config.channels,
            config.block_size
        );

        let stream = device.acquire(config).await?;

        info!("Microphone acquired: {}", device.name());

        Ok(Self {
            device_name: device.name().to_string(),
            config: config.clone(),
            events: Some(stream.events),
            level: stream.level,
            guard: stream.guard,
            released: false,
        })
    }

    /// Take the event stream. Only the first caller gets it.
    pub fn subscribe(&mut self) -> Option<mpsc::Receiver<CaptureEvent>> {
        self.events.take()
    }

    pub fn level_tap(&self) -> LevelTap {
        self.level.clone()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        !self.released
    }

    /// Stop emission and release the device. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.released {
            debug!("Microphone {} already released", self.device_name);
            return;
        }
        self.released = true;
        self.level.deactivate();
        self.events = None;
        self.guard.release();
        info!("Microphone released: {}", self.device_name);
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.release();
    }
}
