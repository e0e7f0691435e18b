//! Microphone capture using CPAL (Cross-Platform Audio Library).
//!
//! The cpal stream is not `Send`, so it lives on a dedicated thread for the
//! lifetime of the capture. The async side only sees a channel of chunks and
//! a guard that stops and joins that thread.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::backend::{
    CaptureConfig, CaptureDevice, CaptureGuard, CaptureStream, ChunkSender, LevelTap, CAPTURE_QUEUE_DEPTH,
};
use super::chunk::BlockAssembler;
use super::convert::{downmix, i16_to_f32, StreamResampler};
use crate::error::DeviceError;

/// Messages to the thread that owns the cpal stream
enum CaptureSignal {
    /// Released by the session
    Stop,
    /// Reported by the stream's error callback
    Failed(DeviceError),
}

/// List the names of all input devices on the default host.
pub fn list_input_devices() -> Result<Vec<String>, DeviceError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| classify(format!("Failed to enumerate input devices: {}", e)))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Microphone backend on the default cpal host
pub struct CpalMicrophone {
    device_name: Option<String>,
    label: String,
}

impl CpalMicrophone {
    /// Use the named input device, or the host default when `None`.
    pub fn new(device_name: Option<String>) -> Self {
        let label = match &device_name {
            Some(name) => format!("cpal:{}", name),
            None => "cpal:default".to_string(),
        };
        Self { device_name, label }
    }
}

#[async_trait::async_trait]
impl CaptureDevice for CpalMicrophone {
    async fn acquire(&self, config: &CaptureConfig) -> Result<CaptureStream, DeviceError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (signal_tx, signal_rx) = std_mpsc::channel::<CaptureSignal>();
        let (events_tx, events_rx) = mpsc::channel(CAPTURE_QUEUE_DEPTH);
        let level = LevelTap::new();

        let thread = {
            let device_name = self.device_name.clone();
            let config = config.clone();
            let level = level.clone();
            let signals = signal_tx.clone();
            std::thread::Builder::new()
                .name("loqa-voice-capture".to_string())
                .spawn(move || {
                    run_capture_thread(
                        device_name,
                        config,
                        ChunkSender::new(events_tx),
                        level,
                        ready_tx,
                        signals,
                        signal_rx,
                    )
                })
                .map_err(|e| DeviceError::Unavailable(format!("Failed to spawn capture thread: {}", e)))?
        };

        match ready_rx.await {
            Ok(Ok(())) => Ok(CaptureStream {
                events: events_rx,
                level,
                guard: Box::new(CpalGuard {
                    stop: Some(signal_tx),
                    thread: Some(thread),
                }),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(DeviceError::Unavailable(
                "Capture thread exited before the stream started".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Stops the capture thread and waits for it to drop the stream
struct CpalGuard {
    stop: Option<std_mpsc::Sender<CaptureSignal>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureGuard for CpalGuard {
    fn release(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(CaptureSignal::Stop);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Capture thread panicked during shutdown");
            }
        }
    }
}

impl Drop for CpalGuard {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_capture_thread(
    device_name: Option<String>,
    config: CaptureConfig,
    events: ChunkSender,
    level: LevelTap,
    ready: oneshot::Sender<Result<(), DeviceError>>,
    signals: std_mpsc::Sender<CaptureSignal>,
    signal_rx: std_mpsc::Receiver<CaptureSignal>,
) {
    let stream = match build_stream(device_name.as_deref(), &config, events.clone(), level, signals) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(classify(format!("Failed to start input stream: {}", e))));
        return;
    }

    if ready.send(Ok(())).is_err() {
        return;
    }

    // The error callback holds a sender, so this only returns on a signal
    match signal_rx.recv() {
        Ok(CaptureSignal::Failed(e)) => {
            drop(stream);
            warn!("Input stream failed: {}", e);
            events.fail_blocking(e);
        }
        Ok(CaptureSignal::Stop) | Err(_) => drop(stream),
    }
}

fn find_device(name: Option<&str>) -> Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();

    match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| classify(format!("Failed to enumerate input devices: {}", e)))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| DeviceError::Unavailable(format!("Input device not found: {}", name))),
        None => host
            .default_input_device()
            .ok_or_else(|| DeviceError::Unavailable("No default input device".to_string())),
    }
}

/// Capture at the device's native format and convert in software.
fn build_stream(
    device_name: Option<&str>,
    config: &CaptureConfig,
    events: ChunkSender,
    level: LevelTap,
    signals: std_mpsc::Sender<CaptureSignal>,
) -> Result<cpal::Stream, DeviceError> {
    let device = find_device(device_name)?;
    let supported = device
        .default_input_config()
        .map_err(|e| classify(format!("Failed to query input config: {}", e)))?;

    let native_rate = supported.sample_rate().0;
    let native_channels = supported.channels() as usize;
    let stream_config: cpal::StreamConfig = supported.config();

    info!(
        "Input device {} native format: {}ch/{}Hz/{:?}",
        device.name().unwrap_or_else(|_| "<unnamed>".to_string()),
        native_channels,
        native_rate,
        supported.sample_format()
    );

    let resampler = StreamResampler::new(native_rate, config.sample_rate).map_err(|e| {
        DeviceError::Unavailable(format!(
            "Cannot resample {}Hz input to {}Hz: {}",
            native_rate, config.sample_rate, e
        ))
    })?;

    let mut sink = ChunkSink {
        assembler: BlockAssembler::new(config.block_size),
        resampler,
        events,
        level,
        native_channels,
    };

    let err_fn = move |err: cpal::StreamError| match err {
        cpal::StreamError::DeviceNotAvailable => {
            let _ = signals.send(CaptureSignal::Failed(DeviceError::Disconnected(
                "Input device is no longer available".to_string(),
            )));
        }
        other => warn!("Audio stream error: {}", other),
    };

    let stream = match supported.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| sink.push(data),
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let converted: Vec<f32> = data.iter().map(|&s| i16_to_f32(s)).collect();
                sink.push(&converted);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(DeviceError::Unavailable(format!(
                "Unsupported native sample format: {:?}",
                other
            )))
        }
    };

    stream.map_err(|e| classify(format!("Failed to build input stream: {}", e)))
}

/// Per-callback conversion state, owned by the audio callback
struct ChunkSink {
    assembler: BlockAssembler,
    resampler: StreamResampler,
    events: ChunkSender,
    level: LevelTap,
    native_channels: usize,
}

impl ChunkSink {
    fn push(&mut self, data: &[f32]) {
        let mono = downmix(data, self.native_channels);
        if !mono.is_empty() {
            let magnitude = mono.iter().map(|s| s.abs()).sum::<f32>() / mono.len() as f32;
            self.level.store(magnitude);
        }

        let resampled = match self.resampler.process(&mono) {
            Ok(resampled) => resampled,
            Err(e) => {
                warn!("Dropping {} input frames: {}", mono.len(), e);
                return;
            }
        };

        for chunk in self.assembler.push(&resampled) {
            self.events.offer(chunk);
        }
    }
}

/// Map a backend error message to the matching device error.
fn classify(message: String) -> DeviceError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        DeviceError::PermissionDenied(message)
    } else {
        DeviceError::Unavailable(message)
    }
}
