// In-memory fakes for the voice link, the microphone and the audio output,
// plus a harness that wires them into a running session controller.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use loqa_voice::audio::{
    AudioOutput, CaptureConfig, CaptureDevice, CaptureEvent, CaptureGuard, CaptureStream, DecodedAudio,
    LevelTap,
};
use loqa_voice::error::{ConnectError, DeviceError, PlaybackError};
use loqa_voice::session::{
    SessionConfig, SessionController, SessionDeps, SessionEvent, SessionHandle, SessionState,
};
use loqa_voice::transport::{Connector, Link, LinkEvent, OUTBOUND_DEPTH};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

pub fn test_config() -> SessionConfig {
    SessionConfig {
        endpoint: "ws://voice.test/ws/voice".to_string(),
        connect_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

/// Encode mono i16 samples as an in-memory WAV file.
pub fn wav_bytes(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("create wav writer");
        for &sample in samples {
            writer.write_sample(sample).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }
    cursor.into_inner()
}

// ----------------------------------------------------------------------------
// Voice link
// ----------------------------------------------------------------------------

pub enum ConnectPlan {
    Accept,
    Refuse(String),
    /// Accept once the sender fires (or is dropped)
    Gate(oneshot::Receiver<()>),
    /// Never complete the handshake
    Hang,
}

/// The service side of one accepted link
pub struct MockServer {
    /// Binary frames sent by the session. `None` once the session closed the link.
    pub frames: mpsc::Receiver<Vec<u8>>,
    /// Events delivered to the session. Dropping it looks like a remote close.
    pub events: mpsc::UnboundedSender<LinkEvent>,
}

impl MockServer {
    pub fn send_text(&self, text: &str) {
        let _ = self
            .events
            .send(LinkEvent::Message(loqa_voice::WireMessage::Text(text.to_string())));
    }

    pub fn send_binary(&self, bytes: Vec<u8>) {
        let _ = self
            .events
            .send(LinkEvent::Message(loqa_voice::WireMessage::Binary(bytes)));
    }

    /// Next frame from the session, or `None` if the link was closed.
    pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
        tokio::time::timeout(EVENT_TIMEOUT, self.frames.recv())
            .await
            .expect("timed out waiting for a frame")
    }
}

pub struct MockConnector {
    plans: Mutex<VecDeque<ConnectPlan>>,
    servers: mpsc::UnboundedSender<MockServer>,
    calls: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            plans: Mutex::new(VecDeque::new()),
            servers,
            calls: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    /// Queue the behavior of the next handshake. Unplanned handshakes succeed.
    pub fn plan(&self, plan: ConnectPlan) {
        self.plans.lock().unwrap().push_back(plan);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn accept(&self) -> Link {
        let (outbound, frames) = mpsc::channel(OUTBOUND_DEPTH);
        let (events, inbound) = mpsc::unbounded_channel();
        let _ = self.servers.send(MockServer { frames, events });
        Link { outbound, inbound }
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Link, ConnectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let plan = self.plans.lock().unwrap().pop_front().unwrap_or(ConnectPlan::Accept);

        match plan {
            ConnectPlan::Accept => Ok(self.accept()),
            ConnectPlan::Refuse(message) => Err(ConnectError::Handshake {
                url: url.to_string(),
                message,
            }),
            ConnectPlan::Gate(gate) => {
                let _ = gate.await;
                Ok(self.accept())
            }
            ConnectPlan::Hang => std::future::pending().await,
        }
    }
}

// ----------------------------------------------------------------------------
// Microphone
// ----------------------------------------------------------------------------

pub enum MicPlan {
    Grant,
    Deny(DeviceError),
    /// Grant once the sender fires (or is dropped)
    Gate(oneshot::Receiver<()>),
}

/// Test side of one granted microphone
pub struct MicHandle {
    pub chunks: mpsc::Sender<CaptureEvent>,
    pub level: LevelTap,
    pub released: Arc<AtomicBool>,
}

impl MicHandle {
    pub async fn send(&self, event: CaptureEvent) {
        self.chunks.send(event).await.expect("capture stream closed");
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

struct MockGuard {
    released: Arc<AtomicBool>,
}

impl CaptureGuard for MockGuard {
    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

pub struct MockMicrophone {
    plans: Mutex<VecDeque<MicPlan>>,
    handles: mpsc::UnboundedSender<MicHandle>,
    calls: AtomicUsize,
}

impl MockMicrophone {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MicHandle>) {
        let (handles, rx) = mpsc::unbounded_channel();
        let mic = Arc::new(Self {
            plans: Mutex::new(VecDeque::new()),
            handles,
            calls: AtomicUsize::new(0),
        });
        (mic, rx)
    }

    /// Queue the behavior of the next acquisition. Unplanned ones are granted.
    pub fn plan(&self, plan: MicPlan) {
        self.plans.lock().unwrap().push_back(plan);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn grant(&self) -> CaptureStream {
        let (chunks, events) = mpsc::channel(8);
        let level = LevelTap::new();
        let released = Arc::new(AtomicBool::new(false));

        let _ = self.handles.send(MicHandle {
            chunks,
            level: level.clone(),
            released: Arc::clone(&released),
        });

        CaptureStream {
            events,
            level,
            guard: Box::new(MockGuard { released }),
        }
    }
}

#[async_trait::async_trait]
impl CaptureDevice for MockMicrophone {
    async fn acquire(&self, _config: &CaptureConfig) -> Result<CaptureStream, DeviceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let plan = self.plans.lock().unwrap().pop_front().unwrap_or(MicPlan::Grant);

        match plan {
            MicPlan::Grant => Ok(self.grant()),
            MicPlan::Deny(e) => Err(e),
            MicPlan::Gate(gate) => {
                let _ = gate.await;
                Ok(self.grant())
            }
        }
    }

    fn name(&self) -> &str {
        "mock-microphone"
    }
}

// ----------------------------------------------------------------------------
// Output
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct MockOutput {
    rendered: Mutex<Vec<DecodedAudio>>,
    failure: Option<PlaybackError>,
}

impl MockOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(error: PlaybackError) -> Arc<Self> {
        Arc::new(Self {
            rendered: Mutex::new(Vec::new()),
            failure: Some(error),
        })
    }

    pub fn rendered(&self) -> Vec<DecodedAudio> {
        self.rendered.lock().unwrap().clone()
    }
}

impl AudioOutput for MockOutput {
    fn render(&self, audio: DecodedAudio) -> Result<(), PlaybackError> {
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        self.rendered.lock().unwrap().push(audio);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock-output"
    }
}

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

pub struct Harness {
    pub handle: SessionHandle,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub connector: Arc<MockConnector>,
    pub servers: mpsc::UnboundedReceiver<MockServer>,
    pub mic: Arc<MockMicrophone>,
    pub mics: mpsc::UnboundedReceiver<MicHandle>,
    pub output: Arc<MockOutput>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(test_config(), MockOutput::new())
    }

    pub fn with(config: SessionConfig, output: Arc<MockOutput>) -> Self {
        let (connector, servers) = MockConnector::new();
        let (mic, mics) = MockMicrophone::new();

        let deps = SessionDeps {
            connector: connector.clone(),
            capture: mic.clone(),
            output: output.clone(),
        };
        let (handle, events, task) = SessionController::spawn(config, deps);

        Self {
            handle,
            events,
            connector,
            servers,
            mic,
            mics,
            output,
            task,
        }
    }

    /// Next event other than a level update.
    pub async fn next(&mut self) -> SessionEvent {
        loop {
            let event = tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
                .await
                .expect("timed out waiting for a session event")
                .expect("session event stream ended");
            if !matches!(event, SessionEvent::LevelChanged(_)) {
                return event;
            }
        }
    }

    /// Next level update, skipping everything else.
    pub async fn next_level(&mut self) -> f32 {
        loop {
            let event = tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
                .await
                .expect("timed out waiting for a level update")
                .expect("session event stream ended");
            if let SessionEvent::LevelChanged(level) = event {
                return level;
            }
        }
    }

    /// Collect events up to and including the change into `state`.
    pub async fn until_status(&mut self, state: SessionState) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next().await;
            let done = event == SessionEvent::StatusChanged(state);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    pub async fn expect_status(&mut self, state: SessionState) {
        assert_eq!(self.next().await, SessionEvent::StatusChanged(state));
    }

    /// Pending events other than level updates, without waiting.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut pending = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if !matches!(event, SessionEvent::LevelChanged(_)) {
                pending.push(event);
            }
        }
        pending
    }

    pub async fn server(&mut self) -> MockServer {
        tokio::time::timeout(EVENT_TIMEOUT, self.servers.recv())
            .await
            .expect("timed out waiting for a handshake")
            .expect("connector dropped")
    }

    pub async fn microphone(&mut self) -> MicHandle {
        tokio::time::timeout(EVENT_TIMEOUT, self.mics.recv())
            .await
            .expect("timed out waiting for microphone acquisition")
            .expect("microphone dropped")
    }

    /// Start a session and wait until it streams.
    pub async fn stream(&mut self) -> (MockServer, MicHandle) {
        assert!(self.handle.start());
        self.expect_status(SessionState::Connecting).await;
        let server = self.server().await;
        let mic = self.microphone().await;
        self.expect_status(SessionState::Streaming).await;
        (server, mic)
    }

    /// Poll stats until `check` holds.
    pub async fn wait_for_stats<F>(&self, check: F) -> loqa_voice::SessionStats
    where
        F: Fn(&loqa_voice::SessionStats) -> bool,
    {
        let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
        loop {
            let stats = self.handle.stats().await.expect("controller exited");
            if check(&stats) {
                return stats;
            }
            assert!(tokio::time::Instant::now() < deadline, "stats never matched: {:?}", stats);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
