//! The session state machine.
//!
//! A single task owns all session state. Microphone callbacks, link events,
//! user commands and the completions of asynchronous steps are all posted
//! into one inbox and handled one at a time, so transitions never interleave.
//!
//! Every asynchronous step carries the epoch it was started in. `start` and
//! every teardown bump the epoch, which marks in-flight work as cancelled:
//! a handshake or microphone grant that completes after `stop` is released
//! instead of resurrecting the session.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::events::{MessageKind, SessionEvent};
use super::state::SessionState;
use super::stats::SessionStats;
use crate::audio::{
    AudioChunk, AudioOutput, CaptureDevice, CaptureEvent, CapturePipeline, LevelMeter, LevelTap,
    PayloadDecoder, PlaybackPipeline, PlaybackReporter, UtteranceRecorder,
};
use crate::error::{ConnectError, DeviceError, PlaybackError, SessionError};
use crate::protocol::{self, ControlEvent, Inbound, WireMessage};
use crate::transport::{Connector, LinkEvent, SendOutcome, TransportChannel};

/// External collaborators a session drives
#[derive(Clone)]
pub struct SessionDeps {
    pub connector: Arc<dyn Connector>,
    pub capture: Arc<dyn CaptureDevice>,
    pub output: Arc<dyn AudioOutput>,
}

enum Command {
    Start,
    Stop,
    Stats(oneshot::Sender<SessionStats>),
    Shutdown,
}

enum Input {
    Command(Command),
    Connected {
        epoch: u64,
        result: Result<TransportChannel, ConnectError>,
    },
    CaptureReady {
        epoch: u64,
        result: Result<CapturePipeline, DeviceError>,
    },
    Link {
        epoch: u64,
        event: LinkEvent,
    },
    Capture {
        epoch: u64,
        event: CaptureEvent,
    },
    PlaybackFailed {
        epoch: u64,
        error: PlaybackError,
    },
}

/// Resources of one live session
struct Session {
    id: String,
    epoch: u64,
    transport: TransportChannel,
    capture: Option<CapturePipeline>,
    playback: PlaybackPipeline,
    meter: Option<LevelMeter>,
    recorder: Option<UtteranceRecorder>,
    /// Armed at start and after each response by the next sent chunk
    started_at: Option<Instant>,
    forwarders: Vec<JoinHandle<()>>,
}

enum Phase {
    Disconnected,
    /// Handshake in flight
    Connecting { epoch: u64, id: String },
    /// Link open, microphone grant in flight
    Acquiring(Session),
    Streaming(Session),
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Disconnected => SessionState::Disconnected,
            Phase::Connecting { .. } | Phase::Acquiring(_) => SessionState::Connecting,
            Phase::Streaming(_) => SessionState::Streaming,
        }
    }
}

#[derive(Clone)]
struct Notifier {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Notifier {
    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("Session observer is gone, dropping notification");
        }
    }
}

/// Cloneable handle used to command a running controller
#[derive(Clone)]
pub struct SessionHandle {
    inbox: mpsc::UnboundedSender<Input>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Request a session start. Ignored unless disconnected.
    pub fn start(&self) -> bool {
        self.inbox.send(Input::Command(Command::Start)).is_ok()
    }

    /// Tear down whatever is active. Always safe to call.
    pub fn stop(&self) -> bool {
        self.inbox.send(Input::Command(Command::Stop)).is_ok()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Current session statistics, or `None` once the controller has exited.
    pub async fn stats(&self) -> Option<SessionStats> {
        let (tx, rx) = oneshot::channel();
        self.inbox.send(Input::Command(Command::Stats(tx))).ok()?;
        rx.await.ok()
    }

    /// Stop any session and end the controller task.
    pub fn shutdown(&self) {
        let _ = self.inbox.send(Input::Command(Command::Shutdown));
    }
}

pub struct SessionController {
    config: SessionConfig,
    deps: SessionDeps,
    phase: Phase,
    epoch: u64,
    inbox: mpsc::UnboundedReceiver<Input>,
    inbox_tx: mpsc::UnboundedSender<Input>,
    notifier: Notifier,
    state_tx: watch::Sender<SessionState>,
    stats: SessionStats,
    clock: Option<Instant>,
}

impl SessionController {
    /// Create a controller, its command handle and its notification stream.
    pub fn new(
        config: SessionConfig,
        deps: SessionDeps,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        let handle = SessionHandle {
            inbox: inbox_tx.clone(),
            state: state_rx,
        };

        let controller = Self {
            config,
            deps,
            phase: Phase::Disconnected,
            epoch: 0,
            inbox,
            inbox_tx,
            notifier: Notifier { events: events_tx },
            state_tx,
            stats: SessionStats::default(),
            clock: None,
        };

        (controller, handle, events_rx)
    }

    /// Create a controller and run it on the current runtime.
    pub fn spawn(
        config: SessionConfig,
        deps: SessionDeps,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>, JoinHandle<()>) {
        let (controller, handle, events) = Self::new(config, deps);
        let task = tokio::spawn(controller.run());
        (handle, events, task)
    }

    /// Process inputs until shutdown.
    pub async fn run(mut self) {
        info!("Session controller started (endpoint {})", self.config.endpoint);

        while let Some(input) = self.inbox.recv().await {
            if !self.handle(input) {
                break;
            }
        }

        self.teardown();
        info!("Session controller stopped");
    }

    fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::Command(Command::Start) => self.on_start(),
            Input::Command(Command::Stop) => self.on_stop(),
            Input::Command(Command::Stats(reply)) => {
                let _ = reply.send(self.snapshot());
            }
            Input::Command(Command::Shutdown) => return false,
            Input::Connected { epoch, result } => self.on_connected(epoch, result),
            Input::CaptureReady { epoch, result } => self.on_capture_ready(epoch, result),
            Input::Link { epoch, event } => self.on_link_event(epoch, event),
            Input::Capture { epoch, event } => self.on_capture_event(epoch, event),
            Input::PlaybackFailed { epoch, error } => self.on_playback_failed(epoch, error),
        }
        true
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn on_start(&mut self) {
        if !matches!(self.phase, Phase::Disconnected) {
            debug!("Start ignored: session is {:?}", self.phase.state());
            return;
        }

        self.epoch += 1;
        let epoch = self.epoch;
        let id = format!("voice-{}", Uuid::new_v4());

        info!("Starting voice session {}", id);

        self.stats = SessionStats {
            session_id: Some(id.clone()),
            started_at: Some(Utc::now()),
            ..SessionStats::default()
        };
        self.clock = Some(Instant::now());

        let connector = Arc::clone(&self.deps.connector);
        let url = self.config.endpoint.clone();
        let timeout = self.config.connect_timeout;
        let inbox = self.inbox_tx.clone();

        tokio::spawn(async move {
            let result = TransportChannel::open(connector.as_ref(), &url, timeout).await;
            let _ = inbox.send(Input::Connected { epoch, result });
        });

        self.transition(SessionState::Disconnected, Phase::Connecting { epoch, id });
    }

    fn on_stop(&mut self) {
        if matches!(self.phase, Phase::Disconnected) {
            debug!("Stop ignored: no active session");
            return;
        }

        info!("Stopping voice session");
        self.teardown();
    }

    // ------------------------------------------------------------------
    // Completions of asynchronous steps
    // ------------------------------------------------------------------

    fn on_connected(&mut self, epoch: u64, result: Result<TransportChannel, ConnectError>) {
        let expected = matches!(&self.phase, Phase::Connecting { epoch: e, .. } if *e == epoch);
        if !expected {
            match result {
                Ok(mut transport) => {
                    debug!("Closing link opened for a cancelled start");
                    transport.close();
                }
                Err(e) => debug!("Ignoring handshake failure of a cancelled start: {}", e),
            }
            return;
        }

        let mut transport = match result {
            Ok(transport) => transport,
            Err(e) => {
                error!("Failed to connect: {}", e);
                self.fail(SessionError::Connect(e), true);
                return;
            }
        };

        let Phase::Connecting { id, .. } = self.take_phase() else {
            return;
        };

        let mut forwarders = Vec::new();
        if let Some(events) = transport.subscribe() {
            forwarders.push(self.forward_link(epoch, events));
        }

        let session = Session {
            id,
            epoch,
            transport,
            capture: None,
            playback: self.playback_pipeline(epoch),
            meter: None,
            recorder: None,
            started_at: None,
            forwarders,
        };

        let device = Arc::clone(&self.deps.capture);
        let config = self.config.capture_config();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = CapturePipeline::acquire(device.as_ref(), &config).await;
            let _ = inbox.send(Input::CaptureReady { epoch, result });
        });

        self.transition(SessionState::Connecting, Phase::Acquiring(session));
    }

    fn on_capture_ready(&mut self, epoch: u64, result: Result<CapturePipeline, DeviceError>) {
        let expected = matches!(&self.phase, Phase::Acquiring(s) if s.epoch == epoch);
        if !expected {
            match result {
                Ok(mut capture) => {
                    debug!("Releasing microphone granted to a cancelled start");
                    capture.release();
                }
                Err(e) => debug!("Ignoring microphone failure of a cancelled start: {}", e),
            }
            return;
        }

        let mut capture = match result {
            Ok(capture) => capture,
            Err(e) => {
                error!("Failed to acquire microphone: {}", e);
                self.fail(SessionError::Device(e), true);
                return;
            }
        };

        let Phase::Acquiring(mut session) = self.take_phase() else {
            return;
        };

        if let Some(events) = capture.subscribe() {
            session.forwarders.push(self.forward_capture(epoch, events));
        }
        session.meter = Some(self.spawn_meter(capture.level_tap()));
        session.recorder = self.open_recorder(&session.id);
        session.started_at = Some(Instant::now());
        session.capture = Some(capture);

        info!("Voice session {} streaming", session.id);
        self.transition(SessionState::Connecting, Phase::Streaming(session));
    }

    // ------------------------------------------------------------------
    // Event sources
    // ------------------------------------------------------------------

    fn on_link_event(&mut self, epoch: u64, event: LinkEvent) {
        let current = matches!(
            &self.phase,
            Phase::Acquiring(s) | Phase::Streaming(s) if s.epoch == epoch
        );
        if !current {
            trace!("Ignoring link event of a finished session");
            return;
        }

        match event {
            LinkEvent::Message(message) => {
                if let Phase::Acquiring(session) | Phase::Streaming(session) = &mut self.phase {
                    Self::dispatch(session, &mut self.stats, &self.notifier, message);
                }
            }
            LinkEvent::Closed => {
                info!("Voice link closed by remote");
                self.teardown();
            }
            LinkEvent::Error(e) => {
                error!("Voice link failed: {}", e);
                self.fail(SessionError::Transport(e), false);
            }
        }
    }

    fn dispatch(session: &mut Session, stats: &mut SessionStats, notifier: &Notifier, message: WireMessage) {
        match protocol::decode(message) {
            Ok(Inbound::Control(ControlEvent::Transcript { content })) => {
                stats.transcripts += 1;
                notifier.emit(SessionEvent::Message {
                    kind: MessageKind::User,
                    text: content,
                });
            }
            Ok(Inbound::Control(ControlEvent::Response { content })) => {
                stats.responses += 1;
                notifier.emit(SessionEvent::Message {
                    kind: MessageKind::Assistant,
                    text: content,
                });

                if let Some(started_at) = session.started_at.take() {
                    let latency = started_at.elapsed().as_secs_f64();
                    info!("Response latency: {:.2}s", latency);
                    stats.last_latency_secs = Some(latency);
                    notifier.emit(SessionEvent::LatencyMeasured(latency));
                }
            }
            Ok(Inbound::Audio(payload)) => {
                stats.payloads_received += 1;
                debug!("Received {} bytes of assistant audio", payload.len());
                session.playback.play(payload);
            }
            Err(e) => {
                stats.protocol_errors += 1;
                warn!("Dropping malformed message: {}", e);
                notifier.emit(SessionEvent::Fault(SessionError::Protocol(e)));
            }
        }
    }

    fn on_capture_event(&mut self, epoch: u64, event: CaptureEvent) {
        let current = matches!(&self.phase, Phase::Streaming(s) if s.epoch == epoch);

        match event {
            CaptureEvent::Chunk(chunk) => {
                if !current {
                    trace!("Dropping chunk {} captured outside of streaming", chunk.sequence);
                    return;
                }
                if let Phase::Streaming(session) = &mut self.phase {
                    Self::forward_chunk(session, &mut self.stats, chunk);
                }
            }
            CaptureEvent::Failed(e) => {
                if !current {
                    debug!("Ignoring microphone failure of a finished session: {}", e);
                    return;
                }
                error!("Microphone failed mid-stream: {}", e);
                self.fail(SessionError::Device(e), true);
            }
        }
    }

    fn forward_chunk(session: &mut Session, stats: &mut SessionStats, chunk: AudioChunk) {
        stats.chunks_captured += 1;

        match session.transport.send(protocol::encode_chunk(&chunk)) {
            SendOutcome::Sent => {
                stats.chunks_sent += 1;
                if session.started_at.is_none() {
                    session.started_at = Some(Instant::now());
                }

                let failed = match &mut session.recorder {
                    Some(recorder) => recorder.write_chunk(&chunk).err(),
                    None => None,
                };
                if let Some(e) = failed {
                    warn!("Recording disabled for this session: {:#}", e);
                    session.recorder = None;
                }
            }
            outcome => {
                stats.chunks_dropped += 1;
                debug!("Dropped chunk {}: {:?}", chunk.sequence, outcome);
            }
        }
    }

    fn on_playback_failed(&mut self, epoch: u64, error: PlaybackError) {
        let current = match &self.phase {
            Phase::Acquiring(s) | Phase::Streaming(s) => s.epoch == epoch,
            _ => false,
        };
        if current {
            self.stats.playback_errors += 1;
        } else {
            debug!("Playback of a finished session failed");
        }
        self.notifier.emit(SessionEvent::Fault(SessionError::Playback(error)));
    }

    // ------------------------------------------------------------------
    // Transitions and teardown
    // ------------------------------------------------------------------

    fn take_phase(&mut self) -> Phase {
        std::mem::replace(&mut self.phase, Phase::Disconnected)
    }

    fn transition(&mut self, from: SessionState, phase: Phase) {
        self.phase = phase;
        let to = self.phase.state();
        self.stats.state = to;

        if from != to {
            info!("Session state: {:?} -> {:?}", from, to);
            self.state_tx.send_replace(to);
            self.notifier.emit(SessionEvent::StatusChanged(to));
        }
    }

    /// Tear down whatever the current phase holds.
    fn teardown(&mut self) {
        let from = self.release();
        self.transition(from, Phase::Disconnected);
    }

    /// Tear down, then report `error` once nothing is held anymore.
    ///
    /// Start failures (`announce`) also get a system message.
    fn fail(&mut self, error: SessionError, announce: bool) {
        let from = self.release();

        self.notifier.emit(SessionEvent::Fault(error.clone()));
        if announce {
            self.notifier.emit(SessionEvent::Message {
                kind: MessageKind::System,
                text: format!("Error: {}", error),
            });
        }

        self.transition(from, Phase::Disconnected);
    }

    /// Release everything the current phase holds, returning its state.
    fn release(&mut self) -> SessionState {
        let previous = self.take_phase();
        let from = previous.state();

        // Anything still in flight now belongs to a cancelled session
        self.epoch += 1;

        match previous {
            Phase::Acquiring(session) | Phase::Streaming(session) => self.close_session(session),
            Phase::Connecting { id, .. } => debug!("Cancelling pending handshake of {}", id),
            Phase::Disconnected => {}
        }
        if let Some(clock) = self.clock.take() {
            self.stats.duration_secs = clock.elapsed().as_secs_f64();
        }

        from
    }

    fn close_session(&mut self, mut session: Session) {
        // Stop producing audio before disconnecting
        if let Some(mut capture) = session.capture.take() {
            capture.release();
        }
        if let Some(meter) = session.meter.take() {
            meter.stop();
        }
        session.transport.close();

        for forwarder in session.forwarders.drain(..) {
            forwarder.abort();
        }

        if let Some(recorder) = session.recorder.take() {
            if let Err(e) = recorder.finish() {
                warn!("Failed to finish recording: {:#}", e);
            }
        }

        info!(
            "Voice session {} ended (captured={}, sent={}, dropped={}, responses={})",
            session.id,
            self.stats.chunks_captured,
            self.stats.chunks_sent,
            self.stats.chunks_dropped,
            self.stats.responses
        );
    }

    // ------------------------------------------------------------------
    // Wiring
    // ------------------------------------------------------------------

    fn forward_link(&self, epoch: u64, mut events: mpsc::UnboundedReceiver<LinkEvent>) -> JoinHandle<()> {
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let terminal = !matches!(event, LinkEvent::Message(_));
                if inbox.send(Input::Link { epoch, event }).is_err() || terminal {
                    return;
                }
            }
            // Link dropped without a close event
            let _ = inbox.send(Input::Link {
                epoch,
                event: LinkEvent::Closed,
            });
        })
    }

    fn forward_capture(&self, epoch: u64, mut events: mpsc::Receiver<CaptureEvent>) -> JoinHandle<()> {
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let terminal = matches!(event, CaptureEvent::Failed(_));
                if inbox.send(Input::Capture { epoch, event }).is_err() || terminal {
                    return;
                }
            }
            // The device stopped without saying why
            let _ = inbox.send(Input::Capture {
                epoch,
                event: CaptureEvent::Failed(DeviceError::Disconnected(
                    "Capture stream ended unexpectedly".to_string(),
                )),
            });
        })
    }

    fn playback_pipeline(&self, epoch: u64) -> PlaybackPipeline {
        let inbox = self.inbox_tx.clone();
        let report: PlaybackReporter = Arc::new(move |error: PlaybackError| {
            let _ = inbox.send(Input::PlaybackFailed { epoch, error });
        });

        PlaybackPipeline::new(
            PayloadDecoder::new(self.config.raw_pcm_sample_rate),
            Arc::clone(&self.deps.output),
            report,
        )
    }

    fn spawn_meter(&self, tap: LevelTap) -> LevelMeter {
        let notifier = self.notifier.clone();
        LevelMeter::spawn(tap, self.config.level_interval, move |percentage| {
            notifier.emit(SessionEvent::LevelChanged(percentage));
        })
    }

    fn open_recorder(&self, session_id: &str) -> Option<UtteranceRecorder> {
        let dir = self.config.recording_dir.as_deref()?;
        match UtteranceRecorder::create(dir, session_id, self.config.sample_rate) {
            Ok(recorder) => Some(recorder),
            Err(e) => {
                warn!("Recording unavailable: {:#}", e);
                None
            }
        }
    }

    fn snapshot(&self) -> SessionStats {
        let mut stats = self.stats.clone();
        if let Some(clock) = self.clock {
            stats.duration_secs = clock.elapsed().as_secs_f64();
        }
        stats
    }
}
