//! Session driver task and its handle

use std::mem;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{
    Controls, LivenessMonitor, QueryBuffer, Session, SessionEvent, SessionState, Transcript,
    Utterance,
};
use crate::config::{AvatarConfig, SessionSettings};
use crate::sdk::{AvatarSdk, ChatClient, ConfigProvider, Synthesizer};
use crate::speech::{Advance, Playback, SpeechChunk, SpeechQueue, segment};
use crate::{Error, Result};

/// Capacity of the event broadcast channel
const EVENT_CAPACITY: usize = 256;

/// External services the driver talks to
#[derive(Clone)]
pub struct Collaborators {
    /// Avatar settings source
    pub config: Arc<dyn ConfigProvider>,
    /// Speech/avatar SDK
    pub sdk: Arc<dyn AvatarSdk>,
    /// Speech output
    pub synthesizer: Arc<dyn Synthesizer>,
    /// Remote chat agent
    pub chat: Arc<dyn ChatClient>,
}

/// Point-in-time view of the driver's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Lifecycle state
    pub state: SessionState,
    /// Whether the user closed the session
    pub user_closed: bool,
    /// Whether the microphone is open
    pub listening: bool,
    /// Whether a chunk is being spoken
    pub speaking: bool,
    /// Chunks waiting to be spoken
    pub pending_speech: usize,
    /// Queries waiting for an active session
    pub buffered_queries: usize,
    /// Whether a hang reconnect is in progress
    pub reconnecting: bool,
    /// Conversation so far
    pub transcript: Vec<Utterance>,
}

enum Command {
    Start,
    Stop,
    Submit(String),
    ToggleMicrophone,
    StopSpeaking,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
    Established {
        attempt: u64,
        result: Result<Arc<AvatarConfig>>,
    },
    ChatReply {
        turn: u64,
        result: Result<String>,
    },
    SpeechDone {
        generation: u64,
        result: Result<()>,
    },
    MicrophoneStarted(Result<()>),
    Reconnect,
}

/// A user query waiting for the chat agent
struct Query {
    turn: u64,
    text: String,
    /// Cancelled when the session that sent it stops
    cancel: CancellationToken,
}

/// Cloneable handle to a running session driver
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Spawn a driver on the current tokio runtime
    #[must_use]
    pub fn spawn(collaborators: Collaborators, settings: SessionSettings) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let driver = Driver::new(collaborators, settings, tx.clone(), rx, events.clone());
        let task = tokio::spawn(driver.run());
        (Self { commands: tx, events }, task)
    }

    /// Subscribe to session events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Request a new session
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the driver has shut down
    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    /// End the session at the user's request
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the driver has shut down
    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Submit a typed user query
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the driver has shut down
    pub fn submit(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::Submit(text.into()))
    }

    /// Deliver text recognized from the microphone
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the driver has shut down
    pub fn recognized(&self, text: impl Into<String>) -> Result<()> {
        self.submit(text)
    }

    /// Open or close the microphone
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the driver has shut down
    pub fn toggle_microphone(&self) -> Result<()> {
        self.send(Command::ToggleMicrophone)
    }

    /// Cut off the avatar mid-sentence and drop queued speech
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the driver has shut down
    pub fn stop_speaking(&self) -> Result<()> {
        self.send(Command::StopSpeaking)
    }

    /// Fetch the driver's current state
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the driver has shut down
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Release the session and stop the driver
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the driver has already shut down
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Closed)
    }
}

struct Driver {
    collaborators: Collaborators,
    settings: SessionSettings,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<SessionEvent>,
    queries: mpsc::UnboundedSender<Query>,

    session: Session,
    buffer: QueryBuffer,
    queue: SpeechQueue,
    liveness: LivenessMonitor,
    transcript: Transcript,

    config: Option<Arc<AvatarConfig>>,
    attempt: u64,
    attempt_cancel: CancellationToken,
    speech_cancel: CancellationToken,
    turn: u64,
    reply_turn: u64,
    /// Last turn sent before the most recent stop
    settled_turn: u64,
    listening: bool,
    mic_pending: bool,
    resume_sentence: Option<String>,
    controls: Option<Controls>,
}

impl Driver {
    fn new(
        collaborators: Collaborators,
        settings: SessionSettings,
        commands_tx: mpsc::UnboundedSender<Command>,
        commands: mpsc::UnboundedReceiver<Command>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let liveness = LivenessMonitor::new(settings.inactivity_timeout);
        let (queries, pending) = mpsc::unbounded_channel();
        tokio::spawn(answer_queries(
            Arc::clone(&collaborators.chat),
            settings.session_id.clone(),
            pending,
            commands_tx.clone(),
        ));

        Self {
            collaborators,
            settings,
            commands_tx,
            commands,
            events,
            queries,
            session: Session::new(),
            buffer: QueryBuffer::new(),
            queue: SpeechQueue::new(),
            liveness,
            transcript: Transcript::default(),
            config: None,
            attempt: 0,
            attempt_cancel: CancellationToken::new(),
            speech_cancel: CancellationToken::new(),
            turn: 0,
            reply_turn: 0,
            settled_turn: 0,
            listening: false,
            mic_pending: false,
            resume_sentence: None,
            controls: None,
        }
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.settings.hang_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(session_id = %self.settings.session_id, "session driver running");
        self.refresh_controls();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle(command).await,
                },
                _ = ticker.tick() => self.check_hung().await,
            }
        }

        self.stop(true).await;
        tracing::debug!("session driver stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(true).await,
            Command::Submit(text) => self.submit(&text),
            Command::ToggleMicrophone => self.toggle_microphone().await,
            Command::StopSpeaking => self.cancel_speech().await,
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Established { attempt, result } => self.on_established(attempt, result).await,
            Command::ChatReply { turn, result } => self.on_chat_reply(turn, result).await,
            Command::SpeechDone { generation, result } => self.on_speech_done(generation, result),
            Command::MicrophoneStarted(result) => self.on_microphone_started(result).await,
            Command::Reconnect => self.reconnect(),
            Command::Shutdown => {}
        }
    }

    // ---- Lifecycle ----

    fn start(&mut self) {
        if let Err(e) = self.session.begin_start() {
            tracing::warn!(error = %e, "ignoring start request");
            return;
        }

        self.attempt += 1;
        let attempt = self.attempt;
        let cancel = CancellationToken::new();
        self.attempt_cancel = cancel.clone();

        tracing::info!(attempt, "starting avatar session");
        self.publish_state();
        self.emit(SessionEvent::System {
            message: "Session starting...".to_string(),
        });

        let collaborators = self.collaborators.clone();
        let loaded = self.config.clone();
        let commands = self.commands_tx.clone();
        tokio::spawn(async move {
            let result = establish(&collaborators, loaded, cancel).await;
            let _ = commands.send(Command::Established { attempt, result });
        });
    }

    async fn on_established(&mut self, attempt: u64, result: Result<Arc<AvatarConfig>>) {
        if attempt != self.attempt || self.session.state() != SessionState::Starting {
            // The SDK is shared with any newer attempt; close only when idle
            if result.is_ok() && self.session.state() == SessionState::Idle {
                tracing::debug!(attempt, "closing avatar session that came up after stop");
                self.collaborators.sdk.close().await;
            } else {
                tracing::debug!(attempt, "ignoring superseded start attempt");
            }
            return;
        }

        let config = match result {
            Ok(config) => config,
            Err(e) => {
                self.surface(&e);
                if let Err(e) = self.session.fail_start() {
                    tracing::warn!(error = %e, "unexpected state after failed start");
                }
                self.publish_state();
                return;
            }
        };

        if self.transcript.seed(&config.system_prompt) {
            tracing::debug!("transcript initialized with system prompt");
        }
        self.config = Some(config);

        if let Err(e) = self.session.activate() {
            tracing::warn!(error = %e, "failed to activate session");
            return;
        }
        tracing::info!(attempt, "avatar session active");
        self.publish_state();

        if let Some(text) = self.resume_sentence.take() {
            tracing::debug!("repeating sentence interrupted by reconnect");
            let display = text.trim().to_string();
            if let Some(playback) = self.queue.enqueue(self.reply_turn, SpeechChunk::new(text), display) {
                self.play(playback, false);
            }
        }

        let queued = self.buffer.flush();
        if !queued.is_empty() {
            tracing::info!(count = queued.len(), "sending queries buffered while starting");
        }
        for query in queued {
            self.send_query(query);
        }
    }

    async fn stop(&mut self, user_requested: bool) {
        if user_requested {
            self.session.mark_user_closed();
            self.resume_sentence = None;
        }

        if let Err(e) = self.session.begin_stop() {
            tracing::debug!(error = %e, "stop ignored");
            return;
        }

        tracing::info!(user_requested, "stopping avatar session");
        self.publish_state();

        self.attempt_cancel.cancel();
        self.settled_turn = self.turn;
        self.cancel_speech().await;
        if self.listening {
            self.collaborators.sdk.stop_listening().await;
            self.listening = false;
        }
        self.collaborators.sdk.close().await;
        if user_requested {
            self.buffer.clear();
        }

        if let Err(e) = self.session.finish_stop() {
            tracing::warn!(error = %e, "unexpected state while stopping");
        }
        self.publish_state();
    }

    async fn check_hung(&mut self) {
        if !self.liveness.check(&self.session, Instant::now()) {
            return;
        }

        tracing::warn!(
            timeout = ?self.settings.inactivity_timeout,
            "session seems inactive, reconnecting avatar"
        );
        if self.settings.repeat_sentence_after_reconnect {
            self.resume_sentence = self.queue.speaking_text().map(ToString::to_string);
        }
        self.stop(false).await;

        let commands = self.commands_tx.clone();
        let cooldown = self.settings.reconnect_cooldown;
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            let _ = commands.send(Command::Reconnect);
        });
    }

    fn reconnect(&mut self) {
        self.liveness.reconnected();
        if self.session.user_closed() {
            tracing::info!("session closed by user, not reconnecting");
            self.resume_sentence = None;
            return;
        }
        self.start();
    }

    // ---- Turns ----

    fn submit(&mut self, text: &str) {
        let query = text.trim();
        if query.is_empty() {
            return;
        }

        self.session.touch();
        if !self.session.is_active() {
            tracing::debug!(state = %self.session.state(), "session not active, queueing query");
            self.buffer.push(query);
            self.emit(SessionEvent::System {
                message: "Session starting, query queued...".to_string(),
            });
            return;
        }

        self.send_query(query.to_string());
    }

    fn send_query(&mut self, query: String) {
        self.turn += 1;
        let turn = self.turn;

        let utterance = self.transcript.push(Utterance::user(query.clone()));
        self.emit(SessionEvent::Transcript { utterance });
        tracing::debug!(turn, "sending query to agent");

        let query = Query {
            turn,
            text: query,
            cancel: self.attempt_cancel.clone(),
        };
        if self.queries.send(query).is_err() {
            tracing::warn!(turn, "chat worker is gone, query not sent");
        }
    }

    async fn on_chat_reply(&mut self, turn: u64, result: Result<String>) {
        if !self.session.is_active() || turn <= self.settled_turn {
            tracing::debug!(turn, "dropping reply for a stopped session");
            return;
        }

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                self.surface(&e);
                return;
            }
        };
        if reply.trim().is_empty() {
            tracing::debug!(turn, "agent returned an empty reply");
            return;
        }
        if turn < self.reply_turn {
            // Too late to speak, but the answer still belongs in the log
            tracing::debug!(
                turn,
                latest = self.reply_turn,
                "logging reply superseded by a newer turn"
            );
            let utterance = self.transcript.push(Utterance::assistant(reply.trim()));
            self.emit(SessionEvent::Transcript { utterance });
            return;
        }

        // A new turn silences whatever the previous one was still saying
        if turn > self.reply_turn {
            self.cancel_speech().await;
            self.reply_turn = turn;
        }
        self.session.touch();

        if !self.settings.align_display_with_speech {
            let utterance = self.transcript.push(Utterance::assistant(reply.clone()));
            self.emit(SessionEvent::Transcript { utterance });
        }

        let mut segments = segment(&reply).peekable();
        while let Some(next) = segments.next() {
            let mut chunk = next.chunk;
            if segments.peek().is_none() {
                chunk = chunk.with_ending_silence(self.settings.ending_silence_ms);
            }
            if let Some(playback) = self.queue.enqueue(turn, chunk, next.display) {
                self.play(playback, true);
            }
        }
        self.refresh_controls();
    }

    // ---- Speech ----

    fn play(&mut self, playback: Playback, record: bool) {
        self.session.touch();
        self.emit(SessionEvent::Caption {
            text: playback.display.clone(),
        });
        if record && self.settings.align_display_with_speech {
            let utterance = self
                .transcript
                .push(Utterance::assistant(playback.display.clone()));
            self.emit(SessionEvent::Transcript { utterance });
        }

        let synthesizer = Arc::clone(&self.collaborators.synthesizer);
        let cancel = self.speech_cancel.clone();
        let commands = self.commands_tx.clone();
        let generation = playback.generation;
        tracing::trace!(generation, text = %playback.chunk.text, "speaking chunk");

        tokio::spawn(async move {
            let result = tokio::select! {
                () = cancel.cancelled() => return,
                result = synthesizer.speak(&playback.chunk, cancel.clone()) => result,
            };
            let _ = commands.send(Command::SpeechDone { generation, result });
        });
    }

    fn on_speech_done(&mut self, generation: u64, result: Result<()>) {
        let advance = self.queue.complete(generation);
        if advance == Advance::Stale {
            tracing::trace!(generation, "ignoring completion of cancelled speech");
            return;
        }

        if let Err(e) = result {
            let e = classify(e, Error::Synthesis);
            tracing::warn!(error = %e, "speech synthesis failed, continuing with next chunk");
            self.emit(SessionEvent::System {
                message: e.user_message(),
            });
        }

        self.session.touch();
        if let Advance::Next(playback) = advance {
            self.play(playback, true);
        } else {
            tracing::debug!("speech queue drained");
        }
        self.refresh_controls();
    }

    async fn cancel_speech(&mut self) {
        let was_speaking = self.queue.stop_all();
        mem::replace(&mut self.speech_cancel, CancellationToken::new()).cancel();

        if was_speaking {
            tracing::debug!("cancelled in-flight speech");
            self.collaborators.synthesizer.stop_speaking().await;
        }
        self.refresh_controls();
    }

    // ---- Microphone ----

    async fn toggle_microphone(&mut self) {
        if !self.session.is_active() {
            tracing::debug!("microphone toggle ignored: session not active");
            return;
        }
        if self.mic_pending {
            return;
        }

        if self.listening {
            self.collaborators.sdk.stop_listening().await;
            self.listening = false;
            tracing::info!("microphone stopped");
            self.refresh_controls();
            return;
        }

        self.mic_pending = true;
        self.refresh_controls();

        let sdk = Arc::clone(&self.collaborators.sdk);
        let locales = self
            .config
            .as_ref()
            .map(|c| c.recognition_locales.clone())
            .unwrap_or_default();
        let commands = self.commands_tx.clone();
        tokio::spawn(async move {
            let result = sdk
                .start_listening(&locales)
                .await
                .map_err(|e| classify(e, Error::MicrophonePermissionDenied));
            let _ = commands.send(Command::MicrophoneStarted(result));
        });
    }

    async fn on_microphone_started(&mut self, result: Result<()>) {
        self.mic_pending = false;
        match result {
            Ok(()) if self.session.is_active() => {
                self.listening = true;
                tracing::info!("microphone listening");
            }
            Ok(()) => self.collaborators.sdk.stop_listening().await,
            Err(e) => self.surface(&e),
        }
        self.refresh_controls();
    }

    // ---- Publication ----

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish_state(&mut self) {
        self.emit(SessionEvent::StateChanged {
            state: self.session.state(),
        });
        self.refresh_controls();
    }

    fn refresh_controls(&mut self) {
        let controls = Controls::for_state(
            self.session.state(),
            self.listening,
            self.mic_pending,
            self.queue.is_speaking(),
        );
        if self.controls.as_ref() != Some(&controls) {
            self.controls = Some(controls.clone());
            self.emit(SessionEvent::Controls { controls });
        }
    }

    fn surface(&self, error: &Error) {
        let message = error.user_message();
        if error.is_setup_failure() {
            tracing::error!(error = %error, "session setup failed");
            self.emit(SessionEvent::Alert { message });
        } else {
            tracing::warn!(error = %error, "session error");
            self.emit(SessionEvent::System { message });
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.session.state(),
            user_closed: self.session.user_closed(),
            listening: self.listening,
            speaking: self.queue.is_speaking(),
            pending_speech: self.queue.pending(),
            buffered_queries: self.buffer.len(),
            reconnecting: self.liveness.is_reconnecting(),
            transcript: self.transcript.entries().to_vec(),
        }
    }
}

/// Load settings if needed and run the SDK handshake
async fn establish(
    collaborators: &Collaborators,
    loaded: Option<Arc<AvatarConfig>>,
    cancel: CancellationToken,
) -> Result<Arc<AvatarConfig>> {
    let config = match loaded {
        Some(config) => config,
        None => {
            let config = collaborators
                .config
                .load()
                .await
                .map_err(|e| classify(e, Error::ConfigLoad))?;
            config.validate()?;
            Arc::new(config)
        }
    };

    if !collaborators.sdk.is_available() {
        return Err(Error::SdkUnavailable("speech SDK is not loaded".to_string()));
    }

    let established = tokio::select! {
        () = cancel.cancelled() => Err(Error::SessionEstablish("start cancelled".to_string())),
        result = collaborators.sdk.start_session(&config, cancel.clone()) => {
            result.map_err(|e| classify(e, Error::SessionEstablish))
        }
    };
    established?;

    Ok(config)
}

/// Ask the agent one query at a time, in submission order
async fn answer_queries(
    chat: Arc<dyn ChatClient>,
    session_id: String,
    mut queries: mpsc::UnboundedReceiver<Query>,
    commands: mpsc::UnboundedSender<Command>,
) {
    while let Some(Query { turn, text, cancel }) = queries.recv().await {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(turn, "skipping query from a stopped session");
                continue;
            }
            result = chat.ask(&session_id, &text) => {
                result.map_err(|e| classify(e, Error::RemoteChat))
            }
        };
        if commands.send(Command::ChatReply { turn, result }).is_err() {
            break;
        }
    }
}

/// Wrap `error` as `kind` unless it already is one
fn classify(error: Error, kind: fn(String) -> Error) -> Error {
    if mem::discriminant(&error) == mem::discriminant(&kind(String::new())) {
        error
    } else {
        kind(error.to_string())
    }
}
