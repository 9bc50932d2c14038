//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use beacon_avatar::{
    AvatarConfig, AvatarSdk, ChatClient, Collaborators, ConfigProvider, Error, Result,
    SessionEvent, SessionHandle, SessionSettings, SessionSnapshot, SpeechChunk, Synthesizer,
};

/// Config provider returning defaults, or failing on demand
#[derive(Default)]
pub struct StaticConfig {
    pub fail: AtomicBool,
    pub loads: AtomicUsize,
}

#[async_trait]
impl ConfigProvider for StaticConfig {
    async fn load(&self) -> Result<AvatarConfig> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::ConfigLoad("config endpoint unreachable".to_string()));
        }
        Ok(AvatarConfig {
            system_prompt: "You are a test assistant.".to_string(),
            ..AvatarConfig::default()
        })
    }
}

/// Avatar SDK double with a configurable handshake
#[derive(Default)]
pub struct MockSdk {
    pub start_delay: Duration,
    pub unavailable: AtomicBool,
    pub fail_start: AtomicBool,
    pub deny_microphone: AtomicBool,
    pub starts: AtomicUsize,
    pub closes: AtomicUsize,
    pub listening: AtomicBool,
    /// Whether a session is up and not yet closed
    pub open: AtomicBool,
}

impl MockSdk {
    pub fn with_start_delay(start_delay: Duration) -> Self {
        Self {
            start_delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl AvatarSdk for MockSdk {
    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    async fn start_session(&self, _config: &AvatarConfig, _cancel: CancellationToken) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.start_delay).await;
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::SessionEstablish("ICE negotiation failed".to_string()));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }

    async fn start_listening(&self, _locales: &[String]) -> Result<()> {
        if self.deny_microphone.load(Ordering::SeqCst) {
            return Err(Error::MicrophonePermissionDenied("denied".to_string()));
        }
        self.listening.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_listening(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }
}

/// Decrements the in-flight count even if the speak future is dropped
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Synthesizer double that records what it was asked to say
pub struct MockSynth {
    pub delay: Duration,
    pub fail_on: Option<String>,
    pub spoken: Mutex<Vec<String>>,
    pub silences: Mutex<Vec<u32>>,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub stops: AtomicUsize,
}

impl MockSynth {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_on: None,
            spoken: Mutex::new(Vec::new()),
            silences: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(delay: Duration, text: &str) -> Self {
        Self {
            fail_on: Some(text.to_string()),
            ..Self::new(delay)
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    /// Ending silence of each spoken chunk, in order
    pub fn silences(&self) -> Vec<u32> {
        self.silences.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynth {
    async fn speak(&self, chunk: &SpeechChunk, cancel: CancellationToken) -> Result<()> {
        self.spoken.lock().unwrap().push(chunk.text.clone());
        self.silences.lock().unwrap().push(chunk.ending_silence_ms);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveGuard(&self.active);

        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(self.delay) => {}
        }

        if self.fail_on.as_deref() == Some(chunk.text.as_str()) {
            return Err(Error::Synthesis("voice unavailable".to_string()));
        }
        Ok(())
    }

    async fn stop_speaking(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

type Responder = Box<dyn Fn(&str) -> (Duration, Result<String>) + Send + Sync>;

/// Chat agent double with a scripted responder
pub struct MockChat {
    pub calls: Mutex<Vec<(String, String)>>,
    respond: Responder,
}

impl MockChat {
    pub fn new(respond: impl Fn(&str) -> (Duration, Result<String>) + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    /// Reply with `reply` to everything after `delay`
    pub fn fixed(delay: Duration, reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| (delay, Ok(reply.clone())))
    }

    pub fn messages(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }
}

#[async_trait]
impl ChatClient for MockChat {
    async fn ask(&self, session_id: &str, message: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((session_id.to_string(), message.to_string()));
        let (delay, reply) = (self.respond)(message);
        tokio::time::sleep(delay).await;
        reply
    }
}

/// A running driver wired to test doubles
pub struct Harness {
    pub handle: SessionHandle,
    pub events: broadcast::Receiver<SessionEvent>,
    pub config: Arc<StaticConfig>,
    pub sdk: Arc<MockSdk>,
    pub synth: Arc<MockSynth>,
    pub chat: Arc<MockChat>,
}

impl Harness {
    pub fn spawn(sdk: MockSdk, synth: MockSynth, chat: MockChat) -> Self {
        Self::spawn_with(sdk, synth, chat, test_settings())
    }

    pub fn spawn_with(
        sdk: MockSdk,
        synth: MockSynth,
        chat: MockChat,
        settings: SessionSettings,
    ) -> Self {
        let config = Arc::new(StaticConfig::default());
        let sdk = Arc::new(sdk);
        let synth = Arc::new(synth);
        let chat = Arc::new(chat);

        let (handle, _driver) = SessionHandle::spawn(
            Collaborators {
                config: config.clone(),
                sdk: sdk.clone(),
                synthesizer: synth.clone(),
                chat: chat.clone(),
            },
            settings,
        );
        let events = handle.subscribe();

        Self {
            handle,
            events,
            config,
            sdk,
            synth,
            chat,
        }
    }

    /// Poll snapshots until `done` holds
    pub async fn wait_for(&self, done: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        for _ in 0..2000 {
            let snapshot = self.handle.snapshot().await.expect("driver alive");
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached: {:?}", self.handle.snapshot().await);
    }

    /// Events received so far
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Session settings with display alignment and a short cooldown
pub fn test_settings() -> SessionSettings {
    SessionSettings {
        session_id: "test-session".to_string(),
        reconnect_cooldown: Duration::from_millis(500),
        ..SessionSettings::default()
    }
}
