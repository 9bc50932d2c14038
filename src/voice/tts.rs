//! Text-to-speech through the speech service REST API

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::playback;
use crate::config::AvatarConfig;
use crate::sdk::Synthesizer;
use crate::speech::{SpeechChunk, ssml};
use crate::{Error, Result};

/// Audio format requested from the service
const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Synthesizes SSML with the speech service and plays it locally
pub struct SpeechServiceSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    subscription_key: SecretString,
    voice: String,
    /// Cancelled by `stop_speaking`, then replaced
    stopped: Mutex<CancellationToken>,
    /// Held by the blocking player until it returns
    player: Arc<Mutex<()>>,
}

impl SpeechServiceSynthesizer {
    /// Create a synthesizer for the configured region and voice
    ///
    /// `endpoint` overrides the regional default URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoad` if no subscription key is configured
    pub fn new(config: &AvatarConfig, endpoint: Option<String>) -> Result<Self> {
        let subscription_key = config.subscription_key.clone().ok_or_else(|| {
            Error::ConfigLoad("a speech subscription key is required for TTS".to_string())
        })?;

        let endpoint = endpoint.unwrap_or_else(|| {
            format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                config.region
            )
        });

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            subscription_key,
            voice: config.voice.clone(),
            stopped: Mutex::new(CancellationToken::new()),
            player: Arc::new(Mutex::new(())),
        })
    }

    /// Fetch MP3 audio for one chunk
    ///
    /// # Errors
    ///
    /// Returns `Synthesis` if the service rejects the request
    pub async fn synthesize(&self, chunk: &SpeechChunk) -> Result<Vec<u8>> {
        let body = ssml::render(chunk, &self.voice);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", self.subscription_key.expose_secret())
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;
        Ok(audio.to_vec())
    }

    /// Token for one chunk, cancelled by the caller or by `stop_speaking`
    async fn chunk_token(&self, cancel: &CancellationToken) -> CancellationToken {
        let token = cancel.child_token();
        let stopped = self.stopped.lock().await.clone();
        let relay = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = stopped.cancelled() => relay.cancel(),
                () = relay.cancelled() => {}
            }
        });
        token
    }

    /// Run a blocking player once the previous one has returned
    ///
    /// The player polls its stop flag, which is raised when `token` is
    /// cancelled. The player lock travels with the blocking task, so a
    /// caller that gives up early still leaves the device busy until the
    /// player has actually exited.
    async fn play_exclusive<F>(&self, token: &CancellationToken, player: F) -> Result<()>
    where
        F: FnOnce(&AtomicBool) -> Result<()> + Send + 'static,
    {
        let device = Arc::clone(&self.player).lock_owned().await;
        if token.is_cancelled() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let watcher = {
            let stop = Arc::clone(&stop);
            let token = token.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                stop.store(true, Ordering::Relaxed);
            })
        };

        let played = tokio::task::spawn_blocking(move || {
            let _device = device;
            player(stop.as_ref())
        })
        .await;
        watcher.abort();

        played.map_err(|e| Error::Audio(e.to_string()))?
    }
}

#[async_trait]
impl Synthesizer for SpeechServiceSynthesizer {
    async fn speak(&self, chunk: &SpeechChunk, cancel: CancellationToken) -> Result<()> {
        let token = self.chunk_token(&cancel).await;
        // Dropping this future mid-playback still halts the player
        let _halt = token.clone().drop_guard();

        let audio = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(()),
            audio = self.synthesize(chunk) => audio?,
        };

        self.play_exclusive(&token, move |stop| playback::play_mp3(&audio, stop))
            .await
    }

    async fn stop_speaking(&self) {
        mem::replace(&mut *self.stopped.lock().await, CancellationToken::new()).cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config() -> AvatarConfig {
        AvatarConfig {
            subscription_key: Some(SecretString::from("test-key")),
            ..AvatarConfig::default()
        }
    }

    #[test]
    fn requires_subscription_key() {
        let result = SpeechServiceSynthesizer::new(&AvatarConfig::default(), None);
        assert!(matches!(result, Err(Error::ConfigLoad(_))));
    }

    #[test]
    fn regional_endpoint_by_default() {
        let synth = SpeechServiceSynthesizer::new(&config(), None).unwrap();
        assert_eq!(
            synth.endpoint,
            "https://eastus2.tts.speech.microsoft.com/cognitiveservices/v1"
        );
    }

    #[tokio::test]
    async fn posts_ssml_with_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tts"))
            .and(header("Ocp-Apim-Subscription-Key", "test-key"))
            .and(header("X-Microsoft-OutputFormat", OUTPUT_FORMAT))
            .and(body_string_contains("Hello there.<break time='300ms' />"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
            .expect(1)
            .mount(&server)
            .await;

        let synth =
            SpeechServiceSynthesizer::new(&config(), Some(format!("{}/tts", server.uri()))).unwrap();
        let chunk = SpeechChunk::new("Hello there.").with_ending_silence(300);
        assert_eq!(synth.synthesize(&chunk).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn rejected_request_is_synthesis_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let synth = SpeechServiceSynthesizer::new(&config(), Some(server.uri())).unwrap();
        let err = synth.synthesize(&SpeechChunk::new("Hi.")).await.unwrap_err();
        assert!(matches!(err, Error::Synthesis(msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn stop_speaking_halts_every_chunk_in_flight() {
        let synth = SpeechServiceSynthesizer::new(&config(), None).unwrap();
        let first = synth.chunk_token(&CancellationToken::new()).await;
        let second = synth.chunk_token(&CancellationToken::new()).await;

        synth.stop_speaking().await;
        let halted = tokio::time::timeout(Duration::from_secs(1), async {
            first.cancelled().await;
            second.cancelled().await;
        })
        .await;
        assert!(halted.is_ok());

        // Chunks started afterwards are unaffected
        let later = synth.chunk_token(&CancellationToken::new()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!later.is_cancelled());
    }

    #[tokio::test]
    async fn next_chunk_waits_for_cancelled_player_to_exit() {
        let synth = Arc::new(SpeechServiceSynthesizer::new(&config(), None).unwrap());
        let started = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(AtomicBool::new(false));
        let first = CancellationToken::new();

        let abandoned = {
            let synth = Arc::clone(&synth);
            let first = first.clone();
            let started = Arc::clone(&started);
            let exited = Arc::clone(&exited);
            tokio::spawn(async move {
                synth
                    .play_exclusive(&first, move |stop| {
                        started.store(true, Ordering::SeqCst);
                        while !stop.load(Ordering::Relaxed) {
                            std::thread::sleep(Duration::from_millis(5));
                        }
                        // Device drain after the stop flag is seen
                        std::thread::sleep(Duration::from_millis(50));
                        exited.store(true, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            })
        };
        while !started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Cancel and walk away without waiting for the player
        first.cancel();
        abandoned.abort();

        let overlapped = Arc::new(AtomicBool::new(true));
        let seen = Arc::clone(&overlapped);
        let exited_before = Arc::clone(&exited);
        synth
            .play_exclusive(&CancellationToken::new(), move |_| {
                seen.store(!exited_before.load(Ordering::SeqCst), Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancelled_before_audio_returns_quietly() {
        let synth = SpeechServiceSynthesizer::new(&config(), Some("http://127.0.0.1:9".into())).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(synth.speak(&SpeechChunk::new("Hi."), cancel).await.is_ok());
    }
}
