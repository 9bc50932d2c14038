//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig, SupportedStreamConfigRange};

use crate::{Error, Result};

/// Sample rate of the synthesized audio
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// How often the blocking player checks for completion or interruption
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Decode MP3 bytes and play them on the default output device
///
/// Blocks until playback finishes or `stop` is set. Run it on a blocking
/// thread.
///
/// # Errors
///
/// Returns `Audio` if decoding fails or no output device is usable
pub fn play_mp3(mp3_data: &[u8], stop: &AtomicBool) -> Result<()> {
    let samples = decode_mp3(mp3_data)?;
    if samples.is_empty() || stop.load(Ordering::Relaxed) {
        return Ok(());
    }

    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;
    let config = output_config(&device)?;
    let channels = usize::from(config.channels);

    let sample_count = samples.len();
    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(pos).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        pos = (pos + 1).min(samples.len());
                    }
                    position.store(pos, Ordering::Relaxed);
                },
                |err| tracing::error!(error = %err, "audio playback error"),
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };
    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);

    while position.load(Ordering::Relaxed) < sample_count {
        if stop.load(Ordering::Relaxed) {
            tracing::debug!("playback interrupted");
            break;
        }
        if Instant::now() > deadline {
            tracing::warn!("playback did not finish in time");
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    drop(stream);
    tracing::trace!(samples = sample_count, "playback complete");
    Ok(())
}

/// Pick a mono (or failing that stereo) output config at the playback rate
fn output_config(device: &cpal::Device) -> Result<StreamConfig> {
    let supports_rate = |c: &SupportedStreamConfigRange| {
        c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
            && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
    };

    let configs: Vec<SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .collect();

    let supported = configs
        .iter()
        .find(|c| c.channels() == 1 && supports_rate(c))
        .or_else(|| configs.iter().find(|c| c.channels() == 2 && supports_rate(c)))
        .cloned()
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    Ok(supported
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config())
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) if frame.channels == 2 => {
                samples.extend(frame.data.chunks(2).map(|pair| {
                    let left = f32::from(pair[0]) / 32768.0;
                    let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                    f32::midpoint(left, right)
                }));
            }
            Ok(frame) => samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0)),
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
