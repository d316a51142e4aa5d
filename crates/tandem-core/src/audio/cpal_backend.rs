//! CPAL audio backend
//!
//! Brings up a single stereo output stream whose callback owns the
//! [`AudioEngine`] and renders the master mix directly into the device
//! buffer.
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Control domain  │───send()───────────►│   Command Queue     │
//! │ (UI + monitor)   │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         │                                           │ pop()
//!         │ Relaxed atomics                           ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │   DeckAtomics    │◄────────────────────│  CPAL Audio Thread  │
//! │   (lock-free)    │     sync writes     │  (owns AudioEngine) │
//! └──────────────────┘                     └─────────────────────┘
//! ```
//!
//! The callback state sits behind a mutex only because cpal requires the
//! closure to be `Send`; the stream callback is the sole locker, so the
//! lock is always uncontended.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE};
use super::device::{default_output_device, find_device_by_name};
use super::error::{AudioError, AudioResult};
use crate::engine::{AudioEngine, MAX_BUFFER_SIZE};
use crate::session::{create_session, Session};
use crate::types::StereoBuffer;

/// Keeps the output stream alive; drop to stop audio
pub struct AudioHandle {
    _stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Buffer size in frames, as negotiated with the device
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Everything a host needs after the audio system is up
pub struct AudioSystemResult {
    /// Keeps the stream alive
    pub handle: AudioHandle,
    /// Control surface wired to the running engine
    pub session: Session,
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub latency_ms: f32,
}

/// Start the audio system: pick a device, build the engine, open the stream
///
/// The negotiated device rate becomes the engine rate, so tracks loaded
/// through the returned session decode straight to it.
pub fn start_audio_system(config: &AudioConfig) -> AudioResult<AudioSystemResult> {
    let device = match &config.output_device {
        Some(name) => find_device_by_name(name)?,
        None => default_output_device()?,
    };

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let (supported_config, buffer_size) = get_output_config(&device, config)?;
    let sample_rate = supported_config.sample_rate().0;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;
    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        latency_ms
    );

    let (session, mut engine) = create_session(sample_rate);
    engine.prepare(sample_rate, buffer_size as usize);

    let state = Arc::new(Mutex::new(CallbackState::new(engine)));
    let stream = build_output_stream(&device, &stream_config, state)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("Audio stream started");

    Ok(AudioSystemResult {
        handle: AudioHandle {
            _stream: stream,
            sample_rate,
            buffer_size,
        },
        session,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// Callback-owned state: the engine plus its pre-allocated output buffer
struct CallbackState {
    engine: AudioEngine,
    output: StereoBuffer,
}

impl CallbackState {
    fn new(engine: AudioEngine) -> Self {
        Self {
            engine,
            output: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    fn process(&mut self, n_frames: usize) {
        self.output.set_len_from_capacity(n_frames.min(MAX_BUFFER_SIZE));
        self.engine.process(&mut self.output);
    }
}

/// Pick the best supported output configuration for a device
///
/// The stream callback writes f32, so only f32 configurations qualify;
/// within those, prefers stereo and the requested sample rate, falling
/// back down that list. Returns the chosen config plus the buffer size to
/// request.
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let f32_configs: Vec<&cpal::SupportedStreamConfigRange> = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    let target_sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);

    let best_config = f32_configs
        .iter()
        .filter(|c| c.channels() >= 2)
        .find(|c| {
            target_sample_rate >= c.min_sample_rate().0
                && target_sample_rate <= c.max_sample_rate().0
        })
        .or_else(|| f32_configs.iter().find(|c| c.channels() >= 2))
        .or_else(|| f32_configs.first())
        .copied()
        .ok_or_else(|| {
            AudioError::ConfigError("No f32 output configuration available".to_string())
        })?;

    let sample_rate = if target_sample_rate >= best_config.min_sample_rate().0
        && target_sample_rate <= best_config.max_sample_rate().0
    {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let stream_config = best_config.clone().with_sample_rate(sample_rate);

    let buffer_size = match config.buffer_size {
        BufferSize::Default => DEFAULT_BUFFER_SIZE,
        BufferSize::Fixed(frames) => frames.clamp(64, MAX_BUFFER_SIZE as u32),
    };

    Ok((stream_config, buffer_size))
}

/// Build the output stream
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    state: Arc<Mutex<CallbackState>>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut state = state.lock().unwrap();
                let n_frames = data.len() / channels;

                state.process(n_frames);

                let samples = state.output.as_slice();
                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    if i < samples.len() {
                        let sample = samples[i];
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    } else {
                        for ch in frame.iter_mut() {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}
