//! Track loading and sample access
//!
//! A [`Track`] is an immutable, fully decoded stereo PCM image of one audio
//! file, converted to the engine sample rate at load time. Decks read from it
//! at fractional positions (variable-speed playback); the track itself never
//! changes after construction, which is what makes the lock-free swap on
//! `load` safe.
//!
//! Decoding goes through Symphonia (probe, first audio track, packet loop);
//! sample rate conversion uses a windowed-sinc Rubato resampler. Both run in
//! the control domain with bounded time: an unreadable source fails fast.

use std::fs::File;
use std::path::{Path, PathBuf};

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::types::{Sample, StereoBuffer, StereoSample};

/// Errors that can occur while opening and decoding a source
#[derive(Debug, Error)]
pub enum LoadError {
    /// File not found or couldn't be opened
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Container or codec not recognized by the decoder
    #[error("unsupported or unreadable format: {0}")]
    UnsupportedFormat(String),

    /// The container had no decodable audio track
    #[error("no audio track found in source")]
    NoAudioTrack,

    /// Sample rate conversion to the engine rate failed
    #[error("sample rate conversion failed: {0}")]
    Resample(String),

    /// Decoding produced zero frames
    #[error("decoded stream was empty")]
    EmptyStream,
}

/// One loaded audio track: decoded stereo PCM at the engine sample rate
///
/// Owned by exactly one deck at a time through a `basedrop::Shared` handle;
/// replaced wholesale on the next load, with the displaced image retired on
/// the collector thread.
#[derive(Debug)]
pub struct Track {
    locator: String,
    samples: StereoBuffer,
    sample_rate: u32,
}

impl Track {
    /// Open and decode `path`, converting to `engine_rate`
    ///
    /// Synchronous and bounded: the whole track is decoded up front so the
    /// audio callback only ever does in-memory reads.
    pub fn load(path: &Path, engine_rate: u32) -> Result<Self, LoadError> {
        let (interleaved, source_rate, channels) = decode(path)?;
        if interleaved.is_empty() || channels == 0 {
            return Err(LoadError::EmptyStream);
        }

        let (left, right) = downmix_stereo(&interleaved, channels);

        let (left, right) = if source_rate != engine_rate {
            log::debug!(
                "Resampling {:?}: {}Hz -> {}Hz ({} frames)",
                path,
                source_rate,
                engine_rate,
                left.len()
            );
            resample_stereo(&left, &right, source_rate, engine_rate)?
        } else {
            (left, right)
        };

        if left.is_empty() {
            return Err(LoadError::EmptyStream);
        }

        log::info!(
            "Loaded {:?}: {:.1}s at {}Hz",
            path,
            left.len() as f64 / engine_rate as f64,
            engine_rate
        );

        Ok(Self {
            locator: path.to_string_lossy().into_owned(),
            samples: StereoBuffer::from_channels(&left, &right),
            sample_rate: engine_rate,
        })
    }

    /// Build a track from pre-decoded samples (generated content, tests)
    pub fn from_samples(
        samples: StereoBuffer,
        sample_rate: u32,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            locator: locator.into(),
            samples,
            sample_rate,
        }
    }

    /// The locator this track was loaded from
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Total length in frames
    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    /// Sample rate of the decoded image (the engine rate)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total length in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// The decoded sample data
    pub fn samples(&self) -> &[StereoSample] {
        self.samples.as_slice()
    }

    /// Read one sample at a fractional frame position (linear interpolation)
    ///
    /// Out-of-range positions read as silence, so callers stepping past the
    /// end get silence padding rather than a panic.
    #[inline]
    pub fn read_interpolated(&self, position: f64) -> StereoSample {
        let data = self.samples.as_slice();
        if data.is_empty() {
            return StereoSample::silence();
        }

        let index = position.floor() as i64;
        let frac = (position - position.floor()) as f32;

        let s0 = get_sample(data, index);
        let s1 = get_sample(data, index + 1);
        lerp_sample(s0, s1, frac)
    }
}

/// Get a sample with bounds checking (silence outside the track)
#[inline]
fn get_sample(data: &[StereoSample], index: i64) -> StereoSample {
    if index < 0 || index >= data.len() as i64 {
        StereoSample::silence()
    } else {
        data[index as usize]
    }
}

/// Linear interpolation between two samples
#[inline]
fn lerp_sample(s0: StereoSample, s1: StereoSample, t: f32) -> StereoSample {
    StereoSample {
        left: s0.left + (s1.left - s0.left) * t,
        right: s0.right + (s1.right - s0.right) * t,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding (Symphonia)
// ─────────────────────────────────────────────────────────────────────────────

/// Decode an audio file to interleaved f32 samples
fn decode(path: &Path) -> Result<(Vec<Sample>, u32, u16), LoadError> {
    let file = File::open(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| LoadError::UnsupportedFormat(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or(LoadError::NoAudioTrack)?;

    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| LoadError::UnsupportedFormat("unknown sample rate".to_string()))?;

    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| LoadError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<Sample> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<Sample>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet from {:?}: {}", path, e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Error decoding packet from {:?}: {}", path, e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::new(duration, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    Ok((samples, sample_rate, channels))
}

/// Split interleaved multi-channel audio into a stereo pair
///
/// Mono is duplicated to both channels; anything beyond two channels keeps
/// the first two.
fn downmix_stereo(interleaved: &[Sample], channels: u16) -> (Vec<Sample>, Vec<Sample>) {
    let ch = channels as usize;
    let frames = interleaved.len() / ch;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);

    for frame in interleaved.chunks_exact(ch) {
        left.push(frame[0]);
        right.push(if ch > 1 { frame[1] } else { frame[0] });
    }

    (left, right)
}

// ─────────────────────────────────────────────────────────────────────────────
// Sample Rate Conversion (Rubato)
// ─────────────────────────────────────────────────────────────────────────────

/// Input chunk size for the fixed-input resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Convert a stereo pair from `source_rate` to `target_rate`
fn resample_stereo(
    left: &[Sample],
    right: &[Sample],
    source_rate: u32,
    target_rate: u32,
) -> Result<(Vec<Sample>, Vec<Sample>), LoadError> {
    let ratio = target_rate as f64 / source_rate as f64;

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<Sample>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 2)
        .map_err(|e| LoadError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let expected = (left.len() as f64 * ratio).round() as usize;

    let mut out_l: Vec<Sample> = Vec::with_capacity(expected + RESAMPLE_CHUNK);
    let mut out_r: Vec<Sample> = Vec::with_capacity(expected + RESAMPLE_CHUNK);

    let mut pos = 0;
    while left.len() - pos >= RESAMPLE_CHUNK {
        let input = [&left[pos..pos + RESAMPLE_CHUNK], &right[pos..pos + RESAMPLE_CHUNK]];
        let output = resampler
            .process(&input, None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;
        out_l.extend_from_slice(&output[0]);
        out_r.extend_from_slice(&output[1]);
        pos += RESAMPLE_CHUNK;
    }

    if pos < left.len() {
        let input = [&left[pos..], &right[pos..]];
        let output = resampler
            .process_partial(Some(&input), None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;
        out_l.extend_from_slice(&output[0]);
        out_r.extend_from_slice(&output[1]);
    }

    // Drain the resampler's delay line until the expected length is covered
    while out_l.len() < expected + delay {
        let output = resampler
            .process_partial::<&[Sample]>(None, None)
            .map_err(|e| LoadError::Resample(e.to_string()))?;
        if output[0].is_empty() {
            break;
        }
        out_l.extend_from_slice(&output[0]);
        out_r.extend_from_slice(&output[1]);
    }

    // Compensate the sinc filter delay and trim to the expected length
    let l: Vec<Sample> = out_l.into_iter().skip(delay).take(expected).collect();
    let r: Vec<Sample> = out_r.into_iter().skip(delay).take(expected).collect();
    Ok((l, r))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Write a stereo 16-bit WAV with a sine tone, returning its path
    fn write_test_wav(dir: &Path, name: &str, sample_rate: u32, seconds: f64) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        let frames = (sample_rate as f64 * seconds) as usize;
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let v = (t * 440.0 * std::f32::consts::TAU).sin() * 0.5;
            let s = (v * i16::MAX as f32) as i16;
            writer.write_sample(s).unwrap();
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_load_wav_at_native_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_wav(dir.path(), "tone.wav", 48_000, 1.0);

        let track = Track::load(&path, 48_000).unwrap();
        assert_eq!(track.sample_rate(), 48_000);
        assert_eq!(track.frames(), 48_000);
        assert!((track.duration_seconds() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_resamples_to_engine_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_wav(dir.path(), "tone44.wav", 44_100, 1.0);

        let track = Track::load(&path, 48_000).unwrap();
        assert_eq!(track.sample_rate(), 48_000);
        // Duration is preserved through the rate conversion
        assert!((track.duration_seconds() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_load_missing_file_fails_fast() {
        let err = Track::load(Path::new("/nonexistent/track.wav"), 48_000).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_load_undecodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-audio.wav");
        std::fs::write(&path, b"this is not a wav file at all").unwrap();

        let err = Track::load(&path, 48_000).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_read_interpolated_midpoint() {
        let buffer = StereoBuffer::from_interleaved(&[0.0, 0.0, 1.0, 1.0]);
        let track = Track::from_samples(buffer, 48_000, "mem");

        let mid = track.read_interpolated(0.5);
        assert!((mid.left - 0.5).abs() < 1e-6);
        assert!((mid.right - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_read_interpolated_out_of_range_is_silence() {
        let buffer = StereoBuffer::from_interleaved(&[1.0, 1.0]);
        let track = Track::from_samples(buffer, 48_000, "mem");

        assert_eq!(track.read_interpolated(-2.0), StereoSample::silence());
        assert_eq!(track.read_interpolated(10.0), StereoSample::silence());
    }

    #[test]
    fn test_downmix_mono_duplicates() {
        let (l, r) = downmix_stereo(&[0.25, 0.5], 1);
        assert_eq!(l, vec![0.25, 0.5]);
        assert_eq!(r, vec![0.25, 0.5]);
    }

    #[test]
    fn test_downmix_keeps_first_two_channels() {
        let (l, r) = downmix_stereo(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3);
        assert_eq!(l, vec![1.0, 4.0]);
        assert_eq!(r, vec![2.0, 5.0]);
    }
}
