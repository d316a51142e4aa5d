//! Audio output configuration

use serde::{Deserialize, Serialize};

pub use crate::engine::{DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};

/// Default buffer size in frames (~10.7ms at 48kHz)
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Buffer size selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BufferSize {
    /// Use [`DEFAULT_BUFFER_SIZE`]
    #[default]
    Default,
    /// Request a specific size in frames (clamped to sane bounds)
    Fixed(u32),
}

/// Output device and stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name, `None` for the system default
    pub output_device: Option<String>,
    /// Requested sample rate, `None` for [`DEFAULT_SAMPLE_RATE`]
    ///
    /// Tracks are decoded to whatever rate the device ends up at, so a
    /// mismatch here only costs load-time conversion, never playback
    /// quality.
    pub sample_rate: Option<u32>,
    /// Requested buffer size
    pub buffer_size: BufferSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AudioConfig::default();
        assert_eq!(config.output_device, None);
        assert_eq!(config.sample_rate, None);
        assert_eq!(config.buffer_size, BufferSize::Default);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = AudioConfig {
            output_device: Some("USB Interface".to_string()),
            sample_rate: Some(44_100),
            buffer_size: BufferSize::Fixed(256),
        };

        let yaml = serde_yaml::to_string(&config).unwrap();
        let loaded: AudioConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let loaded: AudioConfig = serde_yaml::from_str("sample_rate: 96000\n").unwrap();
        assert_eq!(loaded.sample_rate, Some(96_000));
        assert_eq!(loaded.output_device, None);
        assert_eq!(loaded.buffer_size, BufferSize::Default);
    }
}
