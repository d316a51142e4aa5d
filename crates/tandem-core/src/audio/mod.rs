//! Audio output backend
//!
//! One CPAL stereo output stream carries the master mix. The design is
//! lock-free end to end at runtime:
//!
//! - **Control domain**: sends commands via the lock-free ring buffer
//! - **Audio thread**: owns the `AudioEngine` exclusively, drains commands
//!   at buffer boundaries
//! - **Atomics**: control reads playback state via relaxed atomics
//!
//! ```ignore
//! use tandem_core::audio::{start_audio_system, AudioConfig};
//!
//! let system = start_audio_system(&AudioConfig::default())?;
//! let deck = system.session.deck(DeckId::new(0));
//! deck.load(Path::new("track.mp3"))?;
//! deck.start()?;
//! ```

mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE};
pub use cpal_backend::{start_audio_system, AudioHandle, AudioSystemResult};
pub use device::{available_output_devices, default_output_device, find_device_by_name};
pub use error::{AudioError, AudioResult};
