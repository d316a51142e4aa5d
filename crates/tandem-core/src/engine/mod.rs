//! Audio engine - decks, mixer, command queue
//!
//! The audio-thread half of the player:
//! - Deck: single-track transport with gain and variable-speed playback
//! - Mixer: combines the two decks under the crossfader
//! - Command queue: lock-free control path into the audio thread
//! - AudioEngine: ties it together behind prepare/process/release

mod command;
mod deck;
mod engine;
pub mod gc;
mod mixer;

pub use command::*;
pub use deck::*;
pub use engine::*;
pub use mixer::*;
