//! Tandem Core - dual-deck audio playback and mixing engine
//!
//! Two decks, one crossfading mixer, one audio callback. The control
//! domain (UI, loop monitor) talks to the audio thread exclusively through
//! a lock-free command queue and reads state back through relaxed atomics;
//! tracks are decoded and resampled up front so the render path is pure
//! in-memory reads.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod playlist;
pub mod session;
pub mod track;
pub mod types;

pub use types::*;
