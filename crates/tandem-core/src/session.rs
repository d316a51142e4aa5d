//! Control-domain session surface
//!
//! [`Session`] and the per-deck [`DeckControl`] handles are what the UI and
//! loop monitor talk to. They validate every parameter up front, decode
//! tracks on the calling thread, and turn accepted operations into commands
//! on the lock-free queue. Rejected calls leave all engine state untouched;
//! there is no partial application.
//!
//! The queue is single-producer, so the producer end sits behind a mutex in
//! [`ControlLink`]. Contention there is between control-domain threads only
//! (UI vs. monitor tick); the audio-thread consumer never takes a lock.

use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use basedrop::Shared;
use rtrb::Producer;

use crate::engine::gc::gc_handle;
use crate::engine::{command_channel, AudioEngine, DeckAtomics, EngineCommand};
use crate::error::{ControlError, ControlResult};
use crate::track::Track;
use crate::types::{DeckId, PlayState, NUM_DECKS};

/// Shared sender for the command queue
///
/// Cloned (via `Arc`) to every control-domain party that needs to issue
/// commands. A full queue is reported as [`ControlError::QueueFull`]; the
/// command is dropped, never blocked on.
pub struct ControlLink {
    producer: Mutex<Producer<EngineCommand>>,
}

impl ControlLink {
    fn new(producer: Producer<EngineCommand>) -> Self {
        Self {
            producer: Mutex::new(producer),
        }
    }

    /// Enqueue a command for the audio thread
    pub fn send(&self, command: EngineCommand) -> ControlResult<()> {
        let mut producer = self.producer.lock().expect("command producer poisoned");
        producer.push(command).map_err(|_| ControlError::QueueFull)
    }
}

/// Create a session and the audio engine it controls
///
/// The engine goes to the audio backend (it must end up owned by the audio
/// callback); the session stays with the control domain. Tracks are decoded
/// to `engine_rate` at load time.
pub fn create_session(engine_rate: u32) -> (Session, AudioEngine) {
    let (tx, rx) = command_channel();
    let engine = AudioEngine::new(rx);
    let link = Arc::new(ControlLink::new(tx));

    let decks = std::array::from_fn(|i| DeckControl {
        id: DeckId::new(i),
        link: Arc::clone(&link),
        atomics: engine.deck_atomics(i).expect("deck index in range"),
        loaded_frames: Arc::new(AtomicU64::new(0)),
        engine_rate,
    });

    let session = Session {
        link,
        decks,
        crossfade_bits: AtomicU32::new(0.0f32.to_bits()),
        engine_rate,
    };
    (session, engine)
}

/// The control-domain half of the player
///
/// Methods take `&self` and the session is `Send + Sync`, so it can sit
/// behind an `Arc` shared between the UI and the loop monitor; per-deck
/// work usually goes through cloned [`DeckControl`] handles instead.
pub struct Session {
    link: Arc<ControlLink>,
    decks: [DeckControl; NUM_DECKS],
    /// Control-side cache of the last accepted crossfader value (f32 bits)
    crossfade_bits: AtomicU32,
    engine_rate: u32,
}

impl Session {
    /// Shared sender handle, for parties that issue raw commands
    pub fn link(&self) -> Arc<ControlLink> {
        Arc::clone(&self.link)
    }

    /// Control handle for one deck (cheap to clone, `Send`)
    pub fn deck(&self, deck: DeckId) -> DeckControl {
        self.decks[deck.0].clone()
    }

    /// Sample rate tracks are decoded to
    pub fn engine_rate(&self) -> u32 {
        self.engine_rate
    }

    /// Move the crossfader
    ///
    /// Accepts [0, 1]: 0 is full deck A, 1 is full deck B. When the command
    /// applies it sets deck A's gain to `1 - value` and deck B's to `value`
    /// in the same step, replacing whatever per-deck gains were in effect.
    pub fn set_crossfade(&self, value: f64) -> ControlResult<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ControlError::InvalidParameter {
                name: "crossfade",
                value,
                expected: "0.0 to 1.0",
            });
        }
        self.link
            .send(EngineCommand::SetCrossfade { value: value as f32 })?;
        self.crossfade_bits
            .store((value as f32).to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Last accepted crossfader value
    pub fn crossfade(&self) -> f64 {
        f32::from_bits(self.crossfade_bits.load(Ordering::Relaxed)) as f64
    }
}

/// Cloneable control handle for a single deck
///
/// All methods validate before enqueueing; a rejected call sends nothing.
#[derive(Clone)]
pub struct DeckControl {
    id: DeckId,
    link: Arc<ControlLink>,
    atomics: Arc<DeckAtomics>,
    /// Length of the track this control last loaded, in frames
    ///
    /// Maintained control-side so validation right after `load` doesn't
    /// race the audio thread applying the command.
    loaded_frames: Arc<AtomicU64>,
    engine_rate: u32,
}

impl DeckControl {
    pub fn id(&self) -> DeckId {
        self.id
    }

    /// Lock-free state mirror for this deck
    pub fn atomics(&self) -> Arc<DeckAtomics> {
        Arc::clone(&self.atomics)
    }

    /// Decode a file and put it on this deck
    ///
    /// Decoding happens here, on the calling thread; only the finished
    /// track crosses to the audio thread. On failure the deck keeps
    /// whatever it had.
    pub fn load(&self, path: &Path) -> ControlResult<()> {
        let track = Track::load(path, self.engine_rate)?;
        let frames = track.frames() as u64;

        let shared = Shared::new(&gc_handle(), track);
        self.link.send(EngineCommand::Load {
            deck: self.id.0,
            track: shared,
        })?;

        self.loaded_frames.store(frames, Ordering::Relaxed);
        log::info!("Deck {}: loaded {}", self.id.label(), path.display());
        Ok(())
    }

    /// Remove the track from this deck
    pub fn unload(&self) -> ControlResult<()> {
        self.link.send(EngineCommand::Unload { deck: self.id.0 })?;
        self.loaded_frames.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Start playback from the current position
    ///
    /// Fails with [`ControlError::NotReady`] while the deck is empty.
    pub fn start(&self) -> ControlResult<()> {
        if !self.has_track() {
            return Err(ControlError::NotReady);
        }
        self.link.send(EngineCommand::Play { deck: self.id.0 })
    }

    /// Pause this deck
    ///
    /// Always accepted: pausing an empty or already-paused deck is a no-op.
    pub fn pause(&self) -> ControlResult<()> {
        self.link.send(EngineCommand::Pause { deck: self.id.0 })
    }

    /// Set this deck's gain
    ///
    /// Accepts [0, 1] inclusive; anything else (including NaN) is rejected
    /// and the previous gain stands.
    pub fn set_gain(&self, gain: f64) -> ControlResult<()> {
        if !(0.0..=1.0).contains(&gain) {
            return Err(ControlError::InvalidParameter {
                name: "gain",
                value: gain,
                expected: "0.0 to 1.0",
            });
        }
        self.link.send(EngineCommand::SetGain {
            deck: self.id.0,
            gain: gain as f32,
        })
    }

    /// Set this deck's playback speed ratio
    ///
    /// Accepts (0, 5]: zero would freeze the playhead while claiming to
    /// play, so it is rejected along with negatives and anything above 5x.
    pub fn set_speed(&self, speed: f64) -> ControlResult<()> {
        if !(speed > 0.0 && speed <= 5.0) {
            return Err(ControlError::InvalidParameter {
                name: "speed",
                value: speed,
                expected: "greater than 0.0, at most 5.0",
            });
        }
        self.link.send(EngineCommand::SetSpeed {
            deck: self.id.0,
            speed,
        })
    }

    /// Move the playhead to an absolute time in seconds
    ///
    /// Accepts [0, duration] and requires a loaded track.
    pub fn seek_seconds(&self, seconds: f64) -> ControlResult<()> {
        let Some(duration) = self.duration_seconds() else {
            return Err(ControlError::NotReady);
        };
        if !(0.0..=duration).contains(&seconds) {
            return Err(ControlError::InvalidParameter {
                name: "position_seconds",
                value: seconds,
                expected: "0.0 to track duration",
            });
        }
        self.link.send(EngineCommand::Seek {
            deck: self.id.0,
            frame: seconds * self.engine_rate as f64,
        })
    }

    /// Move the playhead to a fraction of the track length
    ///
    /// Accepts [0, 1] inclusive and requires a loaded track.
    pub fn seek_relative(&self, relative: f64) -> ControlResult<()> {
        if !(0.0..=1.0).contains(&relative) {
            return Err(ControlError::InvalidParameter {
                name: "position",
                value: relative,
                expected: "0.0 to 1.0",
            });
        }
        let frames = self.loaded_frames.load(Ordering::Relaxed);
        if frames == 0 {
            return Err(ControlError::NotReady);
        }
        self.link.send(EngineCommand::Seek {
            deck: self.id.0,
            frame: relative * frames as f64,
        })
    }

    /// Whether this deck has a track, as far as the control side knows
    pub fn has_track(&self) -> bool {
        self.loaded_frames.load(Ordering::Relaxed) > 0
    }

    /// Current transport state
    pub fn play_state(&self) -> PlayState {
        self.atomics.play_state()
    }

    /// Gain as applied by the audio thread
    pub fn gain(&self) -> f64 {
        self.atomics.gain() as f64
    }

    /// Speed ratio as applied by the audio thread
    pub fn speed(&self) -> f64 {
        self.atomics.speed()
    }

    /// Playhead as a fraction of track length (`None` while empty)
    pub fn position_relative(&self) -> Option<f64> {
        self.atomics.position_relative()
    }

    /// Loaded track duration in seconds (`None` while empty)
    pub fn duration_seconds(&self) -> Option<f64> {
        let frames = self.loaded_frames.load(Ordering::Relaxed);
        if frames == 0 {
            return None;
        }
        Some(frames as f64 / self.engine_rate as f64)
    }
}
