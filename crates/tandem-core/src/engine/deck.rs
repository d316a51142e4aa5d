//! Deck - single-track transport with gain and variable-speed playback
//!
//! The audio thread owns each `Deck` exclusively; all mutation arrives as
//! commands drained at buffer boundaries. A mirror of the transport state
//! lives in [`DeckAtomics`] so the control domain (UI, loop monitor) can
//! read position and play state without locks.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use basedrop::Shared;

use crate::engine::mixer::{ChannelFault, MixerChannel};
use crate::track::Track;
use crate::types::{DeckId, PlayState, StereoBuffer};

/// Lock-free transport state mirror for control-domain reads
///
/// The audio thread writes these after every rendered buffer; readers poll
/// them freely. All operations use `Ordering::Relaxed` since each field is
/// an independent snapshot and only visibility matters. Fractional values
/// travel as raw bit patterns.
pub struct DeckAtomics {
    /// Playhead position in frames (f64 bits)
    position_bits: AtomicU64,
    /// Loaded track length in frames (0 while empty)
    length: AtomicU64,
    /// Whether a track is loaded
    loaded: AtomicBool,
    /// Whether the transport is running
    playing: AtomicBool,
    /// Deck gain (f32 bits)
    gain_bits: AtomicU32,
    /// Playback speed ratio (f64 bits)
    speed_bits: AtomicU64,
}

impl DeckAtomics {
    pub fn new() -> Self {
        Self {
            position_bits: AtomicU64::new(0f64.to_bits()),
            length: AtomicU64::new(0),
            loaded: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            gain_bits: AtomicU32::new(1.0f32.to_bits()),
            speed_bits: AtomicU64::new(1.0f64.to_bits()),
        }
    }

    /// Playhead position in frames (lock-free)
    #[inline]
    pub fn position(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Relaxed))
    }

    /// Track length in frames, 0 while empty (lock-free)
    #[inline]
    pub fn length_frames(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    /// Whether a track is loaded (lock-free)
    #[inline]
    pub fn has_track(&self) -> bool {
        self.loaded.load(Ordering::Relaxed)
    }

    /// Whether the transport is running (lock-free)
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// Play state as enum (lock-free)
    #[inline]
    pub fn play_state(&self) -> PlayState {
        if self.is_playing() { PlayState::Playing } else { PlayState::Paused }
    }

    /// Current gain (lock-free)
    #[inline]
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    /// Current speed ratio (lock-free)
    #[inline]
    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }

    /// Playhead as a fraction of track length
    ///
    /// `None` while no track is loaded: an empty deck has no meaningful
    /// fraction, and callers must not confuse it with "at the start".
    #[inline]
    pub fn position_relative(&self) -> Option<f64> {
        let length = self.length_frames();
        if !self.has_track() || length == 0 {
            return None;
        }
        Some(self.position() / length as f64)
    }
}

impl Default for DeckAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// A single deck: one optional track plus transport, gain, and speed
///
/// The playhead advances by `speed` frames per output frame while playing
/// and reads the track with linear interpolation at fractional positions.
/// Reaching the end does not pause the transport; the playhead clamps at
/// the track length and the deck renders silence until something external
/// (the loop monitor, or the user) decides what happens next.
pub struct Deck {
    id: DeckId,
    track: Option<Shared<Track>>,
    /// Playhead in frames, fractional while speed != 1
    position: f64,
    /// Speed ratio, validated control-side to (0, 5]
    speed: f64,
    /// Gain, validated control-side to [0, 1]
    gain: f32,
    state: PlayState,
    atomics: Arc<DeckAtomics>,
}

impl Deck {
    pub fn new(id: DeckId) -> Self {
        Self {
            id,
            track: None,
            position: 0.0,
            speed: 1.0,
            gain: 1.0,
            state: PlayState::Paused,
            atomics: Arc::new(DeckAtomics::new()),
        }
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    /// Shared handle to the lock-free state mirror
    pub fn atomics(&self) -> Arc<DeckAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn has_track(&self) -> bool {
        self.track.is_some()
    }

    pub fn play_state(&self) -> PlayState {
        self.state
    }

    /// Playhead position in frames
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Put a track on the deck, replacing any previous one
    ///
    /// Transport resets to paused at position zero. Gain, speed, and the
    /// crossfader are deliberately untouched: they belong to the operator,
    /// not the track. The displaced `Shared` handle is dropped here on the
    /// audio thread, which only enqueues it for the GC thread.
    pub fn load(&mut self, track: Shared<Track>) {
        self.track = Some(track);
        self.position = 0.0;
        self.state = PlayState::Paused;
        self.sync_atomics();
    }

    /// Return the deck to the empty state
    pub fn unload(&mut self) {
        self.track = None;
        self.position = 0.0;
        self.state = PlayState::Paused;
        self.sync_atomics();
    }

    /// Start the transport (no-op while empty)
    pub fn play(&mut self) {
        if self.track.is_some() {
            self.state = PlayState::Playing;
            self.sync_atomics();
        }
    }

    /// Freeze the playhead where it is
    pub fn pause(&mut self) {
        self.state = PlayState::Paused;
        self.sync_atomics();
    }

    /// Move the playhead to an absolute frame position, clamped to the track
    pub fn seek(&mut self, frame: f64) {
        let length = self.track_frames() as f64;
        self.position = frame.clamp(0.0, length);
        self.sync_atomics();
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
        self.atomics.gain_bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
        self.atomics.speed_bits.store(speed.to_bits(), Ordering::Relaxed);
    }

    fn track_frames(&self) -> usize {
        self.track.as_ref().map_or(0, |t| t.frames())
    }

    /// Render one buffer of output
    ///
    /// A paused or empty deck renders silence. While playing, each output
    /// frame reads the track at the fractional playhead and advances it by
    /// the speed ratio; past the end the reads come back silent and the
    /// playhead clamps at the track length.
    pub fn process(&mut self, output: &mut StereoBuffer) {
        let Some(track) = self.track.as_ref() else {
            output.fill_silence();
            return;
        };

        if self.state != PlayState::Playing {
            output.fill_silence();
            self.sync_atomics();
            return;
        }

        let length = track.frames() as f64;
        for sample in output.iter_mut() {
            *sample = track.read_interpolated(self.position) * self.gain;
            self.position = (self.position + self.speed).min(length);
        }

        self.sync_atomics();
    }

    /// Publish the transport state to the lock-free mirror
    fn sync_atomics(&self) {
        self.atomics
            .position_bits
            .store(self.position.to_bits(), Ordering::Relaxed);
        self.atomics
            .length
            .store(self.track_frames() as u64, Ordering::Relaxed);
        self.atomics.loaded.store(self.track.is_some(), Ordering::Relaxed);
        self.atomics
            .playing
            .store(self.state == PlayState::Playing, Ordering::Relaxed);
    }
}

impl MixerChannel for Deck {
    fn render(&mut self, output: &mut StereoBuffer) -> Result<(), ChannelFault> {
        self.process(output);
        Ok(())
    }
}
