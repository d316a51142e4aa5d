//! AudioEngine - the audio-thread side of the player
//!
//! Owns both decks, the mixer, and the consumer end of the command queue.
//! The audio callback calls [`AudioEngine::process`] once per buffer; the
//! engine drains pending commands first, then renders, so every command
//! takes effect exactly at a buffer boundary and in submission order.

use rtrb::Consumer;

use super::command::EngineCommand;
use super::deck::{Deck, DeckAtomics};
use super::mixer::Mixer;
use crate::types::{DeckId, StereoBuffer, NUM_DECKS};
use std::sync::Arc;

/// Sample rate the engine runs at when the device doesn't dictate one
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Upper bound on frames per buffer the engine will be asked to render
pub const MAX_BUFFER_SIZE: usize = 8192;

/// The audio-thread half of the player
///
/// Exclusively owned by the audio callback after construction; the control
/// domain reaches it only through the command queue and reads it only
/// through the deck atomics.
pub struct AudioEngine {
    decks: [Deck; NUM_DECKS],
    mixer: Mixer,
    commands: Consumer<EngineCommand>,
    sample_rate: u32,
    prepared: bool,
}

impl AudioEngine {
    /// Create an engine wired to the consumer end of a command channel
    pub fn new(commands: Consumer<EngineCommand>) -> Self {
        Self {
            decks: std::array::from_fn(|i| Deck::new(DeckId::new(i))),
            mixer: Mixer::new(MAX_BUFFER_SIZE),
            commands,
            sample_rate: DEFAULT_SAMPLE_RATE,
            prepared: false,
        }
    }

    /// Size render resources for the device's rate and buffer length
    ///
    /// Called before the stream starts and again if the device is
    /// reconfigured. Scratch buffers are (re)allocated here so the render
    /// path never allocates.
    pub fn prepare(&mut self, sample_rate: u32, max_frames: usize) {
        self.sample_rate = sample_rate;
        self.mixer = Mixer::new(max_frames.max(MAX_BUFFER_SIZE));
        self.prepared = true;
        log::info!(
            "Engine prepared: {}Hz, up to {} frames per buffer",
            sample_rate,
            max_frames
        );
    }

    /// Stop rendering and release transport state
    ///
    /// Decks pause but keep their tracks; a subsequent prepare resumes from
    /// where the transports stood.
    pub fn release(&mut self) {
        for deck in &mut self.decks {
            deck.pause();
        }
        self.prepared = false;
        log::info!("Engine released");
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Lock-free state mirror for one deck
    pub fn deck_atomics(&self, deck: usize) -> Option<Arc<DeckAtomics>> {
        self.decks.get(deck).map(|d| d.atomics())
    }

    /// Render one buffer of master output
    ///
    /// Drains the command queue, then mixes both decks. Before prepare (or
    /// after release) the output is silence and commands stay queued for
    /// the next prepared buffer.
    pub fn process(&mut self, output: &mut StereoBuffer) {
        if !self.prepared {
            output.fill_silence();
            return;
        }

        self.process_commands();
        self.mixer.process(&mut self.decks, output);
    }

    /// Drain and apply all pending commands
    fn process_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Load { deck, track } => {
                if let Some(d) = self.decks.get_mut(deck) {
                    d.load(track);
                }
            }
            EngineCommand::Unload { deck } => {
                if let Some(d) = self.decks.get_mut(deck) {
                    d.unload();
                }
            }
            EngineCommand::Play { deck } => {
                if let Some(d) = self.decks.get_mut(deck) {
                    d.play();
                }
            }
            EngineCommand::Pause { deck } => {
                if let Some(d) = self.decks.get_mut(deck) {
                    d.pause();
                }
            }
            EngineCommand::Seek { deck, frame } => {
                if let Some(d) = self.decks.get_mut(deck) {
                    d.seek(frame);
                }
            }
            EngineCommand::SetGain { deck, gain } => {
                if let Some(d) = self.decks.get_mut(deck) {
                    d.set_gain(gain);
                }
            }
            EngineCommand::SetSpeed { deck, speed } => {
                if let Some(d) = self.decks.get_mut(deck) {
                    d.set_speed(speed);
                }
            }
            EngineCommand::SetCrossfade { value } => {
                // The crossfader overwrites both deck gains in one command,
                // so the pair can never be observed half-applied.
                let [a, b] = &mut self.decks;
                a.set_gain(1.0 - value);
                b.set_gain(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::command_channel;
    use crate::engine::gc::gc_handle;
    use crate::track::Track;
    use basedrop::Shared;

    fn test_track(frames: usize, value: f32) -> Shared<Track> {
        let samples: Vec<f32> = (0..frames * 2).map(|_| value).collect();
        let buffer = StereoBuffer::from_interleaved(&samples);
        Shared::new(&gc_handle(), Track::from_samples(buffer, 48_000, "mem"))
    }

    #[test]
    fn test_unprepared_engine_outputs_silence() {
        let (mut tx, rx) = command_channel();
        let mut engine = AudioEngine::new(rx);
        let mut out = StereoBuffer::silence(64);

        tx.push(EngineCommand::Play { deck: 0 }).unwrap();
        engine.process(&mut out);
        assert_eq!(out.peak(), 0.0);

        // The queued command survives until the engine is prepared
        engine.prepare(48_000, 256);
        tx.push(EngineCommand::Load { deck: 0, track: test_track(1000, 0.5) })
            .unwrap();
        engine.process(&mut out);
        assert!(engine.deck_atomics(0).unwrap().has_track());
    }

    #[test]
    fn test_commands_apply_before_rendering() {
        let (mut tx, rx) = command_channel();
        let mut engine = AudioEngine::new(rx);
        engine.prepare(48_000, 256);

        tx.push(EngineCommand::Load { deck: 0, track: test_track(10_000, 0.5) })
            .unwrap();
        tx.push(EngineCommand::Play { deck: 0 }).unwrap();

        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);

        // Load and play both landed before this buffer rendered
        assert!((out[0].left - 0.5).abs() < 1e-6);
        assert_eq!(engine.deck_atomics(0).unwrap().position(), 64.0);
    }

    #[test]
    fn test_crossfade_moves_both_gains_in_one_buffer() {
        let (mut tx, rx) = command_channel();
        let mut engine = AudioEngine::new(rx);
        engine.prepare(48_000, 256);

        tx.push(EngineCommand::Load { deck: 0, track: test_track(10_000, 0.8) })
            .unwrap();
        tx.push(EngineCommand::Load { deck: 1, track: test_track(10_000, 0.4) })
            .unwrap();
        tx.push(EngineCommand::Play { deck: 0 }).unwrap();
        tx.push(EngineCommand::Play { deck: 1 }).unwrap();
        tx.push(EngineCommand::SetCrossfade { value: 0.5 }).unwrap();

        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);

        // Equal blend: 0.8 * 0.5 + 0.4 * 0.5
        assert!((out[0].left - 0.6).abs() < 1e-6);
        assert!((engine.deck_atomics(0).unwrap().gain() - 0.5).abs() < 1e-6);
        assert!((engine.deck_atomics(1).unwrap().gain() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_crossfade_endpoints_silence_the_far_deck() {
        let (mut tx, rx) = command_channel();
        let mut engine = AudioEngine::new(rx);
        engine.prepare(48_000, 256);

        tx.push(EngineCommand::Load { deck: 0, track: test_track(10_000, 0.8) })
            .unwrap();
        tx.push(EngineCommand::Load { deck: 1, track: test_track(10_000, 0.4) })
            .unwrap();
        tx.push(EngineCommand::Play { deck: 0 }).unwrap();
        tx.push(EngineCommand::Play { deck: 1 }).unwrap();
        tx.push(EngineCommand::SetCrossfade { value: 1.0 }).unwrap();

        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);
        assert!((out[0].left - 0.4).abs() < 1e-6);

        tx.push(EngineCommand::SetCrossfade { value: 0.0 }).unwrap();
        engine.process(&mut out);
        assert!((out[0].left - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_load_replaces_track_and_resets_transport() {
        let (mut tx, rx) = command_channel();
        let mut engine = AudioEngine::new(rx);
        engine.prepare(48_000, 256);

        tx.push(EngineCommand::Load { deck: 1, track: test_track(1000, 0.5) })
            .unwrap();
        tx.push(EngineCommand::Play { deck: 1 }).unwrap();
        tx.push(EngineCommand::Seek { deck: 1, frame: 500.0 }).unwrap();

        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);

        tx.push(EngineCommand::Load { deck: 1, track: test_track(2000, 0.5) })
            .unwrap();
        engine.process(&mut out);

        let atomics = engine.deck_atomics(1).unwrap();
        assert_eq!(atomics.length_frames(), 2000);
        assert_eq!(atomics.position(), 0.0);
        assert!(!atomics.is_playing());
    }

    #[test]
    fn test_release_pauses_but_keeps_tracks() {
        let (mut tx, rx) = command_channel();
        let mut engine = AudioEngine::new(rx);
        engine.prepare(48_000, 256);

        tx.push(EngineCommand::Load { deck: 0, track: test_track(1000, 0.5) })
            .unwrap();
        tx.push(EngineCommand::Play { deck: 0 }).unwrap();

        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);

        engine.release();
        let atomics = engine.deck_atomics(0).unwrap();
        assert!(!atomics.is_playing());
        assert!(atomics.has_track());

        engine.process(&mut out);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_out_of_range_deck_index_is_ignored() {
        let (mut tx, rx) = command_channel();
        let mut engine = AudioEngine::new(rx);
        engine.prepare(48_000, 256);

        tx.push(EngineCommand::Play { deck: 7 }).unwrap();

        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);
        assert_eq!(out.peak(), 0.0);
    }
}
