//! Loop monitor - polling end-of-track watchdog
//!
//! The decks themselves never decide what happens when a track runs out;
//! the playhead just clamps at the end and the deck goes silent. This
//! monitor polls each deck's position mirror and, when the playhead has
//! reached the end, rewinds the deck and either restarts it (loop enabled)
//! or pauses it (loop disabled). Mid-track positions are forwarded to an
//! optional [`PositionListener`] so a UI can move its playhead display.
//!
//! Polling at 100ms means the reaction can lag the actual end by up to one
//! period plus one buffer; during that window the deck outputs silence,
//! which is inaudible at a track boundary. Commands issued by a tick go
//! through the same queue as everything else, so a loop restart applies at
//! a buffer boundary like any other transport change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::session::{DeckControl, Session};
use crate::types::{DeckId, NUM_DECKS};

/// How often the monitor polls the decks
pub const MONITOR_PERIOD: Duration = Duration::from_millis(100);

/// Receiver for mid-track position updates
///
/// Called from the monitor's thread (or whoever drives `tick`), once per
/// tick per deck that is somewhere between start and end.
pub trait PositionListener: Send {
    fn position_changed(&self, deck: DeckId, relative: f64);
}

struct MonitoredDeck {
    control: DeckControl,
    loop_enabled: Arc<AtomicBool>,
}

/// End-of-track watchdog for both decks
///
/// Holds only lock-free mirrors and a command sender, so it can run on its
/// own thread (see [`LoopMonitor::spawn`]) or be ticked manually by a host
/// with its own scheduler.
pub struct LoopMonitor {
    decks: [MonitoredDeck; NUM_DECKS],
    listener: Option<Box<dyn PositionListener>>,
}

impl LoopMonitor {
    /// Create a monitor watching the decks of `session`
    pub fn new(session: &Session) -> Self {
        Self {
            decks: std::array::from_fn(|i| MonitoredDeck {
                control: session.deck(DeckId::new(i)),
                loop_enabled: Arc::new(AtomicBool::new(false)),
            }),
            listener: None,
        }
    }

    /// Attach a listener for mid-track position updates
    pub fn set_listener(&mut self, listener: Box<dyn PositionListener>) {
        self.listener = Some(listener);
    }

    /// Enable or disable looping for one deck
    ///
    /// Takes effect at the next tick; it never interrupts playback
    /// mid-track.
    pub fn set_loop_enabled(&self, deck: DeckId, enabled: bool) {
        self.decks[deck.0].loop_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn loop_enabled(&self, deck: DeckId) -> bool {
        self.decks[deck.0].loop_enabled.load(Ordering::Relaxed)
    }

    /// Shared loop flag for one deck
    ///
    /// Lets a host keep toggling the flag after the monitor has moved onto
    /// its own thread.
    pub fn loop_flag(&self, deck: DeckId) -> Arc<AtomicBool> {
        Arc::clone(&self.decks[deck.0].loop_enabled)
    }

    /// Poll both decks once
    ///
    /// An ended deck is rewound to the start, then restarted or paused
    /// depending on its loop flag; the rewind and the transport command go
    /// out back to back, so they apply within the same buffer drain. A
    /// mid-track deck only notifies the listener; an empty deck is skipped.
    pub fn tick(&self) {
        for deck in &self.decks {
            let Some(relative) = deck.control.position_relative() else {
                continue;
            };
            if relative < 1.0 {
                // Strictly mid-track: a deck sitting at the start has
                // nothing to report.
                if relative > 0.0 {
                    if let Some(listener) = &self.listener {
                        listener.position_changed(deck.control.id(), relative);
                    }
                }
                continue;
            }

            let looping = deck.loop_enabled.load(Ordering::Relaxed);
            let rewind = deck.control.seek_relative(0.0);
            let transport = if looping {
                deck.control.start()
            } else {
                deck.control.pause()
            };

            match (rewind, transport) {
                (Ok(()), Ok(())) => {
                    if looping {
                        log::debug!("Deck {}: end of track, looping", deck.control.id().label());
                    } else {
                        log::debug!("Deck {}: end of track, pausing", deck.control.id().label());
                    }
                }
                // Retried naturally on the next tick
                _ => log::warn!(
                    "Deck {}: command queue full during end-of-track handling",
                    deck.control.id().label()
                ),
            }
        }
    }

    /// Run the monitor on its own thread, ticking every `period`
    pub fn spawn(self, period: Duration) -> MonitorHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("loop-monitor".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::Relaxed) {
                    self.tick();
                    thread::sleep(period);
                }
            })
            .expect("Failed to spawn loop monitor thread");

        MonitorHandle {
            stop,
            thread: Some(thread),
        }
    }
}

/// Handle to a running monitor thread
///
/// Stops the thread on drop.
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Stop the monitor thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AudioEngine, DeckAtomics, DEFAULT_SAMPLE_RATE};
    use crate::session::create_session;
    use crate::types::{PlayState, StereoBuffer};
    use std::sync::Mutex;

    fn write_clip(dir: &std::path::Path, frames: usize) -> std::path::PathBuf {
        let path = dir.join("clip.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: DEFAULT_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(8000i16).unwrap();
            writer.write_sample(8000i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn load_and_play(deck: &DeckControl, engine: &mut AudioEngine, frames: usize) {
        let dir = tempfile::tempdir().unwrap();
        let path = write_clip(dir.path(), frames);

        deck.load(&path).unwrap();
        deck.start().unwrap();

        engine.prepare(DEFAULT_SAMPLE_RATE, 64);
        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);
    }

    fn run_to_end(engine: &mut AudioEngine, atomics: &DeckAtomics) {
        let mut out = StereoBuffer::silence(64);
        while atomics.position_relative() != Some(1.0) {
            engine.process(&mut out);
        }
    }

    #[test]
    fn test_loop_enabled_restarts_from_the_top() {
        let (session, mut engine) = create_session(DEFAULT_SAMPLE_RATE);
        let monitor = LoopMonitor::new(&session);
        let deck = session.deck(DeckId::new(0));
        monitor.set_loop_enabled(deck.id(), true);

        load_and_play(&deck, &mut engine, 100);
        run_to_end(&mut engine, &deck.atomics());

        monitor.tick();
        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);

        assert_eq!(deck.play_state(), PlayState::Playing);
        assert!(deck.position_relative().unwrap() < 1.0);
        assert!(out.peak() > 0.0);
    }

    #[test]
    fn test_loop_disabled_rewinds_and_pauses() {
        let (session, mut engine) = create_session(DEFAULT_SAMPLE_RATE);
        let monitor = LoopMonitor::new(&session);
        let deck = session.deck(DeckId::new(0));

        load_and_play(&deck, &mut engine, 100);
        run_to_end(&mut engine, &deck.atomics());

        monitor.tick();
        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);

        assert_eq!(deck.play_state(), PlayState::Paused);
        assert_eq!(deck.position_relative(), Some(0.0));
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_tick_reports_mid_track_position() {
        struct Recorder(Mutex<Vec<(DeckId, f64)>>);
        impl PositionListener for Arc<Recorder> {
            fn position_changed(&self, deck: DeckId, relative: f64) {
                self.0.lock().unwrap().push((deck, relative));
            }
        }

        let (session, mut engine) = create_session(DEFAULT_SAMPLE_RATE);
        let mut monitor = LoopMonitor::new(&session);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        monitor.set_listener(Box::new(Arc::clone(&recorder)));

        let deck = session.deck(DeckId::new(0));
        load_and_play(&deck, &mut engine, 10_000);
        let before = deck.atomics().position();

        monitor.tick();
        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);

        // Mid-track: the listener heard about it and the transport ran on
        let updates = recorder.0.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, deck.id());
        assert!(updates[0].1 > 0.0 && updates[0].1 < 1.0);
        drop(updates);

        assert_eq!(deck.play_state(), PlayState::Playing);
        assert!(deck.atomics().position() > before);
    }

    #[test]
    fn test_no_report_for_deck_parked_at_start() {
        struct Recorder(Mutex<Vec<f64>>);
        impl PositionListener for Arc<Recorder> {
            fn position_changed(&self, _deck: DeckId, relative: f64) {
                self.0.lock().unwrap().push(relative);
            }
        }

        let (session, mut engine) = create_session(DEFAULT_SAMPLE_RATE);
        let mut monitor = LoopMonitor::new(&session);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        monitor.set_listener(Box::new(Arc::clone(&recorder)));

        // Loaded but never started: the playhead sits at zero
        let deck = session.deck(DeckId::new(0));
        let dir = tempfile::tempdir().unwrap();
        deck.load(&write_clip(dir.path(), 100)).unwrap();

        engine.prepare(DEFAULT_SAMPLE_RATE, 64);
        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);
        assert_eq!(deck.position_relative(), Some(0.0));

        monitor.tick();
        assert!(recorder.0.lock().unwrap().is_empty());
        assert_eq!(deck.play_state(), PlayState::Paused);
    }

    #[test]
    fn test_tick_ignores_empty_decks() {
        let (session, mut engine) = create_session(DEFAULT_SAMPLE_RATE);
        let monitor = LoopMonitor::new(&session);

        monitor.tick();
        engine.prepare(DEFAULT_SAMPLE_RATE, 64);
        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);

        assert_eq!(out.peak(), 0.0);
        assert!(!session.deck(DeckId::new(0)).atomics().is_playing());
    }

    #[test]
    fn test_decks_loop_independently() {
        let (session, mut engine) = create_session(DEFAULT_SAMPLE_RATE);
        let monitor = LoopMonitor::new(&session);
        let a = session.deck(DeckId::new(0));
        let b = session.deck(DeckId::new(1));
        monitor.set_loop_enabled(a.id(), true);

        load_and_play(&a, &mut engine, 100);
        load_and_play(&b, &mut engine, 100);
        run_to_end(&mut engine, &a.atomics());
        run_to_end(&mut engine, &b.atomics());

        monitor.tick();
        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);

        assert_eq!(a.play_state(), PlayState::Playing);
        assert_eq!(b.play_state(), PlayState::Paused);
    }

    #[test]
    fn test_loop_flag_shared_with_host() {
        let (session, _engine) = create_session(DEFAULT_SAMPLE_RATE);
        let monitor = LoopMonitor::new(&session);
        let flag = monitor.loop_flag(DeckId::new(1));

        flag.store(true, Ordering::Relaxed);
        assert!(monitor.loop_enabled(DeckId::new(1)));
    }
}
