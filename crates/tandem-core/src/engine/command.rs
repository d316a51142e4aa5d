//! Lock-free command queue between the control domain and the audio thread
//!
//! Control-side calls (UI, loop monitor) never touch engine state directly.
//! They validate their inputs, then push a command onto a bounded `rtrb`
//! ring buffer; the audio thread drains the queue at the start of each
//! buffer, before any samples are rendered.
//!
//! Two properties fall out of this arrangement:
//! - Commands apply in submission order, each at a buffer boundary, so no
//!   command takes effect mid-buffer.
//! - A crossfade update changes both deck gains in the same drain pass, so
//!   no rendered buffer ever observes one side moved and the other not.
//!
//! Both push and pop are wait-free and allocation-free, which keeps the
//! audio callback free of locks and the control side free of audio-thread
//! stalls.

use basedrop::Shared;

use crate::track::Track;

/// Commands sent from the control domain to the audio thread
///
/// Each variant is an atomic operation on the engine. Track payloads travel
/// as `Shared<Track>` so the displaced track can be dropped on the audio
/// thread without freeing memory there.
pub enum EngineCommand {
    /// Put a decoded track on a deck, replacing whatever was loaded
    ///
    /// Resets the deck to paused at position zero. The previous track's
    /// handle is released on the audio thread and reclaimed by the GC
    /// thread.
    Load { deck: usize, track: Shared<Track> },
    /// Remove the track from a deck, returning it to the empty state
    Unload { deck: usize },

    /// Start playback from the current position
    Play { deck: usize },
    /// Freeze the playhead at the current position
    Pause { deck: usize },
    /// Move the playhead to an absolute frame position
    Seek { deck: usize, frame: f64 },

    /// Set a deck's output gain (validated to [0, 1] before enqueueing)
    SetGain { deck: usize, gain: f32 },
    /// Set a deck's playback speed ratio (validated to (0, 5] before
    /// enqueueing)
    SetSpeed { deck: usize, speed: f64 },

    /// Move the crossfader: deck A gets `1 - value`, deck B gets `value`
    ///
    /// A single command for both gains so the pair always changes together.
    SetCrossfade { value: f32 },
}

/// Capacity of the command queue
///
/// Control traffic is human-scale (fader moves, button presses) plus one
/// monitor tick per deck every 100ms. 256 gives generous headroom; a full
/// queue surfaces as a `QueueFull` error on the control side rather than
/// blocking.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create a new command channel (producer/consumer pair)
///
/// The producer belongs to the control domain, the consumer to the audio
/// thread. Bounded at [`COMMAND_QUEUE_CAPACITY`] commands.
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_channel_roundtrip() {
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::Play { deck: 0 }).unwrap();

        let cmd = rx.pop().unwrap();
        assert!(matches!(cmd, EngineCommand::Play { deck: 0 }));
    }

    #[test]
    fn test_command_channel_empty() {
        let (_tx, mut rx) = command_channel();
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_commands_preserve_order() {
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::SetCrossfade { value: 0.2 }).unwrap();
        tx.push(EngineCommand::SetCrossfade { value: 0.8 }).unwrap();

        assert!(matches!(rx.pop().unwrap(), EngineCommand::SetCrossfade { value } if value == 0.2));
        assert!(matches!(rx.pop().unwrap(), EngineCommand::SetCrossfade { value } if value == 0.8));
    }

    #[test]
    fn test_push_fails_when_full() {
        let (mut tx, _rx) = command_channel();

        for _ in 0..COMMAND_QUEUE_CAPACITY {
            tx.push(EngineCommand::Pause { deck: 1 }).unwrap();
        }
        assert!(tx.push(EngineCommand::Pause { deck: 1 }).is_err());
    }

    #[test]
    fn test_command_size() {
        // Keep the command enum small so the ring buffer stays cache-friendly.
        // The largest variant is Load (deck + Shared pointer).
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 32, "EngineCommand is {} bytes, expected <= 32", size);
    }
}
