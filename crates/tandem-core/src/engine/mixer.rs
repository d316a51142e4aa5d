//! Mixer - sums the two deck outputs into the master buffer
//!
//! Level control lives entirely in the decks: each deck applies its own
//! gain while rendering, and the crossfader works by overwriting both deck
//! gains (see the crossfade command handler). The mixer's job is the sum,
//! plus fault containment: a channel whose render pass fails contributes
//! silence for that buffer and the other channel is unaffected.
//!
//! Channel rendering runs in parallel via Rayon; the summing pass is
//! sequential.

use rayon::prelude::*;
use thiserror::Error;

use crate::types::{StereoBuffer, NUM_DECKS};

/// A channel's render pass could not produce audio for this buffer
///
/// The mixer substitutes silence for the faulted channel and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("channel failed to render")]
pub struct ChannelFault;

/// One input channel of the mixer
///
/// Decks implement this; tests substitute stubs to exercise the mixer's
/// fault handling without a real transport behind it.
pub trait MixerChannel {
    /// Fill `output` with this channel's next buffer of audio
    fn render(&mut self, output: &mut StereoBuffer) -> Result<(), ChannelFault>;
}

/// Two-channel summing mixer
///
/// Owns pre-allocated per-channel scratch buffers so the render path never
/// allocates.
pub struct Mixer {
    /// Scratch buffers the channels render into
    channel_buffers: [StereoBuffer; NUM_DECKS],
}

impl Mixer {
    /// Create a mixer with scratch capacity for `max_frames` per buffer
    pub fn new(max_frames: usize) -> Self {
        Self {
            channel_buffers: std::array::from_fn(|_| StereoBuffer::silence(max_frames)),
        }
    }

    /// Render both channels and sum them into `output`
    ///
    /// Phase 1 renders each channel into its scratch buffer in parallel,
    /// substituting silence if a channel faults. Phase 2 sums the scratch
    /// buffers sequentially. No normalization or clipping control; overall
    /// loudness is the operator's business via the gains and crossfader.
    pub fn process<D>(&mut self, channels: &mut [D; NUM_DECKS], output: &mut StereoBuffer)
    where
        D: MixerChannel + Send,
    {
        let frames = output.len();
        for buffer in &mut self.channel_buffers {
            buffer.set_len_from_capacity(frames);
        }

        self.channel_buffers
            .par_iter_mut()
            .zip(channels.par_iter_mut())
            .for_each(|(buffer, channel)| {
                if channel.render(buffer).is_err() {
                    buffer.fill_silence();
                }
            });

        output.fill_silence();
        for buffer in &self.channel_buffers {
            output.add_buffer(buffer);
        }
    }
}
