//! Memory-resident multi-channel audio assets
//!
//! An [`AudioBuffer`] is the hand-off format between the engine and its
//! collaborators: a codec library produces one from decoded PCM, the offline
//! rendering path produces one as its result, and
//! [`AudioBufferSourceNode`](crate::node::AudioBufferSourceNode) plays one
//! back into the graph.

use std::sync::Arc;

/// Memory-resident audio asset, basically a matrix of `channels x samples`
///
/// An `AudioBuffer` has copy-on-write semantics, so it is cheap to clone.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    channels: Vec<ChannelData>,
    sample_rate: f32,
}

impl AudioBuffer {
    /// Allocate a silent audio buffer with the given channel and sample count
    ///
    /// # Panics
    ///
    /// Panics when `channels` is zero.
    pub fn new(channels: usize, length: usize, sample_rate: f32) -> Self {
        assert!(channels >= 1, "an AudioBuffer must have at least one channel");
        let silence = ChannelData::new(length);

        Self {
            channels: vec![silence; channels],
            sample_rate,
        }
    }

    /// Create a multi-channel buffer from existing channel planes
    ///
    /// # Panics
    ///
    /// Panics when `channels` is empty or the planes have unequal lengths.
    pub fn from_channels(channels: Vec<ChannelData>, sample_rate: f32) -> Self {
        assert!(!channels.is_empty(), "an AudioBuffer must have at least one channel");
        let length = channels[0].len();
        assert!(
            channels.iter().all(|c| c.len() == length),
            "all channel planes must have equal length"
        );

        Self {
            channels,
            sample_rate,
        }
    }

    /// Number of channels in this buffer
    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames per channel
    pub fn length(&self) -> usize {
        self.channels[0].len()
    }

    /// Sample rate of this buffer in Hertz
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.length() as f64 / self.sample_rate as f64
    }

    /// Channel planes as a slice
    pub fn channels(&self) -> &[ChannelData] {
        &self.channels
    }

    /// Get the samples of a specific channel
    ///
    /// Panics if the index is greater than the available number of channels
    pub fn channel_data(&self, index: usize) -> &ChannelData {
        &self.channels[index]
    }

    /// Get the samples of a specific channel (mutable)
    ///
    /// Panics if the index is greater than the available number of channels
    pub fn channel_data_mut(&mut self, index: usize) -> &mut ChannelData {
        &mut self.channels[index]
    }

    /// Copy samples into an existing slice, for channel `channel_number`,
    /// starting at `offset`
    ///
    /// The slice is filled up to its length or the end of the buffer,
    /// whichever comes first.
    pub fn copy_to_channel(&self, destination: &mut [f32], channel_number: usize, offset: usize) {
        let data = self.channels[channel_number].as_slice();
        let available = data.len().saturating_sub(offset);
        let count = available.min(destination.len());
        destination[..count].copy_from_slice(&data[offset..offset + count]);
    }
}

/// Single channel audio samples, wraps an `Arc<Vec<f32>>`
///
/// `ChannelData` has copy-on-write semantics, so it is cheap to clone.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelData {
    data: Arc<Vec<f32>>,
}

impl ChannelData {
    pub fn new(length: usize) -> Self {
        Self {
            data: Arc::new(vec![0.; length]),
        }
    }

    pub fn from(data: Vec<f32>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data[..]
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut Arc::make_mut(&mut self.data)[..]
    }
}
