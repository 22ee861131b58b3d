//! Audio processing code that runs on the audio rendering thread

use std::collections::BTreeMap;

use crossbeam_channel::Sender;

use crate::context::AudioParamId;
use crate::events::EventCallback;
use crate::render::bus::AudioBus;
use crate::render::graph::{Node, NodeIndex};

/// Execution context of one render quantum
///
/// Constructed by the render thread and handed to every processor; the
/// frame/time pair identifies the quantum and never changes within it.
pub struct RenderScope {
    /// First sample frame of this quantum
    pub current_frame: u64,
    /// `current_frame` in seconds
    pub current_time: f64,
    /// Sample rate of the stream in Hertz
    pub sample_rate: f32,
    pub(crate) events: Sender<EventCallback>,
}

impl RenderScope {
    /// Put a callback onto the context event queue
    ///
    /// The queue is drained on a user thread, never on the render thread.
    pub(crate) fn enqueue_event(&self, callback: EventCallback) {
        // the receiver outlives the render thread, but ignore send errors
        // during teardown
        let _ = self.events.send(callback);
    }
}

/// Interface for audio processing code that runs on the audio rendering
/// thread.
///
/// An `AudioProcessor` is constructed together with an
/// [`AudioNode`](crate::node::AudioNode) (the user facing object living on
/// the control thread), see
/// [`BaseAudioContext::register`](crate::context::BaseAudioContext).
pub trait AudioProcessor: Send {
    /// Render one quantum for the given input buses into the output buses
    ///
    /// The return value reports whether the node still holds signal of its
    /// own: a scheduled, playing or finishing source, or a tail still
    /// ringing out. A pure transform of its input returns `false`; it is a
    /// lifecycle report, not a statement about this quantum's buffer
    /// content. The graph reclaims a node only once its control handle is
    /// gone, it reports no remaining signal, and no upstream connection is
    /// left that could feed it.
    fn process(
        &mut self,
        inputs: &[AudioBus],
        outputs: &mut [AudioBus],
        params: AudioParamValues<'_>,
        scope: &RenderScope,
    ) -> bool;

    /// Time in seconds the node keeps producing output after its input (or
    /// its playback) stops, e.g. a reverb or delay tail
    fn tail_time(&self) -> f64 {
        0.
    }

    /// Inherent delay the node introduces, e.g. look-ahead or FIR length
    fn latency_time(&self) -> f64 {
        0.
    }
}

/// Accessor for the current [`AudioParam`](crate::param::AudioParam) values
///
/// Provided to implementations of [`AudioProcessor`] in the render thread.
pub struct AudioParamValues<'a> {
    nodes: &'a BTreeMap<NodeIndex, Node>,
}

impl<'a> AudioParamValues<'a> {
    pub(crate) fn from(nodes: &'a BTreeMap<NodeIndex, Node>) -> Self {
        Self { nodes }
    }

    /// Get the computed values for the given param
    ///
    /// For both A-rate and K-rate params this is a slice of one render
    /// quantum: K-rate values are filled out to the full quantum.
    pub fn get(&self, index: &AudioParamId) -> &[f32] {
        let bus = self.nodes.get(&index.into()).unwrap().get_buffer();
        &bus.channel_data(0)[..]
    }
}
