//! The realtime `AudioContext` type

use std::sync::Arc;

use crate::context::{AudioContextState, BaseAudioContext, ConcreteBaseAudioContext};
use crate::events::EventQueue;
use crate::render::RenderThread;
use crate::sampling::SamplingInfo;

/// Stream configuration the audio driver was opened with
#[derive(Copy, Clone, Debug)]
pub struct AudioContextOptions {
    /// Sample rate of the stream in Hertz
    pub sample_rate: f32,
    /// Number of output channels the device consumes
    pub number_of_channels: usize,
}

impl Default for AudioContextOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.,
            number_of_channels: 2,
        }
    }
}

/// A context whose graph is rendered under an external audio driver
///
/// Constructing the context yields a [`RenderCallback`] alongside it; the
/// driver collaborator moves the callback to its realtime thread and invokes
/// it for every period. The context itself stays on the control thread(s)
/// for building the graph.
///
/// ```
/// use soundgraph::context::{AudioContext, AudioContextOptions, BaseAudioContext};
/// use soundgraph::node::{AudioNode, AudioScheduledSourceNode};
///
/// let (context, mut callback) = AudioContext::new(AudioContextOptions::default());
///
/// let osc = context.create_oscillator();
/// osc.connect(&context.destination());
/// osc.start();
///
/// // the driver thread does this periodically:
/// let mut period = vec![0.; 2 * 480];
/// callback.render(&mut period);
/// ```
pub struct AudioContext {
    base: ConcreteBaseAudioContext,
}

/// Render entry of a realtime context, driven by the audio driver
pub struct RenderCallback {
    thread: RenderThread,
    number_of_channels: usize,
    sample_rate: f32,
}

impl RenderCallback {
    /// Fill `output` (interleaved by frame) with the next rendered frames
    ///
    /// Any frame count is accepted; `output.len()` must be a multiple of the
    /// configured channel count. The graph renders in whole quanta, frames
    /// beyond the requested count are buffered for the next call.
    pub fn render(&mut self, output: &mut [f32]) {
        debug_assert_eq!(output.len() % self.number_of_channels, 0);
        self.thread.render(output);
    }

    pub fn number_of_channels(&self) -> usize {
        self.number_of_channels
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

impl BaseAudioContext for AudioContext {
    fn base(&self) -> &ConcreteBaseAudioContext {
        &self.base
    }
}

impl AudioContext {
    /// Create a realtime context and the callback to hand to the driver
    pub fn new(options: AudioContextOptions) -> (Self, RenderCallback) {
        let AudioContextOptions {
            sample_rate,
            number_of_channels,
        } = options;
        assert!(sample_rate > 0., "sample rate must be positive");
        assert!(number_of_channels >= 1, "need at least one output channel");

        let (sender, receiver) = crossbeam_channel::unbounded();
        let (event_sender, event_queue) = EventQueue::new();
        let sampling = Arc::new(SamplingInfo::new(sample_rate));

        let thread = RenderThread::new(
            sample_rate,
            number_of_channels,
            Arc::clone(&sampling),
            receiver,
            event_sender.clone(),
        );

        let base = ConcreteBaseAudioContext::new(
            sample_rate,
            number_of_channels,
            sampling,
            sender,
            event_sender,
            event_queue,
            false,
        );
        base.set_state(AudioContextState::Running);

        let callback = RenderCallback {
            thread,
            number_of_channels,
            sample_rate,
        };

        (Self { base }, callback)
    }
}
