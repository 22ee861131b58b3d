//! The `BaseAudioContext` interface and the engine's execution contexts

use crate::buffer::AudioBuffer;
use crate::node;
use crate::param::{AudioParam, AudioParamDescriptor};
use crate::render::AudioProcessor;
use crate::sampling::Sampling;

mod concrete_base;
mod offline;
mod online;

pub use concrete_base::ConcreteBaseAudioContext;
pub use offline::OfflineAudioContext;
pub use online::{AudioContext, AudioContextOptions, RenderCallback};

/// Node id of the destination node, the root of every render graph
pub(crate) const DESTINATION_NODE_ID: u64 = 0;

/// Describes the current state of a context
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AudioContextState {
    /// The context is not (or no longer) processing audio
    Suspended,
    /// Audio is being processed
    Running,
    /// The context has been released and can no longer process audio
    Closed,
}

impl From<u8> for AudioContextState {
    fn from(value: u8) -> Self {
        match value {
            0 => AudioContextState::Suspended,
            1 => AudioContextState::Running,
            2 => AudioContextState::Closed,
            _ => unreachable!(),
        }
    }
}

/// Unique identifier of an `AudioNode` within its context, used for internal
/// bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioNodeId(pub(crate) u64);

/// Identifier of an [`AudioParam`]'s render-side processor
///
/// Handed to the owning node's renderer so it can look up the computed
/// parameter values each quantum, see
/// [`AudioParamValues`](crate::render::AudioParamValues).
#[derive(Debug)]
pub struct AudioParamId(pub(crate) u64);

/// Handle binding an `AudioNode` to its context
///
/// Dropping the registration informs the render thread that the node has no
/// control-side handles anymore and may be reclaimed once it has finished.
pub struct AudioContextRegistration {
    id: AudioNodeId,
    context: ConcreteBaseAudioContext,
}

impl AudioContextRegistration {
    pub(crate) fn id(&self) -> &AudioNodeId {
        &self.id
    }

    pub(crate) fn context(&self) -> &ConcreteBaseAudioContext {
        &self.context
    }
}

impl Drop for AudioContextRegistration {
    fn drop(&mut self) {
        self.context.mark_node_dropped(self.id.0);
    }
}

/// The interface representing an audio-processing graph built from audio
/// nodes linked together
///
/// A context controls both the creation of its nodes and the execution of
/// the audio processing or decoding.
pub trait BaseAudioContext {
    /// The concrete context backing this interface
    fn base(&self) -> &ConcreteBaseAudioContext;

    /// Construct an audio node and its render-side processor
    ///
    /// The closure receives the node's [`AudioContextRegistration`]; the
    /// returned processor is shipped to the render thread.
    fn register<
        T: node::AudioNode,
        F: FnOnce(AudioContextRegistration) -> (T, Box<dyn AudioProcessor>),
    >(
        &self,
        f: F,
    ) -> T {
        self.base().register(f)
    }

    /// Construct an [`AudioParam`] owned by the node behind `dest`
    fn create_audio_param(
        &self,
        descriptor: AudioParamDescriptor,
        dest: &AudioContextRegistration,
    ) -> (AudioParam, AudioParamId) {
        self.base().create_audio_param(descriptor, dest)
    }

    /// The destination node of this context, routing all audio to the
    /// device (or the offline buffer)
    fn destination(&self) -> node::AudioDestinationNode {
        let registration = AudioContextRegistration {
            id: AudioNodeId(DESTINATION_NODE_ID),
            context: self.base().clone(),
        };
        node::AudioDestinationNode::attach(registration, self.base().destination_channel_config())
    }

    /// Create an `OscillatorNode`, a source producing a periodic waveform
    fn create_oscillator(&self) -> node::OscillatorNode {
        node::OscillatorNode::new(self.base(), node::OscillatorOptions::default())
    }

    /// Create a `GainNode`, scaling its input by a (possibly automated)
    /// factor
    fn create_gain(&self) -> node::GainNode {
        node::GainNode::new(self.base(), node::GainOptions::default())
    }

    /// Create a `ConstantSourceNode`, a source of a constant (possibly
    /// automated) value
    fn create_constant_source(&self) -> node::ConstantSourceNode {
        node::ConstantSourceNode::new(self.base(), node::ConstantSourceOptions::default())
    }

    /// Create an `AudioBufferSourceNode`, playing back an in-memory asset
    fn create_buffer_source(&self) -> node::AudioBufferSourceNode {
        node::AudioBufferSourceNode::new(self.base(), node::AudioBufferSourceOptions::default())
    }

    /// Create a silent [`AudioBuffer`] with the given shape
    fn create_buffer(
        &self,
        number_of_channels: usize,
        length: usize,
        sample_rate: f32,
    ) -> AudioBuffer {
        AudioBuffer::new(number_of_channels, length, sample_rate)
    }

    /// The sample rate at which the context handles audio, in Hertz
    fn sample_rate(&self) -> f32 {
        self.base().sample_rate()
    }

    /// Time in seconds of the sample frame immediately following the block
    /// most recently processed by the rendering graph
    ///
    /// Lock-free, readable from any thread.
    fn current_time(&self) -> f64 {
        self.base().current_time()
    }

    /// Consistent snapshot of the sampling clock
    fn sampling(&self) -> Sampling {
        self.base().sampling()
    }

    /// Current lifecycle state of the context
    fn state(&self) -> AudioContextState {
        self.base().state()
    }

    /// Run the queued user callbacks (`onended`, `onstart`, completion) on
    /// the calling thread, in the order the render thread emitted them
    ///
    /// Returns the number of callbacks dispatched.
    fn dispatch_events(&self) -> usize {
        self.base().dispatch_events()
    }
}
