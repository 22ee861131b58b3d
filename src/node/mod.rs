//! The AudioNode interface and concrete audio nodes

use std::f32::consts::PI;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use lazy_static::lazy_static;

use crate::context::{AudioContextRegistration, ConcreteBaseAudioContext};
use crate::{Error, MAX_CHANNELS};

mod buffer_source;
pub use buffer_source::*;
mod constant_source;
pub use constant_source::*;
mod destination;
pub use destination::*;
mod gain;
pub use gain::*;
mod oscillator;
pub use oscillator::*;

pub(crate) const TABLE_LENGTH_USIZE: usize = 2048;
// 2048 casts without loss of precision, its mantissa is 0b0
#[allow(clippy::cast_precision_loss)]
pub(crate) const TABLE_LENGTH_F32: f32 = TABLE_LENGTH_USIZE as f32;

// Compute one period sine wavetable of size TABLE_LENGTH
lazy_static! {
    pub(crate) static ref SINETABLE: Vec<f32> = {
        #[allow(clippy::cast_precision_loss)]
        // 0 through 2048 are cast without loss of precision
        let table: Vec<f32> = (0..TABLE_LENGTH_USIZE)
            .map(|x| ((x as f32) * 2.0 * PI * (1. / TABLE_LENGTH_F32)).sin())
            .collect();
        table
    };
}

/// How channels are matched between a node's inputs and outputs
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ChannelCountMode {
    /// The computed number of channels is the maximum over the connections
    /// to an input; `channel_count` is ignored
    Max,
    /// As `Max`, then clamped to a maximum of the given `channel_count`
    ClampedMax,
    /// The computed number of channels is exactly `channel_count`
    Explicit,
}

impl From<u32> for ChannelCountMode {
    fn from(i: u32) -> Self {
        use ChannelCountMode::*;

        match i {
            0 => Max,
            1 => ClampedMax,
            2 => Explicit,
            _ => unreachable!(),
        }
    }
}

/// The meaning of the channels, defining how audio up-mixing and
/// down-mixing happens
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ChannelInterpretation {
    /// Channels carry speaker positions, mixing uses the perceptual matrix
    Speakers,
    /// Channels are plain indices, mixing zero-pads or truncates
    Discrete,
}

impl From<u32> for ChannelInterpretation {
    fn from(i: u32) -> Self {
        use ChannelInterpretation::*;

        match i {
            0 => Speakers,
            1 => Discrete,
            _ => unreachable!(),
        }
    }
}

/// Options for constructing a [`ChannelConfig`]
#[derive(Clone, Debug)]
pub struct ChannelConfigOptions {
    pub count: usize,
    pub mode: ChannelCountMode,
    pub interpretation: ChannelInterpretation,
}

impl Default for ChannelConfigOptions {
    fn default() -> Self {
        Self {
            count: 2,
            mode: ChannelCountMode::Max,
            interpretation: ChannelInterpretation::Speakers,
        }
    }
}

/// Channel up/down-mixing configuration of an audio node
///
/// Shared between the control-side node and its renderer; reads on the
/// render thread pick up changes at the next quantum.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    count: Arc<AtomicUsize>,
    mode: Arc<AtomicU32>,
    interpretation: Arc<AtomicU32>,
}

impl ChannelConfig {
    pub fn count_mode(&self) -> ChannelCountMode {
        self.mode.load(Ordering::SeqCst).into()
    }
    fn set_count_mode(&self, v: ChannelCountMode) {
        self.mode.store(v as u32, Ordering::SeqCst)
    }

    pub fn interpretation(&self) -> ChannelInterpretation {
        self.interpretation.load(Ordering::SeqCst).into()
    }
    fn set_interpretation(&self, v: ChannelInterpretation) {
        self.interpretation.store(v as u32, Ordering::SeqCst)
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
    fn set_count(&self, v: usize) {
        assert!(
            v >= 1 && v <= MAX_CHANNELS,
            "channel count must be in 1..={}",
            MAX_CHANNELS
        );
        self.count.store(v, Ordering::SeqCst)
    }
}

impl From<ChannelConfigOptions> for ChannelConfig {
    fn from(opts: ChannelConfigOptions) -> Self {
        ChannelConfig {
            count: Arc::new(AtomicUsize::new(opts.count)),
            mode: Arc::new(AtomicU32::new(opts.mode as u32)),
            interpretation: Arc::new(AtomicU32::new(opts.interpretation as u32)),
        }
    }
}

/// This interface represents audio sources, the audio destination, and
/// intermediate processing modules
///
/// These modules can be connected together to form processing graphs for
/// rendering audio. Each node can have inputs and/or outputs; an input is a
/// summing junction adding together all connected upstream outputs.
///
/// Note that an `AudioNode` is constructed together with an
/// [`AudioProcessor`](crate::render::AudioProcessor), the render-thread
/// object doing the actual signal processing. See
/// [`BaseAudioContext::register`](crate::context::BaseAudioContext::register).
pub trait AudioNode {
    fn registration(&self) -> &AudioContextRegistration;

    fn channel_config(&self) -> &ChannelConfig;

    /// The `ConcreteBaseAudioContext` which owns this node
    fn context(&self) -> &ConcreteBaseAudioContext {
        self.registration().context()
    }

    /// The number of inputs feeding into the node; 0 for source nodes
    fn number_of_inputs(&self) -> usize;

    /// The number of outputs coming out of the node
    fn number_of_outputs(&self) -> usize;

    /// Connect the default output of this node to the default input of
    /// another node
    ///
    /// # Panics
    ///
    /// Panics when connecting nodes of different contexts, or when the
    /// default ports do not exist.
    fn connect<'a>(&self, dest: &'a dyn AudioNode) -> &'a dyn AudioNode {
        self.connect_at(dest, 0, 0).unwrap()
    }

    /// Connect a specific output of this node to a specific input of
    /// another node
    ///
    /// The connection is applied at the next quantum boundary.
    ///
    /// # Panics
    ///
    /// Panics when connecting nodes of different contexts.
    fn connect_at<'a>(
        &self,
        dest: &'a dyn AudioNode,
        output: usize,
        input: usize,
    ) -> Result<&'a dyn AudioNode, Error> {
        if self.context() != dest.context() {
            panic!("attempting to connect nodes from different contexts");
        }
        if output >= self.number_of_outputs() {
            return Err(Error::InvalidIndex {
                index: output,
                available: self.number_of_outputs(),
            });
        }
        if input >= dest.number_of_inputs() {
            return Err(Error::InvalidIndex {
                index: input,
                available: dest.number_of_inputs(),
            });
        }

        self.context()
            .connect(self.registration().id(), dest.registration().id(), output, input);

        Ok(dest)
    }

    /// Disconnect all outputs of this node going to a specific destination
    ///
    /// # Panics
    ///
    /// Panics when disconnecting nodes of different contexts.
    fn disconnect<'a>(&self, dest: &'a dyn AudioNode) -> &'a dyn AudioNode {
        if self.context() != dest.context() {
            panic!("attempting to disconnect nodes from different contexts");
        }

        self.context()
            .disconnect_from(self.registration().id(), dest.registration().id());

        dest
    }

    /// Disconnect all outgoing connections of this node
    fn disconnect_all(&self) {
        self.context().disconnect(self.registration().id());
    }

    fn channel_count_mode(&self) -> ChannelCountMode {
        self.channel_config().count_mode()
    }
    fn set_channel_count_mode(&self, v: ChannelCountMode) {
        self.channel_config().set_count_mode(v)
    }

    fn channel_interpretation(&self) -> ChannelInterpretation {
        self.channel_config().interpretation()
    }
    fn set_channel_interpretation(&self, v: ChannelInterpretation) {
        self.channel_config().set_interpretation(v)
    }

    /// Number of channels used when up-mixing and down-mixing inputs, in
    /// combination with the count mode
    fn channel_count(&self) -> usize {
        self.channel_config().count()
    }
    fn set_channel_count(&self, v: usize) {
        self.channel_config().set_count(v)
    }
}

/// Interface of source nodes: playback scheduling and lifecycle callbacks
///
/// A source emits silence before it is started and after it has ended; once
/// stopped, it cannot be restarted.
pub trait AudioScheduledSourceNode: AudioNode {
    /// Start playback immediately
    fn start(&self);

    /// Schedule playback start, `when` in absolute context time (seconds)
    fn start_at(&self, when: f64) -> Result<(), Error>;

    /// Stop playback immediately
    fn stop(&self);

    /// Schedule playback stop, `when` in absolute context time (seconds)
    fn stop_at(&self, when: f64) -> Result<(), Error>;

    /// Register a callback run when playback effectively starts, receiving
    /// the requested start time
    fn set_onstart(&self, callback: Box<dyn FnOnce(f64) + Send + 'static>);

    /// Register a callback run exactly once when the source has finished
    fn set_onended(&self, callback: Box<dyn FnOnce() + Send + 'static>);
}
