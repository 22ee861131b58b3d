//! Control messages, the deferred actions applied at quantum boundaries
//!
//! User threads never touch render state directly: every graph mutation is
//! shipped as a `ControlMessage` and drained by the render thread at the
//! start of a quantum, while it exclusively owns the graph.

use crossbeam_channel::Sender;

use crate::node::ChannelConfig;
use crate::param::AudioParamEvent;
use crate::render::AudioProcessor;

pub(crate) enum ControlMessage {
    /// Add a node to the render graph
    RegisterNode {
        id: u64,
        processor: Box<dyn AudioProcessor>,
        inputs: usize,
        outputs: usize,
        channel_config: ChannelConfig,
    },
    /// Connect an output port to an input port
    ConnectNode {
        from: u64,
        to: u64,
        output: usize,
        input: usize,
    },
    /// Remove all connections between two nodes
    DisconnectNode { from: u64, to: u64 },
    /// Remove all outgoing connections of a node
    DisconnectAll { from: u64 },
    /// The control-thread handle dropped, reclaim the node once it has no
    /// remaining tail
    FreeWhenFinished { id: u64 },
    /// Forward an automation event to a parameter processor
    ///
    /// Wrapping the param's own sender in a message keeps automation in
    /// order with the graph mutations surrounding it.
    AudioParamEvent {
        to: Sender<AudioParamEvent>,
        event: AudioParamEvent,
    },
}
