//! The `ConcreteBaseAudioContext` type

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;

use crate::context::{
    AudioContextRegistration, AudioContextState, AudioNodeId, AudioParamId, BaseAudioContext,
    DESTINATION_NODE_ID,
};
use crate::events::{EventCallback, EventQueue};
use crate::message::ControlMessage;
use crate::node::{
    AudioDestinationNode, AudioNode, ChannelConfig, ChannelConfigOptions, ChannelCountMode,
    ChannelInterpretation,
};
use crate::param::{AudioParam, AudioParamDescriptor, AudioParamEvent};
use crate::render::{AudioProcessor, PARAM_INPUT};
use crate::sampling::{Sampling, SamplingInfo};

/// The concrete context implementation backing both the realtime
/// [`AudioContext`](crate::context::AudioContext) and the
/// [`OfflineAudioContext`](crate::context::OfflineAudioContext)
///
/// Allows for cheap cloning (an `Arc` internally); every node holds one
/// clone through its registration.
#[derive(Clone)]
pub struct ConcreteBaseAudioContext {
    /// inner makes `ConcreteBaseAudioContext` cheap to clone
    inner: Arc<ConcreteBaseAudioContextInner>,
}

impl PartialEq for ConcreteBaseAudioContext {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Inner representation of the `ConcreteBaseAudioContext`
struct ConcreteBaseAudioContextInner {
    /// sample rate in Hertz
    sample_rate: f32,
    /// max number of speaker output channels
    max_channel_count: usize,
    /// incrementing id to assign to audio nodes
    node_id_inc: AtomicU64,
    /// destination node's channel config
    destination_channel_config: ChannelConfig,
    /// message channel from control to render thread
    render_channel: Sender<ControlMessage>,
    /// control messages that cannot be sent immediately
    queued_messages: Mutex<Vec<ControlMessage>>,
    /// the sampling clock, written by the render thread
    sampling: Arc<SamplingInfo>,
    /// producing end of the event queue, for context-level events
    event_sender: Sender<EventCallback>,
    /// consuming end of the event queue, drained by `dispatch_events`
    event_queue: EventQueue,
    /// denotes if this context renders offline
    offline: bool,
    /// current lifecycle state
    state: AtomicU8,
}

impl BaseAudioContext for ConcreteBaseAudioContext {
    fn base(&self) -> &ConcreteBaseAudioContext {
        self
    }

    fn register<
        T: AudioNode,
        F: FnOnce(AudioContextRegistration) -> (T, Box<dyn AudioProcessor>),
    >(
        &self,
        f: F,
    ) -> T {
        // create a unique identifier for this node
        let id = self.inner.node_id_inc.fetch_add(1, Ordering::SeqCst);
        let registration = AudioContextRegistration {
            id: AudioNodeId(id),
            context: self.clone(),
        };

        // create the node and its renderer
        let (node, processor) = (f)(registration);

        // pass the renderer to the audio graph
        let message = ControlMessage::RegisterNode {
            id,
            processor,
            inputs: node.number_of_inputs(),
            outputs: node.number_of_outputs(),
            channel_config: node.channel_config().clone(),
        };
        self.inner.render_channel.send(message).unwrap();
        self.resolve_queued_control_msgs(id);

        node
    }
}

impl ConcreteBaseAudioContext {
    /// Creates a `ConcreteBaseAudioContext` instance and registers its
    /// destination node
    pub(super) fn new(
        sample_rate: f32,
        max_channel_count: usize,
        sampling: Arc<SamplingInfo>,
        render_channel: Sender<ControlMessage>,
        event_sender: Sender<EventCallback>,
        event_queue: EventQueue,
        offline: bool,
    ) -> Self {
        // The destination's mixing configuration is fixed for the lifetime
        // of the context. The node itself is not stored inside the context
        // (that would be a cyclic reference), fresh handles are recreated
        // from this config on demand.
        let destination_channel_config: ChannelConfig = ChannelConfigOptions {
            count: max_channel_count,
            mode: ChannelCountMode::Explicit,
            interpretation: ChannelInterpretation::Speakers,
        }
        .into();

        let inner = ConcreteBaseAudioContextInner {
            sample_rate,
            max_channel_count,
            node_id_inc: AtomicU64::new(0),
            destination_channel_config: destination_channel_config.clone(),
            render_channel,
            queued_messages: Mutex::new(Vec::new()),
            sampling,
            event_sender,
            event_queue,
            offline,
            state: AtomicU8::new(AudioContextState::Suspended as u8),
        };
        let base = Self {
            inner: Arc::new(inner),
        };

        // the root of the graph always takes id 0
        let destination = AudioDestinationNode::new(&base, destination_channel_config);
        debug_assert_eq!(destination.registration().id().0, DESTINATION_NODE_ID);
        drop(destination);

        base
    }

    /// Inform the render thread that a control-thread `AudioNode` no longer
    /// has any handles
    pub(crate) fn mark_node_dropped(&self, id: u64) {
        // the destination is never dropped
        if id != DESTINATION_NODE_ID {
            let message = ControlMessage::FreeWhenFinished { id };

            // Sending the message will fail when the render thread has
            // already shut down. This is fine.
            let _r = self.inner.render_channel.send(message);
        }
    }

    /// `ChannelConfig` of the destination node
    pub(super) fn destination_channel_config(&self) -> ChannelConfig {
        self.inner.destination_channel_config.clone()
    }

    /// Construct an [`AudioParam`], register its processor in the graph and
    /// schedule the hidden connection to its owning node
    pub(crate) fn create_audio_param(
        &self,
        descriptor: AudioParamDescriptor,
        dest: &AudioContextRegistration,
    ) -> (AudioParam, AudioParamId) {
        let param = self.register(|registration| {
            let (param, processor) = AudioParam::new(registration, descriptor);
            (param, Box::new(processor) as Box<dyn AudioProcessor>)
        });

        self.queue_audio_param_connect(&param, dest.id());
        let param_id = AudioParamId(param.registration().id().0);

        (param, param_id)
    }

    /// Schedule the connection of an `AudioParam` to the `AudioNode` it
    /// belongs to
    ///
    /// Not performed immediately as the `AudioNode` is not registered at
    /// this point.
    fn queue_audio_param_connect(&self, param: &AudioParam, audio_node: &AudioNodeId) {
        let message = ControlMessage::ConnectNode {
            from: param.registration().id().0,
            to: audio_node.0,
            output: 0,
            // the 'hidden' port: orders the param before its owner without
            // feeding a summing junction
            input: PARAM_INPUT,
        };
        self.inner.queued_messages.lock().unwrap().push(message);
    }

    /// Release queued control messages that were waiting for the node with
    /// the given `id` to be registered
    fn resolve_queued_control_msgs(&self, id: u64) {
        let mut queued = self.inner.queued_messages.lock().unwrap();
        let mut i = 0;
        while i < queued.len() {
            if matches!(&queued[i], ControlMessage::ConnectNode { to, .. } if *to == id) {
                let message = queued.remove(i);
                self.inner.render_channel.send(message).unwrap();
            } else {
                i += 1;
            }
        }
    }

    /// Connect the output of the `from` audio node to the input of the `to`
    /// audio node
    pub(crate) fn connect(
        &self,
        from: &AudioNodeId,
        to: &AudioNodeId,
        output: usize,
        input: usize,
    ) {
        let message = ControlMessage::ConnectNode {
            from: from.0,
            to: to.0,
            output,
            input,
        };
        self.inner.render_channel.send(message).unwrap();
    }

    /// Disconnect all outputs of the audio node that go to a specific
    /// destination node
    pub(crate) fn disconnect_from(&self, from: &AudioNodeId, to: &AudioNodeId) {
        let message = ControlMessage::DisconnectNode {
            from: from.0,
            to: to.0,
        };
        self.inner.render_channel.send(message).unwrap();
    }

    /// Disconnect all outgoing connections of the audio node
    pub(crate) fn disconnect(&self, from: &AudioNodeId) {
        let message = ControlMessage::DisconnectAll { from: from.0 };
        self.inner.render_channel.send(message).unwrap();
    }

    /// Pass an automation event to the render thread
    ///
    /// This clunky setup (wrapping a `Sender` in a message sent by another
    /// `Sender`) ensures automation events are never handled out of order
    /// with respect to surrounding graph mutations.
    pub(crate) fn pass_audio_param_event(
        &self,
        to: &Sender<AudioParamEvent>,
        event: AudioParamEvent,
    ) {
        let message = ControlMessage::AudioParamEvent {
            to: to.clone(),
            event,
        };
        let _r = self.inner.render_channel.send(message);
    }

    /// Put a callback onto the context event queue
    pub(crate) fn enqueue_event(&self, callback: EventCallback) {
        let _r = self.inner.event_sender.send(callback);
    }

    pub(crate) fn dispatch_events(&self) -> usize {
        self.inner.event_queue.dispatch()
    }

    #[must_use]
    pub(crate) fn state(&self) -> AudioContextState {
        self.inner.state.load(Ordering::SeqCst).into()
    }

    pub(crate) fn set_state(&self, state: AudioContextState) {
        self.inner.state.store(state as u8, Ordering::SeqCst);
    }

    #[must_use]
    pub(crate) fn sample_rate(&self) -> f32 {
        self.inner.sample_rate
    }

    #[must_use]
    pub(crate) fn current_time(&self) -> f64 {
        self.inner.sampling.snapshot().current_time
    }

    pub(crate) fn sampling(&self) -> Sampling {
        self.inner.sampling.snapshot()
    }

    /// Maximum available channels for the audio destination
    #[must_use]
    pub(crate) fn max_channel_count(&self) -> usize {
        self.inner.max_channel_count
    }

    /// Returns true for an `OfflineAudioContext`, false for an
    /// `AudioContext`
    pub(crate) fn offline(&self) -> bool {
        self.inner.offline
    }
}
