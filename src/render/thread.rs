//! Operations running off the system-level audio callback

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::buffer::{AudioBuffer, ChannelData};
use crate::events::EventCallback;
use crate::message::ControlMessage;
use crate::node::ChannelInterpretation;
use crate::render::bus::{Alloc, AudioBus};
use crate::render::graph::{Graph, NodeIndex};
use crate::render::processor::RenderScope;
use crate::sampling::SamplingInfo;
use crate::RENDER_QUANTUM_SIZE;

/// Size of the channel-data pool, enough for typical graphs to render
/// without allocating
const POOL_CAPACITY: usize = 64;

/// The render-side root of a context: owns the graph, drains deferred
/// actions at quantum boundaries and advances the sampling clock
pub(crate) struct RenderThread {
    graph: Graph,
    sample_rate: f32,
    number_of_channels: usize,
    sampling: Arc<SamplingInfo>,
    receiver: Receiver<ControlMessage>,
    events: Sender<EventCallback>,
    /// partially consumed quantum, for driver buffers that are not a
    /// multiple of the quantum size
    carry: Option<(AudioBus, usize)>,
}

impl RenderThread {
    pub fn new(
        sample_rate: f32,
        number_of_channels: usize,
        sampling: Arc<SamplingInfo>,
        receiver: Receiver<ControlMessage>,
        events: Sender<EventCallback>,
    ) -> Self {
        Self {
            graph: Graph::new(Alloc::with_capacity(POOL_CAPACITY)),
            sample_rate,
            number_of_channels,
            sampling,
            receiver,
            events,
            carry: None,
        }
    }

    /// Apply deferred actions; the graph is exclusively ours at this point
    fn handle_control_messages(&mut self) {
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                ControlMessage::RegisterNode {
                    id,
                    processor,
                    inputs,
                    outputs,
                    channel_config,
                } => {
                    self.graph
                        .add_node(NodeIndex(id), processor, inputs, outputs, channel_config);
                }
                ControlMessage::ConnectNode {
                    from,
                    to,
                    output,
                    input,
                } => {
                    self.graph
                        .add_edge((NodeIndex(from), output), (NodeIndex(to), input));
                }
                ControlMessage::DisconnectNode { from, to } => {
                    self.graph.remove_edge(NodeIndex(from), NodeIndex(to));
                }
                ControlMessage::DisconnectAll { from } => {
                    self.graph.remove_edges_from(NodeIndex(from));
                }
                ControlMessage::FreeWhenFinished { id } => {
                    self.graph.mark_free_when_finished(NodeIndex(id));
                }
                ControlMessage::AudioParamEvent { to, event } => {
                    // forward to the param processor, in order
                    let _ = to.send(event);
                }
            }
        }
    }

    /// Render the next quantum, mixed to the device channel count
    fn render_quantum(&mut self) -> AudioBus {
        self.handle_control_messages();

        let frame = self.sampling.current_frame();
        // the clock advances up front: `current_time` observed elsewhere
        // refers to the frame following the block being rendered
        self.sampling.advance(RENDER_QUANTUM_SIZE as u64);

        let scope = RenderScope {
            current_frame: frame,
            current_time: frame as f64 / self.sample_rate as f64,
            sample_rate: self.sample_rate,
            events: self.events.clone(),
        };

        let mut bus = self.graph.render(&scope).clone();
        bus.mix(self.number_of_channels, ChannelInterpretation::Speakers);
        bus
    }

    /// Fill an interleaved driver buffer of any frame count
    ///
    /// Quanta are rendered whole; frames the driver did not ask for stay
    /// buffered for the next callback.
    pub fn render(&mut self, buffer: &mut [f32]) {
        let channels = self.number_of_channels;
        let mut remaining = buffer;

        loop {
            let wanted = remaining.len() / channels;
            if wanted == 0 {
                break;
            }

            let (bus, consumed) = match self.carry.take() {
                Some(carry) => carry,
                None => (self.render_quantum(), 0),
            };

            let available = RENDER_QUANTUM_SIZE - consumed;
            let frames = wanted.min(available);

            let chunk = std::mem::take(&mut remaining);
            let (head, rest) = chunk.split_at_mut(frames * channels);
            remaining = rest;

            for channel in 0..channels {
                let plane = bus.channel_data(channel);
                for (frame, sample) in plane[consumed..consumed + frames].iter().enumerate() {
                    head[frame * channels + channel] = *sample;
                }
            }

            if frames < available {
                self.carry = Some((bus, consumed + frames));
            }
        }
    }

    /// Render `length` frames synchronously, as fast as possible
    pub fn render_offline(&mut self, length: usize) -> AudioBuffer {
        let channels = self.number_of_channels;
        let mut planes: Vec<Vec<f32>> = vec![Vec::with_capacity(length); channels];

        let mut rendered = 0;
        while rendered < length {
            let bus = self.render_quantum();
            let frames = RENDER_QUANTUM_SIZE.min(length - rendered);
            for (channel, plane) in planes.iter_mut().enumerate() {
                plane.extend_from_slice(&bus.channel_data(channel)[..frames]);
            }
            rendered += frames;
        }

        let channels = planes.into_iter().map(ChannelData::from).collect();
        AudioBuffer::from_channels(channels, self.sample_rate)
    }
}
