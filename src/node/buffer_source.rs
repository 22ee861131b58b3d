use std::sync::Arc;

use crossbeam_channel::{self, Receiver, Sender};

use crate::buffer::AudioBuffer;
use crate::context::{AudioContextRegistration, BaseAudioContext};
use crate::control::{NodeScheduler, SchedulerHandle};
use crate::render::{AudioBus, AudioParamValues, AudioProcessor, RenderScope};
use crate::{AtomicF64, Error};

use super::{AudioNode, AudioScheduledSourceNode, ChannelConfig, ChannelConfigOptions};

/// Options for constructing an [`AudioBufferSourceNode`]
#[derive(Clone, Debug, Default)]
pub struct AudioBufferSourceOptions {
    pub buffer: Option<AudioBuffer>,
}

/// A source playing back an in-memory [`AudioBuffer`], e.g. a decoded sound
/// file
///
/// The buffer is played as-is, one buffer frame per context frame; supplying
/// content at the context sample rate is the caller's concern.
///
/// # Usage
///
/// ```
/// use soundgraph::buffer::{AudioBuffer, ChannelData};
/// use soundgraph::context::{BaseAudioContext, OfflineAudioContext};
/// use soundgraph::node::{AudioNode, AudioScheduledSourceNode};
///
/// let mut context = OfflineAudioContext::new(1, 1024, 48_000.);
///
/// // normally produced by a codec library
/// let pcm = AudioBuffer::from_channels(vec![ChannelData::from(vec![0.5; 512])], 48_000.);
///
/// let mut src = context.create_buffer_source();
/// src.set_buffer(pcm);
/// src.connect(&context.destination());
/// src.start();
/// ```
pub struct AudioBufferSourceNode {
    registration: AudioContextRegistration,
    channel_config: ChannelConfig,
    buffer: Option<AudioBuffer>,
    buffer_time: Arc<AtomicF64>,
    scheduler: SchedulerHandle,
    /// channel between control and renderer parts (sender side)
    sender: Sender<AudioBuffer>,
}

impl AudioNode for AudioBufferSourceNode {
    fn registration(&self) -> &AudioContextRegistration {
        &self.registration
    }

    fn channel_config(&self) -> &ChannelConfig {
        &self.channel_config
    }

    fn number_of_inputs(&self) -> usize {
        0
    }

    fn number_of_outputs(&self) -> usize {
        1
    }
}

impl AudioScheduledSourceNode for AudioBufferSourceNode {
    fn start(&self) {
        let when = self.registration.context().current_time();
        let _ = self.scheduler.start_at(when, when);
    }

    fn start_at(&self, when: f64) -> Result<(), Error> {
        let now = self.registration.context().current_time();
        self.scheduler.start_at(when, now)
    }

    fn stop(&self) {
        let when = self.registration.context().current_time();
        let _ = self.scheduler.stop_at(when, when);
    }

    fn stop_at(&self, when: f64) -> Result<(), Error> {
        let now = self.registration.context().current_time();
        self.scheduler.stop_at(when, now)
    }

    fn set_onstart(&self, callback: Box<dyn FnOnce(f64) + Send + 'static>) {
        self.scheduler.set_onstart(callback);
    }

    fn set_onended(&self, callback: Box<dyn FnOnce() + Send + 'static>) {
        self.scheduler.set_onended(callback);
    }
}

impl AudioBufferSourceNode {
    pub fn new<C: BaseAudioContext>(context: &C, options: AudioBufferSourceOptions) -> Self {
        let AudioBufferSourceOptions { buffer } = options;

        let mut node = context.register(move |registration| {
            let (scheduler, node_scheduler) = SchedulerHandle::new(context.sample_rate());
            let (sender, receiver) = crossbeam_channel::bounded(1);

            let renderer = AudioBufferSourceRenderer {
                buffer: None,
                receiver,
                scheduler: node_scheduler,
                position: 0,
                buffer_time: Arc::new(AtomicF64::new(0.)),
            };
            let buffer_time = Arc::clone(&renderer.buffer_time);

            let node = Self {
                registration,
                channel_config: ChannelConfigOptions::default().into(),
                buffer: None,
                buffer_time,
                scheduler,
                sender,
            };

            (node, Box::new(renderer) as Box<dyn AudioProcessor>)
        });

        // the renderer is in the graph now, we can send it messages
        if let Some(buffer) = buffer {
            node.set_buffer(buffer);
        }

        node
    }

    /// Current buffer value (nullable)
    pub fn buffer(&self) -> Option<&AudioBuffer> {
        self.buffer.as_ref()
    }

    /// Provide an [`AudioBuffer`] as the source of data to be played back
    ///
    /// # Panics
    ///
    /// Panics if a buffer has already been given (through `new` or through
    /// `set_buffer`)
    pub fn set_buffer(&mut self, audio_buffer: AudioBuffer) {
        assert!(
            self.buffer.is_none(),
            "InvalidStateError: cannot assign the buffer twice",
        );

        let clone = audio_buffer.clone();
        self.buffer = Some(audio_buffer);

        self.sender
            .send(clone)
            .expect("sending the buffer to the node renderer failed");
    }

    /// Current playhead position in seconds within the buffer
    ///
    /// Updated at the end of each render quantum.
    pub fn position(&self) -> f64 {
        self.buffer_time.load()
    }
}

struct AudioBufferSourceRenderer {
    buffer: Option<AudioBuffer>,
    /// channel between control and renderer parts (receiver side)
    receiver: Receiver<AudioBuffer>,
    scheduler: NodeScheduler,
    /// buffer frames consumed so far
    position: usize,
    buffer_time: Arc<AtomicF64>,
}

impl AudioProcessor for AudioBufferSourceRenderer {
    fn process(
        &mut self,
        _inputs: &[AudioBus],
        outputs: &mut [AudioBus],
        _params: AudioParamValues<'_>,
        scope: &RenderScope,
    ) -> bool {
        let output = &mut outputs[0];

        // check if a buffer was sent from the control thread
        if let Ok(buffer) = self.receiver.try_recv() {
            self.buffer = Some(buffer);
        }

        let tail_frames =
            ((self.tail_time() + self.latency_time()) * scope.sample_rate as f64).round() as u64;
        let span = self.scheduler.update(scope, tail_frames);
        if span.length == 0 {
            output.make_silent();
            return self.scheduler.is_active();
        }

        let buffer = match &self.buffer {
            Some(buffer) => buffer,
            None => {
                // keep waiting for a buffer
                output.make_silent();
                return self.scheduler.is_active();
            }
        };

        // a buffer ending inside this quantum stops the source at the exact
        // frame, so the ended event fires without an explicit stop()
        let remaining = buffer.length().saturating_sub(self.position);
        if remaining < span.length {
            let end = scope.current_frame + (span.offset + remaining) as u64;
            self.scheduler.stop_frame(end);
        }

        output.set_number_of_channels(buffer.number_of_channels());
        for channel_number in 0..buffer.number_of_channels() {
            let data = buffer.channel_data(channel_number).as_slice();
            let channel = output.channel_data_mut(channel_number);
            for i in 0..span.length {
                channel[span.offset + i] = data.get(self.position + i).copied().unwrap_or(0.);
            }
        }

        self.position += span.length;
        let played = self.position.min(buffer.length());
        self.buffer_time
            .store(played as f64 / buffer.sample_rate() as f64);

        span.apply(output);
        self.scheduler.is_active()
    }
}
