use crate::context::{AudioContextRegistration, AudioParamId, BaseAudioContext};
use crate::control::{NodeScheduler, SchedulerHandle};
use crate::param::{AudioParam, AudioParamDescriptor, AutomationRate};
use crate::render::{AudioBus, AudioParamValues, AudioProcessor, RenderScope};
use crate::Error;

use super::{
    AudioNode, AudioScheduledSourceNode, ChannelConfig, ChannelConfigOptions, SINETABLE,
    TABLE_LENGTH_F32, TABLE_LENGTH_USIZE,
};

/// Options for constructing an [`OscillatorNode`]
#[derive(Clone, Debug)]
pub struct OscillatorOptions {
    /// The fundamental frequency in Hertz
    pub frequency: f32,
    /// channel config options
    pub channel_config: ChannelConfigOptions,
}

impl Default for OscillatorOptions {
    fn default() -> Self {
        Self {
            frequency: 440.,
            channel_config: ChannelConfigOptions::default(),
        }
    }
}

/// A source generating a sine wave at a (possibly automated) frequency
///
/// The waveform is read from a shared wavetable with linear interpolation.
///
/// # Usage
///
/// ```
/// use soundgraph::context::{BaseAudioContext, OfflineAudioContext};
/// use soundgraph::node::{AudioNode, AudioScheduledSourceNode};
///
/// let mut context = OfflineAudioContext::new(1, 48_000, 48_000.);
///
/// let osc = context.create_oscillator();
/// osc.frequency().set_value(200.);
/// osc.connect(&context.destination());
/// osc.start();
/// ```
pub struct OscillatorNode {
    registration: AudioContextRegistration,
    channel_config: ChannelConfig,
    frequency: AudioParam,
    scheduler: SchedulerHandle,
}

impl AudioNode for OscillatorNode {
    fn registration(&self) -> &AudioContextRegistration {
        &self.registration
    }

    fn channel_config(&self) -> &ChannelConfig {
        &self.channel_config
    }

    /// `OscillatorNode` is a source node, it has no inputs
    fn number_of_inputs(&self) -> usize {
        0
    }

    /// `OscillatorNode` is a mono source node
    fn number_of_outputs(&self) -> usize {
        1
    }
}

impl AudioScheduledSourceNode for OscillatorNode {
    fn start(&self) {
        let when = self.registration.context().current_time();
        // starting at the current time cannot be rejected
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

impl OscillatorNode {
    pub fn new<C: BaseAudioContext>(context: &C, options: OscillatorOptions) -> Self {
        context.register(move |registration| {
            let sample_rate = context.sample_rate();
            let nyquist = sample_rate / 2.;

            let OscillatorOptions {
                frequency,
                channel_config,
            } = options;

            let freq_param_options = AudioParamDescriptor {
                automation_rate: AutomationRate::A,
                default_value: 440.,
                min_value: -nyquist,
                max_value: nyquist,
            };
            let (f_param, f_proc) = context.create_audio_param(freq_param_options, &registration);
            f_param.set_value(frequency);

            let (scheduler, node_scheduler) = SchedulerHandle::new(sample_rate);

            let renderer = OscillatorRenderer {
                frequency: f_proc,
                scheduler: node_scheduler,
                phase: 0.,
            };

            let node = Self {
                registration,
                channel_config: channel_config.into(),
                frequency: f_param,
                scheduler,
            };

            (node, Box::new(renderer) as Box<dyn AudioProcessor>)
        })
    }

    /// A-rate [`AudioParam`] defining the fundamental frequency of the
    /// oscillator, expressed in Hertz
    pub fn frequency(&self) -> &AudioParam {
        &self.frequency
    }
}

/// Rendering component of the oscillator node
struct OscillatorRenderer {
    frequency: AudioParamId,
    scheduler: NodeScheduler,
    /// normalized phase in [0, 1)
    phase: f64,
}

impl AudioProcessor for OscillatorRenderer {
    fn process(
        &mut self,
        _inputs: &[AudioBus],
        outputs: &mut [AudioBus],
        params: AudioParamValues<'_>,
        scope: &RenderScope,
    ) -> bool {
        // single output, 1 channel
        let output = &mut outputs[0];

        // the node is finished once its tail and latency have elapsed
        let tail_frames =
            ((self.tail_time() + self.latency_time()) * scope.sample_rate as f64).round() as u64;
        let span = self.scheduler.update(scope, tail_frames);
        if span.length == 0 {
            output.make_silent();
            return self.scheduler.is_active();
        }

        output.set_number_of_channels(1);

        let frequency_values = params.get(&self.frequency);
        let sample_rate = scope.sample_rate as f64;

        {
            let channel = output.channel_data_mut(0);
            for i in span.offset..span.offset + span.length {
                let position = self.phase * TABLE_LENGTH_F32 as f64;
                let index = position as usize;
                let frac = (position - index as f64) as f32;
                let left = SINETABLE[index];
                let right = SINETABLE[(index + 1) % TABLE_LENGTH_USIZE];
                channel[i] = left + frac * (right - left);

                self.phase += frequency_values[i] as f64 / sample_rate;
                if self.phase >= 1. {
                    self.phase -= 1.;
                }
                if self.phase < 0. {
                    self.phase += 1.;
                }
            }
        }

        span.apply(output);
        self.scheduler.is_active()
    }
}
