use crate::context::{AudioContextRegistration, AudioParamId, BaseAudioContext};
use crate::control::{NodeScheduler, SchedulerHandle};
use crate::param::{AudioParam, AudioParamDescriptor, AutomationRate};
use crate::render::{AudioBus, AudioParamValues, AudioProcessor, RenderScope};
use crate::Error;

use super::{AudioNode, AudioScheduledSourceNode, ChannelConfig, ChannelConfigOptions};

/// Options for constructing a [`ConstantSourceNode`]
#[derive(Clone, Debug)]
pub struct ConstantSourceOptions {
    pub offset: f32,
}

impl Default for ConstantSourceOptions {
    fn default() -> Self {
        Self { offset: 1. }
    }
}

/// A source of a constant value, automatable through its `offset` param
///
/// Useful as a DC signal, and as a single automation fanned out to several
/// parameters at once.
pub struct ConstantSourceNode {
    registration: AudioContextRegistration,
    channel_config: ChannelConfig,
    offset: AudioParam,
    scheduler: SchedulerHandle,
}

impl AudioNode for ConstantSourceNode {
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

impl AudioScheduledSourceNode for ConstantSourceNode {
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

impl ConstantSourceNode {
    pub fn new<C: BaseAudioContext>(context: &C, options: ConstantSourceOptions) -> Self {
        context.register(move |registration| {
            let ConstantSourceOptions { offset } = options;

            let param_options = AudioParamDescriptor {
                automation_rate: AutomationRate::A,
                default_value: 1.,
                min_value: f32::MIN,
                max_value: f32::MAX,
            };
            let (o_param, o_proc) = context.create_audio_param(param_options, &registration);
            o_param.set_value(offset);

            let (scheduler, node_scheduler) = SchedulerHandle::new(context.sample_rate());

            let renderer = ConstantSourceRenderer {
                offset: o_proc,
                scheduler: node_scheduler,
            };

            let node = Self {
                registration,
                channel_config: ChannelConfigOptions::default().into(),
                offset: o_param,
                scheduler,
            };

            (node, Box::new(renderer) as Box<dyn AudioProcessor>)
        })
    }

    /// A-rate [`AudioParam`] defining the emitted value
    pub fn offset(&self) -> &AudioParam {
        &self.offset
    }
}

struct ConstantSourceRenderer {
    offset: AudioParamId,
    scheduler: NodeScheduler,
}

impl AudioProcessor for ConstantSourceRenderer {
    fn process(
        &mut self,
        _inputs: &[AudioBus],
        outputs: &mut [AudioBus],
        params: AudioParamValues<'_>,
        scope: &RenderScope,
    ) -> bool {
        let output = &mut outputs[0];

        let tail_frames =
            ((self.tail_time() + self.latency_time()) * scope.sample_rate as f64).round() as u64;
        let span = self.scheduler.update(scope, tail_frames);
        if span.length == 0 {
            output.make_silent();
            return self.scheduler.is_active();
        }

        output.set_number_of_channels(1);

        let offset_values = params.get(&self.offset);

        {
            let channel = output.channel_data_mut(0);
            let range = span.offset..span.offset + span.length;
            channel[range.clone()].copy_from_slice(&offset_values[range]);
        }

        span.apply(output);
        self.scheduler.is_active()
    }
}
