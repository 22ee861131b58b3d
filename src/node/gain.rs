use crate::context::{AudioContextRegistration, AudioParamId, BaseAudioContext};
use crate::param::{AudioParam, AudioParamDescriptor, AutomationRate};
use crate::render::{AudioBus, AudioParamValues, AudioProcessor, RenderScope};

use super::{AudioNode, ChannelConfig, ChannelConfigOptions};

/// Options for constructing a [`GainNode`]
#[derive(Clone, Debug)]
pub struct GainOptions {
    pub gain: f32,
    pub channel_config: ChannelConfigOptions,
}

impl Default for GainOptions {
    fn default() -> Self {
        Self {
            gain: 1.,
            channel_config: ChannelConfigOptions::default(),
        }
    }
}

/// A node scaling its input by a (possibly automated) gain factor
///
/// The gain is applied sample-accurately from the param's computed values;
/// schedule a short ramp (or use
/// [`AudioBus::copy_with_gain_from`](crate::render::AudioBus::copy_with_gain_from)
/// in custom processors) to avoid zipper noise on abrupt changes.
pub struct GainNode {
    registration: AudioContextRegistration,
    channel_config: ChannelConfig,
    gain: AudioParam,
}

impl AudioNode for GainNode {
    fn registration(&self) -> &AudioContextRegistration {
        &self.registration
    }

    fn channel_config(&self) -> &ChannelConfig {
        &self.channel_config
    }

    fn number_of_inputs(&self) -> usize {
        1
    }

    fn number_of_outputs(&self) -> usize {
        1
    }
}

impl GainNode {
    pub fn new<C: BaseAudioContext>(context: &C, options: GainOptions) -> Self {
        context.register(move |registration| {
            let GainOptions {
                gain,
                channel_config,
            } = options;

            let param_options = AudioParamDescriptor {
                automation_rate: AutomationRate::A,
                default_value: 1.,
                min_value: f32::MIN,
                max_value: f32::MAX,
            };
            let (gain_param, gain_proc) = context.create_audio_param(param_options, &registration);
            gain_param.set_value(gain);

            let renderer = GainRenderer { gain: gain_proc };

            let node = Self {
                registration,
                channel_config: channel_config.into(),
                gain: gain_param,
            };

            (node, Box::new(renderer) as Box<dyn AudioProcessor>)
        })
    }

    /// A-rate [`AudioParam`] controlling the amount of gain to apply
    pub fn gain(&self) -> &AudioParam {
        &self.gain
    }
}

struct GainRenderer {
    gain: AudioParamId,
}

impl AudioProcessor for GainRenderer {
    fn process(
        &mut self,
        inputs: &[AudioBus],
        outputs: &mut [AudioBus],
        params: AudioParamValues<'_>,
        _scope: &RenderScope,
    ) -> bool {
        let input = &inputs[0];
        let output = &mut outputs[0];

        if input.is_silent() {
            // nothing to scale this quantum
            output.make_silent();
        } else {
            let gain_values = params.get(&self.gain);

            *output = input.clone();
            output.modify_channels(|channel| {
                channel
                    .iter_mut()
                    .zip(gain_values.iter())
                    .for_each(|(sample, gain)| *sample *= gain);
            });
        }

        // A plain multiplier holds no signal of its own, so it never claims
        // a tail. Whether the node is done for good is a question about its
        // upstream connections, which the graph answers before reclaiming
        // it; a quantum of silence from a source that has not started yet
        // must not count as exhaustion.
        false
    }
}
