use crate::context::{AudioContextRegistration, BaseAudioContext};
use crate::render::{AudioBus, AudioParamValues, AudioProcessor, RenderScope};

use super::{AudioNode, ChannelConfig, ChannelCountMode};

/// The final audio destination, what the user will ultimately hear
///
/// The render thread copies this node's output to the driver buffer (or, for
/// an offline context, into the result buffer), up/down-mixed to the device
/// channel count.
pub struct AudioDestinationNode {
    registration: AudioContextRegistration,
    channel_config: ChannelConfig,
}

struct DestinationRenderer;

impl AudioProcessor for DestinationRenderer {
    fn process(
        &mut self,
        inputs: &[AudioBus],
        outputs: &mut [AudioBus],
        _params: AudioParamValues<'_>,
        _scope: &RenderScope,
    ) -> bool {
        let (input, output) = (&inputs[0], &mut outputs[0]);

        // the summing junction arrives pre-mixed to the configured channel
        // count (explicit count mode), hand it through unchanged
        output.set_number_of_channels(input.number_of_channels());
        if let Err(err) = output.copy_from(input) {
            log::warn!("destination render failed ({}), emitting silence", err);
            output.make_silent();
        }

        // the graph root never reports exhaustion
        true
    }
}

impl AudioNode for AudioDestinationNode {
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

    fn set_channel_count(&self, count: usize) {
        if self.registration.context().offline() {
            // the offline result buffer is allocated up front
            assert!(
                count == self.channel_count(),
                "NotSupportedError: the OfflineAudioContext destination channel count is fixed"
            );
            return;
        }
        assert!(
            count <= self.max_channel_count(),
            "IndexSizeError: the device supports at most {} channels, {} requested",
            self.max_channel_count(),
            count
        );
        self.channel_config.set_count(count);
    }

    fn set_channel_count_mode(&self, _: ChannelCountMode) {
        panic!("InvalidStateError: the destination's channel count mode is fixed");
    }
}

impl AudioDestinationNode {
    /// Register the destination in a freshly created context
    ///
    /// The mixing configuration is decided by the context and fixed for its
    /// lifetime.
    pub(crate) fn new<C: BaseAudioContext>(context: &C, channel_config: ChannelConfig) -> Self {
        context.register(move |registration| {
            let node = Self {
                registration,
                channel_config,
            };

            (node, Box::new(DestinationRenderer) as Box<dyn AudioProcessor>)
        })
    }

    /// Recreate a handle to the already-registered destination
    pub(crate) fn attach(
        registration: AudioContextRegistration,
        channel_config: ChannelConfig,
    ) -> Self {
        Self {
            registration,
            channel_config,
        }
    }

    /// The maximum number of channels the destination can be set to (the
    /// number of channels the device was opened with)
    pub fn max_channel_count(&self) -> usize {
        self.registration.context().max_channel_count()
    }
}
