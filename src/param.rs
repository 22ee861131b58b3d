//! AudioParam automation
//!
//! An [`AudioParam`] is the control-thread handle of a scalar node parameter.
//! Automation events are passed through the context's control channel to the
//! render-side `AudioParamProcessor`, which is itself a node in the render
//! graph: audio-rate driver connections terminate at its (mono) input and are
//! summed on top of the automation timeline, sample by sample.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};

use crate::context::AudioContextRegistration;
use crate::node::{
    AudioNode, ChannelConfig, ChannelConfigOptions, ChannelCountMode, ChannelInterpretation,
};
use crate::render::{AudioBus, AudioParamValues, AudioProcessor, RenderScope};
use crate::{valid_time_value, AtomicF64, Error};

/// Precision of value calculation per render quantum
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AutomationRate {
    /// Audio rate: sampled for each sample frame of the quantum
    A,
    /// Control rate: sampled at the start of the quantum
    K,
}

/// Options for constructing an [`AudioParam`]
#[derive(Copy, Clone, Debug)]
pub struct AudioParamDescriptor {
    pub automation_rate: AutomationRate,
    pub default_value: f32,
    pub min_value: f32,
    pub max_value: f32,
}

/// Automation events, in the order they are handed to the render thread
#[derive(Clone, Debug)]
pub(crate) enum AudioParamEvent {
    SetValue {
        value: f32,
    },
    SetValueAtTime {
        value: f32,
        time: f64,
    },
    LinearRampToValueAtTime {
        value: f32,
        end_time: f64,
    },
    ExponentialRampToValueAtTime {
        value: f32,
        end_time: f64,
    },
    SetTargetAtTime {
        value: f32,
        start_time: f64,
        time_constant: f64,
    },
    SetValueCurveAtTime {
        values: Box<[f32]>,
        start_time: f64,
        duration: f64,
    },
}

impl AudioParamEvent {
    /// The time this event enters the timeline
    ///
    /// `SetValue` is applied immediately and never stored in the timeline.
    fn time(&self) -> f64 {
        match self {
            AudioParamEvent::SetValue { .. } => 0.,
            AudioParamEvent::SetValueAtTime { time, .. } => *time,
            AudioParamEvent::LinearRampToValueAtTime { end_time, .. } => *end_time,
            AudioParamEvent::ExponentialRampToValueAtTime { end_time, .. } => *end_time,
            AudioParamEvent::SetTargetAtTime { start_time, .. } => *start_time,
            AudioParamEvent::SetValueCurveAtTime { start_time, .. } => *start_time,
        }
    }
}

/// Scalar parameter of an audio node, automatable over time
///
/// The parameter is also an [`AudioNode`]: connecting a node output to the
/// parameter adds an audio-rate driver whose samples are summed on top of the
/// automation timeline.
pub struct AudioParam {
    registration: AudioContextRegistration,
    channel_config: ChannelConfig,
    automation_rate: AutomationRate,
    default_value: f32,
    min_value: f32,
    max_value: f32,
    current_value: Arc<AtomicF64>,
    sender: Sender<AudioParamEvent>,
    // scheduled ramp endpoints, to reject duplicates synchronously
    ramp_endpoints: Mutex<Vec<f64>>,
}

impl AudioNode for AudioParam {
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

impl AudioParam {
    /// Create the control handle and its render-side processor
    pub(crate) fn new(
        registration: AudioContextRegistration,
        descriptor: AudioParamDescriptor,
    ) -> (Self, AudioParamProcessor) {
        let AudioParamDescriptor {
            automation_rate,
            default_value,
            min_value,
            max_value,
        } = descriptor;

        let current_value = Arc::new(AtomicF64::new(default_value as f64));
        let (sender, receiver) = crossbeam_channel::unbounded();

        let processor = AudioParamProcessor {
            value: default_value as f64,
            anchor_time: 0.,
            automation_rate,
            min_value,
            max_value,
            shared_value: Arc::clone(&current_value),
            receiver,
            events: Vec::with_capacity(16),
        };

        // drivers are summed and mixed down to a single channel
        let channel_config = ChannelConfigOptions {
            count: 1,
            mode: ChannelCountMode::Explicit,
            interpretation: ChannelInterpretation::Speakers,
        }
        .into();

        let param = Self {
            registration,
            channel_config,
            automation_rate,
            default_value,
            min_value,
            max_value,
            current_value,
            sender,
            ramp_endpoints: Mutex::new(Vec::new()),
        };

        (param, processor)
    }

    pub fn automation_rate(&self) -> AutomationRate {
        self.automation_rate
    }

    pub fn default_value(&self) -> f32 {
        self.default_value
    }

    pub fn min_value(&self) -> f32 {
        self.min_value
    }

    pub fn max_value(&self) -> f32 {
        self.max_value
    }

    /// Current scalar value of the parameter
    ///
    /// Reflects the intrinsic value computed at the last quantum boundary
    /// plus any pending `set_value`; drivers and future events are not
    /// anticipated.
    pub fn value(&self) -> f32 {
        self.current_value.load() as f32
    }

    /// Set the value immediately
    ///
    /// The next evaluation uses this value unless a timeline event in the
    /// past overrides it.
    pub fn set_value(&self, value: f32) {
        let clamped = value.clamp(self.min_value, self.max_value);
        self.current_value.store(clamped as f64);
        self.send(AudioParamEvent::SetValue { value: clamped });
    }

    /// Schedule the parameter to hold `value` starting at `time`
    pub fn set_value_at_time(&self, value: f32, time: f64) -> Result<(), Error> {
        self.check_time(time)?;
        self.send(AudioParamEvent::SetValueAtTime { value, time });
        Ok(())
    }

    /// Schedule a linear ramp from the previous event to `value` at `end_time`
    pub fn linear_ramp_to_value_at_time(&self, value: f32, end_time: f64) -> Result<(), Error> {
        self.check_time(end_time)?;
        self.ramp_endpoints.lock().unwrap().push(end_time);
        self.send(AudioParamEvent::LinearRampToValueAtTime { value, end_time });
        Ok(())
    }

    /// Schedule a geometric ramp from the previous event to `value` at
    /// `end_time`
    ///
    /// Both ramp endpoints must be strictly positive.
    pub fn exponential_ramp_to_value_at_time(
        &self,
        value: f32,
        end_time: f64,
    ) -> Result<(), Error> {
        if value <= 0. {
            return Err(Error::InvalidDomain {
                value,
                constraint: "strictly positive for an exponential ramp",
            });
        }
        self.check_time(end_time)?;
        self.ramp_endpoints.lock().unwrap().push(end_time);
        self.send(AudioParamEvent::ExponentialRampToValueAtTime { value, end_time });
        Ok(())
    }

    /// Schedule a first-order exponential approach of `value`, starting at
    /// `start_time` with time constant `time_constant`
    pub fn set_target_at_time(
        &self,
        value: f32,
        start_time: f64,
        time_constant: f64,
    ) -> Result<(), Error> {
        if time_constant < 0. {
            return Err(Error::InvalidDomain {
                value: time_constant as f32,
                constraint: "a non-negative time constant",
            });
        }
        self.check_time(start_time)?;
        self.send(AudioParamEvent::SetTargetAtTime {
            value,
            start_time,
            time_constant,
        });
        Ok(())
    }

    /// Schedule a curve of values, linearly interpolated across `duration`
    pub fn set_value_curve_at_time(
        &self,
        values: &[f32],
        start_time: f64,
        duration: f64,
    ) -> Result<(), Error> {
        if values.len() < 2 {
            return Err(Error::InvalidDomain {
                value: values.len() as f32,
                constraint: "a curve of at least two values",
            });
        }
        if duration <= 0. {
            return Err(Error::InvalidDomain {
                value: duration as f32,
                constraint: "a strictly positive curve duration",
            });
        }
        self.check_time(start_time)?;
        self.send(AudioParamEvent::SetValueCurveAtTime {
            values: values.to_vec().into_boxed_slice(),
            start_time,
            duration,
        });
        Ok(())
    }

    fn check_time(&self, time: f64) -> Result<(), Error> {
        valid_time_value(time)?;
        if self.ramp_endpoints.lock().unwrap().contains(&time) {
            return Err(Error::InvalidTime { time });
        }
        Ok(())
    }

    fn send(&self, event: AudioParamEvent) {
        // ship through the context so automation keeps its insertion order
        // relative to graph mutations
        self.registration
            .context()
            .pass_audio_param_event(&self.sender, event);
    }
}

/// Render-side counterpart of an [`AudioParam`], registered in the graph
pub(crate) struct AudioParamProcessor {
    value: f64,
    anchor_time: f64,
    automation_rate: AutomationRate,
    min_value: f32,
    max_value: f32,
    shared_value: Arc<AtomicF64>,
    receiver: Receiver<AudioParamEvent>,
    events: Vec<AudioParamEvent>,
}

impl AudioProcessor for AudioParamProcessor {
    fn process(
        &mut self,
        inputs: &[AudioBus],
        outputs: &mut [AudioBus],
        _params: AudioParamValues<'_>,
        scope: &RenderScope,
    ) -> bool {
        while let Ok(event) = self.receiver.try_recv() {
            self.handle_event(event);
        }

        let output = &mut outputs[0];
        output.set_number_of_channels(1);

        let start_frame = scope.current_frame;
        let sample_rate = scope.sample_rate as f64;

        {
            let channel = output.channel_data_mut(0);
            match self.automation_rate {
                AutomationRate::A => {
                    for (i, sample) in channel.iter_mut().enumerate() {
                        let t = (start_frame + i as u64) as f64 / sample_rate;
                        *sample = self.intrinsic_value(t) as f32;
                    }
                }
                AutomationRate::K => {
                    let t = start_frame as f64 / sample_rate;
                    let value = self.intrinsic_value(t) as f32;
                    channel.iter_mut().for_each(|sample| *sample = value);
                }
            }
        }

        // sum audio-rate drivers, already mixed down to mono
        let input = &inputs[0];
        if !input.is_silent() {
            let driver = input.channel_data(0).clone();
            let channel = output.channel_data_mut(0);
            channel
                .iter_mut()
                .zip(driver.iter())
                .for_each(|(sample, drive)| *sample += drive);
        }

        let (min, max) = (self.min_value, self.max_value);
        let channel = output.channel_data_mut(0);
        channel
            .iter_mut()
            .for_each(|sample| *sample = sample.clamp(min, max));

        self.shared_value.store(channel[channel.len() - 1] as f64);

        !self.events.is_empty()
    }
}

impl AudioParamProcessor {
    fn handle_event(&mut self, event: AudioParamEvent) {
        if let AudioParamEvent::SetValue { value } = event {
            self.value = value as f64;
            return;
        }

        // keep the timeline sorted, equal times stay in insertion order
        let time = event.time();
        let index = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(index, event);
    }

    fn commit(&mut self, value: f64, time: f64) {
        self.value = value.clamp(self.min_value as f64, self.max_value as f64);
        self.anchor_time = time;
    }

    /// Timeline value at time `t`, with `t` non-decreasing between calls
    fn intrinsic_value(&mut self, t: f64) -> f64 {
        loop {
            let event = match self.events.first() {
                None => return self.value,
                Some(event) => event,
            };

            match event {
                AudioParamEvent::SetValue { .. } => unreachable!("applied on arrival"),

                &AudioParamEvent::SetValueAtTime { value, time } => {
                    if t < time {
                        return self.value;
                    }
                    self.commit(value as f64, time);
                    self.events.remove(0);
                }

                &AudioParamEvent::LinearRampToValueAtTime { value, end_time } => {
                    let (t0, v0) = (self.anchor_time, self.value);
                    if t >= end_time || end_time <= t0 {
                        self.commit(value as f64, end_time);
                        self.events.remove(0);
                        continue;
                    }
                    return v0 + (value as f64 - v0) * (t - t0) / (end_time - t0);
                }

                &AudioParamEvent::ExponentialRampToValueAtTime { value, end_time } => {
                    if t >= end_time {
                        self.commit(value as f64, end_time);
                        self.events.remove(0);
                        continue;
                    }
                    let (t0, v0) = (self.anchor_time, self.value);
                    if end_time <= t0 || v0 <= 0. {
                        // a geometric ramp from a non-positive value cannot
                        // be expressed, hold and jump at the end point
                        return self.value;
                    }
                    return v0 * (value as f64 / v0).powf((t - t0) / (end_time - t0));
                }

                &AudioParamEvent::SetTargetAtTime {
                    value,
                    start_time,
                    time_constant,
                } => {
                    let target = value as f64;
                    let decay = |at: f64, from: f64| {
                        if time_constant == 0. {
                            target
                        } else {
                            target + (from - target) * (-(at - start_time) / time_constant).exp()
                        }
                    };

                    // a later event freezes the approach at its start time
                    let next_time = self.events.get(1).map(AudioParamEvent::time);
                    if let Some(next_time) = next_time {
                        if t >= next_time {
                            let frozen = decay(next_time.max(start_time), self.value);
                            self.commit(frozen, next_time);
                            self.events.remove(0);
                            continue;
                        }
                    }

                    if t < start_time {
                        return self.value;
                    }
                    return decay(t, self.value);
                }

                AudioParamEvent::SetValueCurveAtTime {
                    values,
                    start_time,
                    duration,
                } => {
                    let (start_time, duration) = (*start_time, *duration);
                    let end_time = start_time + duration;
                    if t >= end_time {
                        let last = *values.last().unwrap() as f64;
                        self.commit(last, end_time);
                        self.events.remove(0);
                        continue;
                    }
                    if t < start_time {
                        return self.value;
                    }
                    let position = (t - start_time) / duration * (values.len() - 1) as f64;
                    let index = position.floor() as usize;
                    let frac = position - index as f64;
                    let left = values[index] as f64;
                    let right = values[(index + 1).min(values.len() - 1)] as f64;
                    return left + frac * (right - left);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use float_eq::assert_float_eq;

    use super::*;

    fn processor(default_value: f32) -> (Sender<AudioParamEvent>, AudioParamProcessor) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let processor = AudioParamProcessor {
            value: default_value as f64,
            anchor_time: 0.,
            automation_rate: AutomationRate::A,
            min_value: f32::MIN,
            max_value: f32::MAX,
            shared_value: Arc::new(AtomicF64::new(default_value as f64)),
            receiver,
            events: Vec::new(),
        };
        (sender, processor)
    }

    fn drain(processor: &mut AudioParamProcessor) {
        while let Ok(event) = processor.receiver.try_recv() {
            processor.handle_event(event);
        }
    }

    #[test]
    fn test_constant_without_events() {
        let (_sender, mut processor) = processor(0.5);
        for frame in 0..256 {
            assert_float_eq!(processor.intrinsic_value(frame as f64 / 48_000.), 0.5, abs <= 0.);
        }
    }

    #[test]
    fn test_set_value_applies_immediately() {
        let (sender, mut processor) = processor(0.);
        sender.send(AudioParamEvent::SetValue { value: 2. }).unwrap();
        drain(&mut processor);
        assert_float_eq!(processor.intrinsic_value(0.), 2., abs <= 0.);
    }

    #[test]
    fn test_set_value_at_time_holds_until_due() {
        let (sender, mut processor) = processor(1.);
        sender
            .send(AudioParamEvent::SetValueAtTime { value: 3., time: 0.5 })
            .unwrap();
        drain(&mut processor);

        assert_float_eq!(processor.intrinsic_value(0.25), 1., abs <= 0.);
        // the event's value wins exactly at its time
        assert_float_eq!(processor.intrinsic_value(0.5), 3., abs <= 0.);
        assert_float_eq!(processor.intrinsic_value(0.75), 3., abs <= 0.);
    }

    #[test]
    fn test_linear_ramp() {
        let (sender, mut processor) = processor(0.);
        sender
            .send(AudioParamEvent::SetValueAtTime { value: 0., time: 0. })
            .unwrap();
        sender
            .send(AudioParamEvent::LinearRampToValueAtTime { value: 1., end_time: 1. })
            .unwrap();
        drain(&mut processor);

        assert_float_eq!(processor.intrinsic_value(0.), 0., abs <= 0.);
        assert_float_eq!(processor.intrinsic_value(0.25), 0.25, abs <= 1e-12);
        assert_float_eq!(processor.intrinsic_value(0.5), 0.5, abs <= 1e-12);
        assert_float_eq!(processor.intrinsic_value(1.), 1., abs <= 0.);
        assert_float_eq!(processor.intrinsic_value(2.), 1., abs <= 0.);
    }

    #[test]
    fn test_exponential_ramp_is_geometric() {
        let (sender, mut processor) = processor(0.);
        sender
            .send(AudioParamEvent::SetValueAtTime { value: 1., time: 0. })
            .unwrap();
        sender
            .send(AudioParamEvent::ExponentialRampToValueAtTime { value: 4., end_time: 1. })
            .unwrap();
        drain(&mut processor);

        assert_float_eq!(processor.intrinsic_value(0.), 1., abs <= 0.);
        // geometric midpoint of 1 and 4 is 2
        assert_float_eq!(processor.intrinsic_value(0.5), 2., abs <= 1e-9);
        assert_float_eq!(processor.intrinsic_value(1.), 4., abs <= 0.);
    }

    #[test]
    fn test_set_target_decay() {
        let (sender, mut processor) = processor(0.);
        let tau = 0.2;
        sender
            .send(AudioParamEvent::SetValueAtTime { value: 1., time: 0. })
            .unwrap();
        sender
            .send(AudioParamEvent::SetTargetAtTime {
                value: 0.,
                start_time: 0.,
                time_constant: tau,
            })
            .unwrap();
        drain(&mut processor);

        assert_float_eq!(processor.intrinsic_value(0.), 1., abs <= 1e-12);
        let expected = (-0.5_f64 / tau).exp();
        assert_float_eq!(processor.intrinsic_value(0.5), expected, abs <= 1e-9);
    }

    #[test]
    fn test_value_curve_interpolates() {
        let (sender, mut processor) = processor(0.);
        sender
            .send(AudioParamEvent::SetValueCurveAtTime {
                values: vec![0., 1., 0.].into_boxed_slice(),
                start_time: 0.,
                duration: 1.,
            })
            .unwrap();
        drain(&mut processor);

        assert_float_eq!(processor.intrinsic_value(0.), 0., abs <= 0.);
        assert_float_eq!(processor.intrinsic_value(0.25), 0.5, abs <= 1e-12);
        assert_float_eq!(processor.intrinsic_value(0.5), 1., abs <= 1e-12);
        assert_float_eq!(processor.intrinsic_value(0.75), 0.5, abs <= 1e-12);
        // after the curve the last value holds
        assert_float_eq!(processor.intrinsic_value(1.5), 0., abs <= 0.);
    }

    #[test]
    fn test_events_with_equal_time_keep_insertion_order() {
        let (sender, mut processor) = processor(0.);
        sender
            .send(AudioParamEvent::SetValueAtTime { value: 1., time: 0.5 })
            .unwrap();
        sender
            .send(AudioParamEvent::SetValueAtTime { value: 2., time: 0.5 })
            .unwrap();
        drain(&mut processor);

        // the later insertion wins once both are due
        assert_float_eq!(processor.intrinsic_value(0.5), 2., abs <= 0.);
    }

    #[test]
    fn test_ramp_follows_set_target() {
        let (sender, mut processor) = processor(0.);
        sender
            .send(AudioParamEvent::SetValueAtTime { value: 1., time: 0. })
            .unwrap();
        sender
            .send(AudioParamEvent::SetTargetAtTime {
                value: 0.,
                start_time: 0.,
                time_constant: 0.5,
            })
            .unwrap();
        sender
            .send(AudioParamEvent::SetValueAtTime { value: 5., time: 1. })
            .unwrap();
        drain(&mut processor);

        // the decay is frozen when the next event becomes due
        assert!(processor.intrinsic_value(0.5) < 1.);
        assert_float_eq!(processor.intrinsic_value(1.), 5., abs <= 0.);
    }
}
