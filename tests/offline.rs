//! End-to-end tests for the offline rendering path
//!
//! These build small graphs, render them synchronously and assert on the
//! produced samples, so they run without any audio hardware.

use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use float_eq::assert_float_eq;

use soundgraph::buffer::{AudioBuffer, ChannelData};
use soundgraph::context::{AudioContextState, BaseAudioContext, OfflineAudioContext};
use soundgraph::node::{
    AudioNode, AudioScheduledSourceNode, ChannelCountMode, ChannelInterpretation,
};

fn constant_buffer(channels: usize, length: usize, sample_rate: f32) -> AudioBuffer {
    let channel = ChannelData::from(vec![1.; length]);
    AudioBuffer::from_channels(vec![channel; channels], sample_rate)
}

#[test]
fn test_sine_440_accuracy() {
    let mut context = OfflineAudioContext::new(1, 48_000, 48_000.);

    let osc = context.create_oscillator();
    osc.connect(&context.destination());
    osc.start();

    let output = context.start_rendering();
    assert_eq!(output.length(), 48_000);

    let data = output.channel_data(0).as_slice();
    let mut peak: f32 = 0.;
    for (i, sample) in data.iter().enumerate() {
        let expected = (2. * PI * 440. * i as f64 / 48_000.).sin() as f32;
        assert_float_eq!(*sample, expected, abs <= 1e-5);
        peak = peak.max(sample.abs());
    }
    assert!(peak <= 1.0);
}

#[test]
fn test_gain_linear_ramp() {
    let mut context = OfflineAudioContext::new(1, 48_128, 48_000.);

    let src = context.create_constant_source();
    let gain = context.create_gain();
    gain.gain().set_value_at_time(0., 0.).unwrap();
    gain.gain().linear_ramp_to_value_at_time(1., 1.).unwrap();

    src.connect(&gain);
    gain.connect(&context.destination());
    src.start();

    let output = context.start_rendering();
    let data = output.channel_data(0).as_slice();

    assert_float_eq!(data[0], 0., abs <= 1e-5);
    assert_float_eq!(data[24_000], 0.5, abs <= 1e-5);
    assert_float_eq!(data[48_000], 1., abs <= 1e-5);
}

#[test]
fn test_start_stop_precision() {
    let mut context = OfflineAudioContext::new(1, 44_100, 44_100.);

    let src = context.create_constant_source();
    src.connect(&context.destination());
    src.start_at(0.5).unwrap();
    src.stop_at(0.75).unwrap();

    let output = context.start_rendering();
    let data = output.channel_data(0).as_slice();

    // start is at frame 22050, stop at frame 33075; a fade of at most one
    // quantum is allowed at each boundary
    for (i, sample) in data.iter().enumerate() {
        if i < 22_050 {
            assert_eq!(*sample, 0., "frame {} should be silent", i);
        } else if i >= 22_144 && i < 33_024 {
            assert_float_eq!(*sample, 1., abs <= 1e-6);
        } else if i >= 33_075 {
            assert_eq!(*sample, 0., "frame {} should be silent", i);
        } else {
            // inside the fade regions the level is between silence and signal
            assert!(*sample >= 0. && *sample <= 1.);
        }
    }
}

#[test]
fn test_fan_in_sums_stereo_sources() {
    let mut context = OfflineAudioContext::new(2, 512, 48_000.);

    let gain = context.create_gain();
    gain.connect(&context.destination());

    for _ in 0..2 {
        let mut src = context.create_buffer_source();
        src.set_buffer(constant_buffer(2, 512, 48_000.));
        src.connect(&gain);
        src.start();
    }

    let output = context.start_rendering();
    assert_eq!(output.number_of_channels(), 2);

    for channel in 0..2 {
        for sample in output.channel_data(channel).as_slice() {
            assert_float_eq!(*sample, 2., abs <= 1e-6);
        }
    }
}

#[test]
fn test_explicit_five_one_downmix() {
    let mut context = OfflineAudioContext::new(2, 256, 48_000.);

    let gain = context.create_gain();
    gain.set_channel_count(2);
    gain.set_channel_count_mode(ChannelCountMode::Explicit);
    gain.set_channel_interpretation(ChannelInterpretation::Speakers);
    gain.connect(&context.destination());

    let mut src = context.create_buffer_source();
    src.set_buffer(constant_buffer(6, 256, 48_000.));
    src.connect(&gain);
    src.start();

    let output = context.start_rendering();

    // L = R = 1 + 0.7071 (center) + 0.7071 (surround)
    let expected = 1. + 2. * std::f32::consts::FRAC_1_SQRT_2;
    for channel in 0..2 {
        for sample in output.channel_data(channel).as_slice() {
            assert_float_eq!(*sample, expected, abs <= 1e-5);
        }
    }
}

#[test]
fn test_onended_ordering() {
    let mut context = OfflineAudioContext::new(1, 48_000, 48_000.);

    let order = Arc::new(Mutex::new(Vec::new()));

    for (tag, stop) in [(1, 0.25), (2, 0.5)] {
        let src = context.create_constant_source();
        src.connect(&context.destination());
        src.start();
        src.stop_at(stop).unwrap();

        let order = Arc::clone(&order);
        src.set_onended(Box::new(move || order.lock().unwrap().push(tag)));
    }

    context.start_rendering();
    context.dispatch_events();

    // ended events are observed in stop-time order
    assert_eq!(*order.lock().unwrap(), vec![1, 2]);
}

#[test]
fn test_onended_fires_for_exhausted_buffer() {
    let mut context = OfflineAudioContext::new(1, 1024, 48_000.);

    let mut src = context.create_buffer_source();
    src.set_buffer(constant_buffer(1, 300, 48_000.));
    src.connect(&context.destination());
    src.start();

    let ended = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let ended_clone = Arc::clone(&ended);
    src.set_onended(Box::new(move || {
        ended_clone.store(true, std::sync::atomic::Ordering::SeqCst)
    }));

    let output = context.start_rendering();
    context.dispatch_events();

    assert!(ended.load(std::sync::atomic::Ordering::SeqCst));

    // the buffer plays its 300 frames, the rest is silence
    let data = output.channel_data(0).as_slice();
    assert_float_eq!(data[299], 1., abs <= 1e-6);
    for sample in &data[300..] {
        assert_eq!(*sample, 0.);
    }
}

#[test]
fn test_audio_rate_param_driver() {
    let mut context = OfflineAudioContext::new(1, 256, 48_000.);

    let src = context.create_constant_source();
    let gain = context.create_gain();
    src.connect(&gain);
    gain.connect(&context.destination());
    src.start();

    // the gain param is driven at audio rate on top of its own value
    gain.gain().set_value(0.25);
    let driver = context.create_constant_source();
    driver.offset().set_value(0.5);
    driver.connect(gain.gain());
    driver.start();

    let output = context.start_rendering();
    for sample in output.channel_data(0).as_slice() {
        assert_float_eq!(*sample, 0.75, abs <= 1e-6);
    }
}

#[test]
fn test_offline_render_is_deterministic() {
    fn render_once() -> AudioBuffer {
        let mut context = OfflineAudioContext::new(2, 4096, 48_000.);

        let osc = context.create_oscillator();
        let gain = context.create_gain();
        gain.gain().set_value_at_time(0., 0.).unwrap();
        gain.gain()
            .linear_ramp_to_value_at_time(1., 4096. / 48_000.)
            .unwrap();

        osc.connect(&gain);
        gain.connect(&context.destination());
        osc.start();

        context.start_rendering()
    }

    let first = render_once();
    let second = render_once();

    for channel in 0..first.number_of_channels() {
        let a = first.channel_data(channel).as_slice();
        let b = second.channel_data(channel).as_slice();
        assert_eq!(a, b, "renders must be bit-identical");
    }
}

#[test]
fn test_clock_is_monotonic_and_final() {
    let mut context = OfflineAudioContext::new(1, 1000, 48_000.);
    assert_eq!(context.current_time(), 0.);

    context.start_rendering();

    // 1000 frames round up to 8 quanta
    assert_eq!(context.sampling().current_sample_frame, 1024);
    assert_eq!(context.state(), AudioContextState::Closed);
}

#[test]
fn test_connect_index_errors() {
    let context = OfflineAudioContext::new(1, 128, 48_000.);

    let src = context.create_constant_source();
    let gain = context.create_gain();

    assert!(src.connect_at(&gain, 1, 0).is_err());
    assert!(src.connect_at(&gain, 0, 1).is_err());
    assert!(src.connect_at(&gain, 0, 0).is_ok());
}

#[test]
fn test_param_insertion_errors() {
    let context = OfflineAudioContext::new(1, 128, 48_000.);
    let gain = context.create_gain();

    // negative and non-finite times are rejected
    assert!(gain.gain().set_value_at_time(1., -1.).is_err());
    assert!(gain.gain().linear_ramp_to_value_at_time(1., f64::NAN).is_err());

    // exponential ramps need strictly positive endpoints
    assert!(gain.gain().exponential_ramp_to_value_at_time(0., 1.).is_err());
    assert!(gain.gain().exponential_ramp_to_value_at_time(-1., 1.).is_err());

    // duplicate ramp endpoints are rejected
    assert!(gain.gain().linear_ramp_to_value_at_time(1., 0.5).is_ok());
    assert!(gain.gain().linear_ramp_to_value_at_time(2., 0.5).is_err());

    // curves must hold at least two values
    assert!(gain.gain().set_value_curve_at_time(&[1.], 0., 1.).is_err());
    assert!(gain.gain().set_value_curve_at_time(&[0., 1.], 0., 1.).is_ok());
}

#[test]
fn test_disconnected_source_still_ends() {
    let mut context = OfflineAudioContext::new(1, 48_000, 48_000.);

    let src = context.create_constant_source();
    src.connect(&context.destination());
    src.start();
    src.stop_at(0.5).unwrap();

    let ended = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let ended_clone = Arc::clone(&ended);
    src.set_onended(Box::new(move || {
        ended_clone.store(true, std::sync::atomic::Ordering::SeqCst)
    }));

    // removed from the audible graph, the source must still run its course
    src.disconnect(&context.destination());

    let output = context.start_rendering();
    context.dispatch_events();

    assert!(ended.load(std::sync::atomic::Ordering::SeqCst));
    assert!(output.channel_data(0).as_slice().iter().all(|&s| s == 0.));
}
