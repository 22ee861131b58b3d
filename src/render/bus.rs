//! The render-thread audio bus and its channel-data allocator
//!
//! An [`AudioBus`] is a multi-channel buffer of exactly one render quantum.
//! Its channel planes are handed out by a pre-sized pool so that steady-state
//! rendering does not allocate, and silent planes are shared so that silence
//! detection and propagation are O(1).

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use arrayvec::ArrayVec;

use crate::node::ChannelInterpretation;
use crate::{Error, MAX_CHANNELS, RENDER_QUANTUM_SIZE};

const LEN: usize = RENDER_QUANTUM_SIZE;

const SQRT1_2: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// One channel plane worth of samples, aligned for SIMD consumers
#[derive(Clone)]
#[repr(align(16))]
struct Block([f32; LEN]);

/// Pool of channel planes, shared by all buses of one render thread
pub(crate) struct Alloc {
    inner: Arc<AllocInner>,
}

struct AllocInner {
    pool: Mutex<Vec<Arc<Block>>>,
    zeroes: Arc<Block>,
}

impl Alloc {
    pub fn with_capacity(n: usize) -> Self {
        let pool: Vec<_> = (0..n).map(|_| Arc::new(Block([0.; LEN]))).collect();
        let zeroes = Arc::new(Block([0.; LEN]));

        let inner = AllocInner {
            pool: Mutex::new(pool),
            zeroes,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn allocate(&self) -> ChannelData {
        ChannelData {
            data: self.inner.allocate(),
            alloc: Arc::clone(&self.inner),
        }
    }

    pub fn silence(&self) -> ChannelData {
        ChannelData {
            data: Arc::clone(&self.inner.zeroes),
            alloc: Arc::clone(&self.inner),
        }
    }

    #[cfg(test)]
    pub fn pool_size(&self) -> usize {
        self.inner.pool.lock().unwrap().len()
    }
}

impl AllocInner {
    fn allocate(&self) -> Arc<Block> {
        if let Some(block) = self.pool.lock().unwrap().pop() {
            // re-use from pool
            block
        } else {
            // pool is depleted, allocate
            Arc::new(Block([0.; LEN]))
        }
    }

    fn push(&self, block: Arc<Block>) {
        self.pool
            .lock()
            .unwrap() // lock is uncontended, the pool lives on the render thread
            .push(block);
    }
}

/// Single channel of a render quantum
///
/// Cloning is cheap: planes are copy-on-write and reclaimed by the pool when
/// the last reference drops.
#[derive(Clone)]
pub struct ChannelData {
    data: Arc<Block>,
    alloc: Arc<AllocInner>,
}

impl ChannelData {
    fn make_mut(&mut self) -> &mut Block {
        if Arc::strong_count(&self.data) != 1 {
            let mut new = self.alloc.allocate();
            Arc::get_mut(&mut new).unwrap().0.copy_from_slice(&self.data.0);
            self.data = new;
        }

        Arc::get_mut(&mut self.data).unwrap()
    }

    /// `O(1)` check if this plane is the shared silence plane
    ///
    /// If this returns false it is still possible for all samples to be zero.
    pub fn is_silent(&self) -> bool {
        Arc::ptr_eq(&self.data, &self.alloc.zeroes)
    }

    /// Sum another channel into this one
    pub fn add(&mut self, other: &Self) {
        if self.is_silent() {
            *self = other.clone();
        } else if !other.is_silent() {
            self.iter_mut().zip(other.iter()).for_each(|(a, b)| *a += b);
        }
    }

    pub fn silence(&self) -> Self {
        ChannelData {
            data: Arc::clone(&self.alloc.zeroes),
            alloc: Arc::clone(&self.alloc),
        }
    }
}

impl Deref for ChannelData {
    type Target = [f32; LEN];

    fn deref(&self) -> &Self::Target {
        &self.data.0
    }
}

impl DerefMut for ChannelData {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.make_mut().0
    }
}

impl Drop for ChannelData {
    fn drop(&mut self) {
        if Arc::strong_count(&self.data) == 1 {
            let block = std::mem::replace(&mut self.data, Arc::clone(&self.alloc.zeroes));
            self.alloc.push(block);
        }
    }
}

/// Multi-channel buffer of one render quantum
///
/// Channel counts of 1 (mono), 2 (stereo), 4 (quad, `[L, R, SL, SR]`) and
/// 6 (5.1, `[L, R, C, LFE, SL, SR]`) carry speaker semantics for up and
/// down-mixing; other counts mix discretely.
#[derive(Clone)]
pub struct AudioBus {
    channels: ArrayVec<ChannelData, MAX_CHANNELS>,
}

impl AudioBus {
    /// Create a new mono bus from a single channel plane
    pub(crate) fn new(channel: ChannelData) -> Self {
        let mut channels = ArrayVec::new();
        channels.push(channel);
        Self { channels }
    }

    /// Number of channels in this bus
    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Grow or shrink the channel count, new channels are silent
    pub fn set_number_of_channels(&mut self, n: usize) {
        assert!(n >= 1 && n <= MAX_CHANNELS);
        let silence = self.channels[0].silence();
        while self.channels.len() < n {
            self.channels.push(silence.clone());
        }
        self.channels.truncate(n);
    }

    /// Get the samples of a specific channel
    pub fn channel_data(&self, index: usize) -> &ChannelData {
        &self.channels[index]
    }

    /// Get the samples of a specific channel (mutable)
    pub fn channel_data_mut(&mut self, index: usize) -> &mut ChannelData {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> &[ChannelData] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [ChannelData] {
        &mut self.channels
    }

    /// Modify every channel in the same way
    pub fn modify_channels<F: Fn(&mut ChannelData)>(&mut self, fun: F) {
        self.channels.iter_mut().for_each(fun)
    }

    /// `O(1)` check if every plane is the shared silence plane
    pub fn is_silent(&self) -> bool {
        self.channels.iter().all(ChannelData::is_silent)
    }

    /// Convert this bus to a single silent channel
    pub fn make_silent(&mut self) {
        let silence = self.channels[0].silence();
        self.channels.truncate(1);
        self.channels[0] = silence;
    }

    /// Zero all samples, preserving the channel count
    pub fn zero(&mut self) {
        let silence = self.channels[0].silence();
        self.modify_channels(|c| *c = silence.clone());
    }

    /// Copy the contents of another bus with the same channel count
    pub fn copy_from(&mut self, source: &Self) -> Result<(), Error> {
        self.check_format(source)?;
        self.channels
            .iter_mut()
            .zip(source.channels.iter())
            .for_each(|(dst, src)| *dst = src.clone());
        Ok(())
    }

    /// Sum the contents of another bus with the same channel count into this
    /// one, sample by sample
    pub fn sum_from(&mut self, source: &Self) -> Result<(), Error> {
        self.check_format(source)?;
        self.channels
            .iter_mut()
            .zip(source.channels.iter())
            .for_each(|(dst, src)| dst.add(src));
        Ok(())
    }

    /// Multiply all samples by a constant factor
    pub fn scale(&mut self, factor: f32) {
        if self.is_silent() {
            return;
        }
        self.modify_channels(|c| c.iter_mut().for_each(|s| *s *= factor));
    }

    /// Largest sample magnitude over all channels
    pub fn max_abs_value(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0., |max, s| s.abs().max(max))
    }

    /// Copy from another bus while interpolating the gain from `*last_gain`
    /// to `target_gain` across the quantum (de-zippering), writing the
    /// reached gain back into `*last_gain`
    pub fn copy_with_gain_from(
        &mut self,
        source: &Self,
        last_gain: &mut f32,
        target_gain: f32,
    ) -> Result<(), Error> {
        self.check_format(source)?;

        let step = (target_gain - *last_gain) / LEN as f32;
        let base = *last_gain;
        for (dst, src) in self.channels.iter_mut().zip(source.channels.iter()) {
            let mut gain = base;
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                gain += step;
                *d = s * gain;
            }
        }
        *last_gain = target_gain;
        Ok(())
    }

    fn check_format(&self, other: &Self) -> Result<(), Error> {
        if self.number_of_channels() == other.number_of_channels() {
            Ok(())
        } else {
            Err(Error::MismatchedFormat {
                destination: self.number_of_channels(),
                source: other.number_of_channels(),
            })
        }
    }

    /// Sum another bus into this one, up-mixing the bus with the lower
    /// channel count first
    pub fn add(&mut self, other: &Self, interpretation: ChannelInterpretation) {
        let channels = self.number_of_channels().max(other.number_of_channels());
        self.mix(channels, interpretation);

        if other.number_of_channels() == channels {
            let _ = self.sum_from(other);
        } else {
            let mut other_mixed = other.clone();
            other_mixed.mix(channels, interpretation);
            let _ = self.sum_from(&other_mixed);
        }
    }

    /// Up/down-mix to the desired number of channels
    pub fn mix(&mut self, channels: usize, interpretation: ChannelInterpretation) {
        assert!(channels >= 1 && channels <= MAX_CHANNELS);

        if self.number_of_channels() == channels {
            return;
        }

        match interpretation {
            ChannelInterpretation::Discrete => self.mix_discrete(channels),
            ChannelInterpretation::Speakers => {
                match (self.number_of_channels(), channels) {
                    (1, 2) => self.up_mix_mono_to_stereo(),
                    (1, 4) => {
                        self.up_mix_mono_to_stereo();
                        self.mix_discrete(4);
                    }
                    (1, 6) => self.up_mix_mono_to_five_one(),
                    (2, 4) | (2, 6) | (4, 6) => self.up_mix_speakers(channels),
                    (2, 1) => self.down_mix_stereo_to_mono(),
                    (4, 1) => self.down_mix_quad_to_mono(),
                    (4, 2) => self.down_mix_quad_to_stereo(),
                    (6, 1) => self.down_mix_five_one_to_mono(),
                    (6, 2) => self.down_mix_five_one_to_stereo(),
                    (6, 4) => self.down_mix_five_one_to_quad(),
                    // non-standard layouts have no speaker semantics
                    _ => self.mix_discrete(channels),
                }
            }
        }
    }

    /// Copy channel i to i up to the lower count, zero-pad or truncate the rest
    fn mix_discrete(&mut self, channels: usize) {
        let silence = self.channels[0].silence();
        while self.channels.len() < channels {
            self.channels.push(silence.clone());
        }
        self.channels.truncate(channels);
    }

    fn up_mix_mono_to_stereo(&mut self) {
        let mono = self.channels[0].clone();
        self.channels.truncate(1);
        self.channels.push(mono);
    }

    fn up_mix_mono_to_five_one(&mut self) {
        let mono = self.channels[0].clone();
        let silence = mono.silence();
        self.channels.truncate(1);
        self.channels[0] = silence.clone();
        self.channels.push(silence.clone());
        self.channels.push(mono); // center
        self.channels.push(silence.clone());
        self.channels.push(silence.clone());
        self.channels.push(silence);
    }

    /// Stereo and quad up-mixes keep L/R (and SL/SR) in place and pad the
    /// remaining speaker positions with silence
    fn up_mix_speakers(&mut self, channels: usize) {
        let silence = self.channels[0].silence();
        // surround channels move from [2], [3] (quad) to [4], [5] (5.1)
        if self.channels.len() == 4 && channels == 6 {
            self.channels.insert(2, silence.clone());
            self.channels.insert(3, silence);
        } else {
            self.mix_discrete(channels);
        }
    }

    fn down_mix_stereo_to_mono(&mut self) {
        let right = self.channels[1].clone();
        self.channels.truncate(1);
        let left = &mut self.channels[0];
        left.iter_mut()
            .zip(right.iter())
            .for_each(|(l, r)| *l = 0.5 * (*l + *r));
    }

    fn down_mix_quad_to_mono(&mut self) {
        let (r, sl, sr) = (
            self.channels[1].clone(),
            self.channels[2].clone(),
            self.channels[3].clone(),
        );
        self.channels.truncate(1);
        let left = &mut self.channels[0];
        left.iter_mut()
            .zip(r.iter())
            .zip(sl.iter().zip(sr.iter()))
            .for_each(|((l, r), (sl, sr))| *l = 0.25 * (*l + *r + *sl + *sr));
    }

    fn down_mix_quad_to_stereo(&mut self) {
        let (sl, sr) = (self.channels[2].clone(), self.channels[3].clone());
        self.channels.truncate(2);
        self.channels[0]
            .iter_mut()
            .zip(sl.iter())
            .for_each(|(l, sl)| *l += SQRT1_2 * sl);
        self.channels[1]
            .iter_mut()
            .zip(sr.iter())
            .for_each(|(r, sr)| *r += SQRT1_2 * sr);
    }

    fn down_mix_five_one_to_mono(&mut self) {
        let (r, c, sl, sr) = (
            self.channels[1].clone(),
            self.channels[2].clone(),
            self.channels[4].clone(),
            self.channels[5].clone(),
        );
        self.channels.truncate(1);
        let left = &mut self.channels[0];
        left.iter_mut()
            .zip(r.iter().zip(c.iter()))
            .zip(sl.iter().zip(sr.iter()))
            .for_each(|((l, (r, c)), (sl, sr))| {
                // the LFE channel does not contribute
                *l = SQRT1_2 * (*l + *r) + *c + 0.5 * (*sl + *sr);
            });
    }

    fn down_mix_five_one_to_stereo(&mut self) {
        let (c, sl, sr) = (
            self.channels[2].clone(),
            self.channels[4].clone(),
            self.channels[5].clone(),
        );
        self.channels.truncate(2);
        self.channels[0]
            .iter_mut()
            .zip(c.iter().zip(sl.iter()))
            .for_each(|(l, (c, sl))| *l += SQRT1_2 * (*c + *sl));
        self.channels[1]
            .iter_mut()
            .zip(c.iter().zip(sr.iter()))
            .for_each(|(r, (c, sr))| *r += SQRT1_2 * (*c + *sr));
    }

    fn down_mix_five_one_to_quad(&mut self) {
        let c = self.channels[2].clone();
        self.channels.remove(3); // LFE
        self.channels.remove(2);
        for i in 0..2 {
            self.channels[i]
                .iter_mut()
                .zip(c.iter())
                .for_each(|(s, c)| *s += SQRT1_2 * c);
        }
    }
}

#[cfg(test)]
mod tests {
    use float_eq::assert_float_eq;

    use super::*;

    fn filled_bus(alloc: &Alloc, values: &[f32]) -> AudioBus {
        let mut bus = AudioBus::new(alloc.silence());
        bus.set_number_of_channels(values.len());
        for (i, v) in values.iter().enumerate() {
            bus.channel_data_mut(i).iter_mut().for_each(|s| *s = *v);
        }
        bus
    }

    fn channel_values(bus: &AudioBus) -> Vec<f32> {
        bus.channels().iter().map(|c| c[0]).collect()
    }

    #[test]
    fn test_pool() {
        // create a pool of size 2
        let alloc = Alloc::with_capacity(2);
        assert_eq!(alloc.pool_size(), 2);

        alloc_counter::deny_alloc(|| {
            {
                // take a buffer out of the pool
                let a = alloc.allocate();
                assert_eq!(*a.as_ref(), [0.; LEN]);
                assert_eq!(alloc.pool_size(), 1);

                // mutating this buffer will not allocate
                let mut a = a;
                a.iter_mut().for_each(|v| *v += 1.);
                assert_eq!(*a.as_ref(), [1.; LEN]);
                assert_eq!(alloc.pool_size(), 1);

                // cloning will not allocate
                let mut b: ChannelData = a.clone();
                assert_eq!(alloc.pool_size(), 1);

                // mutating the clone takes the second pool entry
                b.iter_mut().for_each(|v| *v += 1.);
                assert_eq!(alloc.pool_size(), 0);
            }

            // all buffers are reclaimed
            assert_eq!(alloc.pool_size(), 2);

            let c = {
                let _a = alloc.allocate();
                let _b = alloc.allocate();

                let c = alloc_counter::allow_alloc(|| {
                    // we can allocate beyond the pool size
                    let c = alloc.allocate();
                    assert_eq!(alloc.pool_size(), 0);
                    c
                });

                c
            };

            // dropping c extends the pool capacity
            alloc_counter::allow_alloc(move || {
                std::mem::drop(c);
            });

            assert_eq!(alloc.pool_size(), 3);

            {
                // silence does not take from the pool
                let mut a = alloc.silence();
                assert!(a.is_silent());
                assert_eq!(alloc.pool_size(), 3);

                // mutable access does, but the data stays zero
                let values = a.deref_mut();
                assert_eq!(alloc.pool_size(), 2);
                assert_eq!(*values, [0.; LEN]);

                // is_silent is a superficial ptr check
                assert!(!a.is_silent());
            }
        });
    }

    #[test]
    fn test_silence_propagation() {
        let alloc = Alloc::with_capacity(8);

        let mut bus = AudioBus::new(alloc.silence());
        assert!(bus.is_silent());

        bus.set_number_of_channels(4);
        assert!(bus.is_silent());

        bus.channel_data_mut(2).iter_mut().for_each(|s| *s = 1.);
        assert!(!bus.is_silent());

        bus.make_silent();
        assert_eq!(bus.number_of_channels(), 1);
        assert!(bus.is_silent());
    }

    #[test]
    fn test_zero_preserves_channel_count() {
        let alloc = Alloc::with_capacity(8);
        let mut bus = filled_bus(&alloc, &[1., 2., 3.]);

        bus.zero();
        assert_eq!(bus.number_of_channels(), 3);
        assert!(bus.is_silent());
    }

    #[test]
    fn test_sum_from() {
        let alloc = Alloc::with_capacity(8);
        let mut rng = rand::thread_rng();

        let mut a = AudioBus::new(alloc.allocate());
        let mut b = AudioBus::new(alloc.allocate());
        a.set_number_of_channels(2);
        b.set_number_of_channels(2);

        use rand::Rng;
        for i in 0..2 {
            a.channel_data_mut(i)
                .iter_mut()
                .for_each(|s| *s = rng.gen_range(-1.0..1.0));
            b.channel_data_mut(i)
                .iter_mut()
                .for_each(|s| *s = rng.gen_range(-1.0..1.0));
        }

        let before = a.clone();
        a.sum_from(&b).unwrap();

        for i in 0..2 {
            for j in 0..LEN {
                assert_float_eq!(
                    a.channel_data(i)[j],
                    before.channel_data(i)[j] + b.channel_data(i)[j],
                    ulps <= 1
                );
            }
        }
    }

    #[test]
    fn test_copy_from() {
        let alloc = Alloc::with_capacity(8);
        let src = filled_bus(&alloc, &[0.25, -0.5]);
        let mut dst = filled_bus(&alloc, &[1., 1.]);

        dst.copy_from(&src).unwrap();
        assert_eq!(channel_values(&dst), vec![0.25, -0.5]);

        let mono = filled_bus(&alloc, &[1.]);
        assert!(dst.copy_from(&mono).is_err());
    }

    #[test]
    fn test_sum_from_mismatched() {
        let alloc = Alloc::with_capacity(8);
        let mut a = AudioBus::new(alloc.allocate());
        let mut b = AudioBus::new(alloc.allocate());
        b.set_number_of_channels(2);

        assert_eq!(
            a.sum_from(&b),
            Err(Error::MismatchedFormat {
                destination: 1,
                source: 2
            })
        );
    }

    #[test]
    fn test_copy_with_gain() {
        let alloc = Alloc::with_capacity(8);
        let src = filled_bus(&alloc, &[1.]);
        let mut dst = AudioBus::new(alloc.silence());

        let mut last_gain = 0.;
        dst.copy_with_gain_from(&src, &mut last_gain, 1.).unwrap();

        // gain ramps linearly from 0 to 1 over the quantum
        assert_float_eq!(last_gain, 1., abs <= 0.);
        assert_float_eq!(dst.channel_data(0)[LEN - 1], 1., abs <= 1e-6);
        assert_float_eq!(dst.channel_data(0)[LEN / 2 - 1], 0.5, abs <= 1e-6);

        // a steady gain is applied uniformly
        dst.copy_with_gain_from(&src, &mut last_gain, 1.).unwrap();
        assert!(dst.channel_data(0).iter().all(|&s| (s - 1.).abs() < 1e-6));
    }

    #[test]
    fn test_scale_and_max_abs() {
        let alloc = Alloc::with_capacity(8);
        let mut bus = filled_bus(&alloc, &[0.5, -1.0]);

        assert_float_eq!(bus.max_abs_value(), 1.0, abs <= 0.);
        bus.scale(0.5);
        assert_float_eq!(bus.max_abs_value(), 0.5, abs <= 0.);
        assert_float_eq!(bus.channel_data(0)[0], 0.25, abs <= 0.);
    }

    #[test]
    fn test_mix_identity() {
        let alloc = Alloc::with_capacity(8);
        for channels in [1, 2, 4, 6] {
            let mut bus = filled_bus(&alloc, &vec![1.; channels]);
            let before = channel_values(&bus);
            bus.mix(channels, ChannelInterpretation::Speakers);
            assert_eq!(channel_values(&bus), before);
        }
    }

    #[test]
    fn test_up_mix_speakers() {
        let alloc = Alloc::with_capacity(16);

        // 1 -> 2: L = R = M
        let mut bus = filled_bus(&alloc, &[0.75]);
        bus.mix(2, ChannelInterpretation::Speakers);
        assert_eq!(channel_values(&bus), vec![0.75, 0.75]);

        // 1 -> 4: L = R = M, surrounds silent
        let mut bus = filled_bus(&alloc, &[0.75]);
        bus.mix(4, ChannelInterpretation::Speakers);
        assert_eq!(channel_values(&bus), vec![0.75, 0.75, 0., 0.]);

        // 1 -> 6: only the center speaks
        let mut bus = filled_bus(&alloc, &[0.75]);
        bus.mix(6, ChannelInterpretation::Speakers);
        assert_eq!(channel_values(&bus), vec![0., 0., 0.75, 0., 0., 0.]);

        // 2 -> 4 and 2 -> 6: passthrough + silence
        let mut bus = filled_bus(&alloc, &[0.25, 0.5]);
        bus.mix(4, ChannelInterpretation::Speakers);
        assert_eq!(channel_values(&bus), vec![0.25, 0.5, 0., 0.]);

        let mut bus = filled_bus(&alloc, &[0.25, 0.5]);
        bus.mix(6, ChannelInterpretation::Speakers);
        assert_eq!(channel_values(&bus), vec![0.25, 0.5, 0., 0., 0., 0.]);

        // 4 -> 6: surrounds keep their position
        let mut bus = filled_bus(&alloc, &[1., 2., 3., 4.]);
        bus.mix(6, ChannelInterpretation::Speakers);
        assert_eq!(channel_values(&bus), vec![1., 2., 0., 0., 3., 4.]);
    }

    #[test]
    fn test_down_mix_speakers() {
        let alloc = Alloc::with_capacity(16);

        // 2 -> 1: average
        let mut bus = filled_bus(&alloc, &[1., 0.5]);
        bus.mix(1, ChannelInterpretation::Speakers);
        assert_float_eq!(bus.channel_data(0)[0], 0.75, abs <= 1e-6);

        // 4 -> 1: quarter sum
        let mut bus = filled_bus(&alloc, &[1., 1., 1., 1.]);
        bus.mix(1, ChannelInterpretation::Speakers);
        assert_float_eq!(bus.channel_data(0)[0], 1., abs <= 1e-6);

        // 4 -> 2: surrounds fold in at -3dB
        let mut bus = filled_bus(&alloc, &[1., 1., 1., 1.]);
        bus.mix(2, ChannelInterpretation::Speakers);
        assert_float_eq!(bus.channel_data(0)[0], 1. + SQRT1_2, abs <= 1e-6);
        assert_float_eq!(bus.channel_data(1)[0], 1. + SQRT1_2, abs <= 1e-6);

        // 6 -> 1: LFE is discarded
        let mut bus = filled_bus(&alloc, &[1., 1., 1., 1., 1., 1.]);
        bus.mix(1, ChannelInterpretation::Speakers);
        assert_float_eq!(
            bus.channel_data(0)[0],
            SQRT1_2 * 2. + 1. + 0.5 * 2.,
            abs <= 1e-6
        );

        // 6 -> 2: center and surround fold in at -3dB
        let mut bus = filled_bus(&alloc, &[1., 1., 1., 1., 1., 1.]);
        bus.mix(2, ChannelInterpretation::Speakers);
        assert_float_eq!(bus.channel_data(0)[0], 1. + 2. * SQRT1_2, abs <= 1e-5);
        assert_float_eq!(bus.channel_data(1)[0], 1. + 2. * SQRT1_2, abs <= 1e-5);
    }

    #[test]
    fn test_mix_round_trips() {
        let alloc = Alloc::with_capacity(16);

        // 1 -> 2 -> 1
        let mut bus = filled_bus(&alloc, &[0.8]);
        bus.mix(2, ChannelInterpretation::Speakers);
        bus.mix(1, ChannelInterpretation::Speakers);
        assert_float_eq!(bus.channel_data(0)[0], 0.8, abs <= 1e-6);

        // 1 -> 4 -> 1
        let mut bus = filled_bus(&alloc, &[0.8]);
        bus.mix(4, ChannelInterpretation::Speakers);
        bus.mix(1, ChannelInterpretation::Speakers);
        assert_float_eq!(bus.channel_data(0)[0], 0.8 * 0.5, abs <= 1e-6);

        // 2 -> 4 -> 2: surrounds stay empty, stereo restored exactly
        let mut bus = filled_bus(&alloc, &[0.25, 0.5]);
        bus.mix(4, ChannelInterpretation::Speakers);
        bus.mix(2, ChannelInterpretation::Speakers);
        assert_eq!(channel_values(&bus), vec![0.25, 0.5]);
    }

    #[test]
    fn test_mix_discrete() {
        let alloc = Alloc::with_capacity(8);

        let mut bus = filled_bus(&alloc, &[1., 2.]);
        bus.mix(4, ChannelInterpretation::Discrete);
        assert_eq!(channel_values(&bus), vec![1., 2., 0., 0.]);

        bus.mix(1, ChannelInterpretation::Discrete);
        assert_eq!(channel_values(&bus), vec![1.]);
    }

    #[test]
    fn test_add_up_mixes() {
        let alloc = Alloc::with_capacity(8);

        let mut stereo = filled_bus(&alloc, &[1., 1.]);
        let mono = filled_bus(&alloc, &[0.5]);

        stereo.add(&mono, ChannelInterpretation::Speakers);
        assert_eq!(stereo.number_of_channels(), 2);
        assert_float_eq!(stereo.channel_data(0)[0], 1.5, abs <= 1e-6);
        assert_float_eq!(stereo.channel_data(1)[0], 1.5, abs <= 1e-6);
    }
}
