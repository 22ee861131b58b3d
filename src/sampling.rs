//! The sampling clock
//!
//! `current_sample_frame` is written only by the render thread. Other
//! threads obtain consistent snapshots without locking: the writer fills the
//! epoch slot indexed by the low bit of the upcoming frame value before
//! publishing the frame, the reader re-checks the frame after loading the
//! slot and retries if a write raced in between.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A consistent snapshot of the sampling clock
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sampling {
    /// Number of sample frames processed so far
    pub current_sample_frame: u64,
    /// `current_sample_frame` expressed in seconds
    pub current_time: f64,
    /// Sample rate of the stream in Hertz
    pub sample_rate: f32,
    /// Wall-clock time since the stream started, taken when the frame
    /// counter was last advanced
    pub epoch: Duration,
}

pub(crate) struct SamplingInfo {
    current_sample_frame: AtomicU64,
    // nanoseconds since `origin`, double buffered by the low bit of the frame
    epoch: [AtomicU64; 2],
    sample_rate: f32,
    origin: Instant,
}

impl SamplingInfo {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            current_sample_frame: AtomicU64::new(0),
            epoch: [AtomicU64::new(0), AtomicU64::new(0)],
            sample_rate,
            origin: Instant::now(),
        }
    }

    /// Current frame, for use on the render thread itself
    pub fn current_frame(&self) -> u64 {
        self.current_sample_frame.load(Ordering::Acquire)
    }

    /// Advance the frame counter, render thread only
    pub fn advance(&self, frames: u64) {
        let next = self.current_sample_frame.load(Ordering::Relaxed) + frames;
        let nanos = self.origin.elapsed().as_nanos() as u64;
        // fill the alternative epoch slot, then publish the frame
        self.epoch[(next & 1) as usize].store(nanos, Ordering::Release);
        self.current_sample_frame.store(next, Ordering::Release);
    }

    /// Consistent snapshot, callable from any thread
    pub fn snapshot(&self) -> Sampling {
        loop {
            let frame = self.current_sample_frame.load(Ordering::Acquire);
            let nanos = self.epoch[(frame & 1) as usize].load(Ordering::Acquire);
            if self.current_sample_frame.load(Ordering::Acquire) == frame {
                return Sampling {
                    current_sample_frame: frame,
                    current_time: frame as f64 / self.sample_rate as f64,
                    sample_rate: self.sample_rate,
                    epoch: Duration::from_nanos(nanos),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_and_snapshot() {
        let info = SamplingInfo::new(48_000.);

        let snapshot = info.snapshot();
        assert_eq!(snapshot.current_sample_frame, 0);
        assert_eq!(snapshot.current_time, 0.);

        info.advance(128);
        info.advance(128);

        let snapshot = info.snapshot();
        assert_eq!(snapshot.current_sample_frame, 256);
        assert_eq!(snapshot.current_time, 256. / 48_000.);
        assert_eq!(snapshot.sample_rate, 48_000.);
    }

    #[test]
    fn test_monotonic_across_threads() {
        use std::sync::Arc;

        let info = Arc::new(SamplingInfo::new(48_000.));
        let reader = Arc::clone(&info);

        let handle = std::thread::spawn(move || {
            let mut last = 0;
            for _ in 0..10_000 {
                let frame = reader.snapshot().current_sample_frame;
                assert!(frame >= last);
                last = frame;
            }
        });

        for _ in 0..10_000 {
            info.advance(128);
        }

        handle.join().unwrap();
    }
}
