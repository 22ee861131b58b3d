//! A real-time audio synthesis and processing engine organized as a directed
//! graph of audio nodes exchanging multi-channel sample buffers.
//!
//! The graph is rendered with a pull model in fixed-size quanta on a dedicated
//! render thread, while user threads build the graph, schedule source playback
//! and automate parameters. The render thread itself is driven either by an
//! external audio driver (see [`context::AudioContext`]) or by a synchronous
//! loop (see [`context::OfflineAudioContext`]).
//!
//! # Usage
//!
//! ```
//! use soundgraph::context::{BaseAudioContext, OfflineAudioContext};
//! use soundgraph::node::{AudioNode, AudioScheduledSourceNode};
//!
//! // render 1 second of stereo audio at 48kHz, as fast as possible
//! let mut context = OfflineAudioContext::new(2, 48_000, 48_000.);
//!
//! let osc = context.create_oscillator();
//! osc.connect(&context.destination());
//! osc.start();
//!
//! let rendered = context.start_rendering();
//! assert_eq!(rendered.length(), 48_000);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Render quantum size, the audio graph is rendered in blocks of this size
pub const RENDER_QUANTUM_SIZE: usize = 128;

/// Maximum number of channels for a single audio bus
pub const MAX_CHANNELS: usize = 32;

pub mod buffer;
pub mod context;
pub mod node;
pub mod param;
pub mod render;

pub(crate) mod control;
pub(crate) mod events;
pub(crate) mod message;
pub(crate) mod sampling;

pub use sampling::Sampling;

/// Error type for operations of the user-facing API.
///
/// Errors that can only occur on the render thread (a missing input, a
/// deferred action that cannot be applied this quantum) are not represented
/// here: the renderer degrades to silence or retries at the next quantum
/// boundary, it never surfaces errors across the audio callback boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input or output port index out of range
    InvalidIndex {
        /// the requested port
        index: usize,
        /// number of available ports
        available: usize,
    },
    /// Scheduling value is negative or not a finite number
    InvalidTime {
        /// the offending time value in seconds
        time: f64,
    },
    /// Automation value outside the domain of the requested curve
    InvalidDomain {
        /// the offending value
        value: f32,
        /// what was expected of it
        constraint: &'static str,
    },
    /// Bus operation on buses of incompatible shapes
    MismatchedFormat {
        /// channel count of the destination bus
        destination: usize,
        /// channel count of the source bus
        source: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidIndex { index, available } => {
                write!(f, "IndexSizeError: port {} out of range 0..{}", index, available)
            }
            Error::InvalidTime { time } => {
                write!(f, "RangeError: time value {} must be finite and non-negative", time)
            }
            Error::InvalidDomain { value, constraint } => {
                write!(f, "RangeError: value {} must be {}", value, constraint)
            }
            Error::MismatchedFormat { destination, source } => {
                write!(
                    f,
                    "MismatchedFormat: bus with {} channels incompatible with {} channels",
                    destination, source
                )
            }
        }
    }
}

impl std::error::Error for Error {}

/// Validate a user supplied scheduling time (absolute seconds)
pub(crate) fn valid_time_value(time: f64) -> Result<(), Error> {
    if time.is_finite() && time >= 0. {
        Ok(())
    } else {
        Err(Error::InvalidTime { time })
    }
}

/// Atomic float, suitable for playhead positions and timestamps.
///
/// The standard library has no `AtomicF64`, the value is stored in its bit
/// representation instead.
#[derive(Debug)]
pub(crate) struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }

    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_f64() {
        let f = AtomicF64::new(2.0);
        assert_eq!(f.load(), 2.0);
        f.store(3.0);
        assert_eq!(f.load(), 3.0);
    }

    #[test]
    fn test_valid_time_value() {
        assert!(valid_time_value(0.).is_ok());
        assert!(valid_time_value(1.5).is_ok());
        assert!(valid_time_value(-0.1).is_err());
        assert!(valid_time_value(f64::NAN).is_err());
        assert!(valid_time_value(f64::INFINITY).is_err());
    }
}
