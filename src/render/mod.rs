//! Primitives used for rendering the audio graph

mod bus;
mod graph;
mod processor;
mod thread;

pub use bus::{AudioBus, ChannelData};
pub use processor::{AudioParamValues, AudioProcessor, RenderScope};

pub(crate) use bus::Alloc;
pub(crate) use graph::{Graph, NodeIndex, PARAM_INPUT};
pub(crate) use thread::RenderThread;
