//! The `OfflineAudioContext` type

use std::sync::{Arc, Mutex};

use crate::buffer::AudioBuffer;
use crate::context::{AudioContextState, BaseAudioContext, ConcreteBaseAudioContext};
use crate::events::{EventCallback, EventQueue};
use crate::render::RenderThread;
use crate::sampling::SamplingInfo;

/// A context that does not render to the audio hardware: it generates audio
/// as fast as it can and yields the result as an [`AudioBuffer`]
///
/// Given the same graph and inputs, two offline renders produce identical
/// output.
pub struct OfflineAudioContext {
    base: ConcreteBaseAudioContext,
    /// the size of the rendering in sample frames
    length: usize,
    /// the rendering 'thread', fully controlled by this context
    render: Option<RenderThread>,
    oncomplete: Mutex<Option<EventCallback>>,
}

impl BaseAudioContext for OfflineAudioContext {
    fn base(&self) -> &ConcreteBaseAudioContext {
        &self.base
    }
}

impl OfflineAudioContext {
    /// Create an offline context rendering `length` sample frames of
    /// `number_of_channels` channels at `sample_rate` Hertz
    pub fn new(number_of_channels: usize, length: usize, sample_rate: f32) -> Self {
        assert!(number_of_channels >= 1, "need at least one output channel");
        assert!(sample_rate > 0., "sample rate must be positive");

        let (sender, receiver) = crossbeam_channel::unbounded();
        let (event_sender, event_queue) = EventQueue::new();
        let sampling = Arc::new(SamplingInfo::new(sample_rate));

        let render = RenderThread::new(
            sample_rate,
            number_of_channels,
            Arc::clone(&sampling),
            receiver,
            event_sender.clone(),
        );

        let base = ConcreteBaseAudioContext::new(
            sample_rate,
            number_of_channels,
            sampling,
            sender,
            event_sender,
            event_queue,
            true,
        );

        Self {
            base,
            length,
            render: Some(render),
            oncomplete: Mutex::new(None),
        }
    }

    /// Number of sample frames this context will render
    pub fn length(&self) -> usize {
        self.length
    }

    /// Register a callback to run when the rendering completes
    ///
    /// The callback goes through the event queue: call
    /// [`dispatch_events`](BaseAudioContext::dispatch_events) after
    /// [`start_rendering`](OfflineAudioContext::start_rendering) to run it.
    pub fn set_oncomplete<F: FnOnce() + Send + 'static>(&self, callback: F) {
        *self.oncomplete.lock().unwrap() = Some(Box::new(callback));
    }

    /// Render the graph synchronously over the full length of the context
    ///
    /// # Panics
    ///
    /// Panics when called more than once.
    pub fn start_rendering(&mut self) -> AudioBuffer {
        let mut render = self.render.take().expect("rendering has already started");

        self.base.set_state(AudioContextState::Running);
        let buffer = render.render_offline(self.length);
        self.base.set_state(AudioContextState::Closed);

        if let Some(callback) = self.oncomplete.lock().unwrap().take() {
            self.base.enqueue_event(callback);
        }

        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_states() {
        let mut context = OfflineAudioContext::new(1, 256, 48_000.);
        assert_eq!(context.state(), AudioContextState::Suspended);
        assert_eq!(context.length(), 256);

        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        context.set_oncomplete(move || fired_clone.store(true, std::sync::atomic::Ordering::SeqCst));

        let buffer = context.start_rendering();
        assert_eq!(context.state(), AudioContextState::Closed);
        assert_eq!(buffer.length(), 256);
        assert_eq!(buffer.number_of_channels(), 1);

        assert_eq!(context.dispatch_events(), 1);
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_current_time_advances() {
        let mut context = OfflineAudioContext::new(1, 384, 48_000.);
        assert_eq!(context.current_time(), 0.);

        context.start_rendering();
        // 384 frames are exactly three quanta
        assert_eq!(context.current_time(), 384. / 48_000.);
    }
}
