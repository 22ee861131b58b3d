//! Sample-accurate scheduling of source node playback
//!
//! Every source node owns a [`NodeScheduler`] on the render thread, fed by a
//! [`SchedulerHandle`] on the control thread. Start/stop requests become
//! `(state, epoch)` operations in a min-heap keyed by epoch; the scheduler
//! drains due operations at each quantum and reports the renderable span of
//! the quantum back to the node.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crossbeam_channel::{self, Receiver, Sender};

use crate::render::{AudioBus, RenderScope};
use crate::{valid_time_value, Error, RENDER_QUANTUM_SIZE};

/// Playback lifecycle of a source node
///
/// States only ever advance, except through `reset()` which re-enqueues a
/// stop at epoch zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchedulingState {
    /// Initial playback state, created but not yet scheduled
    Unscheduled,
    /// Scheduled to play but not yet due
    Scheduled,
    /// First rendered quantum, ramping in
    FadeIn,
    /// Generating sound
    Playing,
    /// Stop epoch reached, ramping out
    Stopping,
    /// Queue cleared, transitioning to a stop
    Resetting,
    /// Playback over, the tail is still sounding
    Finishing,
    /// Node has finished and will not sound again
    Finished,
}

/// An upcoming state change at a given epoch (sample frame)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct ScheduleOp {
    state: SchedulingState,
    epoch: u64,
    seq: u64,
}

impl Ord for ScheduleOp {
    fn cmp(&self, other: &Self) -> Ordering {
        // `BinaryHeap` is a max-heap, reverse so the earliest epoch pops
        // first; equal epochs pop in insertion order
        other
            .epoch
            .cmp(&self.epoch)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduleOp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

type OnStart = Box<dyn FnOnce(f64) + Send + 'static>;
type OnEnded = Box<dyn FnOnce() + Send + 'static>;

enum SchedulerMessage {
    Start { epoch: u64, when: f64 },
    Stop { epoch: u64 },
    Reset,
    OnStart(OnStart),
    OnEnded(OnEnded),
}

/// Control-thread side of a source node scheduler
///
/// Converts absolute seconds to sample frames and posts operations to the
/// render-side [`NodeScheduler`]; the channel is drained at the next quantum
/// boundary.
pub(crate) struct SchedulerHandle {
    sender: Sender<SchedulerMessage>,
    sample_rate: f32,
}

impl SchedulerHandle {
    pub fn new(sample_rate: f32) -> (Self, NodeScheduler) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let handle = Self {
            sender,
            sample_rate,
        };
        (handle, NodeScheduler::new(receiver))
    }

    fn frame(&self, when: f64) -> u64 {
        (when * self.sample_rate as f64).round() as u64
    }

    /// Schedule playback start, `when` in absolute seconds
    pub fn start_at(&self, when: f64, current_time: f64) -> Result<(), Error> {
        valid_time_value(when)?;
        if when < current_time {
            return Err(Error::InvalidTime { time: when });
        }
        let message = SchedulerMessage::Start {
            epoch: self.frame(when),
            when,
        };
        // sending fails when the render thread has shut down, this is fine
        let _ = self.sender.send(message);
        Ok(())
    }

    /// Schedule playback stop, `when` in absolute seconds
    pub fn stop_at(&self, when: f64, current_time: f64) -> Result<(), Error> {
        valid_time_value(when)?;
        if when < current_time {
            return Err(Error::InvalidTime { time: when });
        }
        let message = SchedulerMessage::Stop {
            epoch: self.frame(when),
        };
        let _ = self.sender.send(message);
        Ok(())
    }

    /// Clear all pending operations and stop immediately
    pub fn reset(&self) {
        let _ = self.sender.send(SchedulerMessage::Reset);
    }

    pub fn set_onstart(&self, callback: OnStart) {
        let _ = self.sender.send(SchedulerMessage::OnStart(callback));
    }

    pub fn set_onended(&self, callback: OnEnded) {
        let _ = self.sender.send(SchedulerMessage::OnEnded(callback));
    }
}

/// The renderable part of the current quantum, as decided by the scheduler
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct RenderSpan {
    /// silent frames before the signal starts
    pub offset: usize,
    /// number of signal frames, starting at `offset`
    pub length: usize,
    /// ramp the span in from silence
    pub fade_in: bool,
    /// ramp the span out into silence
    pub fade_out: bool,
}

impl RenderSpan {
    fn silent() -> Self {
        Self {
            offset: 0,
            length: 0,
            fade_in: false,
            fade_out: false,
        }
    }

    /// Zero the samples outside the span and apply the de-click ramps
    ///
    /// The half-cosine fades span at most one render quantum; they are only
    /// requested when a start/stop boundary falls strictly inside a quantum.
    pub fn apply(&self, output: &mut AudioBus) {
        if self.length == 0 {
            output.make_silent();
            return;
        }

        let (start, end) = (self.offset, self.offset + self.length);
        let fade_in = self.fade_in;
        let fade_out = self.fade_out;
        let n = self.length as f32;

        output.modify_channels(|channel| {
            channel[..start].iter_mut().for_each(|s| *s = 0.);
            channel[end..].iter_mut().for_each(|s| *s = 0.);

            if fade_in {
                for (i, s) in channel[start..end].iter_mut().enumerate() {
                    let phase = std::f32::consts::PI * (i + 1) as f32 / n;
                    *s *= 0.5 * (1. - phase.cos());
                }
            }
            if fade_out {
                for (i, s) in channel[start..end].iter_mut().enumerate() {
                    let phase = std::f32::consts::PI * (i + 1) as f32 / n;
                    *s *= 0.5 * (1. + phase.cos());
                }
            }
        });
    }
}

/// Render-thread state machine driving a source node through its lifecycle
pub(crate) struct NodeScheduler {
    playback_state: SchedulingState,
    ops: BinaryHeap<ScheduleOp>,
    receiver: Receiver<SchedulerMessage>,
    seq: u64,
    start_epoch: u64,
    start_when: f64,
    stop_epoch: u64,
    finish_epoch: u64,
    on_start: Option<OnStart>,
    on_ended: Option<OnEnded>,
}

impl NodeScheduler {
    fn new(receiver: Receiver<SchedulerMessage>) -> Self {
        Self {
            playback_state: SchedulingState::Unscheduled,
            ops: BinaryHeap::with_capacity(16),
            receiver,
            seq: 0,
            start_epoch: 0,
            start_when: 0.,
            stop_epoch: 0,
            finish_epoch: 0,
            on_start: None,
            on_ended: None,
        }
    }

    pub fn playback_state(&self) -> SchedulingState {
        self.playback_state
    }

    /// True while the node may still produce sound or owes an ended event
    pub fn is_active(&self) -> bool {
        self.playback_state > SchedulingState::Unscheduled
            && self.playback_state < SchedulingState::Finished
    }

    fn push(&mut self, state: SchedulingState, epoch: u64) {
        let op = ScheduleOp {
            state,
            epoch,
            seq: self.seq,
        };
        self.seq += 1;
        self.ops.push(op);
    }

    /// Render-side stop, used when a source exhausts its signal
    pub fn stop_frame(&mut self, epoch: u64) {
        self.push(SchedulingState::Stopping, epoch);
    }

    fn handle_messages(&mut self) {
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                SchedulerMessage::Start { epoch, when } => {
                    if self.playback_state == SchedulingState::Unscheduled {
                        self.playback_state = SchedulingState::Scheduled;
                    }
                    self.start_when = when;
                    self.push(SchedulingState::FadeIn, epoch);
                }
                SchedulerMessage::Stop { epoch } => {
                    self.push(SchedulingState::Stopping, epoch);
                }
                SchedulerMessage::Reset => {
                    self.ops.clear();
                    if self.playback_state >= SchedulingState::FadeIn
                        && self.playback_state < SchedulingState::Stopping
                    {
                        self.playback_state = SchedulingState::Resetting;
                    }
                    self.push(SchedulingState::Stopping, 0);
                }
                SchedulerMessage::OnStart(callback) => self.on_start = Some(callback),
                SchedulerMessage::OnEnded(callback) => self.on_ended = Some(callback),
            }
        }
    }

    /// Advance the state machine to the quantum starting at
    /// `scope.current_frame` and report the renderable span.
    ///
    /// `tail_frames` is the tail the node keeps sounding beyond its stop
    /// epoch before it is considered finished.
    pub fn update(&mut self, scope: &RenderScope, tail_frames: u64) -> RenderSpan {
        self.handle_messages();

        let quantum = RENDER_QUANTUM_SIZE;
        let epoch = scope.current_frame;
        let window_end = epoch + quantum as u64;

        // drain operations due inside this quantum
        while let Some(top) = self.ops.peek() {
            if top.epoch >= window_end {
                break;
            }
            let op = *top;
            self.ops.pop();

            match op.state {
                SchedulingState::FadeIn => {
                    if self.playback_state < SchedulingState::FadeIn {
                        // not playing: start, and stop draining so the start
                        // stays sample accurate
                        self.playback_state = SchedulingState::FadeIn;
                        self.start_epoch = op.epoch.max(epoch);
                        break;
                    }
                    // already playing or stopped: states only advance forward
                }
                SchedulingState::Stopping => {
                    let sounding = self.playback_state >= SchedulingState::FadeIn
                        && self.playback_state < SchedulingState::Stopping;
                    if sounding || self.playback_state == SchedulingState::Resetting {
                        self.playback_state = SchedulingState::Stopping;
                        self.stop_epoch = op.epoch.max(epoch);
                        break;
                    }
                    // never started: nothing to stop, keep draining
                }
                _ => unreachable!("only FadeIn and Stopping ops are enqueued"),
            }
        }

        match self.playback_state {
            SchedulingState::Unscheduled
            | SchedulingState::Scheduled
            | SchedulingState::Resetting => RenderSpan::silent(),

            SchedulingState::FadeIn => {
                let offset = (self.start_epoch - epoch) as usize;
                let span = RenderSpan {
                    offset,
                    length: quantum - offset,
                    fade_in: offset > 0,
                    fade_out: false,
                };

                if let Some(callback) = self.on_start.take() {
                    let when = self.start_when;
                    scope.enqueue_event(Box::new(move || callback(when)));
                }

                self.playback_state = SchedulingState::Playing;
                span
            }

            SchedulingState::Playing => RenderSpan {
                offset: 0,
                length: quantum,
                fade_in: false,
                fade_out: false,
            },

            SchedulingState::Stopping => {
                let stop_offset = ((self.stop_epoch - epoch) as usize).min(quantum);
                self.playback_state = SchedulingState::Finishing;
                self.finish_epoch = self.stop_epoch + tail_frames;

                RenderSpan {
                    offset: 0,
                    length: stop_offset,
                    fade_in: false,
                    fade_out: stop_offset > 0 && stop_offset < quantum,
                }
            }

            SchedulingState::Finishing => {
                if epoch >= self.finish_epoch {
                    self.playback_state = SchedulingState::Finished;
                    if let Some(callback) = self.on_ended.take() {
                        scope.enqueue_event(callback);
                    }
                }
                RenderSpan::silent()
            }

            SchedulingState::Finished => RenderSpan::silent(),
        }
    }
}
