//! Render subscription
//!
//! The controller publishes owned [`RenderEvent`] messages; subscribers draw
//! them. Subscribers are called one at a time from the controller's thread and
//! must not block.

use serde::Serialize;

use crate::animation::Phase;
use crate::model::{CircleSnapshot, Position};
use crate::scheduler::Generation;
use crate::simulation::RunId;

/// Messages sent to the render layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RenderEvent {
    /// Drop everything drawn for previous generations
    Cleared { generation: Generation },
    /// A new set of circles, resting on their targets
    Built {
        generation: Generation,
        circles: Vec<CircleSnapshot>,
    },
    /// Start the fade/morph between region shapes and circles
    PhaseChanged {
        generation: Generation,
        from: Phase,
        to: Phase,
    },
    /// Positions after one simulation tick
    Tick {
        generation: Generation,
        run: RunId,
        alpha: f64,
        positions: Vec<Position>,
    },
    /// The run cooled down
    Converged { generation: Generation, run: RunId },
    /// Hovered circle
    Highlight { id: String },
    /// Hover left a circle
    Unhighlight { id: String },
    /// Hide any visible tooltip
    TooltipHidden,
}

impl RenderEvent {
    /// Short name, handy for logs and traces
    pub fn kind(&self) -> &'static str {
        match self {
            RenderEvent::Cleared { .. } => "cleared",
            RenderEvent::Built { .. } => "built",
            RenderEvent::PhaseChanged { .. } => "phase_changed",
            RenderEvent::Tick { .. } => "tick",
            RenderEvent::Converged { .. } => "converged",
            RenderEvent::Highlight { .. } => "highlight",
            RenderEvent::Unhighlight { .. } => "unhighlight",
            RenderEvent::TooltipHidden => "tooltip_hidden",
        }
    }
}

/// Receives render events
pub trait RenderSubscriber {
    fn render(&mut self, event: &RenderEvent);
}

/// Adapts a closure into a subscriber
pub struct FnSubscriber<F>(pub F);

impl<F> RenderSubscriber for FnSubscriber<F>
where
    F: FnMut(&RenderEvent),
{
    fn render(&mut self, event: &RenderEvent) {
        (self.0)(event)
    }
}

/// Forwards events over a std channel; a closed receiver is ignored
impl RenderSubscriber for std::sync::mpsc::Sender<RenderEvent> {
    fn render(&mut self, event: &RenderEvent) {
        let _ = self.send(event.clone());
    }
}

/// Forwards events over a tokio channel; a closed receiver is ignored
impl RenderSubscriber for tokio::sync::mpsc::UnboundedSender<RenderEvent> {
    fn render(&mut self, event: &RenderEvent) {
        let _ = self.send(event.clone());
    }
}

/// Ordered list of subscribers
#[derive(Default)]
pub struct Subscribers {
    subscribers: Vec<Box<dyn RenderSubscriber>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscriber: Box<dyn RenderSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn publish(&mut self, event: RenderEvent) {
        for subscriber in &mut self.subscribers {
            subscriber.render(&event);
        }
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.subscribers.len())
            .finish()
    }
}
