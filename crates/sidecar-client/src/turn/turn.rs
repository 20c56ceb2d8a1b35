//! Folding one turn's events into a structured aggregate.

use std::collections::HashMap;

use sidecar_proto::{
    AssistantMessage, MessageEvent, MessageKind, ResultMessage, ServerEvent, SidecarError,
    StreamEventMessage, SystemMessage, TurnBoundaryKind, UserMessage,
};

use crate::mux::Event;

/// Aggregate of every event observed for one turn id.
#[derive(Debug, Clone, Default)]
pub struct Turn {
    pub request_id: Option<String>,
    pub turn_id: String,
    pub turn_index: u32,
    /// Turn-begin seen before the turn ended.
    pub started: bool,
    /// Turn-end seen. Terminal.
    pub ended: bool,
    /// Every folded event, in arrival order.
    pub events: Vec<Event>,
    /// Final (non-partial) messages in arrival order.
    pub messages: Vec<MessageEvent>,
    /// Partial messages in arrival order.
    pub partials: Vec<MessageEvent>,
    pub stream_events: Vec<StreamEventMessage>,
    pub stderr: Vec<String>,
    pub errors: Vec<SidecarError>,
    /// Last result message seen, partial or final.
    pub result: Option<ResultMessage>,
    latest: HashMap<MessageKind, MessageEvent>,
}

impl Turn {
    /// Empty turn for `turn_id`.
    pub fn new(turn_id: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            ..Self::default()
        }
    }

    /// Fold one event. Returns `true` when this event ended the turn.
    pub fn apply(&mut self, event: Event) -> bool {
        if self.request_id.is_none() {
            self.request_id = event.request_id().map(str::to_owned);
        }

        let mut ended_now = false;
        match &event.event {
            ServerEvent::Turn(boundary) => match boundary.kind {
                TurnBoundaryKind::TurnBegin => {
                    if !self.started && !self.ended {
                        self.started = true;
                        self.turn_index = boundary.turn_index;
                    }
                }
                TurnBoundaryKind::TurnEnd => {
                    if !self.ended {
                        self.ended = true;
                        ended_now = true;
                    }
                    if self.turn_index == 0 {
                        self.turn_index = boundary.turn_index;
                    }
                }
            },
            ServerEvent::Message(message) => self.apply_message(message),
            ServerEvent::StderrLine(stderr) => self.stderr.push(stderr.line.clone()),
            ServerEvent::Error(error) => self.errors.push(error.clone()),
            _ => {}
        }

        self.events.push(event);
        ended_now
    }

    fn apply_message(&mut self, message: &MessageEvent) {
        if let Some(result) = message.message.as_result() {
            self.result = Some(result.clone());
        }
        if let Some(stream_event) = message.message.as_stream_event() {
            self.stream_events.push(stream_event.clone());
        }
        if message.is_partial {
            self.partials.push(message.clone());
        } else {
            self.latest.insert(message.kind(), message.clone());
            self.messages.push(message.clone());
        }
    }

    /// Latest final message of `kind`.
    pub fn latest(&self, kind: MessageKind) -> Option<&MessageEvent> {
        self.latest.get(&kind)
    }

    /// Latest final user message.
    pub fn latest_user(&self) -> Option<&UserMessage> {
        self.latest(MessageKind::User)
            .and_then(|m| m.message.as_user())
    }

    /// Latest final assistant message.
    pub fn latest_assistant(&self) -> Option<&AssistantMessage> {
        self.latest(MessageKind::Assistant)
            .and_then(|m| m.message.as_assistant())
    }

    /// Latest final system message.
    pub fn latest_system(&self) -> Option<&SystemMessage> {
        self.latest(MessageKind::System)
            .and_then(|m| m.message.as_system())
    }

    /// Latest final stream-event message.
    pub fn latest_stream_event(&self) -> Option<&StreamEventMessage> {
        self.latest(MessageKind::StreamEvent)
            .and_then(|m| m.message.as_stream_event())
    }

    /// The turn's result message, if any was observed.
    pub const fn latest_result(&self) -> Option<&ResultMessage> {
        self.result.as_ref()
    }

    /// Latest final assistant message, else the latest partial one.
    pub fn merged_assistant(&self) -> Option<&AssistantMessage> {
        self.latest_assistant().or_else(|| {
            self.partials
                .iter()
                .rev()
                .find_map(|m| m.message.as_assistant())
        })
    }
}

/// Outcome of a completed single-turn run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub turn: Turn,
}

impl RunResult {
    /// Wrap a completed turn.
    pub const fn new(turn: Turn) -> Self {
        Self { turn }
    }

    /// The merged assistant message of the turn.
    pub fn assistant(&self) -> Option<&AssistantMessage> {
        self.turn.merged_assistant()
    }

    /// The result message of the turn, if any.
    pub const fn result(&self) -> Option<&ResultMessage> {
        self.turn.latest_result()
    }

    /// Request the turn belongs to.
    pub fn request_id(&self) -> Option<&str> {
        self.turn.request_id.as_deref()
    }
}
