use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::view::DashboardView;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    ViewUpdate,
    Command,
}

/// Message published by the sync loop to its subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecycleEvent),
    View(Box<DashboardView>),
    Command(CommandEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecyclePhase {
    Started,
    PollingSuspended,
    PollingResumed,
    Shutdown,
}

/// Outcome of one control request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEvent {
    pub path: String,
    pub ok: bool,
    pub error: Option<String>,
}

impl DashboardEvent {
    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn view(view: DashboardView) -> Self {
        Self::new(EventKind::ViewUpdate, EventPayload::View(Box::new(view)))
    }

    pub fn lifecycle(phase: LifecyclePhase, details: impl Into<Option<String>>) -> Self {
        Self::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent {
                phase,
                details: details.into(),
            }),
        )
    }

    pub fn command(event: CommandEvent) -> Self {
        Self::new(EventKind::Command, EventPayload::Command(event))
    }
}
