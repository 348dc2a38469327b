//! Container platform abstraction.
//!
//! The watcher consumes the platform through this trait so the lifecycle
//! logic can be driven by a mock in tests and by bollard in production.

use std::collections::HashMap;
use std::pin::Pin;

use futures::Stream;

use crate::discovery::error::{DiscoveryError, Result};

/// Minimal record from a running-container listing.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    /// Platform-assigned container ID.
    pub id: String,
    /// Container name, if the platform reported one.
    pub name: Option<String>,
}

/// Full metadata snapshot from container inspection.
///
/// Fetched fresh for every start event; never cached. A second start event
/// for the same container triggers a new inspection.
#[derive(Debug, Clone)]
pub struct ContainerMetadata {
    /// Platform-assigned container ID.
    pub id: String,
    /// Raw container name as reported by the platform, leading separator
    /// included (Docker reports `/my-app`).
    pub name: String,
    /// Container labels.
    pub labels: HashMap<String, String>,
    /// Ports the container declares as exposed, in no particular order.
    pub exposed_ports: Vec<u16>,
}

/// Container lifecycle actions the watcher cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Start,
    Stop,
    Die,
    Kill,
}

impl EventAction {
    /// Parse a platform action string. Unknown actions return `None` and are
    /// ignored by consumers.
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "start" => Some(EventAction::Start),
            "stop" => Some(EventAction::Stop),
            "die" => Some(EventAction::Die),
            "kill" => Some(EventAction::Kill),
            _ => None,
        }
    }

    /// The platform's wire name for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Start => "start",
            EventAction::Stop => "stop",
            EventAction::Die => "die",
            EventAction::Kill => "kill",
        }
    }

    /// Whether this action terminates a container.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventAction::Stop | EventAction::Die | EventAction::Kill)
    }
}

/// A container lifecycle event.
#[derive(Debug, Clone)]
pub struct ContainerEvent {
    /// ID of the container the event is about.
    pub id: String,
    /// What happened.
    pub action: EventAction,
}

/// Subscription filter for the platform event stream.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Actions to deliver.
    pub actions: Vec<EventAction>,
    /// Restrict to a single container ID.
    pub container: Option<String>,
}

impl EventFilter {
    /// Filter for container start events (the top-level subscription).
    pub fn starts() -> Self {
        Self {
            actions: vec![EventAction::Start],
            container: None,
        }
    }

    /// Filter for terminal events of one specific container.
    pub fn terminal_for(id: impl Into<String>) -> Self {
        Self {
            actions: vec![EventAction::Stop, EventAction::Die, EventAction::Kill],
            container: Some(id.into()),
        }
    }

    /// Whether an event passes this filter.
    pub fn matches(&self, event: &ContainerEvent) -> bool {
        if let Some(id) = &self.container {
            if *id != event.id {
                return false;
            }
        }
        self.actions.is_empty() || self.actions.contains(&event.action)
    }
}

/// Stream of filtered container events.
///
/// The stream ending corresponds to the platform closing the subscription; an
/// `Err` item corresponds to the platform's error channel yielding an error.
pub type EventStream = Pin<Box<dyn Stream<Item = std::result::Result<ContainerEvent, DiscoveryError>> + Send>>;

/// Capabilities the watcher needs from the container platform.
#[async_trait::async_trait]
pub trait ContainerPlatform: Send + Sync {
    /// List currently running containers. Used once, at reconciliation.
    async fn list_running(&self) -> Result<Vec<ContainerSummary>>;

    /// Fetch the full metadata snapshot for a container.
    ///
    /// Returns [`DiscoveryError::NotFound`] when the container disappeared
    /// between the event and the inspection.
    async fn inspect(&self, id: &str) -> Result<ContainerMetadata>;

    /// Subscribe to a filtered event stream.
    fn subscribe(&self, filter: EventFilter) -> EventStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_actions() {
        assert_eq!(EventAction::parse("start"), Some(EventAction::Start));
        assert_eq!(EventAction::parse("stop"), Some(EventAction::Stop));
        assert_eq!(EventAction::parse("die"), Some(EventAction::Die));
        assert_eq!(EventAction::parse("kill"), Some(EventAction::Kill));
        assert_eq!(EventAction::parse("pause"), None);
        assert_eq!(EventAction::parse(""), None);
    }

    #[test]
    fn terminal_actions() {
        assert!(!EventAction::Start.is_terminal());
        assert!(EventAction::Stop.is_terminal());
        assert!(EventAction::Die.is_terminal());
        assert!(EventAction::Kill.is_terminal());
    }

    #[test]
    fn filter_matches_by_action_and_container() {
        let filter = EventFilter::terminal_for("abc");

        let stop_abc = ContainerEvent {
            id: "abc".to_string(),
            action: EventAction::Stop,
        };
        let stop_other = ContainerEvent {
            id: "def".to_string(),
            action: EventAction::Stop,
        };
        let start_abc = ContainerEvent {
            id: "abc".to_string(),
            action: EventAction::Start,
        };

        assert!(filter.matches(&stop_abc));
        assert!(!filter.matches(&stop_other));
        assert!(!filter.matches(&start_abc));
    }

    #[test]
    fn start_filter_ignores_container_id() {
        let filter = EventFilter::starts();
        let event = ContainerEvent {
            id: "anything".to_string(),
            action: EventAction::Start,
        };
        assert!(filter.matches(&event));
    }
}
