//! Domain notifications derived from relation lifecycle signals

use crate::model::RelationEventKind;

/// Notifications for the side that routes traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Requirer data was read; fetch it with `get_data`
    DataAvailable,

    /// A requirer went away
    DataRemoved,
}

/// Notifications for the side that asks to be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirerEvent {
    /// The provider has published endpoints; fetch them with `get_routed_endpoints`
    Ready,

    /// The relation with the provider is gone
    Removed,
}

/// Where a single relation instance is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationPhase {
    Unbound,
    Joining,
    Exchanging,
    Broken,
}

impl RelationPhase {
    /// The phase a relation lands in after the given signal
    ///
    /// Signals the library does not act on (a unit joining) return `None`.
    pub fn after(kind: RelationEventKind) -> Option<RelationPhase> {
        match kind {
            RelationEventKind::Created => Some(RelationPhase::Joining),
            RelationEventKind::Changed => Some(RelationPhase::Exchanging),
            RelationEventKind::Departed | RelationEventKind::Broken => Some(RelationPhase::Broken),
            RelationEventKind::Joined => None,
        }
    }

    /// Entering this phase reads and validates the remote side's data
    pub fn validates(self) -> bool {
        match self {
            RelationPhase::Joining | RelationPhase::Exchanging => true,
            RelationPhase::Unbound | RelationPhase::Broken => false,
        }
    }
}
