use super::error::ValidationError;
use super::request::{RequestStatus, TimeStamp};
use chrono::Utc;
use std::fmt;
use std::str::FromStr;

/// An action a caller may apply to an existing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Approved,
    Rejected,
    Modified,
}

impl Action {
    /// The status an action moves a request into. `Modified` edits items
    /// and leaves the status alone.
    pub fn target_status(&self) -> Option<RequestStatus> {
        match self {
            Action::Approved => Some(RequestStatus::Approved),
            Action::Rejected => Some(RequestStatus::Rejected),
            Action::Modified => None,
        }
    }
}

impl FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Action::Approved),
            "rejected" => Ok(Action::Rejected),
            "modified" => Ok(Action::Modified),
            other => Err(ValidationError::UnknownAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum HistoryAction {
    #[n(0)]
    Created,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Modified,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Approved => "approved",
            HistoryAction::Rejected => "rejected",
            HistoryAction::Modified => "modified",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Action> for HistoryAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Approved => HistoryAction::Approved,
            Action::Rejected => HistoryAction::Rejected,
            Action::Modified => HistoryAction::Modified,
        }
    }
}

/// One immutable line of a request's audit trail.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct HistoryEntry {
    #[n(0)]
    pub request_id: String, // weak reference, survives deletion of the request
    #[n(1)]
    pub action: HistoryAction,
    #[n(2)]
    pub acted_by: String,
    #[n(3)]
    pub notes: Option<String>,
    #[n(4)]
    pub acted_at: TimeStamp<Utc>,
}

impl HistoryEntry {
    pub fn new(
        request_id: String,
        action: HistoryAction,
        acted_by: String,
        notes: Option<String>,
    ) -> Self {
        Self {
            request_id,
            action,
            acted_by,
            notes,
            acted_at: TimeStamp::new(),
        }
    }
}

/// Checks the shape of a full history: exactly one `created` entry, first.
pub fn is_well_formed(entries: &[HistoryEntry]) -> bool {
    match entries.split_first() {
        None => true,
        Some((first, rest)) => {
            first.action == HistoryAction::Created
                && rest.iter().all(|e| e.action != HistoryAction::Created)
        }
    }
}
