//! Human readable feed of recent request activity
use super::request::TimeStamp;
use chrono::Utc;

pub const REQUEST_UPDATE: &str = "Request Update";

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct ActivityEntry {
    #[n(0)]
    pub kind: String,
    #[n(1)]
    pub description: String,
    #[n(2)]
    pub actor: String,
    #[n(3)]
    pub at: TimeStamp<Utc>,
}

impl ActivityEntry {
    pub fn request_update(description: String, actor: String) -> Self {
        Self {
            kind: REQUEST_UPDATE.to_string(),
            description,
            actor,
            at: TimeStamp::new(),
        }
    }
}
