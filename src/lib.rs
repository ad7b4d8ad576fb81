//! Stock request lifecycle: creation, approve/reject/modify actions,
//! pre-modification snapshots and an append-only history, stored in sled.

pub mod activity;
pub mod config;
pub mod error;
pub mod history;
pub mod notify;
pub mod request;
pub mod service;
pub mod sled_store;
pub mod snapshot;
pub mod store;
pub mod utils;
