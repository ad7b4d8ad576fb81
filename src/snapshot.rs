//! Immutable pre-modification copies of requests
use super::error::PersistenceError;
use super::request::{Request, TimeStamp};
use chrono::Utc;

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct Snapshot {
    #[n(0)]
    pub id: String, // `{request id}/{version}`, one per pre-image
    #[n(1)]
    pub original_request_id: String,
    #[n(2)]
    pub request: Request, // the request exactly as it was before the edit
    #[n(3)]
    pub digest: String, // sha256 over the CBOR encoding of `request`
    #[n(4)]
    pub copied_at: TimeStamp<Utc>,
}

impl Snapshot {
    pub fn key(request_id: &str, version: u64) -> String {
        format!("{request_id}/{version:020}")
    }

    /// Copies `request` as it currently stands.
    pub fn capture(request: &Request) -> Result<Self, PersistenceError> {
        Ok(Self {
            id: Self::key(&request.id, request.version),
            original_request_id: request.id.clone(),
            request: request.clone(),
            digest: digest_of(request)?,
            copied_at: TimeStamp::new(),
        })
    }

    pub fn version(&self) -> u64 {
        self.request.version
    }

    /// True when the stored copy still hashes to the digest taken at capture.
    pub fn verify(&self) -> Result<bool, PersistenceError> {
        Ok(digest_of(&self.request)? == self.digest)
    }
}

fn digest_of(request: &Request) -> Result<String, PersistenceError> {
    let cbor = minicbor::to_vec(request).map_err(|e| PersistenceError::Encode(e.to_string()))?;
    Ok(sha256::digest(&cbor))
}
