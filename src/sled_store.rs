//! sled backed implementation of the store contracts
use super::activity::ActivityEntry;
use super::config::StoreConfig;
use super::error::PersistenceError;
use super::history::HistoryEntry;
use super::request::Request;
use super::snapshot::Snapshot;
use super::store::{ActivityFeed, HistoryLog, RequestFilter, RequestStore, SnapshotStore};
use super::utils::{scope_prefix, scoped_key};
use sled::transaction::{ConflictableTransactionError, TransactionError, abort};
use sled::{Db, Transactional, Tree};
use std::cell::RefCell;
use std::sync::Arc;
use tracing::debug;

const REQUESTS: &str = "requests";
const SNAPSHOTS: &str = "snapshots";
const HISTORY: &str = "history";
const ACTIVITY: &str = "activity";

/// One tree per collection inside a single sled database.
pub struct SledStore {
    instance: Arc<Db>,
    requests: Tree,
    snapshots: Tree,
    history: Tree,
    activity: Tree,
    flush_every_write: bool,
}

impl SledStore {
    pub fn new(instance: Arc<Db>) -> Result<Self, PersistenceError> {
        Ok(Self {
            requests: instance.open_tree(REQUESTS)?,
            snapshots: instance.open_tree(SNAPSHOTS)?,
            history: instance.open_tree(HISTORY)?,
            activity: instance.open_tree(ACTIVITY)?,
            instance,
            flush_every_write: false,
        })
    }

    pub fn open(config: &StoreConfig) -> Result<Self, PersistenceError> {
        let db = sled::Config::new()
            .path(&config.path)
            .temporary(config.temporary)
            .open()?;

        let mut store = Self::new(Arc::new(db))?;
        store.flush_every_write = config.flush_every_write;
        Ok(store)
    }

    fn written(&self) -> Result<(), PersistenceError> {
        if self.flush_every_write {
            self.instance.flush()?;
        }
        Ok(())
    }
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, PersistenceError> {
    minicbor::to_vec(value).map_err(|e| PersistenceError::Encode(e.to_string()))
}

fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T, PersistenceError> {
    Ok(minicbor::decode(bytes)?)
}

impl RequestStore for SledStore {
    fn save(&self, request: &Request) -> Result<String, PersistenceError> {
        let swap = self.requests.compare_and_swap(
            request.id.as_bytes(),
            None::<&[u8]>,
            Some(encode(request)?),
        )?;
        if swap.is_err() {
            return Err(PersistenceError::Duplicate(request.id.clone()));
        }
        self.written()?;
        debug!(request_id = %request.id, "request saved");

        Ok(request.id.clone())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Request>, PersistenceError> {
        self.requests
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn find_all(&self, filter: &RequestFilter) -> Result<Vec<Request>, PersistenceError> {
        let mut found = Vec::new();
        for kv in self.requests.iter() {
            let (_, bytes) = kv?;
            let request: Request = decode(&bytes)?;
            if filter.matches(&request) {
                found.push(request);
            }
        }
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(found)
    }

    fn update(
        &self,
        id: &str,
        expected_version: u64,
        mutator: &mut dyn FnMut(&mut Request),
    ) -> Result<Request, PersistenceError> {
        let current = self
            .requests
            .get(id.as_bytes())?
            .ok_or_else(|| PersistenceError::Missing(id.to_string()))?;

        let mut request: Request = decode(&current)?;
        if request.version != expected_version {
            return Err(PersistenceError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                found: request.version,
            });
        }

        mutator(&mut request);
        request.version = expected_version + 1;

        // another writer may have slipped in between the read and this swap
        let swap = self.requests.compare_and_swap(
            id.as_bytes(),
            Some(&current[..]),
            Some(encode(&request)?),
        )?;
        if let Err(lost) = swap {
            return match lost.current {
                Some(bytes) => {
                    let winner: Request = decode(&bytes)?;
                    Err(PersistenceError::VersionConflict {
                        id: id.to_string(),
                        expected: expected_version,
                        found: winner.version,
                    })
                }
                None => Err(PersistenceError::Missing(id.to_string())),
            };
        }
        self.written()?;
        debug!(request_id = %id, version = request.version, "request updated");

        Ok(request)
    }

    fn update_with_snapshot(
        &self,
        id: &str,
        expected_version: u64,
        mutator: &mut dyn FnMut(&mut Request),
    ) -> Result<(Request, Snapshot), PersistenceError> {
        let mutator = RefCell::new(mutator);

        let tx_trees = (&self.requests, &self.snapshots);
        let outcome: Result<_, TransactionError<PersistenceError>> =
            tx_trees.transaction(|(requests, snapshots)| {
                let Some(current) = requests.get(id.as_bytes())? else {
                    return abort(PersistenceError::Missing(id.to_string()));
                };

                let mut request: Request =
                    decode(&current).map_err(ConflictableTransactionError::Abort)?;
                if request.version != expected_version {
                    return abort(PersistenceError::VersionConflict {
                        id: id.to_string(),
                        expected: expected_version,
                        found: request.version,
                    });
                }

                // captured from the stored bytes, not from the caller's copy
                let snapshot =
                    Snapshot::capture(&request).map_err(ConflictableTransactionError::Abort)?;
                snapshots.insert(
                    snapshot.id.as_bytes(),
                    encode(&snapshot).map_err(ConflictableTransactionError::Abort)?,
                )?;

                (*mutator.borrow_mut())(&mut request);
                request.version = expected_version + 1;
                requests.insert(
                    id.as_bytes(),
                    encode(&request).map_err(ConflictableTransactionError::Abort)?,
                )?;

                Ok((request, snapshot))
            });

        let (request, snapshot) = outcome.map_err(|err| match err {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => PersistenceError::Sled(err),
        })?;
        self.written()?;
        debug!(
            request_id = %id,
            version = request.version,
            snapshot_id = %snapshot.id,
            "request updated with snapshot"
        );

        Ok((request, snapshot))
    }

    fn remove(&self, id: &str) -> Result<Option<Request>, PersistenceError> {
        let removed = self
            .requests
            .remove(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()?;
        self.written()?;

        Ok(removed)
    }
}

impl SnapshotStore for SledStore {
    fn find_by_request(&self, request_id: &str) -> Result<Vec<Snapshot>, PersistenceError> {
        self.snapshots
            .scan_prefix(scope_prefix(request_id))
            .map(|kv| {
                let (_, bytes) = kv?;
                decode(&bytes)
            })
            .collect()
    }
}

impl HistoryLog for SledStore {
    fn append(&self, entry: &HistoryEntry) -> Result<(), PersistenceError> {
        let seq = self.instance.generate_id()?;
        self.history
            .insert(scoped_key(&entry.request_id, seq), encode(entry)?)?;
        self.written()?;
        debug!(request_id = %entry.request_id, action = %entry.action, "history appended");

        Ok(())
    }

    fn find_by_request(&self, request_id: &str) -> Result<Vec<HistoryEntry>, PersistenceError> {
        self.history
            .scan_prefix(scope_prefix(request_id))
            .map(|kv| {
                let (_, bytes) = kv?;
                decode(&bytes)
            })
            .collect()
    }
}

impl ActivityFeed for SledStore {
    fn record(&self, entry: &ActivityEntry) -> Result<(), PersistenceError> {
        let seq = self.instance.generate_id()?;
        self.activity.insert(seq.to_be_bytes(), encode(entry)?)?;
        self.written()?;

        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<ActivityEntry>, PersistenceError> {
        self.activity
            .iter()
            .rev()
            .take(limit)
            .map(|kv| {
                let (_, bytes) = kv?;
                decode(&bytes)
            })
            .collect()
    }
}
