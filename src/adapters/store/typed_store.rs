//! Concurrent key-value layer partitioned by namespace.
//!
//! One store instance exists per resource type. Reads go straight to a
//! shared map under a read lock; every write funnels through a single
//! writer task fed by an mpsc channel, so writes to one resource type
//! are totally ordered and insert/update/delete are race-free without a
//! global lock. Different resource types never contend with each other.
//!
//! Namespace isolation is key composition: the true key of every record
//! is `(namespace, id)`, and no operation crosses that boundary.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, oneshot};

use crate::domain::foundation::{Namespace, SimError, StoredObject};

type Key = (Namespace, String);
type Map<T> = Arc<RwLock<HashMap<Key, T>>>;

/// Paging options for `list`.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Page size; `None` returns everything.
    pub limit: Option<usize>,
    /// Cursor: return records strictly after this id in page order.
    pub starting_after: Option<String>,
}

/// One page of records, newest first.
#[derive(Debug, Clone)]
pub struct ListPage<T> {
    pub data: Vec<T>,
    pub has_more: bool,
}

enum WriteOp<T> {
    Insert {
        record: T,
        reply: oneshot::Sender<()>,
    },
    InsertIfAbsent {
        record: T,
        reply: oneshot::Sender<bool>,
    },
    Update {
        record: T,
        reply: oneshot::Sender<Result<(), SimError>>,
    },
    Mutate {
        key: Key,
        apply: Box<dyn FnOnce(&mut T) + Send>,
        reply: oneshot::Sender<Result<(), SimError>>,
    },
    Delete {
        key: Key,
        reply: oneshot::Sender<Result<(), SimError>>,
    },
    ClearNamespace {
        namespace: Namespace,
        reply: oneshot::Sender<usize>,
    },
    Retain {
        keep: Box<dyn Fn(&T) -> bool + Send>,
        reply: oneshot::Sender<usize>,
    },
}

/// Store for one resource type.
pub struct TypedStore<T: StoredObject> {
    resource: &'static str,
    map: Map<T>,
    writer: mpsc::Sender<WriteOp<T>>,
}

impl<T: StoredObject> TypedStore<T> {
    /// Create the store and spawn its writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(resource: &'static str) -> Arc<Self> {
        let map: Map<T> = Arc::new(RwLock::new(HashMap::new()));
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run_writer(resource, Arc::clone(&map), rx));
        Arc::new(Self {
            resource,
            map,
            writer: tx,
        })
    }

    /// The resource type this store holds, e.g. `"invoice"`.
    pub fn resource(&self) -> &'static str {
        self.resource
    }

    /// Fetch one record.
    pub fn get(&self, namespace: &Namespace, id: &str) -> Result<T, SimError> {
        self.read_map()
            .get(&(namespace.clone(), id.to_string()))
            .cloned()
            .ok_or_else(|| SimError::not_found(self.resource, id))
    }

    /// List a namespace's records, newest first, with cursor paging.
    pub fn list(&self, namespace: &Namespace, opts: &ListOptions) -> ListPage<T> {
        let mut records = self.list_all(namespace);
        if let Some(cursor) = &opts.starting_after {
            if let Some(pos) = records.iter().position(|r| r.id() == cursor) {
                records.drain(..=pos);
            }
        }
        let has_more = match opts.limit {
            Some(limit) => records.len() > limit,
            None => false,
        };
        if let Some(limit) = opts.limit {
            records.truncate(limit);
        }
        ListPage {
            data: records,
            has_more,
        }
    }

    /// Every record in a namespace, newest first.
    pub fn list_all(&self, namespace: &Namespace) -> Vec<T> {
        let mut records: Vec<T> = self
            .read_map()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by(|a, b| b.created().cmp(&a.created()).then_with(|| b.id().cmp(a.id())));
        records
    }

    /// Namespaces that currently hold records.
    pub fn namespaces(&self) -> Vec<Namespace> {
        let mut seen: Vec<Namespace> = Vec::new();
        for (ns, _) in self.read_map().keys() {
            if !seen.contains(ns) {
                seen.push(ns.clone());
            }
        }
        seen
    }

    /// Insert (or overwrite) a record.
    pub async fn insert(&self, record: T) -> Result<T, SimError> {
        let (reply, rx) = oneshot::channel();
        self.send(WriteOp::Insert {
            record: record.clone(),
            reply,
        })
        .await?;
        self.recv(rx).await?;
        Ok(record)
    }

    /// Insert only if the key is absent. Returns whether this caller won.
    ///
    /// Linearizable through the writer task: exactly one concurrent
    /// caller wins for a given key.
    pub async fn insert_if_absent(&self, record: T) -> Result<bool, SimError> {
        let (reply, rx) = oneshot::channel();
        self.send(WriteOp::InsertIfAbsent { record, reply }).await?;
        self.recv(rx).await
    }

    /// Replace an existing record.
    pub async fn update(&self, record: T) -> Result<T, SimError> {
        let (reply, rx) = oneshot::channel();
        self.send(WriteOp::Update {
            record: record.clone(),
            reply,
        })
        .await?;
        self.recv(rx).await??;
        Ok(record)
    }

    /// Modify a record in place inside the writer task.
    ///
    /// Unlike read-then-`update`, concurrent mutations of the same
    /// record all apply; none overwrites another's change.
    pub async fn mutate<F>(&self, namespace: &Namespace, id: &str, apply: F) -> Result<(), SimError>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.send(WriteOp::Mutate {
            key: (namespace.clone(), id.to_string()),
            apply: Box::new(apply),
            reply,
        })
        .await?;
        self.recv(rx).await?
    }

    /// Delete one record.
    pub async fn delete(&self, namespace: &Namespace, id: &str) -> Result<(), SimError> {
        let (reply, rx) = oneshot::channel();
        self.send(WriteOp::Delete {
            key: (namespace.clone(), id.to_string()),
            reply,
        })
        .await?;
        self.recv(rx).await?
    }

    /// Remove every record in a namespace; other namespaces untouched.
    /// Returns how many records were removed.
    pub async fn clear_namespace(&self, namespace: &Namespace) -> Result<usize, SimError> {
        let (reply, rx) = oneshot::channel();
        self.send(WriteOp::ClearNamespace {
            namespace: namespace.clone(),
            reply,
        })
        .await?;
        self.recv(rx).await
    }

    /// Bulk-delete records failing the predicate, across all namespaces.
    /// Housekeeping only (e.g. TTL sweeps); returns how many were removed.
    pub async fn retain<F>(&self, keep: F) -> Result<usize, SimError>
    where
        F: Fn(&T) -> bool + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.send(WriteOp::Retain {
            keep: Box::new(keep),
            reply,
        })
        .await?;
        self.recv(rx).await
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Key, T>> {
        self.map
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn send(&self, op: WriteOp<T>) -> Result<(), SimError> {
        self.writer
            .send(op)
            .await
            .map_err(|_| SimError::internal(format!("{} store writer stopped", self.resource)))
    }

    async fn recv<R>(&self, rx: oneshot::Receiver<R>) -> Result<R, SimError> {
        rx.await
            .map_err(|_| SimError::internal(format!("{} store writer dropped reply", self.resource)))
    }
}

async fn run_writer<T: StoredObject>(
    resource: &'static str,
    map: Map<T>,
    mut rx: mpsc::Receiver<WriteOp<T>>,
) {
    while let Some(op) = rx.recv().await {
        let mut guard = match map.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match op {
            WriteOp::Insert { record, reply } => {
                guard.insert(
                    (record.namespace().clone(), record.id().to_string()),
                    record,
                );
                let _ = reply.send(());
            }
            WriteOp::InsertIfAbsent { record, reply } => {
                let key = (record.namespace().clone(), record.id().to_string());
                let won = if guard.contains_key(&key) {
                    false
                } else {
                    guard.insert(key, record);
                    true
                };
                let _ = reply.send(won);
            }
            WriteOp::Update { record, reply } => {
                let key = (record.namespace().clone(), record.id().to_string());
                let result = if guard.contains_key(&key) {
                    guard.insert(key, record);
                    Ok(())
                } else {
                    Err(SimError::not_found(resource, record.id()))
                };
                let _ = reply.send(result);
            }
            WriteOp::Mutate { key, apply, reply } => {
                let result = match guard.get_mut(&key) {
                    Some(record) => {
                        apply(record);
                        Ok(())
                    }
                    None => Err(SimError::not_found(resource, key.1)),
                };
                let _ = reply.send(result);
            }
            WriteOp::Delete { key, reply } => {
                let result = if guard.remove(&key).is_some() {
                    Ok(())
                } else {
                    Err(SimError::not_found(resource, key.1))
                };
                let _ = reply.send(result);
            }
            WriteOp::ClearNamespace { namespace, reply } => {
                let before = guard.len();
                guard.retain(|(ns, _), _| ns != &namespace);
                let _ = reply.send(before - guard.len());
            }
            WriteOp::Retain { keep, reply } => {
                let before = guard.len();
                guard.retain(|_, record| keep(record));
                let _ = reply.send(before - guard.len());
            }
        }
    }
    tracing::debug!(resource, "Store writer shutting down");
}
