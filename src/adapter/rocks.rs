//! RocksDB implementation of the workflow store ports
//!
//! Storage layout (one column family per collection, JSON values keyed by id):
//! - `process`, `tramitacao`, `opinion`, `position` -> serialized entity
//! - `outstanding_opinion` -> `{process_id}:{issuing_sector}` -> opinion id
//! - `sequence` -> scope -> big-endian u64
//!
//! Writes run inside optimistic transactions: the stored copy is read with
//! `get_for_update` so a concurrent commit on the same key makes ours fail
//! with `Busy`, at which point the whole read-validate-write is replayed.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{
    ColumnFamily, DBCompressionType, ErrorKind, IteratorMode, OptimisticTransactionDB, Options, Transaction
};
use tracing::{Level, event};

use crate::{
    domain::{
        constant::store,
        error::WorkflowError,
        opinion::Opinion,
        position::Position,
        process::{CounterKind, Process},
        tramitacao::Tramitacao
    },
    port::store::{
        Document, OpinionStore, PositionStore, ProcessStore, SequenceStore, TramitacaoStore, apply_counter,
        outstanding_key, outstanding_opinion_conflict, prepare_process_update, prepare_update
    }
};

const CF_OUTSTANDING: &str = "outstanding_opinion";
const CF_SEQUENCE: &str = "sequence";

const COLUMN_FAMILIES: [&str; 6] = [
    crate::domain::process::ENTITY,
    crate::domain::tramitacao::ENTITY,
    crate::domain::opinion::ENTITY,
    crate::domain::position::ENTITY,
    CF_OUTSTANDING,
    CF_SEQUENCE
];

/// Upper bound on replays of a transaction that keeps losing write conflicts
const MAX_TXN_ATTEMPTS: usize = 32;

type TxnDb = OptimisticTransactionDB;

/// Persistent store for every workflow entity
pub struct RocksDbStore {
    db: Arc<TxnDb>
}

impl RocksDbStore {
    /// Open (or create) the database and its column families at `path`
    pub fn open(path: &Path) -> Result<Self, WorkflowError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(DBCompressionType::Snappy);

        let db = TxnDb::open_cf(&opts, path, COLUMN_FAMILIES)
            .map_err(|e| WorkflowError::Storage(format!("Failed to open RocksDB at {}: {}", path.display(), e)))?;

        event!(Level::INFO, event = store::STORE_OPENED, backend = "rocksdb", path = %path.display());
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<R, F>(&self, operation: F) -> Result<R, WorkflowError>
    where
        R: Send + 'static,
        F: FnOnce(&TxnDb) -> Result<R, WorkflowError> + Send + 'static
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || operation(&db))
            .await
            .map_err(|e| WorkflowError::Generic(format!("Storage task failed: {}", e)))?
    }

    async fn insert_doc<T: Document>(&self, doc: &T) -> Result<(), WorkflowError> {
        let doc = doc.clone();
        self.blocking(move |db| {
            let cf = column(db, T::COLLECTION)?;
            let value = serde_json::to_vec(&doc)?;
            transact(db, T::COLLECTION, doc.id(), |txn| {
                if txn.get_for_update_cf(cf, doc.id(), true)?.is_some() {
                    return Err(WorkflowError::Conflict(format!("{} '{}' already exists", T::COLLECTION, doc.id())));
                }
                txn.put_cf(cf, doc.id(), &value)?;
                Ok(())
            })
        })
        .await
    }

    async fn get_doc<T: Document>(&self, id: &str) -> Result<Option<T>, WorkflowError> {
        let id = id.to_string();
        self.blocking(move |db| {
            let cf = column(db, T::COLLECTION)?;
            match db.get_cf(cf, id.as_bytes())? {
                Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                None => Ok(None)
            }
        })
        .await
    }

    async fn update_doc<T: Document>(
        &self,
        incoming: &T,
        prepare: fn(&T, &T) -> Result<T, WorkflowError>
    ) -> Result<T, WorkflowError> {
        let incoming = incoming.clone();
        self.blocking(move |db| {
            let cf = column(db, T::COLLECTION)?;
            transact(db, T::COLLECTION, incoming.id(), |txn| {
                let stored: T = read_for_update(txn, cf, T::COLLECTION, incoming.id())?;
                let next = prepare(&stored, &incoming)?;
                txn.put_cf(cf, next.id(), serde_json::to_vec(&next)?)?;
                Ok(next)
            })
        })
        .await
    }

    async fn remove_doc<T: Document>(&self, id: &str) -> Result<(), WorkflowError> {
        let id = id.to_string();
        self.blocking(move |db| {
            let cf = column(db, T::COLLECTION)?;
            db.delete_cf(cf, id.as_bytes())?;
            Ok(())
        })
        .await
    }

    async fn list_docs<T: Document>(&self) -> Result<Vec<T>, WorkflowError> {
        self.blocking(|db| {
            let cf = column(db, T::COLLECTION)?;
            let mut docs: Vec<T> = Vec::new();
            for item in db.iterator_cf(cf, IteratorMode::Start) {
                let (_, value) = item?;
                docs.push(serde_json::from_slice(&value)?);
            }
            Ok(docs)
        })
        .await
    }
}

fn column<'a>(db: &'a TxnDb, name: &str) -> Result<&'a ColumnFamily, WorkflowError> {
    db.cf_handle(name).ok_or_else(|| WorkflowError::Storage(format!("Missing column family '{}'", name)))
}

fn read_for_update<T: Document>(
    txn: &Transaction<'_, TxnDb>,
    cf: &ColumnFamily,
    entity: &'static str,
    id: &str
) -> Result<T, WorkflowError> {
    let bytes = txn.get_for_update_cf(cf, id, true)?.ok_or_else(|| WorkflowError::not_found(entity, id))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Run `body` in an optimistic transaction, replaying it on write conflicts
fn transact<R>(
    db: &TxnDb,
    entity: &'static str,
    id: &str,
    mut body: impl FnMut(&Transaction<'_, TxnDb>) -> Result<R, WorkflowError>
) -> Result<R, WorkflowError> {
    for attempt in 1..=MAX_TXN_ATTEMPTS {
        let txn = db.transaction();
        let value = body(&txn)?;

        match txn.commit() {
            Ok(()) => return Ok(value),
            Err(e) if matches!(e.kind(), ErrorKind::Busy | ErrorKind::TryAgain) => {
                event!(Level::DEBUG, event = store::WRITE_CONFLICT, entity = entity, id = %id, attempt = attempt);
            }
            Err(e) => return Err(e.into())
        }
    }

    Err(WorkflowError::concurrent(entity, id))
}

#[async_trait]
impl ProcessStore for RocksDbStore {
    async fn insert_process(&self, process: &Process) -> Result<(), WorkflowError> {
        self.insert_doc(process).await
    }

    async fn get_process(&self, id: &str) -> Result<Option<Process>, WorkflowError> {
        self.get_doc(id).await
    }

    async fn update_process(&self, process: &Process) -> Result<Process, WorkflowError> {
        self.update_doc(process, prepare_process_update).await
    }

    async fn adjust_counter(&self, id: &str, kind: CounterKind, delta: i64) -> Result<Process, WorkflowError> {
        let id = id.to_string();
        self.blocking(move |db| {
            let cf = column(db, Process::COLLECTION)?;
            transact(db, Process::COLLECTION, &id, |txn| {
                let stored: Process = read_for_update(txn, cf, Process::COLLECTION, &id)?;
                let next = apply_counter(&stored, kind, delta, Utc::now())?;
                txn.put_cf(cf, id.as_bytes(), serde_json::to_vec(&next)?)?;
                Ok(next)
            })
        })
        .await
    }

    async fn list_processes(&self) -> Result<Vec<Process>, WorkflowError> {
        self.list_docs().await
    }
}

#[async_trait]
impl TramitacaoStore for RocksDbStore {
    async fn insert_tramitacao(&self, tramitacao: &Tramitacao) -> Result<(), WorkflowError> {
        self.insert_doc(tramitacao).await
    }

    async fn get_tramitacao(&self, id: &str) -> Result<Option<Tramitacao>, WorkflowError> {
        self.get_doc(id).await
    }

    async fn update_tramitacao(&self, tramitacao: &Tramitacao) -> Result<Tramitacao, WorkflowError> {
        self.update_doc(tramitacao, prepare_update).await
    }

    async fn list_tramitacoes(&self) -> Result<Vec<Tramitacao>, WorkflowError> {
        self.list_docs().await
    }
}

#[async_trait]
impl OpinionStore for RocksDbStore {
    async fn insert_opinion(&self, opinion: &Opinion) -> Result<(), WorkflowError> {
        let opinion = opinion.clone();
        self.blocking(move |db| {
            let opinions = column(db, Opinion::COLLECTION)?;
            let index = column(db, CF_OUTSTANDING)?;
            let key = outstanding_key(&opinion.process_id, &opinion.issuing_sector);
            let value = serde_json::to_vec(&opinion)?;

            transact(db, Opinion::COLLECTION, &opinion.id, |txn| {
                if let Some(holder) = txn.get_for_update_cf(index, key.as_bytes(), true)? {
                    let holder_id = String::from_utf8_lossy(&holder).to_string();
                    if let Some(bytes) = txn.get_for_update_cf(opinions, holder_id.as_bytes(), true)? {
                        let existing: Opinion = serde_json::from_slice(&bytes)?;
                        if existing.status.is_outstanding() {
                            return Err(outstanding_opinion_conflict(&opinion));
                        }
                    }
                }

                if txn.get_for_update_cf(opinions, opinion.id.as_bytes(), true)?.is_some() {
                    return Err(WorkflowError::Conflict(format!("opinion '{}' already exists", opinion.id)));
                }

                txn.put_cf(index, key.as_bytes(), opinion.id.as_bytes())?;
                txn.put_cf(opinions, opinion.id.as_bytes(), &value)?;
                Ok(())
            })
        })
        .await
    }

    async fn get_opinion(&self, id: &str) -> Result<Option<Opinion>, WorkflowError> {
        self.get_doc(id).await
    }

    async fn update_opinion(&self, opinion: &Opinion) -> Result<Opinion, WorkflowError> {
        self.update_doc(opinion, prepare_update).await
    }

    async fn remove_opinion(&self, id: &str) -> Result<(), WorkflowError> {
        let id = id.to_string();
        self.blocking(move |db| {
            let opinions = column(db, Opinion::COLLECTION)?;
            let index = column(db, CF_OUTSTANDING)?;

            transact(db, Opinion::COLLECTION, &id, |txn| {
                let Some(bytes) = txn.get_for_update_cf(opinions, id.as_bytes(), true)? else { return Ok(()) };
                let opinion: Opinion = serde_json::from_slice(&bytes)?;
                let key = outstanding_key(&opinion.process_id, &opinion.issuing_sector);

                // the index may already point at a newer solicitation
                if txn.get_for_update_cf(index, key.as_bytes(), true)?.as_deref() == Some(id.as_bytes()) {
                    txn.delete_cf(index, key.as_bytes())?;
                }
                txn.delete_cf(opinions, id.as_bytes())?;
                Ok(())
            })
        })
        .await
    }

    async fn list_opinions(&self) -> Result<Vec<Opinion>, WorkflowError> {
        self.list_docs().await
    }
}

#[async_trait]
impl PositionStore for RocksDbStore {
    async fn insert_position(&self, position: &Position) -> Result<(), WorkflowError> {
        self.insert_doc(position).await
    }

    async fn get_position(&self, id: &str) -> Result<Option<Position>, WorkflowError> {
        self.get_doc(id).await
    }

    async fn update_position(&self, position: &Position) -> Result<Position, WorkflowError> {
        self.update_doc(position, prepare_update).await
    }

    async fn remove_position(&self, id: &str) -> Result<(), WorkflowError> {
        self.remove_doc::<Position>(id).await
    }

    async fn list_positions(&self) -> Result<Vec<Position>, WorkflowError> {
        self.list_docs().await
    }
}

#[async_trait]
impl SequenceStore for RocksDbStore {
    async fn next_sequence(&self, scope: &str) -> Result<u64, WorkflowError> {
        let scope = scope.to_string();
        self.blocking(move |db| {
            let cf = column(db, CF_SEQUENCE)?;
            transact(db, "sequence", &scope, |txn| {
                let current = match txn.get_for_update_cf(cf, scope.as_bytes(), true)? {
                    Some(bytes) => {
                        let raw: [u8; 8] = bytes
                            .as_slice()
                            .try_into()
                            .map_err(|_| WorkflowError::Storage(format!("Corrupt sequence '{}'", scope)))?;
                        u64::from_be_bytes(raw)
                    }
                    None => 0
                };
                let next = current + 1;
                txn.put_cf(cf, scope.as_bytes(), next.to_be_bytes())?;
                Ok(next)
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{domain::opinion::OpinionStatus, fixtures};

    fn open_store() -> (TempDir, RocksDbStore) {
        let dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_roundtrip_and_optimistic_update() {
        let (_dir, store) = open_store();
        let process = fixtures::process("p-1");
        store.insert_process(&process).await.unwrap();

        let loaded = store.get_process("p-1").await.unwrap().unwrap();
        assert_eq!(loaded, process);

        let updated = store.update_process(&loaded).await.unwrap();
        assert_eq!(updated.version, 1);
        let err = store.update_process(&loaded).await.unwrap_err();
        assert!(matches!(err, WorkflowError::ConcurrentModification { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let (_dir, store) = open_store();
        let process = fixtures::process("p-1");
        store.insert_process(&process).await.unwrap();
        assert!(matches!(store.insert_process(&process).await, Err(WorkflowError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_outstanding_opinion_index_releases_after_decision() {
        let (_dir, store) = open_store();
        let first = fixtures::opinion("o-1", "p-1", "S1");
        store.insert_opinion(&first).await.unwrap();

        let err = store.insert_opinion(&fixtures::opinion("o-2", "p-1", "S1")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));

        let mut decided = first.clone();
        decided.status = OpinionStatus::Reprovado;
        store.update_opinion(&decided).await.unwrap();

        store.insert_opinion(&fixtures::opinion("o-2", "p-1", "S1")).await.unwrap();
        assert_eq!(store.list_opinions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_removed_opinion_frees_its_sector_slot() {
        let (_dir, store) = open_store();
        store.insert_opinion(&fixtures::opinion("o-1", "p-1", "S1")).await.unwrap();

        store.remove_opinion("o-1").await.unwrap();
        store.remove_opinion("o-1").await.unwrap();
        assert!(store.get_opinion("o-1").await.unwrap().is_none());

        store.insert_opinion(&fixtures::opinion("o-2", "p-1", "S1")).await.unwrap();
        let err = store.insert_opinion(&fixtures::opinion("o-3", "p-1", "S1")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_closed_process_takes_no_new_pending_work() {
        let (_dir, store) = open_store();
        let mut process = fixtures::process("p-1");
        process.status = crate::domain::process::ProcessStatus::Arquivado;
        store.insert_process(&process).await.unwrap();

        let err = store.adjust_counter("p-1", CounterKind::Positions, 1).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        assert_eq!(store.get_process("p-1").await.unwrap().unwrap().pending_positions, 0);
    }

    #[tokio::test]
    async fn test_sequences_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            assert_eq!(store.next_sequence("process:2026").await.unwrap(), 1);
            assert_eq!(store.next_sequence("process:2026").await.unwrap(), 2);
        }
        let store = RocksDbStore::open(dir.path()).unwrap();
        assert_eq!(store.next_sequence("process:2026").await.unwrap(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_counter_adjustments_are_not_lost() {
        let (_dir, store) = open_store();
        let store = Arc::new(store);
        store.insert_process(&fixtures::process("p-1")).await.unwrap();
        store.adjust_counter("p-1", CounterKind::Opinions, 20).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.adjust_counter("p-1", CounterKind::Opinions, -1).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let process = store.get_process("p-1").await.unwrap().unwrap();
        assert_eq!(process.pending_opinions, 0);
    }
}
