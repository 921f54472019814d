//! In-memory implementation of the workflow store ports
//!
//! Suitable for development and tests: data is lost when the application
//! restarts. Every write happens under the collection's write lock, so the
//! version check and the write are atomic.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::{
    domain::{
        error::WorkflowError,
        opinion::Opinion,
        position::Position,
        process::{CounterKind, Process},
        tramitacao::Tramitacao
    },
    port::store::{
        Document, OpinionStore, PositionStore, ProcessStore, SequenceStore, TramitacaoStore, apply_counter,
        outstanding_opinion_conflict, prepare_process_update, prepare_update
    }
};

struct Collection<T: Document> {
    docs: Arc<RwLock<HashMap<String, T>>>
}

impl<T: Document> Default for Collection<T> {
    fn default() -> Self {
        Self { docs: Arc::new(RwLock::new(HashMap::new())) }
    }
}

impl<T: Document> Collection<T> {
    async fn insert(&self, doc: &T) -> Result<(), WorkflowError> {
        let mut docs = self.docs.write().await;
        Self::insert_locked(&mut docs, doc)
    }

    fn insert_locked(docs: &mut HashMap<String, T>, doc: &T) -> Result<(), WorkflowError> {
        if docs.contains_key(doc.id()) {
            return Err(WorkflowError::Conflict(format!("{} '{}' already exists", T::COLLECTION, doc.id())));
        }
        docs.insert(doc.id().to_string(), doc.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<T> {
        self.docs.read().await.get(id).cloned()
    }

    async fn update_with(
        &self,
        incoming: &T,
        prepare: impl FnOnce(&T, &T) -> Result<T, WorkflowError>
    ) -> Result<T, WorkflowError> {
        let mut docs = self.docs.write().await;
        let stored = docs.get(incoming.id()).ok_or_else(|| WorkflowError::not_found(T::COLLECTION, incoming.id()))?;
        let next = prepare(stored, incoming)?;
        docs.insert(next.id().to_string(), next.clone());
        Ok(next)
    }

    async fn remove(&self, id: &str) {
        self.docs.write().await.remove(id);
    }

    async fn list(&self) -> Vec<T> {
        self.docs.read().await.values().cloned().collect()
    }
}

/// In-memory store for every workflow entity
#[derive(Default)]
pub struct InMemoryStore {
    processes:   Collection<Process>,
    tramitacoes: Collection<Tramitacao>,
    opinions:    Collection<Opinion>,
    positions:   Collection<Position>,
    sequences:   Arc<Mutex<HashMap<String, u64>>>
}

impl InMemoryStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessStore for InMemoryStore {
    async fn insert_process(&self, process: &Process) -> Result<(), WorkflowError> {
        self.processes.insert(process).await
    }

    async fn get_process(&self, id: &str) -> Result<Option<Process>, WorkflowError> {
        Ok(self.processes.get(id).await)
    }

    async fn update_process(&self, process: &Process) -> Result<Process, WorkflowError> {
        self.processes.update_with(process, prepare_process_update).await
    }

    async fn adjust_counter(&self, id: &str, kind: CounterKind, delta: i64) -> Result<Process, WorkflowError> {
        let mut docs = self.processes.docs.write().await;
        let stored = docs.get(id).ok_or_else(|| WorkflowError::not_found(Process::COLLECTION, id))?;
        let next = apply_counter(stored, kind, delta, Utc::now())?;
        docs.insert(id.to_string(), next.clone());
        Ok(next)
    }

    async fn list_processes(&self) -> Result<Vec<Process>, WorkflowError> {
        Ok(self.processes.list().await)
    }
}

#[async_trait]
impl TramitacaoStore for InMemoryStore {
    async fn insert_tramitacao(&self, tramitacao: &Tramitacao) -> Result<(), WorkflowError> {
        self.tramitacoes.insert(tramitacao).await
    }

    async fn get_tramitacao(&self, id: &str) -> Result<Option<Tramitacao>, WorkflowError> {
        Ok(self.tramitacoes.get(id).await)
    }

    async fn update_tramitacao(&self, tramitacao: &Tramitacao) -> Result<Tramitacao, WorkflowError> {
        self.tramitacoes.update_with(tramitacao, prepare_update).await
    }

    async fn list_tramitacoes(&self) -> Result<Vec<Tramitacao>, WorkflowError> {
        Ok(self.tramitacoes.list().await)
    }
}

#[async_trait]
impl OpinionStore for InMemoryStore {
    async fn insert_opinion(&self, opinion: &Opinion) -> Result<(), WorkflowError> {
        let mut docs = self.opinions.docs.write().await;

        let duplicate = docs.values().any(|existing| {
            existing.process_id == opinion.process_id
                && existing.issuing_sector == opinion.issuing_sector
                && existing.status.is_outstanding()
        });
        if duplicate {
            return Err(outstanding_opinion_conflict(opinion));
        }

        Collection::<Opinion>::insert_locked(&mut docs, opinion)
    }

    async fn get_opinion(&self, id: &str) -> Result<Option<Opinion>, WorkflowError> {
        Ok(self.opinions.get(id).await)
    }

    async fn update_opinion(&self, opinion: &Opinion) -> Result<Opinion, WorkflowError> {
        self.opinions.update_with(opinion, prepare_update).await
    }

    async fn remove_opinion(&self, id: &str) -> Result<(), WorkflowError> {
        self.opinions.remove(id).await;
        Ok(())
    }

    async fn list_opinions(&self) -> Result<Vec<Opinion>, WorkflowError> {
        Ok(self.opinions.list().await)
    }
}

#[async_trait]
impl PositionStore for InMemoryStore {
    async fn insert_position(&self, position: &Position) -> Result<(), WorkflowError> {
        self.positions.insert(position).await
    }

    async fn get_position(&self, id: &str) -> Result<Option<Position>, WorkflowError> {
        Ok(self.positions.get(id).await)
    }

    async fn update_position(&self, position: &Position) -> Result<Position, WorkflowError> {
        self.positions.update_with(position, prepare_update).await
    }

    async fn remove_position(&self, id: &str) -> Result<(), WorkflowError> {
        self.positions.remove(id).await;
        Ok(())
    }

    async fn list_positions(&self) -> Result<Vec<Position>, WorkflowError> {
        Ok(self.positions.list().await)
    }
}

#[async_trait]
impl SequenceStore for InMemoryStore {
    async fn next_sequence(&self, scope: &str) -> Result<u64, WorkflowError> {
        let mut sequences = self.sequences.lock().await;
        let counter = sequences.entry(scope.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn test_update_requires_current_version() {
        let store = InMemoryStore::new();
        let process = fixtures::process("p-1");
        store.insert_process(&process).await.unwrap();

        let first = store.update_process(&process).await.unwrap();
        assert_eq!(first.version, 1);

        let err = store.update_process(&process).await.unwrap_err();
        assert!(matches!(err, WorkflowError::ConcurrentModification { .. }));
    }

    #[tokio::test]
    async fn test_document_update_never_overwrites_counters() {
        let store = InMemoryStore::new();
        let process = fixtures::process("p-1");
        store.insert_process(&process).await.unwrap();

        let adjusted = store.adjust_counter("p-1", CounterKind::Opinions, 1).await.unwrap();
        assert_eq!(adjusted.pending_opinions, 1);

        let mut edited = adjusted.clone();
        edited.pending_opinions = 0;
        edited.title = "novo título".to_string();
        let stored = store.update_process(&edited).await.unwrap();
        assert_eq!(stored.pending_opinions, 1);
        assert_eq!(stored.title, "novo título");
    }

    #[tokio::test]
    async fn test_counter_adjustment_bumps_version_and_clamps() {
        let store = InMemoryStore::new();
        let process = fixtures::process("p-1");
        store.insert_process(&process).await.unwrap();

        let after = store.adjust_counter("p-1", CounterKind::Positions, -1).await.unwrap();
        assert_eq!(after.pending_positions, 0);
        assert_eq!(after.version, 1);

        // a copy loaded before the adjustment is now stale
        assert!(store.update_process(&process).await.is_err());
    }

    #[tokio::test]
    async fn test_store_refuses_finalized_with_pending_counters() {
        let store = InMemoryStore::new();
        let process = fixtures::process("p-1");
        store.insert_process(&process).await.unwrap();
        let mut loaded = store.adjust_counter("p-1", CounterKind::Opinions, 1).await.unwrap();

        loaded.status = crate::domain::process::ProcessStatus::Finalizado;
        loaded.pending_opinions = 0;
        let err = store.update_process(&loaded).await.unwrap_err();
        assert!(matches!(err, WorkflowError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_closed_process_takes_no_new_pending_work() {
        let store = InMemoryStore::new();
        let mut process = fixtures::process("p-1");
        process.status = crate::domain::process::ProcessStatus::Finalizado;
        store.insert_process(&process).await.unwrap();

        let err = store.adjust_counter("p-1", CounterKind::Opinions, 1).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

        let stored = store.get_process("p-1").await.unwrap().unwrap();
        assert_eq!(stored.pending_opinions, 0);
        assert_eq!(stored.version, 0);
        assert!(store.adjust_counter("p-1", CounterKind::Opinions, -1).await.is_ok());
    }

    #[tokio::test]
    async fn test_single_outstanding_opinion_per_sector() {
        let store = InMemoryStore::new();
        let first = fixtures::opinion("o-1", "p-1", "S1");
        store.insert_opinion(&first).await.unwrap();

        let err = store.insert_opinion(&fixtures::opinion("o-2", "p-1", "S1")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));

        store.insert_opinion(&fixtures::opinion("o-3", "p-1", "S2")).await.unwrap();
    }

    #[tokio::test]
    async fn test_sequences_are_scoped() {
        let store = InMemoryStore::new();
        assert_eq!(store.next_sequence("process:2026").await.unwrap(), 1);
        assert_eq!(store.next_sequence("process:2026").await.unwrap(), 2);
        assert_eq!(store.next_sequence("opinion:2026").await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_counter_adjustments_are_not_lost() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_process(&fixtures::process("p-1")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.adjust_counter("p-1", CounterKind::Opinions, 1).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let process = store.get_process("p-1").await.unwrap().unwrap();
        assert_eq!(process.pending_opinions, 50);
        assert_eq!(process.version, 50);
    }
}
