use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    error::WorkflowError,
    opinion::Opinion,
    position::Position,
    process::{CounterKind, Process, ProcessStatus},
    tramitacao::Tramitacao
};

/// A persisted entity keyed by id and guarded by an optimistic version
pub trait Document: Clone + Send + Sync + serde::Serialize + serde::de::DeserializeOwned + 'static {
    /// Entity name used in errors and as the storage namespace
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

macro_rules! impl_document {
    ($type:ty, $collection:expr) => {
        impl Document for $type {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> &str {
                &self.id
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn set_version(&mut self, version: u64) {
                self.version = version;
            }
        }
    };
}

impl_document!(Process, crate::domain::process::ENTITY);
impl_document!(Tramitacao, crate::domain::tramitacao::ENTITY);
impl_document!(Opinion, crate::domain::opinion::ENTITY);
impl_document!(Position, crate::domain::position::ENTITY);

/// Port for process persistence.
///
/// `update_process` is a compare-and-set on `version` and never writes the
/// pending counters: those only change through `adjust_counter`, which is
/// atomic at the store and bumps the version so a racing whole-document
/// write fails with `ConcurrentModification`.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    async fn insert_process(&self, process: &Process) -> Result<(), WorkflowError>;

    async fn get_process(&self, id: &str) -> Result<Option<Process>, WorkflowError>;

    /// Persist if the stored version equals `process.version`; returns the stored copy
    async fn update_process(&self, process: &Process) -> Result<Process, WorkflowError>;

    /// Atomically add `delta` to one counter, clamping at zero. A positive
    /// delta on a FINALIZADO or ARQUIVADO process fails with `InvalidTransition`.
    async fn adjust_counter(&self, id: &str, kind: CounterKind, delta: i64) -> Result<Process, WorkflowError>;

    async fn list_processes(&self) -> Result<Vec<Process>, WorkflowError>;
}

/// Port for tramitação persistence
#[async_trait]
pub trait TramitacaoStore: Send + Sync {
    async fn insert_tramitacao(&self, tramitacao: &Tramitacao) -> Result<(), WorkflowError>;

    async fn get_tramitacao(&self, id: &str) -> Result<Option<Tramitacao>, WorkflowError>;

    async fn update_tramitacao(&self, tramitacao: &Tramitacao) -> Result<Tramitacao, WorkflowError>;

    async fn list_tramitacoes(&self) -> Result<Vec<Tramitacao>, WorkflowError>;
}

/// Port for opinion persistence
#[async_trait]
pub trait OpinionStore: Send + Sync {
    /// Insert unless another outstanding opinion exists for the same
    /// (process, issuing sector); that case fails with `Conflict`
    async fn insert_opinion(&self, opinion: &Opinion) -> Result<(), WorkflowError>;

    async fn get_opinion(&self, id: &str) -> Result<Option<Opinion>, WorkflowError>;

    async fn update_opinion(&self, opinion: &Opinion) -> Result<Opinion, WorkflowError>;

    /// Drop a solicitation that never became pending work. Missing ids are ignored.
    async fn remove_opinion(&self, id: &str) -> Result<(), WorkflowError>;

    async fn list_opinions(&self) -> Result<Vec<Opinion>, WorkflowError>;
}

/// Port for position persistence
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn insert_position(&self, position: &Position) -> Result<(), WorkflowError>;

    async fn get_position(&self, id: &str) -> Result<Option<Position>, WorkflowError>;

    async fn update_position(&self, position: &Position) -> Result<Position, WorkflowError>;

    /// Drop a solicitation that never became pending work. Missing ids are ignored.
    async fn remove_position(&self, id: &str) -> Result<(), WorkflowError>;

    async fn list_positions(&self) -> Result<Vec<Position>, WorkflowError>;
}

/// Port for gap-free number allocation
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Atomically return the next value for `scope`, starting at 1
    async fn next_sequence(&self, scope: &str) -> Result<u64, WorkflowError>;
}

/// Everything the workflow needs from persistence
pub trait WorkflowStore: ProcessStore + TramitacaoStore + OpinionStore + PositionStore + SequenceStore {}

impl<T> WorkflowStore for T where T: ProcessStore + TramitacaoStore + OpinionStore + PositionStore + SequenceStore {}

/// Compare-and-set check shared by adapters: the incoming copy must carry the
/// stored version. Returns the document to write, with its version bumped.
pub fn prepare_update<T: Document>(stored: &T, incoming: &T) -> Result<T, WorkflowError> {
    if stored.version() != incoming.version() {
        return Err(WorkflowError::concurrent(T::COLLECTION, incoming.id()));
    }

    let mut next = incoming.clone();
    next.set_version(stored.version() + 1);
    Ok(next)
}

/// Process variant of [`prepare_update`]: counters are taken from the stored
/// copy and FINALIZADO is refused while any of them is non-zero.
pub fn prepare_process_update(stored: &Process, incoming: &Process) -> Result<Process, WorkflowError> {
    let mut next = prepare_update(stored, incoming)?;
    next.pending_opinions = stored.pending_opinions;
    next.pending_positions = stored.pending_positions;

    if next.status == ProcessStatus::Finalizado && stored.status != ProcessStatus::Finalizado && next.has_pending() {
        return Err(WorkflowError::PreconditionFailed(format!(
            "process {} cannot be finalized with pending opinions or positions",
            next.number
        )));
    }

    Ok(next)
}

/// Counter adjustment shared by adapters. A closed process takes no new
/// pending work, so increments on a terminal status are refused.
pub fn apply_counter(
    stored: &Process,
    kind: CounterKind,
    delta: i64,
    now: DateTime<Utc>
) -> Result<Process, WorkflowError> {
    if delta > 0 && stored.status.is_terminal() {
        return Err(WorkflowError::invalid_transition(
            crate::domain::process::ENTITY,
            stored.status,
            "new pending work"
        ));
    }

    let mut next = stored.clone();
    next.apply_counter_delta(kind, delta);
    next.version = stored.version + 1;
    next.updated_at = now;
    Ok(next)
}

/// Shared conflict error for a duplicate outstanding opinion
pub fn outstanding_opinion_conflict(opinion: &Opinion) -> WorkflowError {
    WorkflowError::Conflict(format!(
        "sector '{}' already has an outstanding opinion on process '{}'",
        opinion.issuing_sector, opinion.process_id
    ))
}

/// Key of the outstanding-opinion uniqueness index
pub fn outstanding_key(process_id: &str, issuing_sector: &str) -> String {
    format!("{}:{}", process_id, issuing_sector)
}
