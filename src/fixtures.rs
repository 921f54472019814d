//! Shared test data and doubles

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    adapter::{
        directory::{ActorGrant, DirectorySeed, Party, StaticDirectory},
        memory::InMemoryStore
    },
    domain::{
        auth::Role,
        error::WorkflowError,
        event::{Notification, NotificationKind},
        opinion::{Opinion, OpinionDraft, OpinionKind, OpinionRequest, Recommendation},
        position::{Position, PositionKind, PositionReply, PositionRequest},
        process::{CounterKind, NewProcess, Priority, Process},
        tramitacao::{NewTramitacao, Tramitacao, TramitacaoKind}
    },
    port::{
        notify::NotificationDispatcher,
        store::{OpinionStore, PositionStore, ProcessStore, SequenceStore, TramitacaoStore, WorkflowStore}
    },
    service::{ServiceContext, ServiceOptions, WorkflowServices}
};

pub const ADMIN: &str = "admin";
pub const GESTOR: &str = "gestor";
pub const ANALISTA: &str = "analista";
pub const S0: &str = "S0";
pub const S1: &str = "S1";
pub const S2: &str = "S2";
pub const MRE: &str = "MRE";
pub const OTHER_BODY: &str = "CAMARA";
pub const ITEM: &str = "PL-1";
pub const OTHER_ITEM: &str = "PL-2";

fn party(id: &str) -> Party {
    Party { id: id.to_string(), name: format!("{} name", id), acronym: Some(id.to_string()), active: true }
}

fn grant(id: &str, roles: &[Role]) -> ActorGrant {
    ActorGrant { id: id.to_string(), roles: roles.to_vec() }
}

/// Sectors act through their own ids; external bodies hold only EXTERNO
pub fn seed() -> DirectorySeed {
    DirectorySeed {
        sectors:           vec![party(S0), party(S1), party(S2)],
        external_bodies:   vec![party(MRE), party(OTHER_BODY)],
        legislative_items: vec![ITEM.to_string(), OTHER_ITEM.to_string()],
        actors:            vec![
            grant(ADMIN, &[Role::Admin]),
            grant(GESTOR, &[Role::Gestor]),
            grant(ANALISTA, &[Role::Analista]),
            grant(S0, &[Role::Analista]),
            grant(S1, &[Role::Analista]),
            grant(S2, &[Role::Analista]),
            grant(MRE, &[Role::Externo]),
            grant(OTHER_BODY, &[Role::Externo])
        ]
    }
}

pub fn new_process() -> NewProcess {
    NewProcess {
        title:       "PL 1/2026 - Cooperação internacional".to_string(),
        description: Some("Acordo de cooperação".to_string()),
        theme:       "Relações exteriores".to_string(),
        priority:    Priority::Normal,
        item_ids:    vec![ITEM.to_string()],
        sector_id:   S0.to_string(),
        analyst_id:  Some(ANALISTA.to_string()),
        deadline:    None
    }
}

/// A stored-shape process for adapter tests
pub fn process(id: &str) -> Process {
    Process::open(id.to_string(), format!("2026/{}", id), new_process(), Utc::now())
        .expect("fixture process is valid")
}

pub fn opinion_request(process_id: &str, issuing_sector: &str) -> OpinionRequest {
    OpinionRequest {
        process_id:        process_id.to_string(),
        requesting_sector: S0.to_string(),
        issuing_sector:    issuing_sector.to_string(),
        kind:              OpinionKind::Juridico,
        deadline:          None,
        tramitacao_id:     None
    }
}

pub fn opinion(id: &str, process_id: &str, issuing_sector: &str) -> Opinion {
    let request = opinion_request(process_id, issuing_sector);
    Opinion::request(id.to_string(), format!("PARECER-2026/{}", id), request, Utc::now())
}

pub fn position_request(process_id: &str, issuing_body: &str) -> PositionRequest {
    PositionRequest {
        process_id:       process_id.to_string(),
        requesting_party: S0.to_string(),
        issuing_body:     issuing_body.to_string(),
        deadline:         None,
        tramitacao_id:    None
    }
}

pub fn routing_to(process_id: &str, recipient_id: &str) -> NewTramitacao {
    NewTramitacao {
        process_id:   process_id.to_string(),
        sender_id:    S0.to_string(),
        recipient_id: recipient_id.to_string(),
        kind:         TramitacaoKind::Encaminhamento,
        urgent:       false,
        deadline:     None,
        dispatch:     Some("Para análise".to_string())
    }
}

pub fn draft() -> OpinionDraft {
    OpinionDraft {
        context:            "Proposta de acordo".to_string(),
        analysis:           "Sem óbices".to_string(),
        recommendation:     Recommendation::Favoravel,
        justification:      "Alinhado à política externa".to_string(),
        legal_basis:        vec!["CF art. 49".to_string()],
        identified_impacts: vec![],
        conclusion:         "Favorável".to_string()
    }
}

pub fn reply() -> PositionReply {
    PositionReply {
        representative_name:  "Maria Souza".to_string(),
        representative_title: "Assessora".to_string(),
        kind:                 PositionKind::FavoravelComRessalvas,
        manifestation:        "De acordo com ressalvas".to_string(),
        justification:        "Ajustes de redação".to_string(),
        supporting_refs:      vec![],
        official_doc_number:  Some("OF-12/2026".to_string())
    }
}

/// Records every notification it receives
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>
}

impl RecordingDispatcher {
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(&self, notification: Notification) -> Result<(), WorkflowError> {
        self.sent.lock().await.push(notification);
        Ok(())
    }
}

pub struct FailingDispatcher;

#[async_trait]
impl NotificationDispatcher for FailingDispatcher {
    async fn notify(&self, _notification: Notification) -> Result<(), WorkflowError> {
        Err(WorkflowError::Notification("dispatcher unavailable".to_string()))
    }
}

/// Never answers within any sane timeout
pub struct StalledDispatcher;

#[async_trait]
impl NotificationDispatcher for StalledDispatcher {
    async fn notify(&self, _notification: Notification) -> Result<(), WorkflowError> {
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        Ok(())
    }
}

/// Closes the process right after a solicitation is stored, before its
/// counter is raised
pub struct FinalizingStore {
    pub inner: Arc<InMemoryStore>
}

impl FinalizingStore {
    async fn finalize(&self, process_id: &str) -> Result<(), WorkflowError> {
        let mut process = self.inner.get_process(process_id).await?.ok_or_else(|| {
            WorkflowError::not_found("process", process_id)
        })?;
        process.finalize("Posição final", "Encerrado antes da resposta", Utc::now())?;
        self.inner.update_process(&process).await?;
        Ok(())
    }
}

#[async_trait]
impl ProcessStore for FinalizingStore {
    async fn insert_process(&self, process: &Process) -> Result<(), WorkflowError> {
        self.inner.insert_process(process).await
    }

    async fn get_process(&self, id: &str) -> Result<Option<Process>, WorkflowError> {
        self.inner.get_process(id).await
    }

    async fn update_process(&self, process: &Process) -> Result<Process, WorkflowError> {
        self.inner.update_process(process).await
    }

    async fn adjust_counter(&self, id: &str, kind: CounterKind, delta: i64) -> Result<Process, WorkflowError> {
        self.inner.adjust_counter(id, kind, delta).await
    }

    async fn list_processes(&self) -> Result<Vec<Process>, WorkflowError> {
        self.inner.list_processes().await
    }
}

#[async_trait]
impl TramitacaoStore for FinalizingStore {
    async fn insert_tramitacao(&self, tramitacao: &Tramitacao) -> Result<(), WorkflowError> {
        self.inner.insert_tramitacao(tramitacao).await
    }

    async fn get_tramitacao(&self, id: &str) -> Result<Option<Tramitacao>, WorkflowError> {
        self.inner.get_tramitacao(id).await
    }

    async fn update_tramitacao(&self, tramitacao: &Tramitacao) -> Result<Tramitacao, WorkflowError> {
        self.inner.update_tramitacao(tramitacao).await
    }

    async fn list_tramitacoes(&self) -> Result<Vec<Tramitacao>, WorkflowError> {
        self.inner.list_tramitacoes().await
    }
}

#[async_trait]
impl OpinionStore for FinalizingStore {
    async fn insert_opinion(&self, opinion: &Opinion) -> Result<(), WorkflowError> {
        self.inner.insert_opinion(opinion).await?;
        self.finalize(&opinion.process_id).await
    }

    async fn get_opinion(&self, id: &str) -> Result<Option<Opinion>, WorkflowError> {
        self.inner.get_opinion(id).await
    }

    async fn update_opinion(&self, opinion: &Opinion) -> Result<Opinion, WorkflowError> {
        self.inner.update_opinion(opinion).await
    }

    async fn remove_opinion(&self, id: &str) -> Result<(), WorkflowError> {
        self.inner.remove_opinion(id).await
    }

    async fn list_opinions(&self) -> Result<Vec<Opinion>, WorkflowError> {
        self.inner.list_opinions().await
    }
}

#[async_trait]
impl PositionStore for FinalizingStore {
    async fn insert_position(&self, position: &Position) -> Result<(), WorkflowError> {
        self.inner.insert_position(position).await?;
        self.finalize(&position.process_id).await
    }

    async fn get_position(&self, id: &str) -> Result<Option<Position>, WorkflowError> {
        self.inner.get_position(id).await
    }

    async fn update_position(&self, position: &Position) -> Result<Position, WorkflowError> {
        self.inner.update_position(position).await
    }

    async fn remove_position(&self, id: &str) -> Result<(), WorkflowError> {
        self.inner.remove_position(id).await
    }

    async fn list_positions(&self) -> Result<Vec<Position>, WorkflowError> {
        self.inner.list_positions().await
    }
}

#[async_trait]
impl SequenceStore for FinalizingStore {
    async fn next_sequence(&self, scope: &str) -> Result<u64, WorkflowError> {
        self.inner.next_sequence(scope).await
    }
}

/// Services over an in-memory store and the seeded directory
pub struct Harness {
    pub services:  WorkflowServices,
    pub store:     Arc<InMemoryStore>,
    pub directory: Arc<StaticDirectory>,
    pub recorder:  Arc<RecordingDispatcher>
}

pub fn harness() -> Harness {
    let recorder = Arc::new(RecordingDispatcher::default());
    let mut harness = harness_with(recorder.clone());
    harness.recorder = recorder;
    harness
}

pub fn harness_with(dispatcher: Arc<dyn NotificationDispatcher>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    harness_over(store.clone(), store as Arc<dyn WorkflowStore>, dispatcher)
}

/// Services over `seen` while tests inspect `store` directly
pub fn harness_over(
    store: Arc<InMemoryStore>,
    seen: Arc<dyn WorkflowStore>,
    dispatcher: Arc<dyn NotificationDispatcher>
) -> Harness {
    let directory = Arc::new(StaticDirectory::new(&seed()));
    let options = ServiceOptions { notification_timeout: Duration::from_millis(100), retry_attempts: 8 };
    let ctx = ServiceContext::new(seen, directory.clone(), dispatcher, options);

    Harness {
        services: WorkflowServices::new(ctx),
        store,
        directory,
        recorder: Arc::new(RecordingDispatcher::default())
    }
}

/// A harness whose store closes the process as soon as a solicitation lands
pub fn finalizing_harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let seen = Arc::new(FinalizingStore { inner: store.clone() });
    harness_over(store, seen, Arc::new(RecordingDispatcher::default()))
}

impl Harness {
    pub async fn open_process(&self) -> Process {
        self.services.processes.create(GESTOR, new_process()).await.expect("fixture process is created")
    }

    /// Poll the recorder until `count` notifications of `kind` arrived
    pub async fn wait_for(&self, kind: NotificationKind, count: usize) -> Vec<Notification> {
        for _ in 0..100 {
            let matching: Vec<Notification> =
                self.recorder.sent().await.into_iter().filter(|n| n.kind == kind).collect();
            if matching.len() >= count {
                return matching;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} {} notification(s)", count, kind);
    }
}
