//! Routing Engine: owns the tramitação state machine

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{Level, event};
use uuid::Uuid;

use crate::{
    domain::{
        auth::Operation,
        constant::routing,
        error::WorkflowError,
        event::{Notification, NotificationKind},
        opinion::{Opinion, OpinionKind, OpinionRequest},
        position::{Position, PositionRequest},
        tramitacao::{self, NewTramitacao, Tramitacao, TramitacaoStatus, queue_order}
    },
    service::{
        ServiceContext, opinion::OpinionWorkflow, position::PositionWorkflow, process::ProcessManager,
        retry::with_retry
    }
};

/// Who may drive a step on an existing routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Party {
    Recipient,
    SenderOrRecipient
}

pub struct RoutingEngine {
    ctx:       ServiceContext,
    processes: Arc<ProcessManager>,
    opinions:  Arc<OpinionWorkflow>,
    positions: Arc<PositionWorkflow>
}

impl RoutingEngine {
    pub fn new(
        ctx: ServiceContext,
        processes: Arc<ProcessManager>,
        opinions: Arc<OpinionWorkflow>,
        positions: Arc<PositionWorkflow>
    ) -> Self {
        Self { ctx, processes, opinions, positions }
    }

    /// Send a new routing. It starts PENDENTE in the recipient's queue.
    pub async fn encaminhar(&self, actor_id: &str, input: NewTramitacao) -> Result<Tramitacao, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::Encaminhar).await?;
        self.processes.require_open(&input.process_id).await?;

        if !self.ctx.directory.party_exists(&input.recipient_id).await? {
            return Err(WorkflowError::not_found("recipient", &input.recipient_id));
        }

        let tramitacao = Tramitacao::send(Uuid::new_v4().to_string(), input, Utc::now())?;
        self.ctx.store.insert_tramitacao(&tramitacao).await?;

        event!(Level::INFO, event = routing::TRAMITACAO_SENT, tramitacao_id = %tramitacao.id,
               process_id = %tramitacao.process_id, kind = %tramitacao.kind, recipient_id = %tramitacao.recipient_id,
               urgent = tramitacao.urgent);
        self.notify(NotificationKind::TramitacaoSent, &tramitacao, &tramitacao.recipient_id);
        Ok(tramitacao)
    }

    pub async fn receber(&self, actor_id: &str, tramitacao_id: &str) -> Result<Tramitacao, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::Receber).await?;
        let tramitacao = self.step(actor_id, tramitacao_id, Party::Recipient, &Tramitacao::receive).await?;

        event!(Level::INFO, event = routing::TRAMITACAO_RECEIVED, tramitacao_id = %tramitacao_id, actor_id = %actor_id);
        Ok(tramitacao)
    }

    pub async fn iniciar_analise(&self, actor_id: &str, tramitacao_id: &str) -> Result<Tramitacao, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::IniciarAnalise).await?;
        let tramitacao = self.step(actor_id, tramitacao_id, Party::Recipient, &Tramitacao::start_analysis).await?;

        event!(Level::INFO, event = routing::ANALYSIS_STARTED, tramitacao_id = %tramitacao_id, actor_id = %actor_id);
        Ok(tramitacao)
    }

    /// Park the routing until an opinion from the recipient sector is settled.
    ///
    /// The routing moves first. If the opinion cannot be opened the move is
    /// undone and the opinion error is returned.
    pub async fn solicitar_parecer(
        &self,
        actor_id: &str,
        tramitacao_id: &str
    ) -> Result<(Tramitacao, Opinion), WorkflowError> {
        self.ctx.authorize(actor_id, Operation::SolicitarParecer).await?;

        let opinion_id = Uuid::new_v4().to_string();
        let tramitacao = self
            .step(actor_id, tramitacao_id, Party::Recipient, &|t: &mut Tramitacao, now: DateTime<Utc>| {
                t.await_opinion(now)?;
                t.linked_entity = Some(opinion_id.clone());
                Ok(())
            })
            .await?;

        let request = OpinionRequest {
            process_id:        tramitacao.process_id.clone(),
            requesting_sector: tramitacao.sender_id.clone(),
            issuing_sector:    tramitacao.recipient_id.clone(),
            kind:              OpinionKind::default(),
            deadline:          tramitacao.deadline,
            tramitacao_id:     Some(tramitacao.id.clone())
        };

        match self.opinions.open(request, opinion_id).await {
            Ok(opinion) => {
                event!(Level::INFO, event = routing::REPLY_REQUESTED, tramitacao_id = %tramitacao_id,
                       linked_entity = %opinion.id, status = %tramitacao.status);
                Ok((tramitacao, opinion))
            }
            Err(err) => {
                self.compensate(&tramitacao, &err).await;
                Err(err)
            }
        }
    }

    /// Park the routing until the recipient body registers its position
    pub async fn solicitar_posicionamento(
        &self,
        actor_id: &str,
        tramitacao_id: &str
    ) -> Result<(Tramitacao, Position), WorkflowError> {
        self.ctx.authorize(actor_id, Operation::SolicitarPosicionamento).await?;

        let position_id = Uuid::new_v4().to_string();
        let tramitacao = self
            .step(actor_id, tramitacao_id, Party::Recipient, &|t: &mut Tramitacao, now: DateTime<Utc>| {
                t.await_position(now)?;
                t.linked_entity = Some(position_id.clone());
                Ok(())
            })
            .await?;

        let request = PositionRequest {
            process_id:       tramitacao.process_id.clone(),
            requesting_party: tramitacao.sender_id.clone(),
            issuing_body:     tramitacao.recipient_id.clone(),
            deadline:         tramitacao.deadline,
            tramitacao_id:    Some(tramitacao.id.clone())
        };

        match self.positions.open(request, position_id).await {
            Ok(position) => {
                event!(Level::INFO, event = routing::REPLY_REQUESTED, tramitacao_id = %tramitacao_id,
                       linked_entity = %position.id, status = %tramitacao.status);
                Ok((tramitacao, position))
            }
            Err(err) => {
                self.compensate(&tramitacao, &err).await;
                Err(err)
            }
        }
    }

    pub async fn suspender(&self, actor_id: &str, tramitacao_id: &str) -> Result<Tramitacao, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::Suspender).await?;
        let tramitacao = self.step(actor_id, tramitacao_id, Party::Recipient, &Tramitacao::pause).await?;

        event!(Level::INFO, event = routing::TRAMITACAO_SUSPENDED, tramitacao_id = %tramitacao_id,
               actor_id = %actor_id);
        Ok(tramitacao)
    }

    pub async fn retomar(&self, actor_id: &str, tramitacao_id: &str) -> Result<Tramitacao, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::Retomar).await?;
        let tramitacao = self.step(actor_id, tramitacao_id, Party::Recipient, &Tramitacao::resume).await?;

        event!(Level::INFO, event = routing::TRAMITACAO_RESUMED, tramitacao_id = %tramitacao_id, actor_id = %actor_id);
        Ok(tramitacao)
    }

    /// Close a routing that needs no reply
    pub async fn concluir(&self, actor_id: &str, tramitacao_id: &str) -> Result<Tramitacao, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::Concluir).await?;
        let tramitacao = self
            .step(actor_id, tramitacao_id, Party::Recipient, &|t: &mut Tramitacao, now: DateTime<Utc>| {
                if t.kind.requires_reply() {
                    return Err(WorkflowError::PreconditionFailed(format!(
                        "tramitacao '{}' is a {} and must be answered with a reply",
                        t.id, t.kind
                    )));
                }
                t.conclude(now)
            })
            .await?;

        event!(Level::INFO, event = routing::TRAMITACAO_CONCLUDED, tramitacao_id = %tramitacao_id,
               actor_id = %actor_id);
        Ok(tramitacao)
    }

    /// Answer a solicitation: concludes it and routes the matching RETORNO back to the sender.
    ///
    /// Returns the concluded original and the new reply routing.
    pub async fn responder(
        &self,
        actor_id: &str,
        tramitacao_id: &str,
        dispatch: Option<String>
    ) -> Result<(Tramitacao, Tramitacao), WorkflowError> {
        self.ctx.authorize(actor_id, Operation::Responder).await?;

        let original = self
            .step(actor_id, tramitacao_id, Party::Recipient, &|t: &mut Tramitacao, now: DateTime<Utc>| {
                if t.kind.reply_kind().is_none() {
                    return Err(WorkflowError::PreconditionFailed(format!(
                        "tramitacao '{}' is a {} and takes no reply",
                        t.id, t.kind
                    )));
                }
                if t.status != TramitacaoStatus::EmAnalise {
                    return Err(WorkflowError::invalid_transition(tramitacao::ENTITY, t.status, "REPLY"));
                }
                t.conclude(now)
            })
            .await?;

        // checked inside the step above
        let Some(reply_kind) = original.kind.reply_kind() else {
            return Err(WorkflowError::Generic(format!("tramitacao '{}' lost its reply kind", original.id)));
        };

        let input = NewTramitacao {
            process_id: original.process_id.clone(),
            sender_id: original.recipient_id.clone(),
            recipient_id: original.sender_id.clone(),
            kind: reply_kind,
            urgent: original.urgent,
            deadline: None,
            dispatch
        };
        let reply = Tramitacao::send(Uuid::new_v4().to_string(), input, Utc::now())?;
        self.ctx.store.insert_tramitacao(&reply).await?;

        event!(Level::INFO, event = routing::REPLY_SENT, tramitacao_id = %original.id, reply_id = %reply.id,
               kind = %reply.kind, recipient_id = %reply.recipient_id);
        self.notify(NotificationKind::TramitacaoReplied, &reply, &reply.recipient_id);
        Ok((original, reply))
    }

    /// Shelve a routing from any non-terminal status. Sender or recipient only.
    pub async fn arquivar(&self, actor_id: &str, tramitacao_id: &str) -> Result<Tramitacao, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::Arquivar).await?;
        let tramitacao = self.step(actor_id, tramitacao_id, Party::SenderOrRecipient, &Tramitacao::archive).await?;

        event!(Level::INFO, event = routing::TRAMITACAO_ARCHIVED, tramitacao_id = %tramitacao_id, actor_id = %actor_id);
        Ok(tramitacao)
    }

    pub async fn get(&self, tramitacao_id: &str) -> Result<Tramitacao, WorkflowError> {
        self.ctx
            .store
            .get_tramitacao(tramitacao_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(tramitacao::ENTITY, tramitacao_id))
    }

    /// Urgent routings still waiting for receipt, most pressing first
    pub async fn buscar_urgentes_pendentes(&self, recipient_id: &str) -> Result<Vec<Tramitacao>, WorkflowError> {
        self.queue(recipient_id, |t| t.urgent && t.status == TramitacaoStatus::Pendente).await
    }

    /// Every open routing addressed to `recipient_id`, most pressing first
    pub async fn fila(&self, recipient_id: &str) -> Result<Vec<Tramitacao>, WorkflowError> {
        self.queue(recipient_id, |t| !t.status.is_terminal()).await
    }

    /// Routing history of a process, newest first
    pub async fn por_processo(&self, process_id: &str) -> Result<Vec<Tramitacao>, WorkflowError> {
        let mut history: Vec<Tramitacao> =
            self.ctx.store.list_tramitacoes().await?.into_iter().filter(|t| t.process_id == process_id).collect();
        history.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then_with(|| a.id.cmp(&b.id)));
        Ok(history)
    }

    /// Everything `sender_id` has sent, newest first
    pub async fn por_remetente(&self, sender_id: &str) -> Result<Vec<Tramitacao>, WorkflowError> {
        let mut sent: Vec<Tramitacao> =
            self.ctx.store.list_tramitacoes().await?.into_iter().filter(|t| t.sender_id == sender_id).collect();
        sent.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then_with(|| a.id.cmp(&b.id)));
        Ok(sent)
    }

    async fn queue<P>(&self, recipient_id: &str, keep: P) -> Result<Vec<Tramitacao>, WorkflowError>
    where
        P: Fn(&Tramitacao) -> bool
    {
        let mut queue: Vec<Tramitacao> = self
            .ctx
            .store
            .list_tramitacoes()
            .await?
            .into_iter()
            .filter(|t| t.recipient_id == recipient_id && keep(t))
            .collect();
        queue.sort_by(queue_order);
        Ok(queue)
    }

    /// Load, check the acting party, mutate and compare-and-set, retrying stale writes
    async fn step<F>(
        &self,
        actor_id: &str,
        tramitacao_id: &str,
        party: Party,
        mutate: &F
    ) -> Result<Tramitacao, WorkflowError>
    where
        F: Fn(&mut Tramitacao, DateTime<Utc>) -> Result<(), WorkflowError> + Sync
    {
        with_retry(self.ctx.retry_attempts, move || async move {
            let mut tramitacao = self.get(tramitacao_id).await?;

            match party {
                Party::Recipient => tramitacao.ensure_recipient(actor_id)?,
                Party::SenderOrRecipient if tramitacao.sender_id != actor_id => {
                    tramitacao.ensure_recipient(actor_id)?
                }
                Party::SenderOrRecipient => {}
            }

            mutate(&mut tramitacao, Utc::now())?;
            self.ctx.store.update_tramitacao(&tramitacao).await
        })
        .await
    }

    /// Undo a reply request whose opinion or position could not be opened
    async fn compensate(&self, moved: &Tramitacao, cause: &WorkflowError) {
        let linked = moved.linked_entity.as_deref();
        let result = with_retry(self.ctx.retry_attempts, move || async move {
            let mut tramitacao = self.get(&moved.id).await?;
            if !tramitacao.status.is_awaiting_reply() || tramitacao.linked_entity.as_deref() != linked {
                return Ok(());
            }
            tramitacao.withdraw_reply_request(Utc::now())?;
            self.ctx.store.update_tramitacao(&tramitacao).await.map(|_| ())
        })
        .await;

        match result {
            Ok(()) => {
                event!(Level::WARN, event = routing::COMPENSATION_APPLIED, tramitacao_id = %moved.id, cause = %cause);
            }
            Err(err) => {
                event!(Level::ERROR, event = routing::COMPENSATION_FAILED, tramitacao_id = %moved.id, cause = %cause,
                       error = %err);
            }
        }
    }

    fn notify(&self, kind: NotificationKind, tramitacao: &Tramitacao, recipient_id: &str) {
        self.ctx.notifier.notify(Notification {
            kind,
            process_id: tramitacao.process_id.clone(),
            entity_id: tramitacao.id.clone(),
            recipient_id: recipient_id.to_string(),
            due_at: tramitacao.deadline,
            urgent: tramitacao.urgent
        });
    }
}

/// Loop a routing parked in AGUARDANDO_* back to EM_ANALISE once its linked entity settled.
///
/// Runs after the settling write has committed, so failures are logged rather
/// than undoing the decision. A routing that is no longer waiting is left alone.
pub(crate) async fn resume_from_reply(ctx: &ServiceContext, tramitacao_id: &str, linked_entity: &str) {
    let result = with_retry(ctx.retry_attempts, move || async move {
        let Some(mut tramitacao) = ctx.store.get_tramitacao(tramitacao_id).await? else {
            return Ok(false);
        };
        if !tramitacao.status.is_awaiting_reply() || tramitacao.linked_entity.as_deref() != Some(linked_entity) {
            return Ok(false);
        }
        tramitacao.reply_arrived(Utc::now())?;
        ctx.store.update_tramitacao(&tramitacao).await.map(|_| true)
    })
    .await;

    match result {
        Ok(true) => {
            event!(Level::INFO, event = routing::REPLY_ARRIVED, tramitacao_id = %tramitacao_id,
                   linked_entity = %linked_entity);
        }
        Ok(false) => {}
        Err(err) => {
            event!(Level::WARN, event = routing::REPLY_RESUME_FAILED, tramitacao_id = %tramitacao_id,
                   linked_entity = %linked_entity, error = %err);
        }
    }
}
