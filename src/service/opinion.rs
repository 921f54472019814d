//! Opinion Workflow: solicitation, issuance and approval of internal opinions

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::{Level, event};
use uuid::Uuid;

use crate::{
    domain::{
        auth::Operation,
        constant::opinion_workflow,
        error::WorkflowError,
        event::{Notification, NotificationKind},
        opinion::{self, Opinion, OpinionDraft, OpinionRequest, OpinionStatus, format_opinion_number},
        process::CounterKind
    },
    service::{ServiceContext, process::ProcessManager, retry::with_retry, routing::resume_from_reply}
};

pub struct OpinionWorkflow {
    ctx:       ServiceContext,
    processes: Arc<ProcessManager>
}

impl OpinionWorkflow {
    pub fn new(ctx: ServiceContext, processes: Arc<ProcessManager>) -> Self {
        Self { ctx, processes }
    }

    /// Ask `issuing_sector` for an opinion on the process.
    ///
    /// Fails with `Conflict` while that sector still has an outstanding opinion
    /// on the same process.
    pub async fn solicitar(&self, actor_id: &str, request: OpinionRequest) -> Result<Opinion, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::RequestOpinion).await?;
        self.open(request, Uuid::new_v4().to_string()).await
    }

    /// Open a solicitation under a caller-chosen id. The routing engine links
    /// the id before the opinion exists.
    pub(crate) async fn open(&self, request: OpinionRequest, opinion_id: String) -> Result<Opinion, WorkflowError> {
        self.processes.require_open(&request.process_id).await?;

        for sector in [&request.requesting_sector, &request.issuing_sector] {
            if !self.ctx.directory.sector_exists(sector).await? {
                return Err(WorkflowError::not_found("sector", sector));
            }
        }

        let now = Utc::now();
        let sequence = self.ctx.store.next_sequence(&format!("opinion:{}", now.year())).await?;
        let opinion = Opinion::request(opinion_id, format_opinion_number(now.year(), sequence), request, now);

        self.ctx.store.insert_opinion(&opinion).await?;
        if let Err(err) = self.processes.adjust_pending_counters(&opinion.process_id, 1, CounterKind::Opinions).await {
            self.withdraw(&opinion, &err).await;
            return Err(err);
        }

        event!(Level::INFO, event = opinion_workflow::OPINION_REQUESTED, opinion_id = %opinion.id,
               number = %opinion.number, process_id = %opinion.process_id, issuing_sector = %opinion.issuing_sector);
        self.notify(NotificationKind::OpinionRequested, &opinion, &opinion.issuing_sector);
        Ok(opinion)
    }

    /// Undo an insert whose counter increment failed, e.g. because the process
    /// was closed in between
    async fn withdraw(&self, opinion: &Opinion, cause: &WorkflowError) {
        match self.ctx.store.remove_opinion(&opinion.id).await {
            Ok(()) => {
                event!(Level::WARN, event = opinion_workflow::OPINION_WITHDRAWN, opinion_id = %opinion.id,
                       process_id = %opinion.process_id, cause = %cause);
            }
            Err(e) => {
                event!(Level::ERROR, event = opinion_workflow::WITHDRAW_FAILED, opinion_id = %opinion.id,
                       process_id = %opinion.process_id, cause = %cause, error = %e);
            }
        }
    }

    pub async fn emitir(
        &self,
        actor_id: &str,
        opinion_id: &str,
        draft: OpinionDraft
    ) -> Result<Opinion, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::IssueOpinion).await?;

        let draft = &draft;
        let opinion = with_retry(self.ctx.retry_attempts, move || async move {
            let mut opinion = self.get(opinion_id).await?;
            opinion.emit(actor_id, draft.clone(), Utc::now())?;
            self.ctx.store.update_opinion(&opinion).await
        })
        .await?;

        event!(Level::INFO, event = opinion_workflow::OPINION_ISSUED, opinion_id = %opinion_id, analyst_id = %actor_id,
               met_deadline = ?opinion.met_deadline);
        self.notify(NotificationKind::OpinionIssued, &opinion, &opinion.requesting_sector);
        Ok(opinion)
    }

    pub async fn aprovar(&self, actor_id: &str, opinion_id: &str) -> Result<Opinion, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::ApproveOpinion).await?;
        let opinion = self.decide(actor_id, opinion_id, Opinion::approve).await?;

        event!(Level::INFO, event = opinion_workflow::OPINION_APPROVED, opinion_id = %opinion_id,
               approver_id = %actor_id);
        self.notify(NotificationKind::OpinionApproved, &opinion, &opinion.requesting_sector);
        Ok(opinion)
    }

    /// A rejected opinion is settled too: it no longer counts as pending
    pub async fn reprovar(&self, actor_id: &str, opinion_id: &str) -> Result<Opinion, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::RejectOpinion).await?;
        let opinion = self.decide(actor_id, opinion_id, Opinion::reject).await?;

        event!(Level::INFO, event = opinion_workflow::OPINION_REJECTED, opinion_id = %opinion_id,
               approver_id = %actor_id);
        self.notify(NotificationKind::OpinionRejected, &opinion, &opinion.issuing_sector);
        Ok(opinion)
    }

    pub async fn get(&self, opinion_id: &str) -> Result<Opinion, WorkflowError> {
        self.ctx
            .store
            .get_opinion(opinion_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(opinion::ENTITY, opinion_id))
    }

    pub async fn por_processo(&self, process_id: &str) -> Result<Vec<Opinion>, WorkflowError> {
        self.select(|o| o.process_id == process_id).await
    }

    /// Solicitations the sector has not answered yet
    pub async fn pendentes_do_setor(&self, sector_id: &str) -> Result<Vec<Opinion>, WorkflowError> {
        self.select(|o| o.issuing_sector == sector_id && o.status == OpinionStatus::Solicitado).await
    }

    pub async fn aguardando_aprovacao(&self) -> Result<Vec<Opinion>, WorkflowError> {
        self.select(|o| o.status == OpinionStatus::Emitido).await
    }

    pub async fn vencidos(&self, now: DateTime<Utc>) -> Result<Vec<Opinion>, WorkflowError> {
        self.select(|o| o.is_overdue(now)).await
    }

    async fn select<P>(&self, keep: P) -> Result<Vec<Opinion>, WorkflowError>
    where
        P: Fn(&Opinion) -> bool
    {
        let mut opinions: Vec<Opinion> =
            self.ctx.store.list_opinions().await?.into_iter().filter(|o| keep(o)).collect();
        opinions.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then_with(|| a.number.cmp(&b.number)));
        Ok(opinions)
    }

    /// Settle an issued opinion, release its counter slot and wake the waiting routing
    async fn decide(
        &self,
        actor_id: &str,
        opinion_id: &str,
        settle: fn(&mut Opinion, &str, DateTime<Utc>) -> Result<(), WorkflowError>
    ) -> Result<Opinion, WorkflowError> {
        let opinion = with_retry(self.ctx.retry_attempts, move || async move {
            let mut opinion = self.get(opinion_id).await?;
            settle(&mut opinion, actor_id, Utc::now())?;
            self.ctx.store.update_opinion(&opinion).await
        })
        .await?;

        self.processes.adjust_pending_counters(&opinion.process_id, -1, CounterKind::Opinions).await?;

        if let Some(tramitacao_id) = &opinion.tramitacao_id {
            resume_from_reply(&self.ctx, tramitacao_id, &opinion.id).await;
        }
        Ok(opinion)
    }

    fn notify(&self, kind: NotificationKind, opinion: &Opinion, recipient_id: &str) {
        self.ctx.notifier.notify(Notification {
            kind,
            process_id: opinion.process_id.clone(),
            entity_id: opinion.id.clone(),
            recipient_id: recipient_id.to_string(),
            due_at: opinion.deadline,
            urgent: false
        });
    }
}
