//! Position Workflow: solicitation and registration of external positions

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::{Level, event};
use uuid::Uuid;

use crate::{
    domain::{
        auth::{Operation, Role, RoleSet},
        constant::position_workflow,
        error::WorkflowError,
        event::{Notification, NotificationKind},
        position::{self, Position, PositionReply, PositionRequest, PositionStatus, format_position_number},
        process::CounterKind
    },
    service::{ServiceContext, process::ProcessManager, retry::with_retry, routing::resume_from_reply}
};

pub struct PositionWorkflow {
    ctx:       ServiceContext,
    processes: Arc<ProcessManager>
}

impl PositionWorkflow {
    pub fn new(ctx: ServiceContext, processes: Arc<ProcessManager>) -> Self {
        Self { ctx, processes }
    }

    pub async fn solicitar(&self, actor_id: &str, request: PositionRequest) -> Result<Position, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::RequestPosition).await?;
        self.open(request, Uuid::new_v4().to_string()).await
    }

    pub(crate) async fn open(&self, request: PositionRequest, position_id: String) -> Result<Position, WorkflowError> {
        self.processes.require_open(&request.process_id).await?;

        if !self.ctx.directory.external_body_exists(&request.issuing_body).await? {
            return Err(WorkflowError::not_found("external_body", &request.issuing_body));
        }

        let now = Utc::now();
        let sequence = self.ctx.store.next_sequence(&format!("position:{}", now.year())).await?;
        let position = Position::request(position_id, format_position_number(now.year(), sequence), request, now);

        self.ctx.store.insert_position(&position).await?;
        if let Err(err) = self.processes.adjust_pending_counters(&position.process_id, 1, CounterKind::Positions).await
        {
            self.withdraw(&position, &err).await;
            return Err(err);
        }

        event!(Level::INFO, event = position_workflow::POSITION_REQUESTED, position_id = %position.id,
               number = %position.number, process_id = %position.process_id, issuing_body = %position.issuing_body);
        self.notify(NotificationKind::PositionRequested, &position, &position.issuing_body);
        Ok(position)
    }

    async fn withdraw(&self, position: &Position, cause: &WorkflowError) {
        match self.ctx.store.remove_position(&position.id).await {
            Ok(()) => {
                event!(Level::WARN, event = position_workflow::POSITION_WITHDRAWN, position_id = %position.id,
                       process_id = %position.process_id, cause = %cause);
            }
            Err(e) => {
                event!(Level::ERROR, event = position_workflow::WITHDRAW_FAILED, position_id = %position.id,
                       process_id = %position.process_id, cause = %cause, error = %e);
            }
        }
    }

    /// Record the body's reply. An external actor may only answer for its own body.
    pub async fn registrar(
        &self,
        actor_id: &str,
        position_id: &str,
        reply: PositionReply
    ) -> Result<Position, WorkflowError> {
        let roles = self.ctx.authorize(actor_id, Operation::RegisterPosition).await?;

        let reply = &reply;
        let roles = &roles;
        let position = self
            .settle(position_id, move |position: &mut Position, now: DateTime<Utc>| {
                if external_only(roles) && position.issuing_body != actor_id {
                    return Err(WorkflowError::Unauthorized(format!(
                        "actor '{}' cannot answer for external body '{}'",
                        actor_id, position.issuing_body
                    )));
                }
                position.register(reply.clone(), now)
            })
            .await?;

        event!(Level::INFO, event = position_workflow::POSITION_REGISTERED, position_id = %position_id,
               actor_id = %actor_id, met_deadline = ?position.met_deadline);
        self.notify(NotificationKind::PositionRegistered, &position, &position.requesting_party);
        Ok(position)
    }

    pub async fn cancelar(&self, actor_id: &str, position_id: &str) -> Result<Position, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::CancelPosition).await?;
        let position = self.settle(position_id, |position: &mut Position, now| position.cancel(now)).await?;

        event!(Level::INFO, event = position_workflow::POSITION_CANCELLED, position_id = %position_id,
               actor_id = %actor_id);
        self.notify(NotificationKind::PositionCancelled, &position, &position.issuing_body);
        Ok(position)
    }

    pub async fn get(&self, position_id: &str) -> Result<Position, WorkflowError> {
        self.ctx
            .store
            .get_position(position_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(position::ENTITY, position_id))
    }

    pub async fn por_processo(&self, process_id: &str) -> Result<Vec<Position>, WorkflowError> {
        self.select(|p| p.process_id == process_id).await
    }

    /// Look a position up by its `POSIC-YEAR/SEQ` number
    pub async fn por_numero(&self, number: &str) -> Result<Position, WorkflowError> {
        self.ctx
            .store
            .list_positions()
            .await?
            .into_iter()
            .find(|p| p.number == number)
            .ok_or_else(|| WorkflowError::not_found(position::ENTITY, number))
    }

    /// Solicitations the body has not answered yet
    pub async fn pendentes_do_orgao(&self, body_id: &str) -> Result<Vec<Position>, WorkflowError> {
        self.select(|p| p.issuing_body == body_id && p.status == PositionStatus::Solicitado).await
    }

    pub async fn vencidos(&self, now: DateTime<Utc>) -> Result<Vec<Position>, WorkflowError> {
        self.select(|p| p.is_overdue(now)).await
    }

    async fn select<P>(&self, keep: P) -> Result<Vec<Position>, WorkflowError>
    where
        P: Fn(&Position) -> bool
    {
        let mut positions: Vec<Position> =
            self.ctx.store.list_positions().await?.into_iter().filter(|p| keep(p)).collect();
        positions.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then_with(|| a.number.cmp(&b.number)));
        Ok(positions)
    }

    /// Close a solicitation, release its counter slot and wake the waiting routing
    async fn settle<F>(&self, position_id: &str, apply: F) -> Result<Position, WorkflowError>
    where
        F: Fn(&mut Position, DateTime<Utc>) -> Result<(), WorkflowError> + Sync
    {
        let apply = &apply;
        let position = with_retry(self.ctx.retry_attempts, move || async move {
            let mut position = self.get(position_id).await?;
            apply(&mut position, Utc::now())?;
            self.ctx.store.update_position(&position).await
        })
        .await?;

        self.processes.adjust_pending_counters(&position.process_id, -1, CounterKind::Positions).await?;

        if let Some(tramitacao_id) = &position.tramitacao_id {
            resume_from_reply(&self.ctx, tramitacao_id, &position.id).await;
        }
        Ok(position)
    }

    fn notify(&self, kind: NotificationKind, position: &Position, recipient_id: &str) {
        self.ctx.notifier.notify(Notification {
            kind,
            process_id: position.process_id.clone(),
            entity_id: position.id.clone(),
            recipient_id: recipient_id.to_string(),
            due_at: position.deadline,
            urgent: false
        });
    }
}

fn external_only(roles: &RoleSet) -> bool {
    roles.contains(Role::Externo) && !roles.intersects(&[Role::Admin, Role::Gestor, Role::Analista])
}
