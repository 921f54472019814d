//! Process Manager: lifecycle, linked items, pending counters and final position

use chrono::{Datelike, Utc};
use tracing::{Level, event};
use uuid::Uuid;

use crate::{
    domain::{
        auth::{ELEVATED_ROLES, Operation, require_role},
        constant::process_manager,
        error::WorkflowError,
        event::{Notification, NotificationKind},
        process::{
            self, CounterKind, NewProcess, Process, ProcessFilter, ProcessStatus, format_process_number, listing_order
        }
    },
    service::{ServiceContext, retry::with_retry}
};

pub struct ProcessManager {
    ctx: ServiceContext
}

impl ProcessManager {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Open a process in CRIADO with a freshly allocated `YEAR/SEQ` number
    pub async fn create(&self, actor_id: &str, input: NewProcess) -> Result<Process, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::CreateProcess).await?;

        if input.item_ids.is_empty() {
            return Err(WorkflowError::InvariantViolation("a process must link at least one legislative item".into()));
        }

        if !self.ctx.directory.sector_exists(&input.sector_id).await? {
            return Err(WorkflowError::not_found("sector", &input.sector_id));
        }

        for item_id in &input.item_ids {
            self.require_item(item_id).await?;
        }

        let now = Utc::now();
        let sequence = self.ctx.store.next_sequence(&format!("process:{}", now.year())).await?;
        let process =
            Process::open(Uuid::new_v4().to_string(), format_process_number(now.year(), sequence), input, now)?;
        self.ctx.store.insert_process(&process).await?;

        event!(Level::INFO, event = process_manager::PROCESS_CREATED, process_id = %process.id,
               number = %process.number, priority = %process.priority, actor_id = %actor_id);
        Ok(process)
    }

    pub async fn get(&self, process_id: &str) -> Result<Process, WorkflowError> {
        self.ctx
            .store
            .get_process(process_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(process::ENTITY, process_id))
    }

    /// Look a process up by its `YEAR/SEQ` number
    pub async fn por_numero(&self, number: &str) -> Result<Process, WorkflowError> {
        self.ctx
            .store
            .list_processes()
            .await?
            .into_iter()
            .find(|p| p.number == number)
            .ok_or_else(|| WorkflowError::not_found(process::ENTITY, number))
    }

    /// Processes matching `filter`, highest priority first
    pub async fn list(&self, filter: &ProcessFilter) -> Result<Vec<Process>, WorkflowError> {
        let mut processes: Vec<Process> =
            self.ctx.store.list_processes().await?.into_iter().filter(|p| filter.matches(p)).collect();
        processes.sort_by(listing_order);
        Ok(processes)
    }

    pub async fn link(&self, actor_id: &str, process_id: &str, item_id: &str) -> Result<Process, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::LinkItem).await?;
        self.require_item(item_id).await?;

        let process = with_retry(self.ctx.retry_attempts, move || async move {
            let mut process = self.get(process_id).await?;
            process.link_item(item_id, Utc::now())?;
            self.ctx.store.update_process(&process).await
        })
        .await?;

        event!(Level::INFO, event = process_manager::ITEM_LINKED, process_id = %process_id, item_id = %item_id);
        Ok(process)
    }

    pub async fn unlink(&self, actor_id: &str, process_id: &str, item_id: &str) -> Result<Process, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::UnlinkItem).await?;
        self.require_item(item_id).await?;

        let process = with_retry(self.ctx.retry_attempts, move || async move {
            let mut process = self.get(process_id).await?;
            process.unlink_item(item_id, Utc::now())?;
            self.ctx.store.update_process(&process).await
        })
        .await?;

        event!(Level::INFO, event = process_manager::ITEM_UNLINKED, process_id = %process_id, item_id = %item_id);
        Ok(process)
    }

    /// Move the process along its status graph, appending `note` to the observation log
    pub async fn update_status(
        &self,
        actor_id: &str,
        process_id: &str,
        target: ProcessStatus,
        note: Option<&str>
    ) -> Result<Process, WorkflowError> {
        let roles = self.ctx.authorize(actor_id, Operation::UpdateProcessStatus).await?;
        if target.requires_elevated_role() {
            require_role(actor_id, &roles, ELEVATED_ROLES)?;
        }

        let (previous, process) = with_retry(self.ctx.retry_attempts, move || async move {
            let mut process = self.get(process_id).await?;
            let previous = process.status;
            process.transition(target, actor_id, note, Utc::now())?;
            Ok((previous, self.ctx.store.update_process(&process).await?))
        })
        .await?;

        event!(Level::INFO, event = process_manager::STATUS_CHANGED, process_id = %process_id,
               from = %previous, to = %process.status, actor_id = %actor_id);

        if process.status == ProcessStatus::Finalizado {
            self.notify_finalized(&process);
        }
        Ok(process)
    }

    /// Atomic counter adjustment. Only the opinion and position workflows call this.
    pub(crate) async fn adjust_pending_counters(
        &self,
        process_id: &str,
        delta: i64,
        kind: CounterKind
    ) -> Result<Process, WorkflowError> {
        let process = self.ctx.store.adjust_counter(process_id, kind, delta).await?;

        event!(Level::DEBUG, event = process_manager::COUNTER_ADJUSTED, process_id = %process_id,
               counter = kind.as_str(), delta = delta, value = process.pending(kind));
        Ok(process)
    }

    /// Record the institutional stance and close the process
    pub async fn set_final_position(
        &self,
        actor_id: &str,
        process_id: &str,
        text: &str,
        justification: &str
    ) -> Result<Process, WorkflowError> {
        self.ctx.authorize(actor_id, Operation::SetFinalPosition).await?;

        let result = with_retry(self.ctx.retry_attempts, move || async move {
            let mut process = self.get(process_id).await?;
            process.finalize(text, justification, Utc::now())?;
            self.ctx.store.update_process(&process).await
        })
        .await;

        let process = match result {
            Ok(process) => process,
            Err(err) => {
                if matches!(err, WorkflowError::PreconditionFailed(_)) {
                    event!(Level::INFO, event = process_manager::FINALIZE_REJECTED, process_id = %process_id,
                           reason = %err);
                }
                return Err(err);
            }
        };

        event!(Level::INFO, event = process_manager::FINAL_POSITION_SET, process_id = %process_id,
               number = %process.number, actor_id = %actor_id);
        self.notify_finalized(&process);
        Ok(process)
    }

    /// Load a process that can still receive routings and solicitations
    pub(crate) async fn require_open(&self, process_id: &str) -> Result<Process, WorkflowError> {
        let process = self.get(process_id).await?;
        if process.status.is_terminal() {
            return Err(WorkflowError::invalid_transition(process::ENTITY, process.status, "new activity"));
        }
        Ok(process)
    }

    async fn require_item(&self, item_id: &str) -> Result<(), WorkflowError> {
        if !self.ctx.directory.legislative_item_exists(item_id).await? {
            return Err(WorkflowError::not_found("legislative_item", item_id));
        }
        Ok(())
    }

    fn notify_finalized(&self, process: &Process) {
        self.ctx.notifier.notify(Notification {
            kind:         NotificationKind::ProcessFinalized,
            process_id:   process.id.clone(),
            entity_id:    process.id.clone(),
            recipient_id: process.sector_id.clone(),
            due_at:       None,
            urgent:       process.priority.is_urgent()
        });
    }
}
