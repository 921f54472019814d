//! Workflow services: the operations exposed to the boundary layer
//!
//! Every transition follows the same shape: check the actor's role, load the
//! entity, validate and mutate it in memory, then persist with an optimistic
//! version check. Pending counters on a process only move through the
//! store's atomic `adjust_counter`.

pub mod deadline;
pub mod notifier;
pub mod opinion;
pub mod position;
pub mod process;
pub mod retry;
pub mod routing;

#[cfg(test)]
mod scenario_tests;

use std::{sync::Arc, time::Duration};

use tracing::{Level, event};

use crate::{
    domain::{
        auth::{Operation, RoleSet, require_role},
        constant::auth,
        error::WorkflowError
    },
    port::{directory::Directory, notify::NotificationDispatcher, store::WorkflowStore},
    service::{
        deadline::DeadlineScanner, notifier::Notifier, opinion::OpinionWorkflow, position::PositionWorkflow,
        process::ProcessManager, routing::RoutingEngine
    }
};

/// Tunables shared by every service
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    pub notification_timeout: Duration,
    pub retry_attempts:       u32
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self { notification_timeout: Duration::from_millis(2_000), retry_attempts: 3 }
    }
}

/// Collaborators every service talks to
#[derive(Clone)]
pub struct ServiceContext {
    pub store:          Arc<dyn WorkflowStore>,
    pub directory:      Arc<dyn Directory>,
    pub notifier:       Notifier,
    pub retry_attempts: u32
}

impl ServiceContext {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        directory: Arc<dyn Directory>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        options: ServiceOptions
    ) -> Self {
        Self {
            store,
            directory,
            notifier: Notifier::new(dispatcher, options.notification_timeout),
            retry_attempts: options.retry_attempts
        }
    }

    /// Resolve the actor's roles and check them against the operation
    pub async fn authorize(&self, actor_id: &str, operation: Operation) -> Result<RoleSet, WorkflowError> {
        let roles = self.directory.resolve_actor_roles(actor_id).await?;

        if let Err(err) = require_role(actor_id, &roles, operation.required_roles()) {
            event!(Level::WARN, event = auth::ACCESS_DENIED, actor_id = %actor_id, operation = operation.name());
            return Err(err);
        }

        Ok(roles)
    }
}

/// The full operation set, wired together
#[derive(Clone)]
pub struct WorkflowServices {
    pub processes: Arc<ProcessManager>,
    pub routing:   Arc<RoutingEngine>,
    pub opinions:  Arc<OpinionWorkflow>,
    pub positions: Arc<PositionWorkflow>,
    pub deadlines: Arc<DeadlineScanner>
}

impl WorkflowServices {
    pub fn new(ctx: ServiceContext) -> Self {
        let processes = Arc::new(ProcessManager::new(ctx.clone()));
        let opinions = Arc::new(OpinionWorkflow::new(ctx.clone(), processes.clone()));
        let positions = Arc::new(PositionWorkflow::new(ctx.clone(), processes.clone()));
        let routing = Arc::new(RoutingEngine::new(ctx.clone(), processes.clone(), opinions.clone(), positions.clone()));
        let deadlines = Arc::new(DeadlineScanner::new(ctx));

        Self { processes, routing, opinions, positions, deadlines }
    }
}
