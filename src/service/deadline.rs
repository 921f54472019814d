//! Deadline scanner: finds overdue work and raises escalations
//!
//! A scan only reads. Running it twice over unchanged data yields the same
//! escalations; de-duplicating repeated signals is left to the dispatcher.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{Level, event};

use crate::{
    domain::{
        constant::deadline_monitor,
        error::WorkflowError,
        event::{EntityKind, Escalation, escalation_order},
        process::Priority
    },
    service::ServiceContext
};

/// Outcome of one sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub started_at:  DateTime<Utc>,
    pub escalations: Vec<Escalation>
}

impl SweepReport {
    pub fn len(&self) -> usize {
        self.escalations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.escalations.is_empty()
    }
}

pub struct DeadlineScanner {
    ctx: ServiceContext
}

impl DeadlineScanner {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Every item whose deadline passed before `now` and is still waiting on someone.
    ///
    /// Ordered by deadline ascending, urgent first on ties. Any store failure
    /// aborts the whole scan.
    pub async fn scan(&self, now: DateTime<Utc>) -> Result<Vec<Escalation>, WorkflowError> {
        let priorities: HashMap<String, Priority> =
            self.ctx.store.list_processes().await?.into_iter().map(|p| (p.id, p.priority)).collect();
        let urgent_process = |process_id: &str| priorities.get(process_id).is_some_and(Priority::is_urgent);

        let mut escalations = Vec::new();

        for t in self.ctx.store.list_tramitacoes().await? {
            let Some(deadline) = t.deadline.filter(|_| t.is_overdue(now)) else { continue };
            escalations.push(Escalation {
                entity_kind:   EntityKind::Tramitacao,
                urgent:        t.urgent || urgent_process(&t.process_id),
                entity_id:     t.id,
                process_id:    t.process_id,
                recipient_id:  t.recipient_id,
                overdue_since: deadline
            });
        }

        for o in self.ctx.store.list_opinions().await? {
            let Some(deadline) = o.deadline.filter(|_| o.is_overdue(now)) else { continue };
            escalations.push(Escalation {
                entity_kind:   EntityKind::Opinion,
                urgent:        urgent_process(&o.process_id),
                entity_id:     o.id,
                process_id:    o.process_id,
                recipient_id:  o.issuing_sector,
                overdue_since: deadline
            });
        }

        for p in self.ctx.store.list_positions().await? {
            let Some(deadline) = p.deadline.filter(|_| p.is_overdue(now)) else { continue };
            escalations.push(Escalation {
                entity_kind:   EntityKind::Position,
                urgent:        urgent_process(&p.process_id),
                entity_id:     p.id,
                process_id:    p.process_id,
                recipient_id:  p.issuing_body,
                overdue_since: deadline
            });
        }

        escalations.sort_by(escalation_order);
        Ok(escalations)
    }

    /// Scan as of `now` and hand every escalation to the notifier
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, WorkflowError> {
        let escalations = self.scan(now).await?;

        for escalation in &escalations {
            event!(Level::WARN, event = deadline_monitor::ESCALATION_RAISED, entity_kind = %escalation.entity_kind,
                   entity_id = %escalation.entity_id, process_id = %escalation.process_id,
                   overdue_since = %escalation.overdue_since, urgent = escalation.urgent);
            self.ctx.notifier.notify(escalation.to_notification());
        }

        Ok(SweepReport { started_at: now, escalations })
    }

    pub async fn sweep(&self) -> Result<SweepReport, WorkflowError> {
        self.sweep_at(Utc::now()).await
    }
}
