//! Domain Events - Structured events for internal monitoring and debugging

/// Guardian Actor Events
pub mod guardian {
    pub const GUARDIAN_STARTED: &str = "guardian.started";
    pub const CHILDREN_SPAWNING: &str = "children.spawning";
    pub const CHILDREN_SPAWNED: &str = "children.spawned";
    pub const CHILDREN_SPAWN_FAILED: &str = "children.spawn_failed";
    pub const CHILD_TERMINATED: &str = "children.terminated";
    pub const SYSTEM_INITIALIZED: &str = "system.initialized";
    pub const SYSTEM_SHUTDOWN_STARTED: &str = "system.shutdown_started";
    pub const SYSTEM_SHUTDOWN_COMPLETED: &str = "system.shutdown_completed";
    pub const HEALTH_CHECK_COMPLETED: &str = "health.check_completed";
    pub const SWEEP_FORWARDED: &str = "sweep.forwarded";
}

/// DeadlineMonitor Actor Events
pub mod deadline_monitor {
    pub const MONITOR_STARTED: &str = "monitor.started";
    pub const MONITOR_STOPPED: &str = "monitor.stopped";
    pub const SWEEP_STARTED: &str = "sweep.started";
    pub const SWEEP_COMPLETED: &str = "sweep.completed";
    pub const SWEEP_FAILED: &str = "sweep.failed";
    pub const SWEEP_SCHEDULED: &str = "sweep.scheduled";
    pub const ESCALATION_RAISED: &str = "escalation.raised";
}

/// ProcessManager Events
pub mod process_manager {
    pub const PROCESS_CREATED: &str = "process.created";
    pub const ITEM_LINKED: &str = "process.item_linked";
    pub const ITEM_UNLINKED: &str = "process.item_unlinked";
    pub const STATUS_CHANGED: &str = "process.status_changed";
    pub const COUNTER_ADJUSTED: &str = "process.counter_adjusted";
    pub const FINAL_POSITION_SET: &str = "process.final_position_set";
    pub const FINALIZE_REJECTED: &str = "process.finalize_rejected";
}

/// RoutingEngine Events
pub mod routing {
    pub const TRAMITACAO_SENT: &str = "tramitacao.sent";
    pub const TRAMITACAO_RECEIVED: &str = "tramitacao.received";
    pub const ANALYSIS_STARTED: &str = "tramitacao.analysis_started";
    pub const REPLY_REQUESTED: &str = "tramitacao.reply_requested";
    pub const REPLY_ARRIVED: &str = "tramitacao.reply_arrived";
    pub const REPLY_RESUME_FAILED: &str = "tramitacao.reply_resume_failed";
    pub const REPLY_SENT: &str = "tramitacao.reply_sent";
    pub const TRAMITACAO_SUSPENDED: &str = "tramitacao.suspended";
    pub const TRAMITACAO_RESUMED: &str = "tramitacao.resumed";
    pub const TRAMITACAO_CONCLUDED: &str = "tramitacao.concluded";
    pub const TRAMITACAO_ARCHIVED: &str = "tramitacao.archived";
    pub const COMPENSATION_APPLIED: &str = "tramitacao.compensation_applied";
    pub const COMPENSATION_FAILED: &str = "tramitacao.compensation_failed";
}

/// OpinionWorkflow Events
pub mod opinion_workflow {
    pub const OPINION_REQUESTED: &str = "opinion.requested";
    pub const OPINION_ISSUED: &str = "opinion.issued";
    pub const OPINION_APPROVED: &str = "opinion.approved";
    pub const OPINION_REJECTED: &str = "opinion.rejected";
    pub const OPINION_WITHDRAWN: &str = "opinion.withdrawn";
    pub const WITHDRAW_FAILED: &str = "opinion.withdraw_failed";
}

/// PositionWorkflow Events
pub mod position_workflow {
    pub const POSITION_REQUESTED: &str = "position.requested";
    pub const POSITION_REGISTERED: &str = "position.registered";
    pub const POSITION_CANCELLED: &str = "position.cancelled";
    pub const POSITION_WITHDRAWN: &str = "position.withdrawn";
    pub const WITHDRAW_FAILED: &str = "position.withdraw_failed";
}

/// Notifier Events
pub mod notifier {
    pub const NOTIFICATION_SENT: &str = "notification.sent";
    pub const NOTIFICATION_FAILED: &str = "notification.failed";
    pub const NOTIFICATION_TIMED_OUT: &str = "notification.timed_out";
}

/// Store Events
pub mod store {
    pub const STORE_OPENED: &str = "store.opened";
    pub const WRITE_CONFLICT: &str = "store.write_conflict";
    pub const RETRY_SCHEDULED: &str = "store.retry_scheduled";
}

/// Authorization Events
pub mod auth {
    pub const ACCESS_DENIED: &str = "auth.access_denied";
}
