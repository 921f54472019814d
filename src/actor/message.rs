//! Typed messages for actor communication

use ractor::{Message, RpcReplyPort};

use crate::{domain::error::WorkflowError, service::deadline::SweepReport};

/// Messages for the Guardian actor (root of actor system)
#[derive(Debug)]
pub enum GuardianMessage {
    /// Initialize the actor system
    Initialize,
    /// Run a deadline sweep right away instead of waiting for the next tick
    SweepNow { reply: RpcReplyPort<Result<SweepReport, WorkflowError>> },
    /// Shutdown the entire system
    Shutdown,
    /// System health check
    HealthCheck { reply: RpcReplyPort<SystemHealth> }
}

/// Messages for the DeadlineMonitor actor
#[derive(Debug)]
pub enum MonitorMessage {
    /// Scheduled sweep; re-arms the timer once done
    Tick,
    /// Out-of-band sweep requested through the guardian
    SweepNow { reply: RpcReplyPort<Result<SweepReport, WorkflowError>> },
    /// Counters for health reporting
    GetStats { reply: RpcReplyPort<MonitorStats> }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub sweeps_completed: u64,
    pub sweeps_failed:    u64,
    pub last_escalations: usize
}

/// System health information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemHealth {
    pub monitor_alive:  bool,
    pub monitor:        MonitorStats,
    pub uptime_seconds: u64
}

// Implement Message trait for Ractor
impl Message for GuardianMessage {}
impl Message for MonitorMessage {}
