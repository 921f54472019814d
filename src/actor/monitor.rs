//! DeadlineMonitor Actor - periodic deadline sweeps
//!
//! Runs one sweep per tick and schedules the next tick only after the current
//! sweep finished, so sweeps never overlap. A failed sweep is logged and the
//! schedule continues.

use std::{sync::Arc, time::Duration};

use ractor::{Actor, ActorProcessingErr, ActorRef, MessagingErr, RpcReplyPort, concurrency::JoinHandle};
use tracing::{Level, event};

use crate::{
    actor::message::{MonitorMessage, MonitorStats},
    domain::{constant::deadline_monitor, error::WorkflowError},
    service::deadline::{DeadlineScanner, SweepReport}
};

pub struct MonitorState {
    scanner:  Arc<DeadlineScanner>,
    interval: Duration,
    stats:    MonitorStats,
    next:     Option<JoinHandle<Result<(), MessagingErr<MonitorMessage>>>>
}

pub struct DeadlineMonitor;

#[async_trait::async_trait]
impl Actor for DeadlineMonitor {
    type Arguments = (Arc<DeadlineScanner>, Duration);
    type Msg = MonitorMessage;
    type State = MonitorState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        (scanner, interval): Self::Arguments
    ) -> Result<Self::State, ActorProcessingErr> {
        event!(Level::DEBUG, event = deadline_monitor::MONITOR_STARTED, interval_secs = interval.as_secs());

        Ok(MonitorState { scanner, interval, stats: MonitorStats::default(), next: None })
    }

    async fn post_start(&self, myself: ActorRef<Self::Msg>, state: &mut Self::State) -> Result<(), ActorProcessingErr> {
        self.schedule(myself, state);
        Ok(())
    }

    async fn post_stop(&self, _myself: ActorRef<Self::Msg>, state: &mut Self::State) -> Result<(), ActorProcessingErr> {
        if let Some(next) = state.next.take() {
            next.abort();
        }
        event!(Level::DEBUG, event = deadline_monitor::MONITOR_STOPPED,
               sweeps_completed = state.stats.sweeps_completed);
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        match message {
            MonitorMessage::Tick => {
                let _ = self.run_sweep(state).await;
                self.schedule(myself, state);
            }
            MonitorMessage::SweepNow { reply } => {
                let result = self.run_sweep(state).await;
                self.reply(reply, result);
            }
            MonitorMessage::GetStats { reply } => {
                if let Err(e) = reply.send(state.stats) {
                    event!(Level::ERROR, event = deadline_monitor::SWEEP_FAILED, error = %e);
                }
            }
        }
        Ok(())
    }
}

impl DeadlineMonitor {
    async fn run_sweep(&self, state: &mut MonitorState) -> Result<SweepReport, WorkflowError> {
        event!(Level::DEBUG, event = deadline_monitor::SWEEP_STARTED);

        match state.scanner.sweep().await {
            Ok(report) => {
                state.stats.sweeps_completed += 1;
                state.stats.last_escalations = report.len();
                event!(Level::INFO, event = deadline_monitor::SWEEP_COMPLETED, escalations = report.len(),
                       started_at = %report.started_at);
                Ok(report)
            }
            Err(e) => {
                state.stats.sweeps_failed += 1;
                event!(Level::ERROR, event = deadline_monitor::SWEEP_FAILED, error = %e);
                Err(e)
            }
        }
    }

    fn schedule(&self, myself: ActorRef<MonitorMessage>, state: &mut MonitorState) {
        event!(Level::DEBUG, event = deadline_monitor::SWEEP_SCHEDULED, in_secs = state.interval.as_secs());
        state.next = Some(myself.send_after(state.interval, || MonitorMessage::Tick));
    }

    fn reply(
        &self,
        reply: RpcReplyPort<Result<SweepReport, WorkflowError>>,
        result: Result<SweepReport, WorkflowError>
    ) {
        if let Err(e) = reply.send(result) {
            event!(Level::ERROR, event = deadline_monitor::SWEEP_FAILED, error = %e);
        }
    }
}
