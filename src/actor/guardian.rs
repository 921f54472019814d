//! Guardian Actor - Root Supervisor
//!
//! The Guardian is the root of the actor hierarchy and manages system-wide concerns:
//! - Spawns and supervises the DeadlineMonitor
//! - Handles system initialization and shutdown
//! - Provides health checks and on-demand sweeps

use std::{sync::Arc, time::SystemTime};

use ractor::{
    Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SpawnErr, SupervisionEvent,
    rpc::{CallResult, call}
};
use tracing::{Level, event};

use crate::{
    AppContext,
    actor::{
        message::{GuardianMessage, MonitorMessage, SystemHealth},
        monitor::DeadlineMonitor
    },
    domain::{constant::guardian, error::WorkflowError},
    service::deadline::SweepReport
};

const MONITOR_NAME: &str = "deadline_monitor";

/// Guardian Actor State - tracks child actors and system metrics
pub struct GuardianState {
    context:        Arc<AppContext>,
    /// DeadlineMonitor actor reference
    monitor:        Option<ActorRef<MonitorMessage>>,
    /// System startup time for uptime calculation
    startup_time:   SystemTime,
    is_initialized: bool
}

/// Guardian Actor - Root supervisor of the actor system
pub struct Guardian;

#[async_trait::async_trait]
impl Actor for Guardian {
    type Arguments = Arc<AppContext>;
    type Msg = GuardianMessage;
    type State = GuardianState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        context: Self::Arguments
    ) -> Result<Self::State, ActorProcessingErr> {
        event!(Level::DEBUG, event = guardian::GUARDIAN_STARTED);

        Ok(GuardianState { context, monitor: None, startup_time: SystemTime::now(), is_initialized: false })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        match message {
            GuardianMessage::Initialize => self.handle_initialize(myself, state).await,
            GuardianMessage::Shutdown => self.handle_shutdown(state).await,
            GuardianMessage::HealthCheck { reply } => self.handle_health_check(reply, state).await,
            GuardianMessage::SweepNow { reply } => self.handle_sweep_now(reply, state).await
        }
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(cell, error) => {
                event!(Level::ERROR, event = guardian::CHILD_TERMINATED, actor = ?cell.get_name(), error = %error);
                state.monitor = None;
                if state.is_initialized {
                    self.spawn_monitor(myself, state).await?;
                }
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                event!(Level::DEBUG, event = guardian::CHILD_TERMINATED, actor = ?cell.get_name(), reason = ?reason);
                state.monitor = None;
            }
            _ => {}
        }
        Ok(())
    }
}

impl Guardian {
    /// Spawn the complete actor system
    pub async fn spawn_system(context: Arc<AppContext>) -> Result<ActorRef<GuardianMessage>, SpawnErr> {
        let (guardian_ref, _handle) = Actor::spawn(Some("guardian".to_string()), Guardian, context).await?;

        if let Err(e) = guardian_ref.cast(GuardianMessage::Initialize) {
            event!(Level::ERROR, event = guardian::GUARDIAN_STARTED, error = ?e);
        }

        Ok(guardian_ref)
    }

    async fn handle_initialize(
        &self,
        myself: ActorRef<GuardianMessage>,
        state: &mut GuardianState
    ) -> Result<(), ActorProcessingErr> {
        if state.is_initialized {
            return Ok(());
        }

        self.spawn_monitor(myself, state).await?;
        state.is_initialized = true;

        event!(Level::INFO, event = guardian::SYSTEM_INITIALIZED,
               backend = state.context.settings.storage.backend.as_str(),
               interval_secs = state.context.settings.monitor.interval_secs);
        Ok(())
    }

    async fn spawn_monitor(
        &self,
        myself: ActorRef<GuardianMessage>,
        state: &mut GuardianState
    ) -> Result<(), ActorProcessingErr> {
        event!(Level::DEBUG, event = guardian::CHILDREN_SPAWNING, actor = MONITOR_NAME);

        let args = (state.context.services.deadlines.clone(), state.context.settings.monitor_interval());
        match Actor::spawn_linked(Some(MONITOR_NAME.to_string()), DeadlineMonitor, args, myself.get_cell()).await {
            Ok((monitor_ref, _handle)) => {
                state.monitor = Some(monitor_ref);
                event!(Level::DEBUG, event = guardian::CHILDREN_SPAWNED, actor = MONITOR_NAME);
                Ok(())
            }
            Err(e) => {
                event!(Level::ERROR, event = guardian::CHILDREN_SPAWN_FAILED, actor = MONITOR_NAME, error = %e);
                Err(ActorProcessingErr::from(format!("Failed to spawn {}: {}", MONITOR_NAME, e)))
            }
        }
    }

    /// Shutdown child actors gracefully
    async fn handle_shutdown(&self, state: &mut GuardianState) -> Result<(), ActorProcessingErr> {
        event!(Level::DEBUG, event = guardian::SYSTEM_SHUTDOWN_STARTED);

        state.is_initialized = false;
        if let Some(monitor) = state.monitor.take() {
            monitor.stop(None);
        }

        event!(Level::INFO, event = guardian::SYSTEM_SHUTDOWN_COMPLETED);
        Ok(())
    }

    async fn handle_health_check(
        &self,
        reply: RpcReplyPort<SystemHealth>,
        state: &GuardianState
    ) -> Result<(), ActorProcessingErr> {
        let uptime_seconds = state.startup_time.elapsed().unwrap_or_default().as_secs();

        let stats = match &state.monitor {
            Some(monitor) => match call(monitor, |reply| MonitorMessage::GetStats { reply }, None).await {
                Ok(CallResult::Success(stats)) => Some(stats),
                _ => None
            },
            None => None
        };

        let health = SystemHealth {
            monitor_alive:  stats.is_some(),
            monitor:        stats.unwrap_or_default(),
            uptime_seconds
        };

        event!(Level::DEBUG, event = guardian::HEALTH_CHECK_COMPLETED,
               monitor_alive = health.monitor_alive, uptime_seconds = %uptime_seconds);

        if let Err(e) = reply.send(health) {
            event!(Level::ERROR, event = guardian::HEALTH_CHECK_COMPLETED, error = %e);
        }

        Ok(())
    }

    async fn handle_sweep_now(
        &self,
        reply: RpcReplyPort<Result<SweepReport, WorkflowError>>,
        state: &GuardianState
    ) -> Result<(), ActorProcessingErr> {
        event!(Level::DEBUG, event = guardian::SWEEP_FORWARDED);

        let result = match &state.monitor {
            Some(monitor) => match call(monitor, |reply| MonitorMessage::SweepNow { reply }, None).await {
                Ok(CallResult::Success(result)) => result,
                Ok(_) => Err(WorkflowError::Generic("Deadline monitor did not answer".to_string())),
                Err(e) => Err(WorkflowError::Generic(format!("Failed to reach deadline monitor: {}", e)))
            },
            None => Err(WorkflowError::Generic("Actor system is not initialized".to_string()))
        };

        if let Err(e) = reply.send(result) {
            event!(Level::ERROR, event = guardian::SWEEP_FORWARDED, error = %e);
        }

        Ok(())
    }
}
