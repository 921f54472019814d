//! CLI command handlers

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use ractor::rpc::{CallResult, call};
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};

use super::ConfigCommands;
use crate::{
    AppContext,
    actor::{Guardian, GuardianMessage},
    adapter::StoreType,
    config::{self, Settings},
    domain::{constant::guardian, event::Escalation},
    service::deadline::SweepReport
};

/// One escalation as printed by `sweep`
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct EscalationRow {
    #[tabled(rename = "Kind")]
    pub kind:          String,
    #[tabled(rename = "Entity")]
    pub entity_id:     String,
    #[tabled(rename = "Process")]
    pub process_id:    String,
    #[tabled(rename = "Waiting On")]
    pub recipient_id:  String,
    #[tabled(rename = "Overdue Since")]
    pub overdue_since: String,
    #[tabled(rename = "Urgent")]
    pub urgent:        bool
}

impl From<&Escalation> for EscalationRow {
    fn from(escalation: &Escalation) -> Self {
        Self {
            kind:          escalation.entity_kind.to_string(),
            entity_id:     escalation.entity_id.clone(),
            process_id:    escalation.process_id.clone(),
            recipient_id:  escalation.recipient_id.clone(),
            overdue_since: escalation.overdue_since.to_rfc3339(),
            urgent:        escalation.urgent
        }
    }
}

/// Load the settings and apply command-line overrides
pub fn resolve_settings(explicit: Option<&Path>, store: Option<StoreType>) -> Result<Settings> {
    let mut settings = config::load_settings(explicit)?;
    if let Some(store) = store {
        settings.storage.backend = store;
    }
    Ok(settings)
}

/// Run the actor system until Ctrl-C, then shut it down
pub async fn handle_serve_command(explicit: Option<&Path>, store: Option<StoreType>) -> Result<()> {
    let settings = resolve_settings(explicit, store)?;
    let context = Arc::new(AppContext::init(settings).context("Failed to build application context")?);
    let guardian_ref = Guardian::spawn_system(context).await.context("Failed to start actor system")?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || signal.cancel()).context("Failed to install Ctrl-C handler")?;

    shutdown.cancelled().await;

    if let Err(e) = guardian_ref.cast(GuardianMessage::Shutdown) {
        event!(Level::ERROR, event = guardian::SYSTEM_SHUTDOWN_STARTED, error = ?e);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    guardian_ref.stop(None);

    Ok(())
}

/// Run one sweep through the actor system and print what is overdue
pub async fn handle_sweep_command(
    explicit: Option<&Path>,
    store: Option<StoreType>,
    at: Option<DateTime<Utc>>,
    json: bool
) -> Result<()> {
    let settings = resolve_settings(explicit, store)?;
    let context = AppContext::init(settings).context("Failed to build application context")?;

    let report = match at {
        Some(at) => context.services.deadlines.sweep_at(at).await?,
        None => sweep_via_guardian(Arc::new(context)).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize sweep report")?);
    } else {
        print_report(&report);
    }

    Ok(())
}

async fn sweep_via_guardian(context: Arc<AppContext>) -> Result<SweepReport> {
    let guardian_ref = Guardian::spawn_system(context).await.context("Failed to start actor system")?;

    let result = match call(&guardian_ref, |reply| GuardianMessage::SweepNow { reply }, Some(Duration::from_secs(30)))
        .await
    {
        Ok(CallResult::Success(result)) => result.map_err(anyhow::Error::from),
        Ok(CallResult::Timeout) => Err(anyhow!("Sweep timed out")),
        Ok(_) => Err(anyhow!("Failed to send sweep request to actor system")),
        Err(e) => Err(anyhow!("Failed to submit sweep request: {:?}", e))
    };

    if let Err(e) = guardian_ref.cast(GuardianMessage::Shutdown) {
        event!(Level::ERROR, event = guardian::SYSTEM_SHUTDOWN_STARTED, error = ?e);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    guardian_ref.stop(None);

    result
}

fn print_report(report: &SweepReport) {
    if report.is_empty() {
        println!("No overdue work as of {}", report.started_at.to_rfc3339());
        return;
    }

    let rows: Vec<EscalationRow> = report.escalations.iter().map(EscalationRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());

    println!("{} overdue item(s) as of {}", report.len(), report.started_at.to_rfc3339());
    println!("{}", table);
}

/// Handle configuration commands
pub fn handle_config_command(command: &ConfigCommands, explicit: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let settings = config::load_settings(explicit)?;
            print!("{}", serde_yaml::to_string(&settings).context("Failed to serialize settings")?);
        }
        ConfigCommands::Init => {
            let path = config::init_settings(explicit)?;
            println!("Configuration file: {}", path.display());
        }
        ConfigCommands::Path => {
            println!("{}", config::get_config_file_path(explicit)?.display());
        }
    }

    Ok(())
}
