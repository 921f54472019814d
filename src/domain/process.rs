//! Process aggregate: status graph, linked items and pending counters

use std::{cmp::Ordering, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::WorkflowError;

pub const ENTITY: &str = "process";

/// Process lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    Criado,
    EmAnaliseInterna,
    AguardandoParecerSetor,
    PareceresInternosRecebidos,
    ConsolidacaoInterna,
    AguardandoPosicionamentoExterno,
    PosicionamentosExternosRecebidos,
    EmAnaliseFinal,
    AguardandoDecisao,
    Finalizado,
    Arquivado,
    Suspenso
}

/// The main chain, in order. Any later entry is reachable from an earlier one.
pub const MAIN_CHAIN: [ProcessStatus; 10] = [
    ProcessStatus::Criado,
    ProcessStatus::EmAnaliseInterna,
    ProcessStatus::AguardandoParecerSetor,
    ProcessStatus::PareceresInternosRecebidos,
    ProcessStatus::ConsolidacaoInterna,
    ProcessStatus::AguardandoPosicionamentoExterno,
    ProcessStatus::PosicionamentosExternosRecebidos,
    ProcessStatus::EmAnaliseFinal,
    ProcessStatus::AguardandoDecisao,
    ProcessStatus::Finalizado
];

pub const ALL_STATUSES: [ProcessStatus; 12] = [
    ProcessStatus::Criado,
    ProcessStatus::EmAnaliseInterna,
    ProcessStatus::AguardandoParecerSetor,
    ProcessStatus::PareceresInternosRecebidos,
    ProcessStatus::ConsolidacaoInterna,
    ProcessStatus::AguardandoPosicionamentoExterno,
    ProcessStatus::PosicionamentosExternosRecebidos,
    ProcessStatus::EmAnaliseFinal,
    ProcessStatus::AguardandoDecisao,
    ProcessStatus::Finalizado,
    ProcessStatus::Arquivado,
    ProcessStatus::Suspenso
];

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Criado => "CRIADO",
            ProcessStatus::EmAnaliseInterna => "EM_ANALISE_INTERNA",
            ProcessStatus::AguardandoParecerSetor => "AGUARDANDO_PARECER_SETOR",
            ProcessStatus::PareceresInternosRecebidos => "PARECERES_INTERNOS_RECEBIDOS",
            ProcessStatus::ConsolidacaoInterna => "CONSOLIDACAO_INTERNA",
            ProcessStatus::AguardandoPosicionamentoExterno => "AGUARDANDO_POSICIONAMENTO_EXTERNO",
            ProcessStatus::PosicionamentosExternosRecebidos => "POSICIONAMENTOS_EXTERNOS_RECEBIDOS",
            ProcessStatus::EmAnaliseFinal => "EM_ANALISE_FINAL",
            ProcessStatus::AguardandoDecisao => "AGUARDANDO_DECISAO",
            ProcessStatus::Finalizado => "FINALIZADO",
            ProcessStatus::Arquivado => "ARQUIVADO",
            ProcessStatus::Suspenso => "SUSPENSO"
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessStatus::Finalizado | ProcessStatus::Arquivado)
    }

    /// Targets that only management may request
    pub fn requires_elevated_role(&self) -> bool {
        matches!(self, ProcessStatus::AguardandoDecisao | ProcessStatus::Finalizado | ProcessStatus::Arquivado)
    }

    fn chain_position(&self) -> Option<usize> {
        MAIN_CHAIN.iter().position(|status| status == self)
    }

    /// Whether `target` is reachable in one move.
    ///
    /// `suspended_from` is the status held before entering SUSPENSO and is only
    /// consulted when `self` is SUSPENSO.
    pub fn can_reach(&self, target: ProcessStatus, suspended_from: Option<ProcessStatus>) -> bool {
        if *self == target || self.is_terminal() {
            return false;
        }

        match (self, target) {
            (_, ProcessStatus::Arquivado) | (_, ProcessStatus::Suspenso) => true,
            (ProcessStatus::Suspenso, _) => {
                let previous = suspended_from.unwrap_or(ProcessStatus::Criado);
                target == previous || previous.can_reach(target, None)
            }
            _ => match (self.chain_position(), target.chain_position()) {
                (Some(from), Some(to)) => to > from,
                _ => false
            }
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process priority, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Baixa,
    Normal,
    Alta,
    Urgente,
    Urgentissima
}

impl Priority {
    pub fn is_urgent(&self) -> bool {
        *self >= Priority::Urgente
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Baixa => "BAIXA",
            Priority::Normal => "NORMAL",
            Priority::Alta => "ALTA",
            Priority::Urgente => "URGENTE",
            Priority::Urgentissima => "URGENTISSIMA"
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pending counter an adjustment targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    Opinions,
    Positions
}

impl CounterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::Opinions => "pending_opinions",
            CounterKind::Positions => "pending_positions"
        }
    }
}

/// One entry of the observation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessNote {
    pub at:       DateTime<Utc>,
    pub actor_id: String,
    pub status:   ProcessStatus,
    pub text:     String
}

/// Input for opening a new process
#[derive(Debug, Clone)]
pub struct NewProcess {
    pub title:       String,
    pub description: Option<String>,
    pub theme:       String,
    pub priority:    Priority,
    pub item_ids:    Vec<String>,
    pub sector_id:   String,
    pub analyst_id:  Option<String>,
    pub deadline:    Option<DateTime<Utc>>
}

/// Internal case grouping legislative items for institutional review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    pub id:                  String,
    pub number:              String,
    pub title:               String,
    pub description:         Option<String>,
    pub theme:               String,
    pub priority:            Priority,
    pub status:              ProcessStatus,
    pub item_ids:            Vec<String>,
    pub sector_id:           String,
    pub analyst_id:          Option<String>,
    pub deadline:            Option<DateTime<Utc>>,
    pub pending_opinions:    u32,
    pub pending_positions:   u32,
    pub final_position:      Option<String>,
    pub final_justification: Option<String>,
    pub notes:               Vec<ProcessNote>,
    pub suspended_from:      Option<ProcessStatus>,
    pub created_at:          DateTime<Utc>,
    pub updated_at:          DateTime<Utc>,
    pub closed_at:           Option<DateTime<Utc>>,
    pub version:             u64
}

/// `YEAR/SEQ` with SEQ zero-padded to five digits
pub fn format_process_number(year: i32, sequence: u64) -> String {
    format!("{}/{:05}", year, sequence)
}

impl Process {
    /// Build a fresh process in CRIADO with both counters at zero
    pub fn open(id: String, number: String, input: NewProcess, now: DateTime<Utc>) -> Result<Self, WorkflowError> {
        let mut item_ids: Vec<String> = Vec::with_capacity(input.item_ids.len());
        for item in input.item_ids {
            if !item_ids.contains(&item) {
                item_ids.push(item);
            }
        }

        if item_ids.is_empty() {
            return Err(WorkflowError::InvariantViolation("a process must link at least one legislative item".into()));
        }

        if input.title.trim().is_empty() {
            return Err(WorkflowError::Validation("process title must not be empty".into()));
        }

        Ok(Self {
            id,
            number,
            title: input.title,
            description: input.description,
            theme: input.theme,
            priority: input.priority,
            status: ProcessStatus::Criado,
            item_ids,
            sector_id: input.sector_id,
            analyst_id: input.analyst_id,
            deadline: input.deadline,
            pending_opinions: 0,
            pending_positions: 0,
            final_position: None,
            final_justification: None,
            notes: Vec::new(),
            suspended_from: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            version: 0
        })
    }

    pub fn pending(&self, kind: CounterKind) -> u32 {
        match kind {
            CounterKind::Opinions => self.pending_opinions,
            CounterKind::Positions => self.pending_positions
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_opinions > 0 || self.pending_positions > 0
    }

    /// Apply a signed delta to one counter, clamping at zero
    pub fn apply_counter_delta(&mut self, kind: CounterKind, delta: i64) {
        let counter = match kind {
            CounterKind::Opinions => &mut self.pending_opinions,
            CounterKind::Positions => &mut self.pending_positions
        };
        let next = (*counter as i64).saturating_add(delta).clamp(0, u32::MAX as i64);
        *counter = next as u32;
    }

    fn ensure_open(&self) -> Result<(), WorkflowError> {
        if self.status.is_terminal() {
            return Err(WorkflowError::invalid_transition(ENTITY, self.status, "item change"));
        }
        Ok(())
    }

    pub fn link_item(&mut self, item_id: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.ensure_open()?;

        if self.item_ids.iter().any(|id| id == item_id) {
            return Err(WorkflowError::InvariantViolation(format!(
                "item '{}' is already linked to process {}",
                item_id, self.number
            )));
        }

        self.item_ids.push(item_id.to_string());
        self.updated_at = now;
        Ok(())
    }

    pub fn unlink_item(&mut self, item_id: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.ensure_open()?;

        let Some(index) = self.item_ids.iter().position(|id| id == item_id) else {
            return Err(WorkflowError::InvariantViolation(format!(
                "item '{}' is not linked to process {}",
                item_id, self.number
            )));
        };

        if self.item_ids.len() == 1 {
            return Err(WorkflowError::InvariantViolation(format!(
                "process {} must keep at least one linked item",
                self.number
            )));
        }

        self.item_ids.remove(index);
        self.updated_at = now;
        Ok(())
    }

    /// Move to `target`, appending `note` to the observation log when given
    pub fn transition(
        &mut self,
        target: ProcessStatus,
        actor_id: &str,
        note: Option<&str>,
        now: DateTime<Utc>
    ) -> Result<(), WorkflowError> {
        if !self.status.can_reach(target, self.suspended_from) {
            return Err(WorkflowError::invalid_transition(ENTITY, self.status, target));
        }

        if target == ProcessStatus::Finalizado && self.has_pending() {
            return Err(self.pending_error());
        }

        if target == ProcessStatus::Suspenso {
            self.suspended_from = Some(self.status);
        } else {
            self.suspended_from = None;
        }

        if target.is_terminal() {
            self.closed_at = Some(now);
        }

        if let Some(text) = note.map(str::trim).filter(|text| !text.is_empty()) {
            self.notes.push(ProcessNote { at: now, actor_id: actor_id.to_string(), status: target, text: text.into() });
        }

        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    /// Record the institutional stance and close the process
    pub fn finalize(&mut self, text: &str, justification: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        if self.has_pending() {
            return Err(self.pending_error());
        }

        if self.status.is_terminal() || self.status == ProcessStatus::Suspenso {
            return Err(WorkflowError::invalid_transition(ENTITY, self.status, ProcessStatus::Finalizado));
        }

        if text.trim().is_empty() {
            return Err(WorkflowError::Validation("final position text must not be empty".into()));
        }

        self.final_position = Some(text.to_string());
        self.final_justification = Some(justification.to_string());
        self.status = ProcessStatus::Finalizado;
        self.suspended_from = None;
        self.closed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn pending_error(&self) -> WorkflowError {
        WorkflowError::PreconditionFailed(format!(
            "process {} still has {} pending opinion(s) and {} pending position(s)",
            self.number, self.pending_opinions, self.pending_positions
        ))
    }
}

/// Optional criteria for listing processes
#[derive(Debug, Clone, Default)]
pub struct ProcessFilter {
    pub status:     Option<ProcessStatus>,
    pub sector_id:  Option<String>,
    pub analyst_id: Option<String>
}

impl ProcessFilter {
    pub fn matches(&self, process: &Process) -> bool {
        self.status.is_none_or(|status| process.status == status)
            && self.sector_id.as_deref().is_none_or(|sector| process.sector_id == sector)
            && self.analyst_id.as_deref().is_none_or(|analyst| process.analyst_id.as_deref() == Some(analyst))
    }
}

/// Highest priority first, then oldest first
pub fn listing_order(a: &Process, b: &Process) -> Ordering {
    b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at)).then_with(|| a.id.cmp(&b.id))
}
