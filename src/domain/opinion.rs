//! Opinion (parecer): internal technical assessment issued by a sector

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::WorkflowError;

pub const ENTITY: &str = "opinion";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpinionStatus {
    Solicitado,
    Emitido,
    Aprovado,
    Reprovado
}

impl OpinionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpinionStatus::Solicitado => "SOLICITADO",
            OpinionStatus::Emitido => "EMITIDO",
            OpinionStatus::Aprovado => "APROVADO",
            OpinionStatus::Reprovado => "REPROVADO"
        }
    }

    /// Still counts against the one-per-sector rule
    pub fn is_outstanding(&self) -> bool {
        matches!(self, OpinionStatus::Solicitado | OpinionStatus::Emitido)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_outstanding()
    }
}

impl fmt::Display for OpinionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpinionKind {
    #[default]
    Tecnico,
    Juridico,
    Financeiro,
    Estrategico,
    Operacional,
    Conclusivo
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Favoravel,
    FavoravelComEmendas,
    Contrario,
    Abstencao,
    Informativo,
    AguardarManifestacao
}

impl Recommendation {
    pub fn is_favorable(&self) -> bool {
        matches!(self, Recommendation::Favoravel | Recommendation::FavoravelComEmendas)
    }
}

/// Body of an issued opinion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpinionDraft {
    pub context:            String,
    pub analysis:           String,
    pub recommendation:     Recommendation,
    pub justification:      String,
    pub legal_basis:        Vec<String>,
    pub identified_impacts: Vec<String>,
    pub conclusion:         String
}

/// Input for a new solicitation
#[derive(Debug, Clone)]
pub struct OpinionRequest {
    pub process_id:        String,
    pub requesting_sector: String,
    pub issuing_sector:    String,
    pub kind:              OpinionKind,
    pub deadline:          Option<DateTime<Utc>>,
    pub tramitacao_id:     Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opinion {
    pub id:                String,
    pub process_id:        String,
    pub number:            String,
    pub kind:              OpinionKind,
    pub requesting_sector: String,
    pub issuing_sector:    String,
    pub tramitacao_id:     Option<String>,
    pub status:            OpinionStatus,
    pub analyst_id:        Option<String>,
    pub body:              Option<OpinionDraft>,
    pub approver_id:       Option<String>,
    pub deadline:          Option<DateTime<Utc>>,
    pub met_deadline:      Option<bool>,
    pub requested_at:      DateTime<Utc>,
    pub emitted_at:        Option<DateTime<Utc>>,
    pub decided_at:        Option<DateTime<Utc>>,
    pub updated_at:        DateTime<Utc>,
    pub version:           u64
}

/// `PARECER-YEAR/SEQ`
pub fn format_opinion_number(year: i32, sequence: u64) -> String {
    format!("PARECER-{}/{:05}", year, sequence)
}

impl Opinion {
    pub fn request(id: String, number: String, input: OpinionRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            process_id: input.process_id,
            number,
            kind: input.kind,
            requesting_sector: input.requesting_sector,
            issuing_sector: input.issuing_sector,
            tramitacao_id: input.tramitacao_id,
            status: OpinionStatus::Solicitado,
            analyst_id: None,
            body: None,
            approver_id: None,
            deadline: input.deadline,
            met_deadline: None,
            requested_at: now,
            emitted_at: None,
            decided_at: None,
            updated_at: now,
            version: 0
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == OpinionStatus::Solicitado && self.deadline.is_some_and(|deadline| deadline < now)
    }

    pub fn emit(&mut self, analyst_id: &str, draft: OpinionDraft, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        if self.status != OpinionStatus::Solicitado {
            return Err(WorkflowError::invalid_transition(ENTITY, self.status, OpinionStatus::Emitido));
        }

        if draft.conclusion.trim().is_empty() {
            return Err(WorkflowError::Validation("an opinion needs a conclusion".into()));
        }

        self.status = OpinionStatus::Emitido;
        self.analyst_id = Some(analyst_id.to_string());
        self.body = Some(draft);
        // on time only when answered strictly before a deadline that exists
        self.met_deadline = Some(self.deadline.is_some_and(|deadline| now < deadline));
        self.emitted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn approve(&mut self, approver_id: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.decide(OpinionStatus::Aprovado, approver_id, now)
    }

    pub fn reject(&mut self, approver_id: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.decide(OpinionStatus::Reprovado, approver_id, now)
    }

    fn decide(&mut self, target: OpinionStatus, approver_id: &str, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        if self.status != OpinionStatus::Emitido {
            return Err(WorkflowError::invalid_transition(ENTITY, self.status, target));
        }

        // decision timestamp must not precede emission
        let decided_at = self.emitted_at.map_or(now, |emitted| emitted.max(now));

        self.status = target;
        self.approver_id = Some(approver_id.to_string());
        self.decided_at = Some(decided_at);
        self.updated_at = now;
        Ok(())
    }
}
