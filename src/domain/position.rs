//! Position (posicionamento): formal stance of an external body

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::WorkflowError;

pub const ENTITY: &str = "position";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Solicitado,
    Recebido,
    Cancelado
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Solicitado => "SOLICITADO",
            PositionStatus::Recebido => "RECEBIDO",
            PositionStatus::Cancelado => "CANCELADO"
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PositionStatus::Solicitado)
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionKind {
    Favoravel,
    Contrario,
    FavoravelComRessalvas,
    SemObjecao,
    Abstencao,
    AguardarAnalise
}

impl PositionKind {
    pub fn is_favorable(&self) -> bool {
        matches!(self, PositionKind::Favoravel | PositionKind::FavoravelComRessalvas | PositionKind::SemObjecao)
    }
}

/// What the external body sent back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionReply {
    pub representative_name:  String,
    pub representative_title: String,
    pub kind:                 PositionKind,
    pub manifestation:        String,
    pub justification:        String,
    pub supporting_refs:      Vec<String>,
    pub official_doc_number:  Option<String>
}

#[derive(Debug, Clone)]
pub struct PositionRequest {
    pub process_id:       String,
    pub requesting_party: String,
    pub issuing_body:     String,
    pub deadline:         Option<DateTime<Utc>>,
    pub tramitacao_id:    Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id:               String,
    pub process_id:       String,
    pub number:           String,
    pub requesting_party: String,
    pub issuing_body:     String,
    pub tramitacao_id:    Option<String>,
    pub status:           PositionStatus,
    pub reply:            Option<PositionReply>,
    pub deadline:         Option<DateTime<Utc>>,
    pub met_deadline:     Option<bool>,
    pub requested_at:     DateTime<Utc>,
    pub registered_at:    Option<DateTime<Utc>>,
    pub cancelled_at:     Option<DateTime<Utc>>,
    pub updated_at:       DateTime<Utc>,
    pub version:          u64
}

/// `POSIC-YEAR/SEQ`
pub fn format_position_number(year: i32, sequence: u64) -> String {
    format!("POSIC-{}/{:05}", year, sequence)
}

impl Position {
    pub fn request(id: String, number: String, input: PositionRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            process_id: input.process_id,
            number,
            requesting_party: input.requesting_party,
            issuing_body: input.issuing_body,
            tramitacao_id: input.tramitacao_id,
            status: PositionStatus::Solicitado,
            reply: None,
            deadline: input.deadline,
            met_deadline: None,
            requested_at: now,
            registered_at: None,
            cancelled_at: None,
            updated_at: now,
            version: 0
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == PositionStatus::Solicitado && self.deadline.is_some_and(|deadline| deadline < now)
    }

    pub fn register(&mut self, reply: PositionReply, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        if self.status != PositionStatus::Solicitado {
            return Err(WorkflowError::invalid_transition(ENTITY, self.status, PositionStatus::Recebido));
        }

        if reply.representative_name.trim().is_empty() {
            return Err(WorkflowError::Validation("a position needs the representative's name".into()));
        }

        self.status = PositionStatus::Recebido;
        self.reply = Some(reply);
        // on time only when answered strictly before a deadline that exists
        self.met_deadline = Some(self.deadline.is_some_and(|deadline| now < deadline));
        self.registered_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        if self.status != PositionStatus::Solicitado {
            return Err(WorkflowError::invalid_transition(ENTITY, self.status, PositionStatus::Cancelado));
        }

        self.status = PositionStatus::Cancelado;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}
