//! Tramitação: a routing instruction between a sender and a recipient

use std::{cmp::Ordering, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::WorkflowError;

pub const ENTITY: &str = "tramitacao";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TramitacaoKind {
    Encaminhamento,
    SolicitacaoParecer,
    RetornoParecer,
    SolicitacaoPosicionamento,
    RetornoPosicionamento,
    Redistribuicao,
    Devolucao,
    Arquivamento,
    Informacao
}

impl TramitacaoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TramitacaoKind::Encaminhamento => "ENCAMINHAMENTO",
            TramitacaoKind::SolicitacaoParecer => "SOLICITACAO_PARECER",
            TramitacaoKind::RetornoParecer => "RETORNO_PARECER",
            TramitacaoKind::SolicitacaoPosicionamento => "SOLICITACAO_POSICIONAMENTO",
            TramitacaoKind::RetornoPosicionamento => "RETORNO_POSICIONAMENTO",
            TramitacaoKind::Redistribuicao => "REDISTRIBUICAO",
            TramitacaoKind::Devolucao => "DEVOLUCAO",
            TramitacaoKind::Arquivamento => "ARQUIVAMENTO",
            TramitacaoKind::Informacao => "INFORMACAO"
        }
    }

    /// Solicitations must eventually be answered by a RETORNO_* routing
    pub fn requires_reply(&self) -> bool {
        matches!(self, TramitacaoKind::SolicitacaoParecer | TramitacaoKind::SolicitacaoPosicionamento)
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, TramitacaoKind::RetornoParecer | TramitacaoKind::RetornoPosicionamento)
    }

    pub fn reply_kind(&self) -> Option<TramitacaoKind> {
        match self {
            TramitacaoKind::SolicitacaoParecer => Some(TramitacaoKind::RetornoParecer),
            TramitacaoKind::SolicitacaoPosicionamento => Some(TramitacaoKind::RetornoPosicionamento),
            _ => None
        }
    }
}

impl fmt::Display for TramitacaoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TramitacaoStatus {
    Pendente,
    Recebido,
    EmAnalise,
    AguardandoParecer,
    AguardandoPosicionamento,
    Concluida,
    Arquivada
}

impl TramitacaoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TramitacaoStatus::Pendente => "PENDENTE",
            TramitacaoStatus::Recebido => "RECEBIDO",
            TramitacaoStatus::EmAnalise => "EM_ANALISE",
            TramitacaoStatus::AguardandoParecer => "AGUARDANDO_PARECER",
            TramitacaoStatus::AguardandoPosicionamento => "AGUARDANDO_POSICIONAMENTO",
            TramitacaoStatus::Concluida => "CONCLUIDA",
            TramitacaoStatus::Arquivada => "ARQUIVADA"
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TramitacaoStatus::Concluida | TramitacaoStatus::Arquivada)
    }

    pub fn is_awaiting_reply(&self) -> bool {
        matches!(self, TramitacaoStatus::AguardandoParecer | TramitacaoStatus::AguardandoPosicionamento)
    }
}

impl fmt::Display for TramitacaoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for a new routing
#[derive(Debug, Clone)]
pub struct NewTramitacao {
    pub process_id:   String,
    pub sender_id:    String,
    pub recipient_id: String,
    pub kind:         TramitacaoKind,
    pub urgent:       bool,
    pub deadline:     Option<DateTime<Utc>>,
    pub dispatch:     Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tramitacao {
    pub id:            String,
    pub process_id:    String,
    pub sender_id:     String,
    pub recipient_id:  String,
    pub kind:          TramitacaoKind,
    pub status:        TramitacaoStatus,
    pub urgent:        bool,
    pub deadline:      Option<DateTime<Utc>>,
    pub dispatch:      Option<String>,
    /// Opinion or position spawned by a solicitation
    pub linked_entity: Option<String>,
    /// Set while the routing is paused back in PENDENTE
    pub paused_at:     Option<DateTime<Utc>>,
    pub sent_at:       DateTime<Utc>,
    pub received_at:   Option<DateTime<Utc>>,
    pub concluded_at:  Option<DateTime<Utc>>,
    pub updated_at:    DateTime<Utc>,
    pub version:       u64
}

impl Tramitacao {
    pub fn send(id: String, input: NewTramitacao, now: DateTime<Utc>) -> Result<Self, WorkflowError> {
        if input.sender_id == input.recipient_id {
            return Err(WorkflowError::Validation("a routing cannot be addressed to its own sender".into()));
        }

        Ok(Self {
            id,
            process_id: input.process_id,
            sender_id: input.sender_id,
            recipient_id: input.recipient_id,
            kind: input.kind,
            status: TramitacaoStatus::Pendente,
            urgent: input.urgent,
            deadline: input.deadline,
            dispatch: input.dispatch,
            linked_entity: None,
            paused_at: None,
            sent_at: now,
            received_at: None,
            concluded_at: None,
            updated_at: now,
            version: 0
        })
    }

    pub fn is_paused(&self) -> bool {
        self.status == TramitacaoStatus::Pendente && self.paused_at.is_some()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.deadline.is_some_and(|deadline| deadline < now)
    }

    pub fn ensure_recipient(&self, actor_id: &str) -> Result<(), WorkflowError> {
        if self.recipient_id != actor_id {
            return Err(WorkflowError::Unauthorized(format!(
                "actor '{}' is not the recipient of tramitacao '{}'",
                actor_id, self.id
            )));
        }
        Ok(())
    }

    fn move_to(
        &mut self,
        allowed_from: &[TramitacaoStatus],
        target: TramitacaoStatus,
        now: DateTime<Utc>
    ) -> Result<(), WorkflowError> {
        if !allowed_from.contains(&self.status) {
            return Err(WorkflowError::invalid_transition(ENTITY, self.status, target));
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    pub fn receive(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        if self.is_paused() {
            return Err(WorkflowError::invalid_transition(ENTITY, "PENDENTE (paused)", TramitacaoStatus::Recebido));
        }
        self.move_to(&[TramitacaoStatus::Pendente], TramitacaoStatus::Recebido, now)?;
        self.received_at = Some(now);
        Ok(())
    }

    pub fn start_analysis(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.move_to(&[TramitacaoStatus::Recebido], TramitacaoStatus::EmAnalise, now)
    }

    pub fn await_opinion(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.move_to(&[TramitacaoStatus::EmAnalise], TramitacaoStatus::AguardandoParecer, now)
    }

    pub fn await_position(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.move_to(&[TramitacaoStatus::EmAnalise], TramitacaoStatus::AguardandoPosicionamento, now)
    }

    /// A linked opinion or position settled: analysis continues
    pub fn reply_arrived(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.move_to(
            &[TramitacaoStatus::AguardandoParecer, TramitacaoStatus::AguardandoPosicionamento],
            TramitacaoStatus::EmAnalise,
            now
        )
    }

    /// Undo a reply request whose side effect could not be created
    pub fn withdraw_reply_request(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.reply_arrived(now)?;
        self.linked_entity = None;
        Ok(())
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.move_to(&[TramitacaoStatus::EmAnalise], TramitacaoStatus::Pendente, now)?;
        self.paused_at = Some(now);
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        if !self.is_paused() {
            return Err(WorkflowError::invalid_transition(ENTITY, self.status, TramitacaoStatus::EmAnalise));
        }
        self.status = TramitacaoStatus::EmAnalise;
        self.paused_at = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn conclude(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.move_to(&[TramitacaoStatus::Recebido, TramitacaoStatus::EmAnalise], TramitacaoStatus::Concluida, now)?;
        self.concluded_at = Some(now);
        Ok(())
    }

    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        if self.status.is_terminal() {
            return Err(WorkflowError::invalid_transition(ENTITY, self.status, TramitacaoStatus::Arquivada));
        }
        self.status = TramitacaoStatus::Arquivada;
        self.paused_at = None;
        self.concluded_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

/// Deadline ascending (missing deadlines last), then urgent first
pub fn queue_order(a: &Tramitacao, b: &Tramitacao) -> Ordering {
    deadline_then_urgency(a.deadline, a.urgent, b.deadline, b.urgent).then_with(|| a.sent_at.cmp(&b.sent_at))
}

pub fn deadline_then_urgency(
    a_deadline: Option<DateTime<Utc>>,
    a_urgent: bool,
    b_deadline: Option<DateTime<Utc>>,
    b_urgent: bool
) -> Ordering {
    let by_deadline = match (a_deadline, b_deadline) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal
    };
    by_deadline.then_with(|| b_urgent.cmp(&a_urgent))
}
