//! Outbound signals: notifications and deadline escalations

use std::{cmp::Ordering, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TramitacaoSent,
    TramitacaoReplied,
    OpinionRequested,
    OpinionIssued,
    OpinionApproved,
    OpinionRejected,
    PositionRequested,
    PositionRegistered,
    PositionCancelled,
    ProcessFinalized,
    DeadlineOverdue
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TramitacaoSent => "tramitacao_sent",
            NotificationKind::TramitacaoReplied => "tramitacao_replied",
            NotificationKind::OpinionRequested => "opinion_requested",
            NotificationKind::OpinionIssued => "opinion_issued",
            NotificationKind::OpinionApproved => "opinion_approved",
            NotificationKind::OpinionRejected => "opinion_rejected",
            NotificationKind::PositionRequested => "position_requested",
            NotificationKind::PositionRegistered => "position_registered",
            NotificationKind::PositionCancelled => "position_cancelled",
            NotificationKind::ProcessFinalized => "process_finalized",
            NotificationKind::DeadlineOverdue => "deadline_overdue"
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload handed to the notification dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind:         NotificationKind,
    pub process_id:   String,
    pub entity_id:    String,
    pub recipient_id: String,
    pub due_at:       Option<DateTime<Utc>>,
    pub urgent:       bool
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Tramitacao,
    Opinion,
    Position
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Tramitacao => "tramitacao",
            EntityKind::Opinion => "opinion",
            EntityKind::Position => "position"
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An overdue item found by a deadline sweep
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Escalation {
    pub entity_kind:   EntityKind,
    pub entity_id:     String,
    pub process_id:    String,
    pub recipient_id:  String,
    pub overdue_since: DateTime<Utc>,
    pub urgent:        bool
}

impl Escalation {
    pub fn to_notification(&self) -> Notification {
        Notification {
            kind:         NotificationKind::DeadlineOverdue,
            process_id:   self.process_id.clone(),
            entity_id:    self.entity_id.clone(),
            recipient_id: self.recipient_id.clone(),
            due_at:       Some(self.overdue_since),
            urgent:       self.urgent
        }
    }
}

/// Oldest deadline first, urgent first on ties, then a stable tiebreak on identity
pub fn escalation_order(a: &Escalation, b: &Escalation) -> Ordering {
    a.overdue_since
        .cmp(&b.overdue_since)
        .then_with(|| b.urgent.cmp(&a.urgent))
        .then_with(|| a.entity_kind.cmp(&b.entity_kind))
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}
