//! Actor roles and per-operation capability checks

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::domain::error::WorkflowError;

/// Roles an actor can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Gestor,
    Analista,
    Externo
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Gestor => "GESTOR",
            Role::Analista => "ANALISTA",
            Role::Externo => "EXTERNO"
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of roles resolved for one actor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self(roles.into_iter().collect())
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn intersects(&self, allowed: &[Role]) -> bool {
        allowed.iter().any(|role| self.0.contains(role))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        Self::new(iter)
    }
}

const INTERNAL_STAFF: &[Role] = &[Role::Admin, Role::Gestor, Role::Analista];
const ANY_PARTY: &[Role] = &[Role::Admin, Role::Gestor, Role::Analista, Role::Externo];
const MANAGEMENT: &[Role] = &[Role::Admin, Role::Gestor];

/// Every workflow operation exposed to the boundary layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateProcess,
    LinkItem,
    UnlinkItem,
    UpdateProcessStatus,
    SetFinalPosition,
    Encaminhar,
    Receber,
    IniciarAnalise,
    SolicitarParecer,
    SolicitarPosicionamento,
    Suspender,
    Retomar,
    Concluir,
    Responder,
    Arquivar,
    RequestOpinion,
    IssueOpinion,
    ApproveOpinion,
    RejectOpinion,
    RequestPosition,
    RegisterPosition,
    CancelPosition
}

impl Operation {
    /// Roles the boundary layer must enforce before invoking the operation
    pub fn required_roles(&self) -> &'static [Role] {
        match self {
            Operation::SetFinalPosition | Operation::ApproveOpinion | Operation::RejectOpinion => MANAGEMENT,
            Operation::Receber
            | Operation::IniciarAnalise
            | Operation::SolicitarParecer
            | Operation::SolicitarPosicionamento
            | Operation::Suspender
            | Operation::Retomar
            | Operation::Concluir
            | Operation::Responder
            | Operation::RegisterPosition => ANY_PARTY,
            Operation::CreateProcess
            | Operation::LinkItem
            | Operation::UnlinkItem
            | Operation::UpdateProcessStatus
            | Operation::Encaminhar
            | Operation::Arquivar
            | Operation::RequestOpinion
            | Operation::IssueOpinion
            | Operation::RequestPosition
            | Operation::CancelPosition => INTERNAL_STAFF
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateProcess => "process.create",
            Operation::LinkItem => "process.link",
            Operation::UnlinkItem => "process.unlink",
            Operation::UpdateProcessStatus => "process.update_status",
            Operation::SetFinalPosition => "process.set_final_position",
            Operation::Encaminhar => "routing.encaminhar",
            Operation::Receber => "routing.receber",
            Operation::IniciarAnalise => "routing.iniciar_analise",
            Operation::SolicitarParecer => "routing.solicitar_parecer",
            Operation::SolicitarPosicionamento => "routing.solicitar_posicionamento",
            Operation::Suspender => "routing.suspender",
            Operation::Retomar => "routing.retomar",
            Operation::Concluir => "routing.concluir",
            Operation::Responder => "routing.responder",
            Operation::Arquivar => "routing.arquivar",
            Operation::RequestOpinion => "opinion.solicitar",
            Operation::IssueOpinion => "opinion.emitir",
            Operation::ApproveOpinion => "opinion.aprovar",
            Operation::RejectOpinion => "opinion.reprovar",
            Operation::RequestPosition => "position.solicitar",
            Operation::RegisterPosition => "position.registrar",
            Operation::CancelPosition => "position.cancelar"
        }
    }
}

/// Roles allowed to move a process into a decision or terminal status
pub const ELEVATED_ROLES: &[Role] = MANAGEMENT;

/// Fails with `Unauthorized` unless the actor holds one of the allowed roles
pub fn require_role(actor_id: &str, roles: &RoleSet, allowed: &[Role]) -> Result<(), WorkflowError> {
    if roles.intersects(allowed) {
        return Ok(());
    }

    let wanted = allowed.iter().map(Role::as_str).collect::<Vec<_>>().join(", ");
    Err(WorkflowError::Unauthorized(format!("actor '{}' requires one of [{}]", actor_id, wanted)))
}
