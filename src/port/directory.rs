use async_trait::async_trait;

use crate::domain::{auth::RoleSet, error::WorkflowError};

/// Port for identity and reference-data lookups
#[async_trait]
pub trait Directory: Send + Sync {
    /// True for an active internal sector
    async fn sector_exists(&self, id: &str) -> Result<bool, WorkflowError>;

    /// True for an active external body (ministry, armed force)
    async fn external_body_exists(&self, id: &str) -> Result<bool, WorkflowError>;

    async fn legislative_item_exists(&self, id: &str) -> Result<bool, WorkflowError>;

    /// Roles held by the actor; empty when the actor is unknown
    async fn resolve_actor_roles(&self, actor_id: &str) -> Result<RoleSet, WorkflowError>;

    /// Either kind of routing endpoint
    async fn party_exists(&self, id: &str) -> Result<bool, WorkflowError> {
        Ok(self.sector_exists(id).await? || self.external_body_exists(id).await?)
    }
}
