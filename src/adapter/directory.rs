//! Directory backed by reference data loaded from configuration

use std::{
    collections::{HashMap, HashSet},
    sync::Arc
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    domain::{
        auth::{Role, RoleSet},
        error::WorkflowError
    },
    port::directory::Directory
};

/// Sector or external body record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub id:      String,
    pub name:    String,
    #[serde(default)]
    pub acronym: Option<String>,
    #[serde(default = "active_by_default")]
    pub active:  bool
}

fn active_by_default() -> bool {
    true
}

/// Roles granted to one actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorGrant {
    pub id:    String,
    pub roles: Vec<Role>
}

/// Reference data the directory serves
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub sectors:           Vec<Party>,
    #[serde(default)]
    pub external_bodies:   Vec<Party>,
    #[serde(default)]
    pub legislative_items: Vec<String>,
    #[serde(default)]
    pub actors:            Vec<ActorGrant>
}

#[derive(Debug, Default)]
struct Tables {
    sectors:         HashSet<String>,
    external_bodies: HashSet<String>,
    items:           HashSet<String>,
    actors:          HashMap<String, RoleSet>
}

impl From<&DirectorySeed> for Tables {
    fn from(seed: &DirectorySeed) -> Self {
        let active = |parties: &[Party]| -> HashSet<String> {
            parties.iter().filter(|p| p.active).map(|p| p.id.clone()).collect()
        };

        Self {
            sectors:         active(&seed.sectors),
            external_bodies: active(&seed.external_bodies),
            items:           seed.legislative_items.iter().cloned().collect(),
            actors:          seed
                .actors
                .iter()
                .map(|grant| (grant.id.clone(), grant.roles.iter().copied().collect()))
                .collect()
        }
    }
}

/// In-process directory. Lookups only change through [`StaticDirectory::reload`].
#[derive(Debug, Clone)]
pub struct StaticDirectory {
    tables: Arc<RwLock<Tables>>
}

impl StaticDirectory {
    pub fn new(seed: &DirectorySeed) -> Self {
        Self { tables: Arc::new(RwLock::new(Tables::from(seed))) }
    }

    /// Replace every lookup table with the contents of `seed`
    pub async fn reload(&self, seed: &DirectorySeed) {
        let mut tables = self.tables.write().await;
        *tables = Tables::from(seed);
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn sector_exists(&self, id: &str) -> Result<bool, WorkflowError> {
        Ok(self.tables.read().await.sectors.contains(id))
    }

    async fn external_body_exists(&self, id: &str) -> Result<bool, WorkflowError> {
        Ok(self.tables.read().await.external_bodies.contains(id))
    }

    async fn legislative_item_exists(&self, id: &str) -> Result<bool, WorkflowError> {
        Ok(self.tables.read().await.items.contains(id))
    }

    async fn resolve_actor_roles(&self, actor_id: &str) -> Result<RoleSet, WorkflowError> {
        Ok(self.tables.read().await.actors.get(actor_id).cloned().unwrap_or_default())
    }
}
