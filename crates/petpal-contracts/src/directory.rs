//! Read-only access to the records contracts are generated from.
//!
//! Entity CRUD lives elsewhere; this crate only looks records up. The
//! in-memory directory can be loaded from a YAML document:
//!
//! ```yaml
//! agency:
//!   legal_name: PetPal Marketing Ltda
//!   tax_id: "11222333000181"
//!   partners:
//!     - name: Rafael Costa
//!       email: rafael@petpal.com.br
//! employees: []
//! clients: []
//! ```

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::entity::{Agency, ClientCompany, Employee, EntityKind, TargetEntity};

#[async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn employee(&self, id: &str) -> Result<Option<Employee>>;

    async fn client(&self, id: &str) -> Result<Option<ClientCompany>>;

    /// The single active agency.
    async fn agency(&self) -> Result<Option<Agency>>;

    async fn target(&self, kind: EntityKind, id: &str) -> Result<Option<TargetEntity>> {
        Ok(match kind {
            EntityKind::Employee => self.employee(id).await?.map(TargetEntity::Employee),
            EntityKind::Client => self.client(id).await?.map(TargetEntity::Client),
        })
    }
}

/// YAML shape of a directory seed file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub agency: Option<Agency>,
    #[serde(default)]
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub clients: Vec<ClientCompany>,
}

impl DirectorySeed {
    pub fn load_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("Parsing {}", path.display()))
    }
}

#[derive(Default)]
struct DirectoryState {
    agency: Option<Agency>,
    employees: HashMap<String, Employee>,
    clients: HashMap<String, ClientCompany>,
}

/// In-memory EntityDirectory.
#[derive(Default)]
pub struct MemoryEntityDirectory {
    inner: RwLock<DirectoryState>,
}

impl MemoryEntityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let directory = Self::new();
        if let Ok(mut state) = directory.inner.write() {
            state.agency = seed.agency;
            state.employees = seed.employees.into_iter().map(|e| (e.id.clone(), e)).collect();
            state.clients = seed.clients.into_iter().map(|c| (c.id.clone(), c)).collect();
        }
        directory
    }

    pub fn set_agency(&self, agency: Agency) -> Result<()> {
        let mut state = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        state.agency = Some(agency);
        Ok(())
    }

    pub fn upsert_employee(&self, employee: Employee) -> Result<()> {
        let mut state = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        state.employees.insert(employee.id.clone(), employee);
        Ok(())
    }

    pub fn upsert_client(&self, client: ClientCompany) -> Result<()> {
        let mut state = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        state.clients.insert(client.id.clone(), client);
        Ok(())
    }
}

#[async_trait]
impl EntityDirectory for MemoryEntityDirectory {
    async fn employee(&self, id: &str) -> Result<Option<Employee>> {
        let state = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(state.employees.get(id).cloned())
    }

    async fn client(&self, id: &str) -> Result<Option<ClientCompany>> {
        let state = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(state.clients.get(id).cloned())
    }

    async fn agency(&self) -> Result<Option<Agency>> {
        let state = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(state.agency.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::{sample_agency, sample_company, sample_employee};

    #[tokio::test]
    async fn test_target_lookup_by_kind() {
        let directory = MemoryEntityDirectory::new();
        directory.upsert_employee(sample_employee()).unwrap();
        directory.upsert_client(sample_company()).unwrap();

        let target = directory.target(EntityKind::Client, "cli-1").await.unwrap();
        assert!(matches!(target, Some(TargetEntity::Client(_))));

        // Ids are not shared across kinds
        let wrong_kind = directory.target(EntityKind::Employee, "cli-1").await.unwrap();
        assert!(wrong_kind.is_none());
    }

    #[tokio::test]
    async fn test_seed_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("directory.yaml");
        std::fs::write(
            &path,
            r#"
agency:
  legal_name: PetPal Marketing Ltda
  tax_id: "11222333000181"
  partners:
    - name: Rafael Costa
      email: rafael@petpal.com.br
employees:
  - id: emp-9
    name: Joana Prado
    email: joana@petpal.com.br
    compensation: "3100.50"
    hire_date: 2023-03-01
clients:
  - id: cli-9
    legal_name: Pet Feliz ME
    business_units:
      - id: bu-1
        name: Matriz
        head_office: true
        representatives:
          - name: Paulo Reis
            email: paulo@petfeliz.com.br
"#,
        )
        .unwrap();

        let directory = MemoryEntityDirectory::from_seed(DirectorySeed::load_file(&path).unwrap());
        let agency = directory.agency().await.unwrap().unwrap();
        assert_eq!(agency.partners[0].name, "Rafael Costa");

        let employee = directory.employee("emp-9").await.unwrap().unwrap();
        assert_eq!(employee.compensation.unwrap().to_string(), "3100.50");

        let client = directory.client("cli-9").await.unwrap().unwrap();
        assert!(client.services.is_empty());
        assert!(client.business_units[0].head_office);
    }

    #[tokio::test]
    async fn test_agency_can_be_replaced() {
        let directory = MemoryEntityDirectory::new();
        assert!(directory.agency().await.unwrap().is_none());
        directory.set_agency(sample_agency()).unwrap();
        assert!(directory.agency().await.unwrap().is_some());
    }
}
