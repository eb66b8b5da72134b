//! Contract templates and their store
//!
//! Templates are HTML bodies with `{TOKEN}` placeholders, one kind per target
//! entity. They are edited in place and never deleted; retiring a template
//! means deactivating it.
//!
//! Seed templates can be loaded from YAML:
//!
//! ```yaml
//! id: agenciamento
//! name: Contrato de Agenciamento
//! target_kind: client
//! version: "1.0"
//! tokens: ["{CLIENTE_RAZAO_SOCIAL}", "{SOCIO_NOME}"]
//! body: |
//!   <h1>Contrato</h1>
//!   <p>{CLIENTE_RAZAO_SOCIAL} e {SOCIO_NOME} ...</p>
//! ```

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::entity::EntityKind;
use crate::render::TemplateRenderer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractTemplate {
    pub id: String,
    pub name: String,
    pub target_kind: EntityKind,
    pub body: String,
    /// Tokens the template declares it uses
    #[serde(default)]
    pub tokens: Vec<String>,
    pub version: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl ContractTemplate {
    /// Tokens used in the body but missing from the declared list.
    pub fn undeclared_tokens(&self) -> Vec<String> {
        TemplateRenderer::referenced_tokens(&self.body)
            .into_iter()
            .filter(|t| !self.tokens.contains(t))
            .collect()
    }
}

/// Persistence for contract templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Create or edit a template. Editing keeps `created_at`.
    async fn save(&self, template: &ContractTemplate) -> Result<ContractTemplate>;
    async fn load(&self, id: &str) -> Result<Option<ContractTemplate>>;
    async fn list(&self, kind: Option<EntityKind>, active_only: bool) -> Result<Vec<ContractTemplate>>;
    /// Returns false when the template does not exist.
    async fn deactivate(&self, id: &str) -> Result<bool>;
}

/// In-memory TemplateStore for tests and single-process deployments.
pub struct MemoryTemplateStore {
    inner: RwLock<HashMap<String, ContractTemplate>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn save(&self, template: &ContractTemplate) -> Result<ContractTemplate> {
        let undeclared = template.undeclared_tokens();
        if !undeclared.is_empty() {
            tracing::warn!(template = %template.id, ?undeclared, "template uses undeclared tokens");
        }

        let mut store = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        let mut saved = template.clone();
        saved.updated_at = Utc::now();
        if let Some(existing) = store.get(&template.id) {
            saved.created_at = existing.created_at;
        }
        store.insert(saved.id.clone(), saved.clone());
        Ok(saved)
    }

    async fn load(&self, id: &str) -> Result<Option<ContractTemplate>> {
        let store = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(store.get(id).cloned())
    }

    async fn list(&self, kind: Option<EntityKind>, active_only: bool) -> Result<Vec<ContractTemplate>> {
        let store = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        let mut results: Vec<_> = store
            .values()
            .filter(|tpl| kind.map_or(true, |k| tpl.target_kind == k))
            .filter(|tpl| !active_only || tpl.active)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(results)
    }

    async fn deactivate(&self, id: &str) -> Result<bool> {
        let mut store = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        match store.get_mut(id) {
            Some(tpl) => {
                tpl.active = false;
                tpl.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Loads seed templates from `*.yaml` / `*.yml` files.
pub struct TemplateSeed;

impl TemplateSeed {
    pub fn load_file(path: &Path) -> Result<ContractTemplate> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("Parsing {}", path.display()))
    }

    /// Every template in `dir`, sorted by file name.
    pub fn load_dir(dir: &Path) -> Result<Vec<ContractTemplate>> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("Reading {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();
        paths.iter().map(|p| Self::load_file(p)).collect()
    }

    pub async fn seed(store: &dyn TemplateStore, dir: &Path) -> Result<usize> {
        let templates = Self::load_dir(dir)?;
        for template in &templates {
            store.save(template).await?;
        }
        tracing::info!("Seeded {} contract templates from {}", templates.len(), dir.display());
        Ok(templates.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_template(kind: EntityKind) -> ContractTemplate {
        let (id, name, body, tokens) = match kind {
            EntityKind::Client => (
                "agenciamento",
                "Agenciamento",
                "<h1>Contrato de Agenciamento</h1>\
                 <p>{CLIENTE_RAZAO_SOCIAL} ({CLIENTE_CNPJ}), representada por {REPRESENTANTE_NOME},\
                 contrata {AGENCIA_RAZAO_SOCIAL} para {SERVICO_NOME} por {SERVICO_VALOR}.</p>\
                 <p>{SOCIO_NOME}, {DATA_ATUAL}</p>",
                vec![
                    "{CLIENTE_RAZAO_SOCIAL}",
                    "{CLIENTE_CNPJ}",
                    "{REPRESENTANTE_NOME}",
                    "{AGENCIA_RAZAO_SOCIAL}",
                    "{SERVICO_NOME}",
                    "{SERVICO_VALOR}",
                    "{SOCIO_NOME}",
                    "{DATA_ATUAL}",
                ],
            ),
            EntityKind::Employee => (
                "contrato-trabalho",
                "Contrato de Trabalho",
                "<h1>Contrato de Trabalho</h1>\
                 <p>{FUNCIONARIO_NOME}, CPF {FUNCIONARIO_CPF}, cargo {FUNCIONARIO_CARGO},\
                 salário {FUNCIONARIO_SALARIO}, admissão {FUNCIONARIO_DATA_ADMISSAO}.</p>\
                 <p>{AGENCIA_RAZAO_SOCIAL} - {SOCIO_NOME}</p>",
                vec![
                    "{FUNCIONARIO_NOME}",
                    "{FUNCIONARIO_CPF}",
                    "{FUNCIONARIO_CARGO}",
                    "{FUNCIONARIO_SALARIO}",
                    "{FUNCIONARIO_DATA_ADMISSAO}",
                    "{AGENCIA_RAZAO_SOCIAL}",
                    "{SOCIO_NOME}",
                ],
            ),
        };
        let now = Utc::now();
        ContractTemplate {
            id: id.into(),
            name: name.into(),
            target_kind: kind,
            body: body.into(),
            tokens: tokens.into_iter().map(String::from).collect(),
            version: "1.0".into(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_undeclared_tokens() {
        let mut tpl = sample_template(EntityKind::Client);
        assert!(tpl.undeclared_tokens().is_empty());

        tpl.body.push_str("<p>{CLIENTE_NOME_FANTASIA}</p>");
        assert_eq!(tpl.undeclared_tokens(), vec!["{CLIENTE_NOME_FANTASIA}"]);
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let store = MemoryTemplateStore::new();
        let tpl = sample_template(EntityKind::Client);
        store.save(&tpl).await.unwrap();

        let loaded = store.load("agenciamento").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Agenciamento");
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_edit_keeps_created_at() {
        let store = MemoryTemplateStore::new();
        let tpl = sample_template(EntityKind::Client);
        let first = store.save(&tpl).await.unwrap();

        let mut edited = tpl.clone();
        edited.version = "1.1".into();
        edited.created_at = Utc::now() + chrono::Duration::days(1);
        let second = store.save(&edited).await.unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.version, "1.1");
    }

    #[tokio::test]
    async fn test_list_filters_kind_and_active() {
        let store = MemoryTemplateStore::new();
        store.save(&sample_template(EntityKind::Client)).await.unwrap();
        store.save(&sample_template(EntityKind::Employee)).await.unwrap();

        assert_eq!(store.list(None, false).await.unwrap().len(), 2);
        assert_eq!(
            store.list(Some(EntityKind::Employee), false).await.unwrap().len(),
            1
        );

        assert!(store.deactivate("agenciamento").await.unwrap());
        assert!(!store.deactivate("missing").await.unwrap());

        let active = store.list(None, true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "contrato-trabalho");
        // Deactivated templates are still loadable
        assert!(store.load("agenciamento").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_seed_from_yaml_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("agenciamento.yaml"),
            r#"
id: agenciamento
name: Agenciamento
target_kind: client
version: "2.0"
tokens: ["{CLIENTE_RAZAO_SOCIAL}"]
body: "<p>{CLIENTE_RAZAO_SOCIAL}</p>"
"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("README.txt"), "ignored").unwrap();

        let store = MemoryTemplateStore::new();
        let count = TemplateSeed::seed(&store, dir.path()).await.unwrap();
        assert_eq!(count, 1);

        let loaded = store.load("agenciamento").await.unwrap().unwrap();
        assert_eq!(loaded.version, "2.0");
        assert!(loaded.active);
    }
}
