//! PostgreSQL adapters for the contract and template stores
//!
//! Schema lives in `migrations/`. Structured parts of a contract (roster,
//! snapshot, history) are JSONB columns; everything the list screens filter
//! on is a plain column.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::contract::{ContractStatus, GeneratedContract, ServiceRef, TemplateRef};
use crate::entity::EntityKind;
use crate::store::ContractStore;
use crate::template::{ContractTemplate, TemplateStore};

pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Running contract migrations")
}

#[derive(Debug, FromRow)]
struct ContractRow {
    id: Uuid,
    template_id: String,
    template_nome: String,
    template_versao: String,
    entidade_id: String,
    entidade_nome: String,
    entidade_tipo: String,
    servico_id: Option<String>,
    servico_nome: Option<String>,
    status_geral: String,
    documento_html: String,
    dados_snapshot: serde_json::Value,
    signatarios: serde_json::Value,
    historico: serde_json::Value,
    data_geracao: DateTime<Utc>,
    data_envio_assinatura: Option<DateTime<Utc>>,
    prazo_assinatura: Option<DateTime<Utc>>,
    data_ultima_assinatura: Option<DateTime<Utc>>,
    data_conclusao: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ContractRow> for GeneratedContract {
    type Error = anyhow::Error;

    fn try_from(row: ContractRow) -> Result<Self> {
        let service = match (row.servico_id, row.servico_nome) {
            (Some(id), name) => Some(ServiceRef {
                name: name.unwrap_or_else(|| id.clone()),
                id,
            }),
            (None, _) => None,
        };

        Ok(GeneratedContract {
            id: row.id,
            template: TemplateRef {
                id: row.template_id,
                name: row.template_nome,
                version: row.template_versao,
            },
            entity_kind: row.entidade_tipo.parse::<EntityKind>()?,
            entity_id: row.entidade_id,
            entity_name: row.entidade_nome,
            service,
            document_html: row.documento_html,
            signatories: serde_json::from_value(row.signatarios)
                .with_context(|| format!("Decoding signatarios of {}", row.id))?,
            status: row.status_geral.parse::<ContractStatus>()?,
            snapshot: serde_json::from_value(row.dados_snapshot)
                .with_context(|| format!("Decoding dados_snapshot of {}", row.id))?,
            generated_at: row.data_geracao,
            sent_at: row.data_envio_assinatura,
            signing_deadline: row.prazo_assinatura,
            last_signed_at: row.data_ultima_assinatura,
            completed_at: row.data_conclusao,
            history: serde_json::from_value(row.historico)
                .with_context(|| format!("Decoding historico of {}", row.id))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const CONTRACT_COLUMNS: &str = r#"
    id, template_id, template_nome, template_versao,
    entidade_id, entidade_nome, entidade_tipo, servico_id, servico_nome,
    status_geral, documento_html, dados_snapshot, signatarios, historico,
    data_geracao, data_envio_assinatura, prazo_assinatura,
    data_ultima_assinatura, data_conclusao, created_at, updated_at
"#;

/// ContractStore over the `generated_contracts` table.
pub struct PgContractStore {
    pool: PgPool,
}

impl PgContractStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ContractStore for PgContractStore {
    async fn save(&self, contract: &GeneratedContract) -> Result<()> {
        let signatarios = serde_json::to_value(&contract.signatories)?;
        let snapshot = serde_json::to_value(&contract.snapshot)?;
        let historico = serde_json::to_value(&contract.history)?;

        sqlx::query(
            r#"
            INSERT INTO generated_contracts (
                id, template_id, template_nome, template_versao,
                entidade_id, entidade_nome, entidade_tipo, servico_id, servico_nome,
                status_geral, documento_html, dados_snapshot, signatarios, historico,
                data_geracao, data_envio_assinatura, prazo_assinatura,
                data_ultima_assinatura, data_conclusao, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21)
            ON CONFLICT (id) DO UPDATE SET
                status_geral = EXCLUDED.status_geral,
                documento_html = EXCLUDED.documento_html,
                dados_snapshot = EXCLUDED.dados_snapshot,
                signatarios = EXCLUDED.signatarios,
                historico = EXCLUDED.historico,
                data_envio_assinatura = EXCLUDED.data_envio_assinatura,
                prazo_assinatura = EXCLUDED.prazo_assinatura,
                data_ultima_assinatura = EXCLUDED.data_ultima_assinatura,
                data_conclusao = EXCLUDED.data_conclusao,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(contract.id)
        .bind(&contract.template.id)
        .bind(&contract.template.name)
        .bind(&contract.template.version)
        .bind(&contract.entity_id)
        .bind(&contract.entity_name)
        .bind(contract.entity_kind.as_str())
        .bind(contract.service.as_ref().map(|s| s.id.as_str()))
        .bind(contract.service.as_ref().map(|s| s.name.as_str()))
        .bind(contract.status.as_str())
        .bind(&contract.document_html)
        .bind(snapshot)
        .bind(signatarios)
        .bind(historico)
        .bind(contract.generated_at)
        .bind(contract.sent_at)
        .bind(contract.signing_deadline)
        .bind(contract.last_signed_at)
        .bind(contract.completed_at)
        .bind(contract.created_at)
        .bind(contract.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Saving contract {}", contract.id))?;

        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<GeneratedContract>> {
        let row: Option<ContractRow> = sqlx::query_as(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM generated_contracts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Loading contract {id}"))?;

        row.map(GeneratedContract::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<GeneratedContract>> {
        let rows: Vec<ContractRow> = sqlx::query_as(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM generated_contracts ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Listing contracts")?;

        rows.into_iter().map(GeneratedContract::try_from).collect()
    }
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    id: String,
    nome: String,
    tipo_entidade: String,
    corpo_html: String,
    tokens: serde_json::Value,
    versao: String,
    ativo: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for ContractTemplate {
    type Error = anyhow::Error;

    fn try_from(row: TemplateRow) -> Result<Self> {
        Ok(ContractTemplate {
            tokens: serde_json::from_value(row.tokens)
                .with_context(|| format!("Decoding tokens of template {}", row.id))?,
            id: row.id,
            name: row.nome,
            target_kind: row.tipo_entidade.parse::<EntityKind>()?,
            body: row.corpo_html,
            version: row.versao,
            active: row.ativo,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const TEMPLATE_COLUMNS: &str =
    "id, nome, tipo_entidade, corpo_html, tokens, versao, ativo, created_at, updated_at";

/// TemplateStore over the `contract_templates` table.
pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn save(&self, template: &ContractTemplate) -> Result<ContractTemplate> {
        let undeclared = template.undeclared_tokens();
        if !undeclared.is_empty() {
            tracing::warn!(template = %template.id, ?undeclared, "template uses undeclared tokens");
        }

        let row: TemplateRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO contract_templates
                (id, nome, tipo_entidade, corpo_html, tokens, versao, ativo, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (id) DO UPDATE SET
                nome = EXCLUDED.nome,
                tipo_entidade = EXCLUDED.tipo_entidade,
                corpo_html = EXCLUDED.corpo_html,
                tokens = EXCLUDED.tokens,
                versao = EXCLUDED.versao,
                ativo = EXCLUDED.ativo,
                updated_at = NOW()
            RETURNING {TEMPLATE_COLUMNS}
            "#
        ))
        .bind(&template.id)
        .bind(&template.name)
        .bind(template.target_kind.as_str())
        .bind(&template.body)
        .bind(serde_json::to_value(&template.tokens)?)
        .bind(&template.version)
        .bind(template.active)
        .bind(template.created_at)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Saving template {}", template.id))?;

        row.try_into()
    }

    async fn load(&self, id: &str) -> Result<Option<ContractTemplate>> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM contract_templates WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Loading template {id}"))?;

        row.map(ContractTemplate::try_from).transpose()
    }

    async fn list(&self, kind: Option<EntityKind>, active_only: bool) -> Result<Vec<ContractTemplate>> {
        let rows: Vec<TemplateRow> = sqlx::query_as(&format!(
            r#"
            SELECT {TEMPLATE_COLUMNS} FROM contract_templates
            WHERE ($1::text IS NULL OR tipo_entidade = $1)
              AND (NOT $2 OR ativo)
            ORDER BY nome, id
            "#
        ))
        .bind(kind.map(|k| k.as_str()))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .context("Listing templates")?;

        rows.into_iter().map(ContractTemplate::try_from).collect()
    }

    async fn deactivate(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE contract_templates SET ativo = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Deactivating template {id}"))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::tests::sample_contract;
    use crate::contract::{Signatory, SignatoryRole};
    use crate::template::tests::sample_template;

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.expect("connect");
        migrate(&pool).await.expect("migrate");
        pool
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_contract_round_trip() {
        let store = PgContractStore::new(pool().await);
        let mut contract = sample_contract(vec![Signatory::new(
            "Ana Lima",
            Some("ana@aumiau.com.br".into()),
            SignatoryRole::Client,
        )]);
        contract.service = Some(ServiceRef {
            id: "svc-1".into(),
            name: "Agenciamento".into(),
        });
        store.save(&contract).await.unwrap();

        contract.status = ContractStatus::Cancelled;
        store.save(&contract).await.unwrap();

        let loaded = store.load(contract.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ContractStatus::Cancelled);
        assert_eq!(loaded.signatories, contract.signatories);
        assert_eq!(loaded.service, contract.service);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_template_upsert_and_deactivate() {
        let store = PgTemplateStore::new(pool().await);
        let mut template = sample_template(EntityKind::Client);
        template.id = format!("agenciamento-{}", Uuid::new_v4());

        let first = store.save(&template).await.unwrap();
        template.version = "1.1".into();
        let second = store.save(&template).await.unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.version, "1.1");

        assert!(store.deactivate(&template.id).await.unwrap());
        let loaded = store.load(&template.id).await.unwrap().unwrap();
        assert!(!loaded.active);
    }
}
