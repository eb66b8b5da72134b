//! Variable Resolution Engine
//!
//! Maps `(template, target entity, agency, context)` to a flat table of
//! `{TOKEN}` → value. Fields that are absent resolve to [`TokenValue::Missing`]
//! so the renderer can flag them instead of printing an empty string.
//!
//! Resolution is pure: no store access, no clock (the generation date comes
//! in through [`ResolutionContext`]).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entity::{Address, Agency, TargetEntity};
use crate::error::{ContractError, ContractResult};
use crate::format;
use crate::selection;
use crate::template::ContractTemplate;

/// Resolved value of one token.
///
/// On the wire a value is a string or `null`; a blank string reads back as
/// `Missing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum TokenValue {
    Resolved(String),
    /// Source field was absent, null or blank
    Missing,
}

impl TokenValue {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Self::Missing
        } else {
            Self::Resolved(value)
        }
    }

    pub fn from_option(value: Option<String>) -> Self {
        value.map(Self::text).unwrap_or(Self::Missing)
    }

    pub fn as_resolved(&self) -> Option<&str> {
        match self {
            Self::Resolved(v) => Some(v),
            Self::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl From<Option<String>> for TokenValue {
    fn from(value: Option<String>) -> Self {
        Self::from_option(value)
    }
}

impl From<TokenValue> for Option<String> {
    fn from(value: TokenValue) -> Self {
        match value {
            TokenValue::Resolved(v) => Some(v),
            TokenValue::Missing => None,
        }
    }
}

/// Token → value table, ordered for deterministic serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenTable(BTreeMap<String, TokenValue>);

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, token: impl Into<String>, value: TokenValue) {
        self.0.insert(token.into(), value);
    }

    pub fn get(&self, token: &str) -> Option<&TokenValue> {
        self.0.get(token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains_key(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TokenValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tokens that could not be resolved.
    pub fn missing(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, v)| v.is_missing())
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

impl FromIterator<(String, TokenValue)> for TokenTable {
    fn from_iter<I: IntoIterator<Item = (String, TokenValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Inputs to resolution that do not come from stored records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionContext {
    /// Date printed as `{DATA_ATUAL}`
    pub generated_on: NaiveDate,
    /// Explicitly selected contracted service (clients only)
    pub service_id: Option<String>,
}

impl ResolutionContext {
    pub fn new(generated_on: NaiveDate) -> Self {
        Self {
            generated_on,
            service_id: None,
        }
    }

    pub fn with_service(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }
}

pub struct VariableResolver;

impl VariableResolver {
    /// Build the substitution table for one contract.
    pub fn resolve(
        template: &ContractTemplate,
        entity: &TargetEntity,
        agency: &Agency,
        ctx: &ResolutionContext,
    ) -> ContractResult<TokenTable> {
        if template.target_kind != entity.kind() {
            return Err(ContractError::Validation(format!(
                "template {} targets {} but entity {} is {}",
                template.id,
                template.target_kind,
                entity.entity_id(),
                entity.kind()
            )));
        }

        let mut table = TokenTable::new();
        entity.as_party().resolve_tokens(ctx, &mut table)?;
        Self::agency_tokens(agency, &mut table);
        table.set("{DATA_ATUAL}", TokenValue::text(format::date_br(ctx.generated_on)));

        // Declared tokens nobody knows how to fill are flagged, not dropped
        for token in &template.tokens {
            if !table.contains(token) {
                table.set(token.clone(), TokenValue::Missing);
            }
        }

        let missing = table.missing();
        if !missing.is_empty() {
            tracing::debug!(
                template = %template.id,
                entity = %entity.entity_id(),
                ?missing,
                "unresolved tokens"
            );
        }
        Ok(table)
    }

    fn agency_tokens(agency: &Agency, table: &mut TokenTable) {
        table.set("{AGENCIA_RAZAO_SOCIAL}", TokenValue::text(&agency.legal_name));
        table.set("{AGENCIA_CNPJ}", TokenValue::text(format::tax_id(&agency.tax_id)));
        table.set(
            "{AGENCIA_ENDERECO}",
            TokenValue::from_option(agency.address.as_ref().map(Address::one_line)),
        );
        table.set(
            "{AGENCIA_TELEFONE}",
            TokenValue::from_option((!agency.phones.is_empty()).then(|| agency.phones.join(" / "))),
        );
        table.set(
            "{AGENCIA_DATA_FUNDACAO}",
            TokenValue::from_option(agency.founded_on.map(format::date_br)),
        );

        let partner = selection::default_partner(agency);
        table.set(
            "{SOCIO_NOME}",
            TokenValue::from_option(partner.map(|p| p.name.clone())),
        );
        table.set(
            "{SOCIO_CPF}",
            TokenValue::from_option(partner.and_then(|p| p.tax_id.as_deref().map(format::tax_id))),
        );
        table.set(
            "{SOCIO_EMAIL}",
            TokenValue::from_option(partner.and_then(|p| p.email.clone())),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::{sample_agency, sample_company, sample_employee};
    use crate::entity::EntityKind;
    use crate::template::tests::sample_template;

    fn ctx() -> ResolutionContext {
        ResolutionContext::new(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
    }

    fn resolved<'a>(table: &'a TokenTable, token: &str) -> &'a str {
        table
            .get(token)
            .and_then(TokenValue::as_resolved)
            .unwrap_or_else(|| panic!("{token} not resolved"))
    }

    #[test]
    fn test_employee_tokens() {
        let template = sample_template(EntityKind::Employee);
        let entity = TargetEntity::Employee(sample_employee());
        let table = VariableResolver::resolve(&template, &entity, &sample_agency(), &ctx()).unwrap();

        assert_eq!(resolved(&table, "{FUNCIONARIO_NOME}"), "Marina Souza");
        assert_eq!(resolved(&table, "{FUNCIONARIO_CPF}"), "123.456.789-01");
        assert_eq!(resolved(&table, "{FUNCIONARIO_SALARIO}"), "R$ 4.200,00");
        assert_eq!(resolved(&table, "{FUNCIONARIO_DATA_ADMISSAO}"), "05/02/2024");
        assert_eq!(resolved(&table, "{FUNCIONARIO_CRMV}"), "CRMV-SP 12345");
        assert_eq!(resolved(&table, "{DATA_ATUAL}"), "15/01/2025");
    }

    #[test]
    fn test_client_tokens_use_head_office_and_first_active_service() {
        let template = sample_template(EntityKind::Client);
        let entity = TargetEntity::Client(sample_company());
        let table = VariableResolver::resolve(&template, &entity, &sample_agency(), &ctx()).unwrap();

        assert_eq!(resolved(&table, "{CLIENTE_RAZAO_SOCIAL}"), "AuMiau VetCare Ltda");
        assert_eq!(resolved(&table, "{CLIENTE_CNPJ}"), "12.345.678/0001-95");
        assert_eq!(resolved(&table, "{REPRESENTANTE_NOME}"), "Ana Lima");
        assert_eq!(resolved(&table, "{SERVICO_NOME}"), "Agenciamento");
        assert_eq!(resolved(&table, "{SERVICO_VALOR}"), "R$ 2.500,00");
        assert_eq!(resolved(&table, "{SOCIO_NOME}"), "Rafael Costa");
    }

    #[test]
    fn test_missing_representative_is_flagged() {
        let template = sample_template(EntityKind::Client);
        let mut company = sample_company();
        company.business_units.retain(|u| !u.head_office);
        let entity = TargetEntity::Client(company);
        let table = VariableResolver::resolve(&template, &entity, &sample_agency(), &ctx()).unwrap();

        assert_eq!(table.get("{REPRESENTANTE_NOME}"), Some(&TokenValue::Missing));
        assert!(table.missing().contains(&"{REPRESENTANTE_NOME}"));
    }

    #[test]
    fn test_declared_unknown_token_is_missing() {
        let mut template = sample_template(EntityKind::Employee);
        template.tokens.push("{CAMPO_DESCONHECIDO}".into());
        let entity = TargetEntity::Employee(sample_employee());
        let table = VariableResolver::resolve(&template, &entity, &sample_agency(), &ctx()).unwrap();

        assert_eq!(table.get("{CAMPO_DESCONHECIDO}"), Some(&TokenValue::Missing));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let template = sample_template(EntityKind::Client);
        let entity = TargetEntity::Employee(sample_employee());
        let err = VariableResolver::resolve(&template, &entity, &sample_agency(), &ctx()).unwrap_err();
        assert!(matches!(err, ContractError::Validation(_)));
    }

    #[test]
    fn test_blank_values_are_missing() {
        assert_eq!(TokenValue::text("  "), TokenValue::Missing);
        assert_eq!(TokenValue::from_option(None), TokenValue::Missing);
    }

    #[test]
    fn test_token_table_json_shape() {
        let mut table = TokenTable::new();
        table.set("{A}", TokenValue::text("x"));
        table.set("{B}", TokenValue::Missing);
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json, serde_json::json!({"{A}": "x", "{B}": null}));

        let back: TokenTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_stored_blank_values_read_back_missing() {
        let table: TokenTable =
            serde_json::from_value(serde_json::json!({"{NOME}": "", "{CARGO}": "  "})).unwrap();
        assert_eq!(table.get("{NOME}"), Some(&TokenValue::Missing));
        assert_eq!(table.get("{CARGO}"), Some(&TokenValue::Missing));

        let html = crate::render::TemplateRenderer::render("<p>[{NOME}]</p>", &table);
        assert_eq!(html, "<p>[<span class=\"token-missing\">MISSING: NOME</span>]</p>");
    }
}
