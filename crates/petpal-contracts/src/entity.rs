//! Contract target entities and the issuing agency
//!
//! A contract is generated for exactly one `TargetEntity`. Both variants
//! implement [`ContractParty`], which is the only way the resolution and roster
//! code talks to them.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::contract::{Signatory, SignatoryRole};
use crate::error::{ContractError, ContractResult};
use crate::format;
use crate::resolution::{ResolutionContext, TokenTable, TokenValue};
use crate::selection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Employee,
    Client,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employee" | "funcionario" => Ok(Self::Employee),
            "client" | "cliente" => Ok(Self::Client),
            other => Err(ContractError::Validation(format!(
                "unknown entity kind: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub complement: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub postal_code: Option<String>,
}

impl Address {
    /// `Rua das Flores, 120 - Sala 3 - Centro, Campinas/SP, CEP 13010-000`
    pub fn one_line(&self) -> String {
        let mut line = self.street.trim().to_string();
        if let Some(number) = non_blank(&self.number) {
            line.push_str(&format!(", {number}"));
        }
        if let Some(complement) = non_blank(&self.complement) {
            line.push_str(&format!(" - {complement}"));
        }
        if let Some(district) = non_blank(&self.district) {
            line.push_str(&format!(" - {district}"));
        }
        line.push_str(&format!(", {}/{}", self.city.trim(), self.state.trim()));
        if let Some(cep) = non_blank(&self.postal_code) {
            line.push_str(&format!(", CEP {}", format::postal_code(cep)));
        }
        line
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VetLicense {
    pub number: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub compensation: Option<Decimal>,
    #[serde(default)]
    pub hire_date: Option<NaiveDate>,
    #[serde(default)]
    pub vet_license: Option<VetLicense>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representative {
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Representative {
    pub fn has_email(&self) -> bool {
        non_blank(&self.email).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessUnit {
    pub id: String,
    pub name: String,
    /// Registered head office (matriz)
    #[serde(default)]
    pub head_office: bool,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub representatives: Vec<Representative>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractedService {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub monthly_value: Option<Decimal>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientCompany {
    pub id: String,
    pub legal_name: String,
    #[serde(default)]
    pub trade_name: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub business_units: Vec<BusinessUnit>,
    #[serde(default)]
    pub services: Vec<ContractedService>,
}

impl ClientCompany {
    /// Name shown to people: the trade name when present.
    pub fn public_name(&self) -> &str {
        non_blank(&self.trade_name).unwrap_or(&self.legal_name)
    }

    /// Head-office address, falling back to the first unit with an address.
    pub fn registered_address(&self) -> Option<&Address> {
        self.business_units
            .iter()
            .filter(|u| u.head_office)
            .chain(self.business_units.iter())
            .find_map(|u| u.address.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partner {
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// The agency issuing every contract. Exactly one is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub legal_name: String,
    pub tax_id: String,
    #[serde(default)]
    pub founded_on: Option<NaiveDate>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub partners: Vec<Partner>,
}

/// Capabilities every contract target provides.
pub trait ContractParty {
    fn kind(&self) -> EntityKind;

    fn entity_id(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Add this party's tokens to `table`.
    fn resolve_tokens(&self, ctx: &ResolutionContext, table: &mut TokenTable)
        -> ContractResult<()>;

    /// Signatories this party contributes, in signing order.
    fn default_signatories(&self) -> ContractResult<Vec<Signatory>>;
}

impl ContractParty for Employee {
    fn kind(&self) -> EntityKind {
        EntityKind::Employee
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn resolve_tokens(
        &self,
        _ctx: &ResolutionContext,
        table: &mut TokenTable,
    ) -> ContractResult<()> {
        table.set("{FUNCIONARIO_NOME}", TokenValue::text(&self.name));
        table.set(
            "{FUNCIONARIO_CPF}",
            TokenValue::from_option(self.tax_id.as_deref().map(format::tax_id)),
        );
        table.set(
            "{FUNCIONARIO_EMAIL}",
            TokenValue::from_option(self.email.clone()),
        );
        table.set(
            "{FUNCIONARIO_ENDERECO}",
            TokenValue::from_option(self.address.as_ref().map(Address::one_line)),
        );
        table.set(
            "{FUNCIONARIO_CARGO}",
            TokenValue::from_option(self.job_title.clone()),
        );
        table.set(
            "{FUNCIONARIO_SALARIO}",
            TokenValue::from_option(self.compensation.map(format::brl)),
        );
        table.set(
            "{FUNCIONARIO_DATA_ADMISSAO}",
            TokenValue::from_option(self.hire_date.map(format::date_br)),
        );
        table.set(
            "{FUNCIONARIO_CRMV}",
            TokenValue::from_option(
                self.vet_license
                    .as_ref()
                    .map(|l| format!("CRMV-{} {}", l.state, l.number)),
            ),
        );
        Ok(())
    }

    fn default_signatories(&self) -> ContractResult<Vec<Signatory>> {
        if non_blank(&self.email).is_none() {
            return Err(ContractError::MissingContactInfo(format!(
                "employee {} ({}) has no email",
                self.name, self.id
            )));
        }
        Ok(vec![Signatory::new(
            self.name.clone(),
            self.email.clone(),
            SignatoryRole::Employee,
        )])
    }
}

impl ContractParty for ClientCompany {
    fn kind(&self) -> EntityKind {
        EntityKind::Client
    }

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.legal_name
    }

    fn resolve_tokens(&self, ctx: &ResolutionContext, table: &mut TokenTable) -> ContractResult<()> {
        table.set("{CLIENTE_RAZAO_SOCIAL}", TokenValue::text(&self.legal_name));
        table.set(
            "{CLIENTE_NOME_FANTASIA}",
            TokenValue::from_option(self.trade_name.clone()),
        );
        table.set(
            "{CLIENTE_CNPJ}",
            TokenValue::from_option(self.tax_id.as_deref().map(format::tax_id)),
        );
        table.set(
            "{CLIENTE_ENDERECO}",
            TokenValue::from_option(self.registered_address().map(Address::one_line)),
        );

        let representative = selection::head_office_representative(self);
        table.set(
            "{REPRESENTANTE_NOME}",
            TokenValue::from_option(representative.map(|r| r.name.clone())),
        );
        table.set(
            "{REPRESENTANTE_CPF}",
            TokenValue::from_option(
                representative.and_then(|r| r.tax_id.as_deref().map(format::tax_id)),
            ),
        );
        table.set(
            "{REPRESENTANTE_EMAIL}",
            TokenValue::from_option(representative.and_then(|r| r.email.clone())),
        );
        table.set(
            "{REPRESENTANTE_CARGO}",
            TokenValue::from_option(representative.and_then(|r| r.role.clone())),
        );

        let service = selection::primary_service(self, ctx.service_id.as_deref())?;
        table.set(
            "{SERVICO_NOME}",
            TokenValue::from_option(service.map(|s| s.name.clone())),
        );
        table.set(
            "{SERVICO_DESCRICAO}",
            TokenValue::from_option(service.and_then(|s| s.description.clone())),
        );
        table.set(
            "{SERVICO_VALOR}",
            TokenValue::from_option(service.and_then(|s| s.monthly_value).map(format::brl)),
        );
        Ok(())
    }

    /// The representative named in the document signs; without an email
    /// the company primary contact signs instead.
    fn default_signatories(&self) -> ContractResult<Vec<Signatory>> {
        let representative =
            selection::head_office_representative(self).filter(|rep| rep.has_email());
        let signatory = match representative {
            Some(rep) => Signatory::new(rep.name.clone(), rep.email.clone(), SignatoryRole::Client),
            None => {
                tracing::debug!(
                    company = %self.id,
                    "head-office representative has no email, using primary contact"
                );
                Signatory::new(
                    format!("{} (contato principal)", self.public_name()),
                    self.contact_email.clone(),
                    SignatoryRole::Client,
                )
            }
        };
        Ok(vec![signatory])
    }
}

/// The entity a contract is generated for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetEntity {
    Employee(Employee),
    Client(ClientCompany),
}

impl TargetEntity {
    pub fn as_party(&self) -> &dyn ContractParty {
        match self {
            Self::Employee(employee) => employee,
            Self::Client(company) => company,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.as_party().kind()
    }

    pub fn entity_id(&self) -> &str {
        self.as_party().entity_id()
    }

    pub fn display_name(&self) -> &str {
        self.as_party().display_name()
    }

    /// Service the contract will be linked to (clients only).
    pub fn selected_service(
        &self,
        ctx: &ResolutionContext,
    ) -> ContractResult<Option<&ContractedService>> {
        match self {
            Self::Employee(_) => Ok(None),
            Self::Client(company) => selection::primary_service(company, ctx.service_id.as_deref()),
        }
    }
}
