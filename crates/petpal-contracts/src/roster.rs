//! Signatory roster construction

use crate::contract::{Signatory, SignatoryRole};
use crate::entity::{Agency, TargetEntity};
use crate::error::{ContractError, ContractResult};
use crate::selection;

pub struct RosterBuilder;

impl RosterBuilder {
    /// Ordered signatories for a new contract: the target party first, then
    /// the agency partner. Signing order is the 1-based position.
    pub fn build(entity: &TargetEntity, agency: &Agency) -> ContractResult<Vec<Signatory>> {
        let mut roster = entity.as_party().default_signatories()?;

        let partner = selection::default_partner(agency).ok_or_else(|| {
            ContractError::validation(format!(
                "agency {} has no partner to sign contracts",
                agency.legal_name
            ))
        })?;
        roster.push(Signatory::new(
            partner.name.clone(),
            partner.email.clone(),
            SignatoryRole::AgencyPartner,
        ));

        for (position, signatory) in roster.iter_mut().enumerate() {
            signatory.signing_order = Some(position as u32 + 1);
        }
        Ok(roster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::SignatureStatus;
    use crate::entity::tests::{sample_agency, sample_company, sample_employee};
    use crate::entity::{ContractParty, Representative};
    use crate::resolution::{ResolutionContext, TokenTable, TokenValue};
    use chrono::NaiveDate;

    #[test]
    fn test_client_roster_order() {
        let entity = TargetEntity::Client(sample_company());
        let roster = RosterBuilder::build(&entity, &sample_agency()).unwrap();

        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].name, "Ana Lima");
        assert_eq!(roster[0].role, SignatoryRole::Client);
        assert_eq!(roster[0].signing_order, Some(1));
        assert_eq!(roster[1].name, "Rafael Costa");
        assert_eq!(roster[1].role, SignatoryRole::AgencyPartner);
        assert_eq!(roster[1].signing_order, Some(2));
        assert!(roster.iter().all(|s| s.status == SignatureStatus::Pending));
    }

    #[test]
    fn test_employee_roster() {
        let entity = TargetEntity::Employee(sample_employee());
        let roster = RosterBuilder::build(&entity, &sample_agency()).unwrap();

        assert_eq!(roster[0].role, SignatoryRole::Employee);
        assert_eq!(roster[0].email.as_deref(), Some("marina@petpal.com.br"));
        assert_eq!(roster[1].role, SignatoryRole::AgencyPartner);
    }

    #[test]
    fn test_employee_without_email_fails() {
        let mut employee = sample_employee();
        employee.email = None;
        let err = RosterBuilder::build(&TargetEntity::Employee(employee), &sample_agency())
            .unwrap_err();
        assert!(matches!(err, ContractError::MissingContactInfo(_)));
    }

    #[test]
    fn test_agency_without_partner_fails() {
        let mut agency = sample_agency();
        agency.partners.clear();
        let err = RosterBuilder::build(&TargetEntity::Client(sample_company()), &agency)
            .unwrap_err();
        assert!(matches!(err, ContractError::Validation(_)));
    }

    #[test]
    fn test_named_representative_without_email_falls_back_to_contact() {
        let mut company = sample_company();
        let head_office = company
            .business_units
            .iter_mut()
            .find(|u| u.head_office)
            .unwrap();
        head_office.representatives.insert(
            0,
            Representative {
                name: "Bruno Sem Email".into(),
                tax_id: None,
                email: None,
                role: None,
            },
        );
        let contact_email = company.contact_email.clone();
        let entity = TargetEntity::Client(company);

        let mut tokens = TokenTable::new();
        let ctx = ResolutionContext::new(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        entity.as_party().resolve_tokens(&ctx, &mut tokens).unwrap();
        assert_eq!(
            tokens.get("{REPRESENTANTE_NOME}").and_then(TokenValue::as_resolved),
            Some("Bruno Sem Email")
        );

        // Ana has an email but is not the representative the document names
        let roster = RosterBuilder::build(&entity, &sample_agency()).unwrap();
        assert!(roster.iter().all(|s| s.name != "Ana Lima"));
        assert_eq!(roster[0].role, SignatoryRole::Client);
        assert!(roster[0].name.contains("contato principal"));
        assert_eq!(roster[0].email, contact_email);
    }

    #[test]
    fn test_signatory_ids_are_unique() {
        let entity = TargetEntity::Client(sample_company());
        let roster = RosterBuilder::build(&entity, &sample_agency()).unwrap();
        assert_ne!(roster[0].id, roster[1].id);
    }
}
