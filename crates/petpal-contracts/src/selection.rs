//! Tie-break rules for picking one record out of several candidates.
//!
//! Every rule here is "first in stored order". That is a placeholder rather
//! than a business rule; keep all selection in this module so it can be
//! replaced in one place.

use crate::entity::{Agency, ClientCompany, ContractedService, Partner, Representative};
use crate::error::{ContractError, ContractResult};

fn head_office_representatives(
    company: &ClientCompany,
) -> impl Iterator<Item = &Representative> {
    company
        .business_units
        .iter()
        .filter(|unit| unit.head_office)
        .flat_map(|unit| unit.representatives.iter())
}

/// First representative of the registered (head-office) unit.
pub fn head_office_representative(company: &ClientCompany) -> Option<&Representative> {
    head_office_representatives(company).next()
}

/// The explicitly selected service, or the first active one.
///
/// An explicit id that the company does not have is a validation error;
/// an inactive explicit selection is honored.
pub fn primary_service<'a>(
    company: &'a ClientCompany,
    explicit: Option<&str>,
) -> ContractResult<Option<&'a ContractedService>> {
    match explicit {
        Some(id) => company
            .services
            .iter()
            .find(|s| s.id == id)
            .map(Some)
            .ok_or_else(|| {
                ContractError::Validation(format!(
                    "service {id} is not contracted by {}",
                    company.id
                ))
            }),
        None => Ok(company.services.iter().find(|s| s.active)),
    }
}

/// Default agency signatory.
pub fn default_partner(agency: &Agency) -> Option<&Partner> {
    agency.partners.first()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::{sample_agency, sample_company};

    #[test]
    fn test_representative_comes_from_head_office() {
        let company = sample_company();
        let rep = head_office_representative(&company).unwrap();
        assert_eq!(rep.name, "Ana Lima");
    }

    #[test]
    fn test_no_head_office_means_no_representative() {
        let mut company = sample_company();
        for unit in &mut company.business_units {
            unit.head_office = false;
        }
        assert!(head_office_representative(&company).is_none());
    }

    #[test]
    fn test_first_active_service_in_stored_order() {
        let company = sample_company();
        let service = primary_service(&company, None).unwrap().unwrap();
        assert_eq!(service.id, "svc-1");
    }

    #[test]
    fn test_explicit_service_selection() {
        let company = sample_company();
        let service = primary_service(&company, Some("svc-old")).unwrap().unwrap();
        assert_eq!(service.name, "Gestão de Redes");

        let err = primary_service(&company, Some("missing")).unwrap_err();
        assert!(matches!(err, ContractError::Validation(_)));
    }

    #[test]
    fn test_default_partner_is_first() {
        let agency = sample_agency();
        assert_eq!(default_partner(&agency).unwrap().name, "Rafael Costa");
    }
}
