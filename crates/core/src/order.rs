//! Incoming order validation.
//!
//! `NewOrder` is the caller-supplied shape of one business plan request.
//! Validation happens here, before anything is persisted -- the storage
//! layer assumes it only ever sees well-formed input.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A new business plan request, as received from the order intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    /// External item id in the order intake system. Unique across orders.
    pub podio_item_id: String,
    pub podio_workspace_id: Option<String>,
    pub podio_app_id: Option<String>,
    /// Polish tax identifier, exactly 10 digits.
    pub nip: String,
    /// Client full name.
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Services the client offers, in the order they were listed.
    #[serde(default)]
    pub services: Vec<String>,
    /// Expected annual revenue in PLN.
    pub expected_annual_revenue: Option<i64>,
    /// Free-text notes from the client.
    pub notes: Option<String>,
}

impl NewOrder {
    /// Reject malformed input before it reaches storage.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.podio_item_id.trim().is_empty() {
            return Err(DomainError::EmptyField {
                field: "podio_item_id".to_string(),
            });
        }
        if self.full_name.trim().is_empty() {
            return Err(DomainError::EmptyField {
                field: "full_name".to_string(),
            });
        }
        validate_nip(&self.nip)?;
        if let Some(revenue) = self.expected_annual_revenue {
            if revenue < 0 {
                return Err(DomainError::InvalidRevenue { value: revenue });
            }
        }
        Ok(())
    }
}

/// Check the NIP digit pattern: exactly 10 ASCII digits.
///
/// Checksum verification is the registry client's job; the entity layer only
/// guards the stored shape.
pub fn validate_nip(nip: &str) -> Result<(), DomainError> {
    if nip.len() == 10 && nip.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(DomainError::InvalidNip {
            value: nip.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> NewOrder {
        NewOrder {
            podio_item_id: "item-100".to_string(),
            podio_workspace_id: None,
            podio_app_id: None,
            nip: "1234567890".to_string(),
            full_name: "Jan Kowalski".to_string(),
            email: Some("jan@example.pl".to_string()),
            phone: None,
            services: vec!["Software Development".to_string()],
            expected_annual_revenue: Some(250_000),
            notes: None,
        }
    }

    #[test]
    fn valid_order_passes() {
        assert!(order().validate().is_ok());
    }

    #[test]
    fn nip_must_be_ten_digits() {
        assert!(validate_nip("1234567890").is_ok());
        assert!(validate_nip("123456789").is_err());
        assert!(validate_nip("12345678901").is_err());
        assert!(validate_nip("12345678ab").is_err());
        assert!(validate_nip("").is_err());
    }

    #[test]
    fn empty_identity_fields_rejected() {
        let mut o = order();
        o.podio_item_id = "  ".to_string();
        assert!(matches!(
            o.validate(),
            Err(DomainError::EmptyField { .. })
        ));

        let mut o = order();
        o.full_name = String::new();
        assert!(o.validate().is_err());
    }

    #[test]
    fn negative_revenue_rejected() {
        let mut o = order();
        o.expected_annual_revenue = Some(-1);
        assert_eq!(
            o.validate(),
            Err(DomainError::InvalidRevenue { value: -1 })
        );
    }
}
