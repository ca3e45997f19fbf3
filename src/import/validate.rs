//! Row validation — required-field presence, entity-specific field
//! rules, and uniqueness-against-store checks.
//!
//! Errors are collected per row and never stop other rows from being
//! validated.

use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::import::types::{MappingConfig, RowError};
use crate::store::Store;
use crate::store::models::Role;

/// Tokens treated as equivalent to an absent value.
pub const PLACEHOLDER_TOKENS: &[&str] = &["—", "-", "--", "N/A", "NULL"];

/// True when a value is missing for validation purposes.
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || PLACEHOLDER_TOKENS
            .iter()
            .any(|t| trimmed.eq_ignore_ascii_case(t))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w.+-]+@[\w.-]+\.\w+$").expect("static regex"))
}

/// Basic email syntax check.
pub fn is_valid_email(value: &str) -> bool {
    email_regex().is_match(value.trim())
}

/// SIREN-style identifier: 9 digits (establishment-level ids carry 14).
pub fn is_valid_siren(value: &str) -> bool {
    let trimmed = value.trim();
    (trimmed.len() == 9 || trimmed.len() == 14) && trimmed.chars().all(|c| c.is_ascii_digit())
}

/// Validate one transformed row against the mapping and the store.
pub async fn validate_row(
    fields: &Map<String, Value>,
    mapping: &MappingConfig,
    store: &Arc<dyn Store>,
) -> Vec<RowError> {
    let mut errors = Vec::new();

    // Required-field presence, with placeholder tokens counting as
    // absent.
    for rule in &mapping.rules {
        if !rule.required {
            continue;
        }
        let missing = match fields.get(&rule.target_field) {
            None => true,
            Some(Value::String(s)) => is_placeholder(s),
            Some(Value::Null) => true,
            Some(_) => false,
        };
        if missing {
            errors.push(RowError::new(
                &rule.target_field,
                "required field is missing",
            ));
        }
    }

    // Email: syntax plus uniqueness within the target role.
    if let Some(Value::String(email)) = fields.get("email") {
        if !is_placeholder(email) {
            if !is_valid_email(email) {
                errors.push(RowError::new("email", format!("invalid email: {email}")));
            } else {
                match store.profile_email_exists(mapping.entity_type, email).await {
                    Ok(true) => errors.push(RowError::new(
                        "email",
                        format!("{email} already exists for {}", role_label(mapping.entity_type)),
                    )),
                    Ok(false) => {}
                    Err(e) => errors.push(RowError::new("email", e.to_string())),
                }
            }
        }
    }

    // SIREN: length/digit check plus uniqueness.
    if let Some(Value::String(siren)) = fields.get("siren") {
        if !is_placeholder(siren) {
            if !is_valid_siren(siren) {
                errors.push(RowError::new(
                    "siren",
                    format!("identifier must be 9 or 14 digits: {siren}"),
                ));
            } else {
                match store.profile_siren_exists(mapping.entity_type, siren.trim()).await {
                    Ok(true) => errors.push(RowError::new(
                        "siren",
                        format!("{siren} already exists for {}", role_label(mapping.entity_type)),
                    )),
                    Ok(false) => {}
                    Err(e) => errors.push(RowError::new("siren", e.to_string())),
                }
            }
        }
    }

    // Numeric constraints declared on rules.
    for rule in &mapping.rules {
        let Some(numeric) = rule.numeric else { continue };
        let Some(value) = fields.get(&rule.target_field) else {
            continue;
        };
        match value.as_f64() {
            Some(n) => {
                if n < 0.0 {
                    errors.push(RowError::new(
                        &rule.target_field,
                        format!("must not be negative: {n}"),
                    ));
                } else if numeric.integer && n.fract() != 0.0 {
                    errors.push(RowError::new(
                        &rule.target_field,
                        format!("must be an integer: {n}"),
                    ));
                }
            }
            None => errors.push(RowError::new(
                &rule.target_field,
                "expected a numeric value",
            )),
        }
    }

    errors
}

fn role_label(role: Role) -> &'static str {
    role.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::types::{MappingRule, NumericRule};
    use crate::store::LibSqlStore;
    use crate::store::models::NewProfile;

    fn mapping(rules: Vec<MappingRule>) -> MappingConfig {
        MappingConfig {
            entity_type: Role::Client,
            rules,
        }
    }

    fn required(field: &str) -> MappingRule {
        MappingRule {
            column: field.into(),
            target_field: field.into(),
            required: true,
            default_value: None,
            transform: None,
            numeric: None,
        }
    }

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    async fn store() -> Arc<dyn Store> {
        Arc::new(LibSqlStore::new_memory().await.unwrap())
    }

    #[test]
    fn placeholder_tokens_count_as_absent() {
        for token in ["", " ", "—", "-", "--", "N/A", "n/a", "NULL", "null"] {
            assert!(is_placeholder(token), "{token:?} should be a placeholder");
        }
        assert!(!is_placeholder("Acme"));
        assert!(!is_placeholder("0"));
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("jane@acme.com"));
        assert!(is_valid_email("jane.doe+tag@sub.acme.co"));
        assert!(!is_valid_email("jane@"));
        assert!(!is_valid_email("not-an-email"));
    }

    #[test]
    fn siren_length_check() {
        assert!(is_valid_siren("123456789"));
        assert!(is_valid_siren("12345678901234"));
        assert!(!is_valid_siren("12345"));
        assert!(!is_valid_siren("12345678X"));
    }

    #[tokio::test]
    async fn missing_required_field_is_reported() {
        let store = store().await;
        let errors = validate_row(
            &fields(&[("email", Value::String("jane@acme.com".into()))]),
            &mapping(vec![required("email"), required("company_name")]),
            &store,
        )
        .await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "company_name");
    }

    #[tokio::test]
    async fn placeholder_in_required_field_is_reported() {
        let store = store().await;
        let errors = validate_row(
            &fields(&[
                ("email", Value::String("jane@acme.com".into())),
                ("company_name", Value::String("—".into())),
            ]),
            &mapping(vec![required("email"), required("company_name")]),
            &store,
        )
        .await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "company_name");
    }

    #[tokio::test]
    async fn duplicate_email_against_store() {
        let backing = LibSqlStore::new_memory().await.unwrap();
        backing
            .insert_profile(NewProfile {
                role: Role::Client,
                email: "jane@acme.com".into(),
                first_name: None,
                last_name: None,
                company_name: None,
                siren: None,
                phone: None,
                city: None,
                auth_user_id: None,
            })
            .await
            .unwrap();
        let store: Arc<dyn Store> = Arc::new(backing);

        let errors = validate_row(
            &fields(&[("email", Value::String("JANE@ACME.COM".into()))]),
            &mapping(vec![required("email")]),
            &store,
        )
        .await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("already exists"));
    }

    #[tokio::test]
    async fn numeric_constraints() {
        let store = store().await;
        let mut amount = required("amount");
        amount.required = false;
        amount.numeric = Some(NumericRule { integer: false });
        let mut seats = required("seats");
        seats.required = false;
        seats.numeric = Some(NumericRule { integer: true });

        let errors = validate_row(
            &fields(&[
                ("amount", serde_json::json!(-10.0)),
                ("seats", serde_json::json!(2.5)),
            ]),
            &mapping(vec![amount, seats]),
            &store,
        )
        .await;
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.field == "amount"));
        assert!(errors.iter().any(|e| e.field == "seats"));
    }
}
