//! Import pipeline types — mapping configuration, options, and the
//! result aggregate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ImportError;
use crate::store::models::Role;

// ── File format ─────────────────────────────────────────────────────

/// Accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Xlsx,
    Xls,
    Csv,
}

impl ImportFormat {
    /// Infer the format from the uploaded file name.
    pub fn from_file_name(name: &str) -> Result<Self, ImportError> {
        let lower = name.to_lowercase();
        if lower.ends_with(".xlsx") {
            Ok(Self::Xlsx)
        } else if lower.ends_with(".xls") {
            Ok(Self::Xls)
        } else if lower.ends_with(".csv") {
            Ok(Self::Csv)
        } else {
            Err(ImportError::UnsupportedFormat(name.to_string()))
        }
    }
}

// ── Mapping configuration ───────────────────────────────────────────

/// Which related collection a fuzzy lookup resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupTarget {
    Expert,
    Apporteur,
    Product,
}

/// Numeric validation constraint attached to a rule.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NumericRule {
    /// Reject fractional values.
    #[serde(default)]
    pub integer: bool,
}

/// Cell transformation applied after the raw value is pulled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// Keep the raw string.
    Passthrough,
    /// Reparse a date from a named input pattern into ISO 8601.
    Date { input_format: String },
    /// Strip to digits, optionally replacing a leading zero with a
    /// country-code prefix.
    Phone {
        #[serde(default)]
        country_prefix: Option<String>,
    },
    /// Locale-aware decimal parsing.
    Number {
        #[serde(default = "default_decimal_separator")]
        decimal_separator: char,
        #[serde(default)]
        thousands_separator: Option<char>,
    },
    /// Parse a boolean from configurable token lists.
    Boolean {
        true_tokens: Vec<String>,
        false_tokens: Vec<String>,
    },
    /// Resolve free text to an existing related entity's id.
    Lookup { target: LookupTarget },
    /// Restricted arithmetic over previously transformed fields,
    /// e.g. `{amount} * 0.2`.
    Formula { expression: String },
    /// First token becomes `first_name`, the remainder `last_name`.
    SplitName,
}

fn default_decimal_separator() -> char {
    '.'
}

/// One configured column → field correspondence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRule {
    /// Source column header.
    pub column: String,
    /// Destination field name.
    pub target_field: String,
    #[serde(default)]
    pub required: bool,
    /// Used when the column is absent or the cell is blank.
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub numeric: Option<NumericRule>,
}

/// Full mapping configuration for one import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    pub entity_type: Role,
    pub rules: Vec<MappingRule>,
}

impl MappingConfig {
    /// Reject configurations that cannot produce a usable entity.
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.rules.is_empty() {
            return Err(ImportError::InvalidMapping("no mapping rules".into()));
        }
        if matches!(self.entity_type, Role::Admin) {
            return Err(ImportError::InvalidMapping(
                "admin accounts cannot be imported".into(),
            ));
        }
        if !self
            .rules
            .iter()
            .any(|r| r.target_field == "email" || matches!(r.transform, Some(Transform::SplitName)))
        {
            return Err(ImportError::InvalidMapping(
                "mapping must include an email field".into(),
            ));
        }
        Ok(())
    }
}

// ── Options ─────────────────────────────────────────────────────────

/// Import execution options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Report rows whose email/SIREN already exists as skipped
    /// instead of failing them.
    #[serde(default = "default_true")]
    pub skip_duplicates: bool,
    /// Issue credentials for each created entity.
    #[serde(default = "default_true")]
    pub generate_passwords: bool,
    /// Progress-reporting chunk size, clamped to 1..=500.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Keep processing rows after one fails.
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    50
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            skip_duplicates: true,
            generate_passwords: true,
            batch_size: default_batch_size(),
            continue_on_error: true,
        }
    }
}

impl ImportOptions {
    pub fn clamped_batch_size(&self) -> usize {
        self.batch_size.clamp(1, 500)
    }
}

// ── Results ─────────────────────────────────────────────────────────

/// One validation or creation error, anchored to a field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowError {
    pub field: String,
    pub message: String,
}

impl RowError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Outcome for one data row (1-based index within the file).
#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_id: Option<Uuid>,
    pub errors: Vec<RowError>,
    pub skipped: bool,
}

/// Result aggregate for one import run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportReport {
    pub total: usize,
    pub success: usize,
    pub error: usize,
    pub skipped: usize,
    pub rows: Vec<RowOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_file_name() {
        assert_eq!(
            ImportFormat::from_file_name("clients.XLSX").unwrap(),
            ImportFormat::Xlsx
        );
        assert_eq!(
            ImportFormat::from_file_name("data.csv").unwrap(),
            ImportFormat::Csv
        );
        assert!(ImportFormat::from_file_name("notes.txt").is_err());
    }

    #[test]
    fn mapping_requires_email_rule() {
        let config = MappingConfig {
            entity_type: Role::Client,
            rules: vec![MappingRule {
                column: "Société".into(),
                target_field: "company_name".into(),
                required: false,
                default_value: None,
                transform: None,
                numeric: None,
            }],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn admin_import_is_rejected() {
        let config = MappingConfig {
            entity_type: Role::Admin,
            rules: vec![MappingRule {
                column: "Email".into(),
                target_field: "email".into(),
                required: true,
                default_value: None,
                transform: None,
                numeric: None,
            }],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn transform_deserializes_from_tagged_json() {
        let json = r#"{"type": "number", "decimal_separator": ",", "thousands_separator": " "}"#;
        let transform: Transform = serde_json::from_str(json).unwrap();
        match transform {
            Transform::Number {
                decimal_separator,
                thousands_separator,
            } => {
                assert_eq!(decimal_separator, ',');
                assert_eq!(thousands_separator, Some(' '));
            }
            other => panic!("Unexpected transform: {:?}", other),
        }
    }

    #[test]
    fn options_default_and_clamp() {
        let options: ImportOptions = serde_json::from_str("{}").unwrap();
        assert!(options.skip_duplicates);
        assert!(options.continue_on_error);
        assert_eq!(options.clamped_batch_size(), 50);

        let huge = ImportOptions {
            batch_size: 10_000,
            ..Default::default()
        };
        assert_eq!(huge.clamped_batch_size(), 500);
    }
}
