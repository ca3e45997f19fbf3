//! Bulk import pipeline — tabular file to created business entities.
//!
//! State machine per uploaded file:
//! `Parse → Transform(all rows) → Validate(all rows) →
//!  CreateEntity(per row, independent) →
//!  CreateRelations(per created client, independent, non-blocking)`
//!
//! Rows fail independently; with `continue_on_error` (the default) a
//! failed row never stops the ones after it.

pub mod credentials;
pub mod relations;
pub mod tabular;
pub mod transform;
pub mod types;
pub mod validate;

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::error::ImportError;
use crate::store::Store;
use crate::store::models::{NewProfile, Role};

pub use credentials::{CreationOutcome, create_profile_with_identity, generate_password};
pub use tabular::TabularFile;
pub use types::{ImportFormat, ImportOptions, ImportReport, MappingConfig, RowError, RowOutcome};

/// Maximum accepted upload size.
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Orchestrates one import run.
pub struct ImportService {
    store: Arc<dyn Store>,
}

impl ImportService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Run the full import pipeline over an uploaded file.
    ///
    /// Always returns a result aggregate for per-row failures; an
    /// `Err` means the file itself was unusable (format, size,
    /// parse, mapping).
    pub async fn process_import(
        &self,
        file_name: &str,
        bytes: &[u8],
        mapping: &MappingConfig,
        options: &ImportOptions,
    ) -> Result<ImportReport, ImportError> {
        mapping.validate()?;

        if bytes.len() > MAX_FILE_BYTES {
            return Err(ImportError::FileTooLarge {
                size: bytes.len(),
                max: MAX_FILE_BYTES,
            });
        }

        let format = ImportFormat::from_file_name(file_name)?;
        let file = tabular::parse_file(bytes, format)?;

        info!(
            file = %file_name,
            entity = mapping.entity_type.as_str(),
            rows = file.rows.len(),
            "Starting import"
        );

        // History row is bookkeeping; its failure never blocks the run.
        let history_id = match self
            .store
            .insert_import_history(mapping.entity_type, file_name)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "Failed to open import history row");
                None
            }
        };

        let mut report = ImportReport {
            total: file.rows.len(),
            ..Default::default()
        };
        let batch_size = options.clamped_batch_size();

        for (index, row) in file.rows.iter().enumerate() {
            let row_number = index + 1;

            let outcome = self
                .process_row(row_number, &file, row, mapping, options)
                .await;

            if outcome.skipped {
                report.skipped += 1;
            } else if outcome.created_id.is_some() {
                report.success += 1;
            } else {
                report.error += 1;
            }
            let failed = outcome.created_id.is_none() && !outcome.skipped;
            report.rows.push(outcome);

            if row_number % batch_size == 0 {
                info!(
                    processed = row_number,
                    total = report.total,
                    "Import progress"
                );
            }

            if failed && !options.continue_on_error {
                warn!(row = row_number, "Stopping import after row failure");
                break;
            }
        }

        let status = if report.error > 0 && report.success == 0 {
            "failed"
        } else {
            "completed"
        };
        if let Some(history_id) = history_id {
            if let Err(e) = self
                .store
                .complete_import_history(
                    history_id,
                    report.total as i64,
                    report.success as i64,
                    report.error as i64,
                    report.skipped as i64,
                    status,
                )
                .await
            {
                warn!(error = %e, "Failed to close import history row");
            }
        }

        info!(
            success = report.success,
            errors = report.error,
            skipped = report.skipped,
            "Import finished"
        );
        Ok(report)
    }

    async fn process_row(
        &self,
        row_number: usize,
        file: &TabularFile,
        row: &[String],
        mapping: &MappingConfig,
        options: &ImportOptions,
    ) -> RowOutcome {
        let (fields, mut errors) =
            transform::transform_row(file, row, mapping, &self.store).await;

        // Duplicate pre-check: with `skip_duplicates`, rows whose
        // email or SIREN already exists are reported as skipped, not
        // failed. Without it, validation flags them as errors.
        if options.skip_duplicates {
            match self.is_duplicate(&fields, mapping.entity_type).await {
                Ok(true) => {
                    return RowOutcome {
                        row: row_number,
                        created_id: None,
                        errors: Vec::new(),
                        skipped: true,
                    };
                }
                Ok(false) => {}
                Err(e) => errors.push(RowError::new("row", e.to_string())),
            }
        }

        errors.extend(validate::validate_row(&fields, mapping, &self.store).await);

        if !errors.is_empty() {
            return RowOutcome {
                row: row_number,
                created_id: None,
                errors,
                skipped: false,
            };
        }

        let profile = build_profile(mapping.entity_type, &fields);
        match create_profile_with_identity(&self.store, profile, options.generate_passwords).await
        {
            CreationOutcome::Created { profile, .. } => {
                if matches!(mapping.entity_type, Role::Client) {
                    let warnings =
                        relations::create_client_relations(&self.store, &profile, &fields).await;
                    for warning in warnings {
                        warn!(row = row_number, client = %profile.id, "{warning}");
                    }
                }
                RowOutcome {
                    row: row_number,
                    created_id: Some(profile.id),
                    errors: Vec::new(),
                    skipped: false,
                }
            }
            CreationOutcome::Failed {
                error: creation_error,
                compensation,
            } => {
                if let Some(compensation) = compensation {
                    if !compensation.succeeded {
                        error!(
                            row = row_number,
                            "Identity compensation failed, orphaned account left behind"
                        );
                    }
                }
                RowOutcome {
                    row: row_number,
                    created_id: None,
                    errors: vec![RowError::new("row", creation_error)],
                    skipped: false,
                }
            }
        }
    }

    async fn is_duplicate(
        &self,
        fields: &Map<String, Value>,
        entity_type: Role,
    ) -> Result<bool, crate::error::DatabaseError> {
        if let Some(email) = string_field(fields, "email") {
            if self.store.profile_email_exists(entity_type, &email).await? {
                return Ok(true);
            }
        }
        if let Some(siren) = string_field(fields, "siren") {
            if self.store.profile_siren_exists(entity_type, &siren).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    let value = fields.get(key)?.as_str()?.trim();
    if value.is_empty() || validate::is_placeholder(value) {
        None
    } else {
        Some(value.to_string())
    }
}

fn build_profile(role: Role, fields: &Map<String, Value>) -> NewProfile {
    NewProfile {
        role,
        email: string_field(fields, "email").unwrap_or_default(),
        first_name: string_field(fields, "first_name"),
        last_name: string_field(fields, "last_name"),
        company_name: string_field(fields, "company_name"),
        siren: string_field(fields, "siren"),
        phone: string_field(fields, "phone"),
        city: string_field(fields, "city"),
        auth_user_id: None,
    }
}
