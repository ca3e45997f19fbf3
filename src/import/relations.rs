//! Cross-entity relations for imported client rows — product
//! eligibility links, a pre-scheduled appointment, and an expert
//! assignment. All three are independently best-effort: none of them
//! rolls back the entity creation.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::Store;
use crate::store::models::{NewAppointment, NewAssignment, NewClientProductLink, Profile, Role};

/// Create the configured relations for one imported client. Returns
/// warnings for the parts that were skipped or failed.
pub async fn create_client_relations(
    store: &Arc<dyn Store>,
    client: &Profile,
    fields: &Map<String, Value>,
) -> Vec<String> {
    let mut warnings = Vec::new();

    let expert_id = resolve_expert(store, fields, &mut warnings).await;

    link_products(store, client, fields, expert_id, &mut warnings).await;
    schedule_appointment(store, client, fields, expert_id).await;

    // Expert assignment requires a resolvable expert.
    match expert_id {
        Some(expert_id) => {
            if let Err(e) = store
                .insert_assignment(NewAssignment {
                    client_id: client.id,
                    expert_id,
                })
                .await
            {
                warnings.push(format!("expert assignment failed: {e}"));
            }
        }
        None => {
            if fields.contains_key("expert") || fields.contains_key("expert_id") {
                warnings.push("expert assignment skipped: no resolvable expert".into());
            }
        }
    }

    warnings
}

/// Resolve the row's expert: an id from a lookup transform, or free
/// text matched fuzzily.
async fn resolve_expert(
    store: &Arc<dyn Store>,
    fields: &Map<String, Value>,
    warnings: &mut Vec<String>,
) -> Option<Uuid> {
    if let Some(Value::String(id)) = fields.get("expert_id") {
        match Uuid::parse_str(id) {
            Ok(id) => return Some(id),
            Err(_) => warnings.push(format!("expert_id is not a valid id: {id}")),
        }
    }

    let Some(Value::String(needle)) = fields.get("expert") else {
        return None;
    };
    match store.find_profile_fuzzy(Role::Expert, needle).await {
        Ok(Some(expert)) => Some(expert.id),
        Ok(None) => None,
        Err(e) => {
            warnings.push(format!("expert lookup failed: {e}"));
            None
        }
    }
}

/// A single multi-value cell holds the product list; each entry is
/// resolved by id or fuzzy name.
async fn link_products(
    store: &Arc<dyn Store>,
    client: &Profile,
    fields: &Map<String, Value>,
    expert_id: Option<Uuid>,
    warnings: &mut Vec<String>,
) {
    let Some(Value::String(cell)) = fields.get("products") else {
        return;
    };

    for entry in split_multi_value(cell) {
        match store.find_product_by_id_or_name(&entry).await {
            Ok(Some(product)) => {
                if let Err(e) = store
                    .insert_client_product_link(NewClientProductLink {
                        client_id: client.id,
                        product_id: product.id,
                        expert_id,
                    })
                    .await
                {
                    warnings.push(format!("product link \"{entry}\" failed: {e}"));
                }
            }
            Ok(None) => warnings.push(format!("no product matches \"{entry}\"")),
            Err(e) => warnings.push(format!("product lookup \"{entry}\" failed: {e}")),
        }
    }
}

/// An appointment needs both a date and a time; anything less is
/// skipped silently.
async fn schedule_appointment(
    store: &Arc<dyn Store>,
    client: &Profile,
    fields: &Map<String, Value>,
    expert_id: Option<Uuid>,
) {
    let (Some(Value::String(date)), Some(Value::String(time))) = (
        fields.get("appointment_date"),
        fields.get("appointment_time"),
    ) else {
        return;
    };

    let Ok(date) = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") else {
        debug!(date = %date, "Unparseable appointment date, skipping");
        return;
    };
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"));
    let Ok(time) = time else {
        debug!("Unparseable appointment time, skipping");
        return;
    };

    let scheduled_at = date.and_time(time).and_utc();
    if let Err(e) = store
        .insert_appointment(NewAppointment {
            client_id: client.id,
            expert_id,
            scheduled_at,
        })
        .await
    {
        warn!(client = %client.id, error = %e, "Appointment insert failed");
    }
}

/// Split a multi-value cell on comma, semicolon, or newline.
pub fn split_multi_value(cell: &str) -> Vec<String> {
    cell.split([',', ';', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlStore;
    use crate::store::models::NewProfile;

    fn fields(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    async fn seed_client(store: &LibSqlStore) -> Profile {
        store
            .insert_profile(NewProfile {
                role: Role::Client,
                email: "jane@acme.com".into(),
                first_name: Some("Jane".into()),
                last_name: Some("Doe".into()),
                company_name: Some("Acme".into()),
                siren: None,
                phone: None,
                city: None,
                auth_user_id: Some("auth-1".into()),
            })
            .await
            .unwrap()
    }

    async fn seed_expert(store: &LibSqlStore) -> Profile {
        store
            .insert_profile(NewProfile {
                role: Role::Expert,
                email: "marc@experts.fr".into(),
                first_name: Some("Marc".into()),
                last_name: Some("Dupont".into()),
                company_name: None,
                siren: None,
                phone: None,
                city: None,
                auth_user_id: Some("auth-2".into()),
            })
            .await
            .unwrap()
    }

    #[test]
    fn multi_value_split_variants() {
        assert_eq!(
            split_multi_value("TICPE, URSSAF; DFS\nFoncier"),
            vec!["TICPE", "URSSAF", "DFS", "Foncier"]
        );
        assert!(split_multi_value("  ").is_empty());
    }

    #[tokio::test]
    async fn links_products_and_assigns_expert() {
        let backing = LibSqlStore::new_memory().await.unwrap();
        let client = seed_client(&backing).await;
        seed_expert(&backing).await;
        backing.insert_product("TICPE").await.unwrap();
        backing.insert_product("URSSAF").await.unwrap();
        let store: Arc<dyn Store> = Arc::new(backing);

        let warnings = create_client_relations(
            &store,
            &client,
            &fields(&[("products", "TICPE; URSSAF"), ("expert", "Dupont")]),
        )
        .await;
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[tokio::test]
    async fn unknown_product_is_a_warning_not_a_failure() {
        let backing = LibSqlStore::new_memory().await.unwrap();
        let client = seed_client(&backing).await;
        backing.insert_product("TICPE").await.unwrap();
        let store: Arc<dyn Store> = Arc::new(backing);

        let warnings = create_client_relations(
            &store,
            &client,
            &fields(&[("products", "TICPE, Mystery Product")]),
        )
        .await;
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Mystery Product"));
    }

    #[tokio::test]
    async fn missing_expert_yields_assignment_warning() {
        let backing = LibSqlStore::new_memory().await.unwrap();
        let client = seed_client(&backing).await;
        let store: Arc<dyn Store> = Arc::new(backing);

        let warnings = create_client_relations(
            &store,
            &client,
            &fields(&[("expert", "Nobody Known")]),
        )
        .await;
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("no resolvable expert"));
    }

    #[tokio::test]
    async fn appointment_requires_date_and_time() {
        let backing = LibSqlStore::new_memory().await.unwrap();
        let client = seed_client(&backing).await;
        let store: Arc<dyn Store> = Arc::new(backing);

        // Date only — silently skipped, no warning.
        let warnings = create_client_relations(
            &store,
            &client,
            &fields(&[("appointment_date", "2026-09-01")]),
        )
        .await;
        assert!(warnings.is_empty());

        // Date and time — created.
        let warnings = create_client_relations(
            &store,
            &client,
            &fields(&[
                ("appointment_date", "2026-09-01"),
                ("appointment_time", "14:30"),
            ]),
        )
        .await;
        assert!(warnings.is_empty());
    }
}
