//! End-to-end import tests: transforms, validation, entity creation
//! with credentials, and client relations, against the in-memory
//! store.

use std::sync::Arc;

use outreach_core::import::types::{
    LookupTarget, MappingConfig, MappingRule, Transform,
};
use outreach_core::import::{ImportOptions, ImportService};
use outreach_core::store::models::{NewProfile, Role};
use outreach_core::store::{LibSqlStore, Store};

fn rule(column: &str, field: &str) -> MappingRule {
    MappingRule {
        column: column.into(),
        target_field: field.into(),
        required: false,
        default_value: None,
        transform: None,
        numeric: None,
    }
}

fn required(column: &str, field: &str) -> MappingRule {
    MappingRule {
        required: true,
        ..rule(column, field)
    }
}

async fn seed_expert(store: &LibSqlStore) {
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
            auth_user_id: Some("auth-expert".into()),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn full_client_import_with_transforms_and_relations() {
    let backing = Arc::new(LibSqlStore::new_memory().await.unwrap());
    seed_expert(&backing).await;
    backing.insert_product("TICPE").await.unwrap();
    backing.insert_product("URSSAF").await.unwrap();
    let store: Arc<dyn Store> = Arc::clone(&backing) as Arc<dyn Store>;
    let service = ImportService::new(store);

    let mapping = MappingConfig {
        entity_type: Role::Client,
        rules: vec![
            required("Email", "email"),
            MappingRule {
                transform: Some(Transform::SplitName),
                ..rule("Contact", "full_name")
            },
            required("Société", "company_name"),
            rule("SIREN", "siren"),
            MappingRule {
                transform: Some(Transform::Phone {
                    country_prefix: Some("+33".into()),
                }),
                ..rule("Téléphone", "phone")
            },
            rule("Produits", "products"),
            MappingRule {
                transform: Some(Transform::Lookup {
                    target: LookupTarget::Expert,
                }),
                ..rule("Expert", "expert_id")
            },
            MappingRule {
                transform: Some(Transform::Date {
                    input_format: "%d/%m/%Y".into(),
                }),
                ..rule("RDV Date", "appointment_date")
            },
            rule("RDV Heure", "appointment_time"),
        ],
    };

    let csv = "Email;Contact;Société;SIREN;Téléphone;Produits;Expert;RDV Date;RDV Heure\n\
               jane@acme.com;Jane Doe;Acme;123456789;06 12 34 56 78;TICPE, URSSAF;Dupont;01/09/2026;14:30\n";

    let report = service
        .process_import("clients.csv", csv.as_bytes(), &mapping, &ImportOptions::default())
        .await
        .unwrap();

    assert_eq!(report.total, 1);
    assert_eq!(report.success, 1);
    assert_eq!(report.error, 0);

    let client_id = report.rows[0].created_id.expect("client created");

    let clients = backing
        .list_active_profiles_by_role(Role::Client)
        .await
        .unwrap();
    assert_eq!(clients.len(), 1);
    let client = &clients[0];
    assert_eq!(client.id, client_id);
    assert_eq!(client.email, "jane@acme.com");
    assert_eq!(client.first_name.as_deref(), Some("Jane"));
    assert_eq!(client.last_name.as_deref(), Some("Doe"));
    assert_eq!(client.siren.as_deref(), Some("123456789"));
    assert_eq!(client.phone.as_deref(), Some("+33612345678"));
    // Credential issuance linked an identity.
    assert!(client.auth_user_id.is_some());
}

#[tokio::test]
async fn missing_required_field_fails_row_but_not_batch() {
    let store: Arc<dyn Store> = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let service = ImportService::new(store);

    let mapping = MappingConfig {
        entity_type: Role::Client,
        rules: vec![
            required("email", "email"),
            required("company_name", "company_name"),
        ],
    };

    // Row 1 holds a placeholder company, row 2 is fine.
    let csv = "email,company_name\njane@acme.com,N/A\nbob@corp.io,Corp\n";
    let report = service
        .process_import("clients.csv", csv.as_bytes(), &mapping, &ImportOptions::default())
        .await
        .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.success, 1);
    assert_eq!(report.error, 1);

    let failed = &report.rows[0];
    assert_eq!(failed.row, 1);
    assert!(failed.created_id.is_none());
    assert!(failed.errors.iter().any(|e| e.field == "company_name"));

    let ok = &report.rows[1];
    assert_eq!(ok.row, 2);
    assert!(ok.created_id.is_some());
    assert!(ok.errors.is_empty());
}

#[tokio::test]
async fn invalid_siren_is_reported_per_row() {
    let store: Arc<dyn Store> = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let service = ImportService::new(store);

    let mapping = MappingConfig {
        entity_type: Role::Expert,
        rules: vec![required("email", "email"), rule("siren", "siren")],
    };

    let csv = "email,siren\nmarc@experts.fr,1234\n";
    let report = service
        .process_import("experts.csv", csv.as_bytes(), &mapping, &ImportOptions::default())
        .await
        .unwrap();

    assert_eq!(report.error, 1);
    assert!(report.rows[0].errors.iter().any(|e| e.field == "siren"));
}

#[tokio::test]
async fn xlsx_and_csv_share_the_same_pipeline() {
    // The spreadsheet path is covered by unit tests on the parser;
    // here we pin the CSV path end to end with semicolons and quotes.
    let store: Arc<dyn Store> = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let service = ImportService::new(store);

    let mapping = MappingConfig {
        entity_type: Role::Apporteur,
        rules: vec![
            required("email", "email"),
            rule("company_name", "company_name"),
        ],
    };

    let csv = "email;company_name\nlea@apport.fr;\"Apport; Conseil\"\n";
    let report = service
        .process_import("apporteurs.csv", csv.as_bytes(), &mapping, &ImportOptions::default())
        .await
        .unwrap();

    assert_eq!(report.success, 1);
}

#[tokio::test]
async fn generate_passwords_off_leaves_identity_unlinked() {
    let backing = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let store: Arc<dyn Store> = Arc::clone(&backing) as Arc<dyn Store>;
    let service = ImportService::new(store);

    let mapping = MappingConfig {
        entity_type: Role::Client,
        rules: vec![required("email", "email")],
    };
    let options = ImportOptions {
        generate_passwords: false,
        ..Default::default()
    };

    let csv = "email\njane@acme.com\n";
    let report = service
        .process_import("clients.csv", csv.as_bytes(), &mapping, &options)
        .await
        .unwrap();
    assert_eq!(report.success, 1);

    let clients = backing
        .list_active_profiles_by_role(Role::Client)
        .await
        .unwrap();
    assert!(clients[0].auth_user_id.is_none());
}
