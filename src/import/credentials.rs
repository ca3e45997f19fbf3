//! Credential issuance — password generation and hashing, and the
//! create-with-compensation helper wrapping identity provisioning.

use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::store::Store;
use crate::store::models::{NewProfile, Profile};

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*-_=+?";

/// Generate a random password: at least one uppercase, lowercase,
/// digit, and symbol; the remainder drawn from all classes; then
/// shuffled so the guaranteed characters don't sit at the front.
pub fn generate_password(length: usize) -> String {
    let length = length.max(8);
    let mut rng = rand::thread_rng();
    let mut chars: Vec<u8> = vec![
        UPPER[rng.gen_range(0..UPPER.len())],
        LOWER[rng.gen_range(0..LOWER.len())],
        DIGITS[rng.gen_range(0..DIGITS.len())],
        SYMBOLS[rng.gen_range(0..SYMBOLS.len())],
    ];

    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SYMBOLS].concat();
    while chars.len() < length {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    String::from_utf8(chars).expect("password alphabet is ASCII")
}

/// Salted SHA-256 hash, encoded as `sha256$<salt>$<digest>`.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::thread_rng().r#gen();
    let salt_hex = hex::encode(salt);
    let digest = Sha256::new()
        .chain_update(salt_hex.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    format!("sha256${salt_hex}${}", hex::encode(digest))
}

/// Verify a password against a `sha256$salt$digest` hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some("sha256"), Some(salt), Some(digest)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let computed = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    hex::encode(computed) == digest
}

// ── Create with compensation ────────────────────────────────────────

/// Whether the compensating identity delete ran, and how it went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compensation {
    pub attempted: bool,
    pub succeeded: bool,
}

/// Outcome of a profile-plus-identity creation.
#[derive(Debug)]
pub enum CreationOutcome {
    Created {
        profile: Profile,
        /// The clear-text password issued for the new account, when
        /// one was generated. Returned once, never stored.
        password: Option<String>,
    },
    Failed {
        error: String,
        compensation: Option<Compensation>,
    },
}

/// Provision an identity then insert the profile; if the profile
/// insert fails after identity provisioning, delete the identity.
///
/// Compensation failure is not further compensated, only logged and
/// reported in the outcome.
pub async fn create_profile_with_identity(
    store: &Arc<dyn Store>,
    mut profile: NewProfile,
    generate_credentials: bool,
) -> CreationOutcome {
    let mut password = None;
    let mut auth_user_id = None;

    if generate_credentials {
        let clear = generate_password(12);
        let hash = hash_password(&clear);

        match store.create_auth_user(&profile.email, &hash).await {
            Ok(id) => {
                profile.auth_user_id = Some(id.clone());
                auth_user_id = Some(id);
                password = Some(clear);
            }
            Err(e) => {
                return CreationOutcome::Failed {
                    error: format!("identity provisioning failed: {e}"),
                    compensation: None,
                };
            }
        }
    }

    match store.insert_profile(profile).await {
        Ok(created) => {
            info!(profile = %created.id, email = %created.email, "Profile created");
            CreationOutcome::Created {
                profile: created,
                password,
            }
        }
        Err(e) => {
            let compensation = match auth_user_id {
                Some(ref id) => {
                    warn!(auth_user = %id, "Profile insert failed, rolling back identity");
                    let succeeded = match store.delete_auth_user(id).await {
                        Ok(()) => true,
                        Err(del_err) => {
                            error!(auth_user = %id, error = %del_err, "Identity rollback failed");
                            false
                        }
                    };
                    Some(Compensation {
                        attempted: true,
                        succeeded,
                    })
                }
                None => None,
            };
            CreationOutcome::Failed {
                error: format!("profile insert failed: {e}"),
                compensation,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_meets_composition_rule() {
        for _ in 0..50 {
            let password = generate_password(12);
            assert_eq!(password.len(), 12);
            assert!(password.chars().any(|c| c.is_ascii_uppercase()));
            assert!(password.chars().any(|c| c.is_ascii_lowercase()));
            assert!(password.chars().any(|c| c.is_ascii_digit()));
            assert!(password.chars().any(|c| SYMBOLS.contains(&(c as u8))));
        }
    }

    #[test]
    fn password_minimum_length_is_enforced() {
        assert_eq!(generate_password(4).len(), 8);
    }

    #[test]
    fn hash_round_trip() {
        let hash = hash_password("s3cret!Pass");
        assert!(hash.starts_with("sha256$"));
        assert!(verify_password("s3cret!Pass", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(!verify_password("x", "not-a-hash"));
    }

    mod with_store {
        use super::super::*;
        use crate::store::LibSqlStore;
        use crate::store::models::Role;

        fn new_profile(email: &str) -> NewProfile {
            NewProfile {
                role: Role::Client,
                email: email.into(),
                first_name: Some("Jane".into()),
                last_name: Some("Doe".into()),
                company_name: Some("Acme".into()),
                siren: None,
                phone: None,
                city: None,
                auth_user_id: None,
            }
        }

        #[tokio::test]
        async fn creation_issues_credentials() {
            let store: Arc<dyn Store> = Arc::new(LibSqlStore::new_memory().await.unwrap());
            let outcome =
                create_profile_with_identity(&store, new_profile("jane@acme.com"), true).await;

            match outcome {
                CreationOutcome::Created { profile, password } => {
                    assert!(profile.auth_user_id.is_some());
                    let password = password.unwrap();
                    assert_eq!(password.len(), 12);
                }
                CreationOutcome::Failed { error, .. } => panic!("creation failed: {error}"),
            }
        }

        #[tokio::test]
        async fn creation_without_credentials() {
            let store: Arc<dyn Store> = Arc::new(LibSqlStore::new_memory().await.unwrap());
            let outcome =
                create_profile_with_identity(&store, new_profile("jane@acme.com"), false).await;

            match outcome {
                CreationOutcome::Created { profile, password } => {
                    assert!(profile.auth_user_id.is_none());
                    assert!(password.is_none());
                }
                CreationOutcome::Failed { error, .. } => panic!("creation failed: {error}"),
            }
        }

        #[tokio::test]
        async fn failed_profile_insert_rolls_back_identity() {
            let store: Arc<dyn Store> = Arc::new(LibSqlStore::new_memory().await.unwrap());
            // Occupy the (role, email) slot so the second insert fails
            // after its identity has been provisioned.
            store.insert_profile(new_profile("jane@acme.com")).await.unwrap();

            let outcome =
                create_profile_with_identity(&store, new_profile("jane@acme.com"), true).await;

            match outcome {
                CreationOutcome::Failed { compensation, .. } => {
                    let compensation = compensation.expect("compensation should have run");
                    assert!(compensation.attempted);
                    assert!(compensation.succeeded);
                }
                CreationOutcome::Created { .. } => panic!("insert should have failed"),
            }
        }
    }
}
