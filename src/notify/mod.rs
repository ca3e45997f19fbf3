//! Notification emitter — fans out structured notifications to
//! accounts by role, or to a single account.
//!
//! No delivery confirmation or retry is modeled: a failed insert is
//! logged per recipient and never escalated to fail the triggering
//! business event.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::Store;
use crate::store::models::{
    NewNotification, NotificationAction, NotificationPriority, Role,
};

/// What to notify about. Recipient fields are filled in per account
/// during fan-out.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub kind: String,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub action: NotificationAction,
}

/// Creates notification rows against the store.
pub struct NotificationEmitter {
    store: Arc<dyn Store>,
}

impl NotificationEmitter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Notify every active account of `role` that has a linked
    /// identity. Accounts without one are silently skipped. Returns
    /// the number of notifications created.
    pub async fn notify_role(&self, role: Role, payload: &NotificationPayload) -> usize {
        let profiles = match self.store.list_active_profiles_by_role(role).await {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!(role = role.as_str(), error = %e, "Failed to load accounts for fan-out");
                return 0;
            }
        };

        let mut created = 0;
        for profile in profiles {
            if profile.auth_user_id.is_none() {
                debug!(profile = %profile.id, "Skipping account without linked identity");
                continue;
            }
            if self.notify_user(profile.id, role, payload).await {
                created += 1;
            }
        }
        created
    }

    /// Notify a single account. Returns false (and logs) on failure.
    pub async fn notify_user(
        &self,
        recipient_id: Uuid,
        role: Role,
        payload: &NotificationPayload,
    ) -> bool {
        let result = self
            .store
            .insert_notification(NewNotification {
                recipient_id,
                role,
                kind: payload.kind.clone(),
                title: payload.title.clone(),
                message: payload.message.clone(),
                priority: payload.priority,
                action: payload.action.clone(),
            })
            .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    recipient = %recipient_id,
                    kind = %payload.kind,
                    error = %e,
                    "Failed to create notification"
                );
                false
            }
        }
    }
}
