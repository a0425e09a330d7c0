//! crates/neurocom_core/src/inbox.rs
//!
//! Messages to the human expert and consultation bookings.
//!
//! Tier and quota guards run before these calls. The monthly counter is only
//! incremented after the privileged write has succeeded, so a failed write
//! never consumes quota.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::access::{QuotaStatus, QuotaTable};
use crate::domain::{Booking, ExpertMessage, NewBooking, Resource, User};
use crate::error::{CoreError, CoreResult};
use crate::ports::{InboxRepository, UserRepository};

/// Monthly limits of the metered inbox resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboxLimits {
    pub messages: QuotaTable,
    pub consultations: QuotaTable,
}

impl Default for InboxLimits {
    fn default() -> Self {
        Self {
            messages: QuotaTable::intermediate_only(5),
            consultations: QuotaTable::intermediate_only(2),
        }
    }
}

impl InboxLimits {
    pub fn for_resource(&self, resource: Resource) -> &QuotaTable {
        match resource {
            Resource::Messages => &self.messages,
            Resource::Consultations => &self.consultations,
        }
    }
}

#[derive(Clone)]
pub struct InboxService {
    inbox: Arc<dyn InboxRepository>,
    users: Arc<dyn UserRepository>,
    limits: InboxLimits,
}

impl InboxService {
    pub fn new(
        inbox: Arc<dyn InboxRepository>,
        users: Arc<dyn UserRepository>,
        limits: InboxLimits,
    ) -> Self {
        Self {
            inbox,
            users,
            limits,
        }
    }

    pub fn limits(&self) -> &InboxLimits {
        &self.limits
    }

    pub fn status(&self, user: &User, resource: Resource) -> QuotaStatus {
        QuotaStatus::of(user, resource, self.limits.for_resource(resource))
    }

    // --- Expert Messages ---

    pub async fn send_message(
        &self,
        user_id: Uuid,
        text: &str,
        file_url: Option<&str>,
    ) -> CoreResult<ExpertMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::Validation("text must not be empty".to_string()));
        }
        let file_url = file_url.map(str::trim).filter(|u| !u.is_empty());

        let message = self.inbox.insert_message(user_id, text, file_url).await?;
        self.consume(user_id, Resource::Messages).await;
        info!("User {} sent expert message {}", user_id, message.id);
        Ok(message)
    }

    pub async fn list_messages(&self, user_id: Uuid) -> CoreResult<Vec<ExpertMessage>> {
        Ok(self.inbox.list_messages(user_id).await?)
    }

    // --- Consultations ---

    pub async fn book_consultation(
        &self,
        user_id: Uuid,
        booking: NewBooking,
    ) -> CoreResult<Booking> {
        if booking.starts_at >= booking.ends_at {
            return Err(CoreError::Validation(
                "starts_at must be before ends_at".to_string(),
            ));
        }
        let booking = NewBooking {
            notes: booking
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            ..booking
        };

        let stored = self.inbox.insert_booking(user_id, &booking).await?;
        self.consume(user_id, Resource::Consultations).await;
        info!("User {} booked consultation {}", user_id, stored.id);
        Ok(stored)
    }

    pub async fn list_bookings(&self, user_id: Uuid) -> CoreResult<Vec<Booking>> {
        Ok(self.inbox.list_bookings(user_id).await?)
    }

    /// Cancels a caller-owned booking. Quota already consumed is not refunded.
    pub async fn cancel_booking(&self, user_id: Uuid, booking_id: Uuid) -> CoreResult<Booking> {
        self.inbox
            .cancel_booking(user_id, booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Booking {} not found", booking_id)))
    }

    /// Counts a completed privileged action. The action already happened, so a
    /// failed increment is logged rather than reported.
    async fn consume(&self, user_id: Uuid, resource: Resource) {
        if let Err(e) = self.users.increment_usage(user_id, resource).await {
            error!(
                "Failed to increment {} usage for user {}: {}",
                resource, user_id, e
            );
        }
    }
}
