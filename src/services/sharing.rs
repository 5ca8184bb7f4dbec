//! Sharing a trip with other users by email.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::tables::TRIP_SHARES;
use crate::error::AppResult;
use crate::gateway::{DataGateway, Filter, Order, decode_row, decode_rows};
use crate::models::{TripShare, normalize_email};
use crate::views::{ListSpec, LiveQuery};

pub struct ShareService {
    gateway: Arc<dyn DataGateway>,
}

impl ShareService {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self { gateway }
    }

    pub fn list_spec() -> ListSpec {
        ListSpec::new(TRIP_SHARES).scoped_by("trip_id").order(Order::asc("created_at"))
    }

    pub async fn list(&self, trip_id: Uuid) -> AppResult<Vec<TripShare>> {
        decode_rows(self.gateway.select(&Self::list_spec().query(Some(trip_id))).await?)
    }

    pub async fn watch(&self, trip_id: Uuid) -> AppResult<LiveQuery<TripShare>> {
        LiveQuery::open(Arc::clone(&self.gateway), Self::list_spec(), Some(trip_id)).await
    }

    /// Share with `email`. Sharing twice with the same address returns the
    /// existing share.
    pub async fn share(&self, trip_id: Uuid, email: &str) -> AppResult<TripShare> {
        let email = normalize_email(email)?;

        if let Some(existing) = self
            .list(trip_id)
            .await?
            .into_iter()
            .find(|s| s.shared_with_email == email)
        {
            return Ok(existing);
        }

        let row = self
            .gateway
            .insert(
                TRIP_SHARES,
                serde_json::json!({ "trip_id": trip_id, "shared_with_email": email }),
            )
            .await?;
        let share: TripShare = decode_row(row)?;
        info!("🤝 Shared trip {} with {}", trip_id, share.shared_with_email);
        Ok(share)
    }

    pub async fn remove(&self, share_id: Uuid) -> AppResult<()> {
        self.gateway.delete(TRIP_SHARES, &[Filter::eq("id", share_id)]).await
    }
}
