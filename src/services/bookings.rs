//! Bookings of a trip, with optional file attachments.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::fetch_one;
use super::tables::BOOKINGS;
use crate::error::AppResult;
use crate::gateway::{DataGateway, FileUpload, Filter, Order, decode_row, decode_rows};
use crate::models::{Booking, BookingDraft, LocalFile};
use crate::views::{ListSpec, LiveQuery, Mounted};

pub struct BookingService {
    gateway: Arc<dyn DataGateway>,
    bucket: String,
}

/// Object path of an attachment: `bookings/<trip>/<millis>.<ext>`
fn attachment_path(trip_id: Uuid, file: &LocalFile, millis: i64) -> String {
    format!("bookings/{}/{}.{}", trip_id, millis, file.extension())
}

impl BookingService {
    pub fn new(gateway: Arc<dyn DataGateway>, bucket: impl Into<String>) -> Self {
        Self {
            gateway,
            bucket: bucket.into(),
        }
    }

    /// Bookings of one trip, earliest first
    pub fn list_spec() -> ListSpec {
        ListSpec::new(BOOKINGS).scoped_by("trip_id").order(Order::asc("date"))
    }

    pub async fn list(&self, trip_id: Uuid) -> AppResult<Vec<Booking>> {
        decode_rows(self.gateway.select(&Self::list_spec().query(Some(trip_id))).await?)
    }

    pub async fn watch(&self, trip_id: Uuid) -> AppResult<LiveQuery<Booking>> {
        LiveQuery::open(Arc::clone(&self.gateway), Self::list_spec(), Some(trip_id)).await
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Booking> {
        fetch_one(self.gateway.as_ref(), BOOKINGS, "booking", id).await
    }

    pub fn load(&self, id: Uuid) -> Mounted<Booking> {
        let gateway = Arc::clone(&self.gateway);
        Mounted::load("booking", async move { fetch_one(gateway.as_ref(), BOOKINGS, "booking", id).await })
    }

    /// Validate, upload the attachment if any, then insert
    pub async fn create(&self, trip_id: Uuid, draft: &BookingDraft) -> AppResult<Booking> {
        draft.validate()?;

        let attachment = match &draft.file {
            Some(file) => Some(self.upload(trip_id, file).await?),
            None => None,
        };

        let row = self
            .gateway
            .insert(BOOKINGS, draft.to_row(trip_id, attachment.as_deref()))
            .await?;
        let booking: Booking = decode_row(row)?;
        info!("Added {} booking '{}' to trip {}", booking.kind.as_str(), booking.title, trip_id);
        Ok(booking)
    }

    async fn upload(&self, trip_id: Uuid, file: &LocalFile) -> AppResult<String> {
        let upload = FileUpload {
            bucket: self.bucket.clone(),
            path: attachment_path(trip_id, file, Utc::now().timestamp_millis()),
            bytes: file.bytes.clone(),
            content_type: file.mime_type.clone(),
        };
        self.gateway.upload_file(upload).await
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.gateway.delete(BOOKINGS, &[Filter::eq("id", id)]).await?;
        info!("Deleted booking {}", id);
        Ok(())
    }
}
