//! Saved places on the trip map.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::tables::LOCATIONS;
use super::trips::TripService;
use crate::error::AppResult;
use crate::gateway::{DataGateway, Filter, decode_row, decode_rows};
use crate::models::{Location, LocationDraft, MapRegion};
use crate::views::{ListSpec, LiveQuery};

pub struct MapService {
    gateway: Arc<dyn DataGateway>,
}

impl MapService {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self { gateway }
    }

    pub fn list_spec() -> ListSpec {
        ListSpec::new(LOCATIONS).scoped_by("trip_id")
    }

    pub async fn list(&self, trip_id: Uuid) -> AppResult<Vec<Location>> {
        decode_rows(self.gateway.select(&Self::list_spec().query(Some(trip_id))).await?)
    }

    pub async fn watch(&self, trip_id: Uuid) -> AppResult<LiveQuery<Location>> {
        LiveQuery::open(Arc::clone(&self.gateway), Self::list_spec(), Some(trip_id)).await
    }

    pub async fn add(&self, trip_id: Uuid, draft: &LocationDraft) -> AppResult<Location> {
        draft.validate()?;
        let row = self.gateway.insert(LOCATIONS, draft.to_row(trip_id)).await?;
        let location: Location = decode_row(row)?;
        info!("📍 Pinned '{}' on trip {}", location.name, trip_id);
        Ok(location)
    }

    pub async fn remove(&self, id: Uuid) -> AppResult<()> {
        self.gateway.delete(LOCATIONS, &[Filter::eq("id", id)]).await
    }

    /// Region the map opens on for a trip
    pub async fn initial_region(&self, trip_id: Uuid) -> AppResult<MapRegion> {
        let trip = TripService::new(Arc::clone(&self.gateway)).get(trip_id).await?;
        let locations = self.list(trip_id).await?;
        Ok(MapRegion::for_trip(Some(&trip), &locations))
    }
}
