//! # Services Module
//!
//! Data operations behind each screen: trips, bookings, the day planner,
//! the trip map, sharing and city search. Every service talks to the
//! backend only through [`DataGateway`].

pub mod bookings;
pub mod cities;
pub mod map;
pub mod planner;
pub mod sharing;
pub mod trips;

pub use bookings::BookingService;
pub use cities::CityIndex;
pub use map::MapService;
pub use planner::PlannerService;
pub use sharing::ShareService;
pub use trips::TripService;

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::gateway::{DataGateway, Query, decode_row};

pub(crate) mod tables {
    pub const TRIPS: &str = "trips";
    pub const BOOKINGS: &str = "bookings";
    pub const ACTIVITIES: &str = "activities";
    pub const LOCATIONS: &str = "locations";
    pub const TRIP_SHARES: &str = "trip_shares";
}

/// Fetch a single row by id
pub(crate) async fn fetch_one<T: DeserializeOwned>(
    gateway: &dyn DataGateway,
    table: &str,
    entity: &'static str,
    id: Uuid,
) -> AppResult<T> {
    let rows = gateway.select(&Query::table(table).eq("id", id).limit(1)).await?;
    match rows.into_iter().next() {
        Some(row) => decode_row(row),
        None => Err(AppError::not_found(entity, id.to_string())),
    }
}
