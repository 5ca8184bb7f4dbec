//! Trips list, trip detail and trip creation.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::tables::TRIPS;
use super::fetch_one;
use crate::auth::models::Session;
use crate::error::{AppError, AppResult, AuthError};
use crate::gateway::{DataGateway, Filter, Order, decode_row, decode_rows};
use crate::models::{Trip, TripDraft};
use crate::views::{ListSpec, LiveQuery, Mounted};

pub struct TripService {
    gateway: Arc<dyn DataGateway>,
}

impl TripService {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self { gateway }
    }

    /// Newest trips first
    pub fn list_spec() -> ListSpec {
        ListSpec::new(TRIPS).order(Order::desc("start_date"))
    }

    pub async fn list(&self) -> AppResult<Vec<Trip>> {
        decode_rows(self.gateway.select(&Self::list_spec().query(None)).await?)
    }

    /// Trips list kept in sync with the table
    pub async fn watch(&self) -> AppResult<LiveQuery<Trip>> {
        LiveQuery::open(Arc::clone(&self.gateway), Self::list_spec(), None).await
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Trip> {
        fetch_one(self.gateway.as_ref(), TRIPS, "trip", id).await
    }

    /// Load a trip for a detail screen
    pub fn load(&self, id: Uuid) -> Mounted<Trip> {
        let gateway = Arc::clone(&self.gateway);
        Mounted::load("trip", async move { fetch_one(gateway.as_ref(), TRIPS, "trip", id).await })
    }

    /// Validate and insert a trip owned by the signed-in user
    pub async fn create(&self, session: Option<&Session>, draft: &TripDraft) -> AppResult<Trip> {
        draft.validate()?;
        let owner = session.ok_or(AuthError::NotAuthenticated)?.user.id;

        let row = self.gateway.insert(TRIPS, draft.to_row(owner)).await?;
        let trip: Trip = decode_row(row)?;
        info!("🧳 Created trip {} ({})", trip.id, trip.location);
        Ok(trip)
    }

    /// Apply an edited form to an existing trip
    pub async fn update(&self, id: Uuid, draft: &TripDraft) -> AppResult<Trip> {
        draft.validate()?;
        let rows = self
            .gateway
            .update(TRIPS, draft.to_patch(), &[Filter::eq("id", id)])
            .await?;
        match rows.into_iter().next() {
            Some(row) => decode_row(row),
            None => Err(AppError::not_found("trip", id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::User;
    use crate::error::ValidationError;
    use crate::gateway::mock::MockGateway;
    use crate::views::ViewState;
    use chrono::NaiveDate;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn session() -> Session {
        Session {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: None,
            token_type: "bearer".into(),
            user: User {
                id: Uuid::new_v4(),
                email: Some("ana@example.com".into()),
            },
        }
    }

    fn trip_row(id: Uuid, location: &str, start: &str) -> serde_json::Value {
        json!({
            "id": id,
            "location": location,
            "description": "",
            "start_date": start,
            "end_date": start,
        })
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let gateway = MockGateway::new();
        gateway.seed(
            TRIPS,
            vec![
                trip_row(Uuid::new_v4(), "Oslo, Norway", "2024-01-10"),
                trip_row(Uuid::new_v4(), "Rome, Italy", "2024-09-01"),
                trip_row(Uuid::new_v4(), "Lima, Peru", "2024-05-20"),
            ],
        );

        let trips = TripService::new(gateway).list().await.unwrap();
        let places: Vec<&str> = trips.iter().map(|t| t.location.as_str()).collect();
        assert_eq!(places, vec!["Rome, Italy", "Lima, Peru", "Oslo, Norway"]);
    }

    #[tokio::test]
    async fn reversed_dates_never_reach_the_gateway() {
        let gateway = MockGateway::new();
        let service = TripService::new(gateway.clone());
        let draft = TripDraft::new("Paris, France", date("2024-06-01"), date("2024-05-30"));

        let err = service.create(Some(&session()), &draft).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(ValidationError::DateRange { .. })));
        assert_eq!(gateway.count("insert:"), 0);
    }

    #[tokio::test]
    async fn create_requires_a_session_and_sets_owner() {
        let gateway = MockGateway::new();
        let service = TripService::new(gateway.clone());
        let draft = TripDraft::new("Paris, France", date("2024-06-01"), date("2024-06-04"));

        let err = service.create(None, &draft).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::NotAuthenticated)));
        assert_eq!(gateway.count("insert:"), 0);

        let owner = session();
        let trip = service.create(Some(&owner), &draft).await.unwrap();
        assert_eq!(trip.user_id, Some(owner.user.id));
        assert_eq!(trip.location, "Paris, France");
        assert_eq!(gateway.rows(TRIPS).len(), 1);
    }

    #[tokio::test]
    async fn update_keeps_owner_and_checks_dates() {
        let gateway = MockGateway::new();
        let service = TripService::new(gateway.clone());
        let owner = session();
        let draft = TripDraft::new("Porto, Portugal", date("2024-07-01"), date("2024-07-03"));
        let trip = service.create(Some(&owner), &draft).await.unwrap();

        let edited = draft.clone().with_description("Port wine tour");
        let updated = service.update(trip.id, &edited).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("Port wine tour"));
        assert_eq!(updated.user_id, Some(owner.user.id));

        let reversed = TripDraft::new("Porto, Portugal", date("2024-07-03"), date("2024-07-01"));
        assert!(service.update(trip.id, &reversed).await.unwrap_err().is_validation());
        assert!(service.update(Uuid::new_v4(), &edited).await.unwrap_err().is_not_found());
        assert_eq!(gateway.count("update:"), 2);
    }

    #[tokio::test]
    async fn unknown_trip_is_not_found() {
        let gateway = MockGateway::new();
        let service = TripService::new(gateway);
        let id = Uuid::new_v4();

        assert!(service.get(id).await.unwrap_err().is_not_found());

        let view = service.load(id);
        let mut rx = view.state();
        rx.wait_for(|s| !s.is_loading()).await.unwrap();
        assert_eq!(view.current(), ViewState::NotFound);
    }
}
