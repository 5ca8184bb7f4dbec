//! Day-by-day activity planner.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::tables::ACTIVITIES;
use crate::error::AppResult;
use crate::gateway::{DataGateway, Filter, Order, decode_row, decode_rows};
use crate::models::{Activity, ActivityDraft};
use crate::views::{ListSpec, LiveQuery};

pub struct PlannerService {
    gateway: Arc<dyn DataGateway>,
}

impl PlannerService {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self { gateway }
    }

    /// Activities of one trip by day, then by time of day
    pub fn list_spec() -> ListSpec {
        ListSpec::new(ACTIVITIES)
            .scoped_by("trip_id")
            .order(Order::asc("day"))
            .order(Order::asc("time"))
    }

    pub async fn list(&self, trip_id: Uuid) -> AppResult<Vec<Activity>> {
        decode_rows(self.gateway.select(&Self::list_spec().query(Some(trip_id))).await?)
    }

    pub async fn watch(&self, trip_id: Uuid) -> AppResult<LiveQuery<Activity>> {
        LiveQuery::open(Arc::clone(&self.gateway), Self::list_spec(), Some(trip_id)).await
    }

    pub async fn add(&self, trip_id: Uuid, draft: &ActivityDraft) -> AppResult<Activity> {
        draft.validate()?;
        let row = self.gateway.insert(ACTIVITIES, draft.to_row(trip_id)).await?;
        let activity: Activity = decode_row(row)?;
        info!("Planned '{}' on day {} at {}", activity.title, activity.day, activity.time);
        Ok(activity)
    }

    pub async fn remove(&self, id: Uuid) -> AppResult<()> {
        self.gateway.delete(ACTIVITIES, &[Filter::eq("id", id)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use crate::models::group_by_day;

    #[tokio::test]
    async fn activities_come_back_by_day_then_time() {
        let gateway = MockGateway::new();
        let planner = PlannerService::new(gateway.clone());
        let trip = Uuid::new_v4();

        planner.add(trip, &ActivityDraft::new("14:00", "Glacier walk").on_day(2)).await.unwrap();
        planner.add(trip, &ActivityDraft::new("18:30", "Dinner")).await.unwrap();
        planner.add(trip, &ActivityDraft::new("08:00", "Cable car")).await.unwrap();
        planner.add(Uuid::new_v4(), &ActivityDraft::new("09:00", "Elsewhere")).await.unwrap();

        let activities = planner.list(trip).await.unwrap();
        let titles: Vec<&str> = activities.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Cable car", "Dinner", "Glacier walk"]);

        let days = group_by_day(&activities);
        assert_eq!(days[&1].len(), 2);
        assert_eq!(days[&2][0].title, "Glacier walk");
    }

    #[tokio::test]
    async fn incomplete_activity_is_not_inserted() {
        let gateway = MockGateway::new();
        let planner = PlannerService::new(gateway.clone());

        assert!(planner.add(Uuid::new_v4(), &ActivityDraft::new("", "Hike")).await.is_err());
        assert_eq!(gateway.count("insert:"), 0);
    }

    #[tokio::test]
    async fn removed_activity_leaves_the_day() {
        let gateway = MockGateway::new();
        let planner = PlannerService::new(gateway.clone());
        let trip = Uuid::new_v4();

        let museum = planner.add(trip, &ActivityDraft::new("10:00", "Museum")).await.unwrap();
        planner.add(trip, &ActivityDraft::new("12:00", "Lunch")).await.unwrap();
        planner.remove(museum.id).await.unwrap();

        let titles: Vec<String> = planner.list(trip).await.unwrap().into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["Lunch"]);
    }
}
