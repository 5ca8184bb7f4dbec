//! Application routes.

use std::fmt;

use uuid::Uuid;

/// Tab of a trip's detail screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TripTab {
    Planner,
    Bookings,
    Map,
}

impl TripTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Bookings => "bookings",
            Self::Map => "map",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "planner" => Some(Self::Planner),
            "bookings" => Some(Self::Bookings),
            "map" => Some(Self::Map),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Trips,
    CreateTrip,
    Trip { id: Uuid, tab: TripTab },
}

impl Route {
    pub fn trip(id: Uuid, tab: TripTab) -> Self {
        Self::Trip { id, tab }
    }

    pub fn path(&self) -> String {
        match self {
            Self::Login => "/login".to_string(),
            Self::Trips => "/trips".to_string(),
            Self::CreateTrip => "/trips/create".to_string(),
            Self::Trip { id, tab } => format!("/trips/{}/{}", id, tab.as_str()),
        }
    }

    /// Parse a path. `/` and `/trips/<id>` land on their default screens.
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] | ["trips"] => Some(Self::Trips),
            ["login"] => Some(Self::Login),
            ["trips", "create"] => Some(Self::CreateTrip),
            ["trips", id] => Some(Self::trip(Uuid::parse_str(id).ok()?, TripTab::Planner)),
            ["trips", id, tab] => Some(Self::trip(Uuid::parse_str(id).ok()?, TripTab::parse(tab)?)),
            _ => None,
        }
    }

    /// Every screen but the login screen needs a session
    pub fn requires_session(&self) -> bool {
        !matches!(self, Self::Login)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
