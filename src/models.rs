//! Data Models
//!
//! Rows of the gateway's tables (trips, bookings, activities, locations,
//! trip shares) plus the drafts the forms build before an insert. Drafts
//! validate locally; nothing is sent to the gateway until `validate` passes.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::ValidationError;

// ============================================================================
// DATE HANDLING
// ============================================================================

/// Parse a calendar date from either a `date` or a timestamp column
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
}

mod date_format {
    use super::*;

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("unrecognised date '{}'", raw)))
    }
}

/// Empty or whitespace-only form input counts as absent
fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

fn check_coordinates(latitude: f64, longitude: f64) -> Result<(), ValidationError> {
    let valid = latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude);
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidCoordinates { latitude, longitude })
    }
}

// ============================================================================
// TRIPS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub location: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(with = "date_format")]
    pub start_date: NaiveDate,
    #[serde(with = "date_format")]
    pub end_date: NaiveDate,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Trip {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Number of calendar days covered, both ends included
    pub fn day_count(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Calendar date of planner day `day` (day 1 is the start date)
    pub fn date_of_day(&self, day: i32) -> Option<NaiveDate> {
        if day < 1 {
            return None;
        }
        self.start_date.checked_add_days(chrono::Days::new((day - 1) as u64))
    }
}

/// Trip form contents
#[derive(Debug, Clone, PartialEq)]
pub struct TripDraft {
    pub location: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl TripDraft {
    pub fn new(location: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            location: location.into(),
            description: String::new(),
            start_date,
            end_date,
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Fill location and coordinates from a city suggestion
    pub fn with_city(mut self, city: &City) -> Self {
        self.location = city.label();
        self.latitude = Some(city.latitude);
        self.longitude = Some(city.longitude);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.location, "a location")?;
        if self.end_date < self.start_date {
            return Err(ValidationError::DateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if let (Some(lat), Some(lon)) = (self.latitude, self.longitude) {
            check_coordinates(lat, lon)?;
        }
        Ok(())
    }

    /// Editable columns only; ownership never changes after creation
    pub(crate) fn to_patch(&self) -> Value {
        json!({
            "location": self.location.trim(),
            "description": self.description.trim(),
            "start_date": self.start_date.format("%Y-%m-%d").to_string(),
            "end_date": self.end_date.format("%Y-%m-%d").to_string(),
            "latitude": self.latitude,
            "longitude": self.longitude,
        })
    }

    pub(crate) fn to_row(&self, owner: Uuid) -> Value {
        let mut row = self.to_patch();
        row["user_id"] = json!(owner);
        row
    }
}

/// Entry of the bundled city list used for location suggestions
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct City {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl City {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().or(self.city.as_deref()).unwrap_or_default()
    }

    /// `"City, Country"`
    pub fn label(&self) -> String {
        format!("{}, {}", self.display_name(), self.country)
    }
}

// ============================================================================
// BOOKINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingKind {
    Hotel,
    /// Older rows still say `flight`
    #[serde(alias = "flight")]
    Transport,
    Activity,
    #[serde(other)]
    Other,
}

impl BookingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hotel => "hotel",
            Self::Transport => "transport",
            Self::Activity => "activity",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub trip_id: Uuid,
    #[serde(rename = "type")]
    pub kind: BookingKind,
    pub title: String,
    #[serde(default)]
    pub confirmation_number: Option<String>,
    #[serde(with = "date_format")]
    pub date: NaiveDate,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Booking {
    pub fn has_attachment(&self) -> bool {
        self.file_url.is_some()
    }
}

/// File picked on the device, to be attached to a booking
#[derive(Clone, PartialEq)]
pub struct LocalFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    /// Extension for the stored object, from the file name or the MIME type
    pub fn extension(&self) -> String {
        if let Some((_, ext)) = self.name.rsplit_once('.') {
            if !ext.is_empty() {
                return ext.to_ascii_lowercase();
            }
        }
        match self.mime_type.as_str() {
            "application/pdf" => "pdf",
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/heic" => "heic",
            _ => "bin",
        }
        .to_string()
    }
}

impl std::fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingDraft {
    pub kind: BookingKind,
    pub title: String,
    pub confirmation_number: Option<String>,
    pub date: NaiveDate,
    pub time: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub file: Option<LocalFile>,
}

impl BookingDraft {
    pub fn new(kind: BookingKind, title: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            kind,
            title: title.into(),
            confirmation_number: None,
            date,
            time: None,
            location: None,
            notes: None,
            file: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.title, "a title")
    }

    /// Row to insert; `attachment` is the stored file's URL when a file was uploaded
    pub(crate) fn to_row(&self, trip_id: Uuid, attachment: Option<&str>) -> Value {
        json!({
            "trip_id": trip_id,
            "type": self.kind.as_str(),
            "title": self.title.trim(),
            "confirmation_number": non_empty(&self.confirmation_number),
            "date": self.date.format("%Y-%m-%d").to_string(),
            "time": non_empty(&self.time),
            "location": non_empty(&self.location),
            "notes": non_empty(&self.notes),
            "file_url": attachment,
            "file_name": attachment.and(self.file.as_ref().map(|f| f.name.clone())),
        })
    }
}

// ============================================================================
// PLANNER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub day: i32,
    pub time: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityDraft {
    pub day: i32,
    pub time: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
}

impl ActivityDraft {
    /// New activity on the first day of the trip
    pub fn new(time: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            day: 1,
            time: time.into(),
            title: title.into(),
            description: None,
            location: None,
        }
    }

    pub fn on_day(mut self, day: i32) -> Self {
        self.day = day;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.time, "a time")?;
        require(&self.title, "a title")?;
        if self.day < 1 {
            return Err(ValidationError::InvalidDay(self.day));
        }
        Ok(())
    }

    pub(crate) fn to_row(&self, trip_id: Uuid) -> Value {
        json!({
            "trip_id": trip_id,
            "day": self.day,
            "time": self.time.trim(),
            "title": self.title.trim(),
            "description": non_empty(&self.description),
            "location": non_empty(&self.location),
        })
    }
}

/// Activities keyed by day, keeping the incoming order within a day
pub fn group_by_day(activities: &[Activity]) -> BTreeMap<i32, Vec<&Activity>> {
    let mut days: BTreeMap<i32, Vec<&Activity>> = BTreeMap::new();
    for activity in activities {
        days.entry(activity.day).or_default().push(activity);
    }
    days
}

// ============================================================================
// MAP
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationCategory {
    Hotel,
    Activity,
    Restaurant,
    #[serde(other)]
    Other,
}

impl LocationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hotel => "hotel",
            Self::Activity => "activity",
            Self::Restaurant => "restaurant",
            Self::Other => "other",
        }
    }

    /// Marker colour on the trip map
    pub fn marker_color(&self) -> &'static str {
        match self {
            Self::Hotel => "#FF6B6B",
            Self::Activity => "#4ECDC4",
            Self::Restaurant => "#FFD166",
            Self::Other => "#6C5CE7",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "type")]
    pub category: LocationCategory,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationDraft {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub category: LocationCategory,
    pub notes: Option<String>,
}

impl LocationDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "a name")?;
        check_coordinates(self.latitude, self.longitude)
    }

    pub(crate) fn to_row(&self, trip_id: Uuid) -> Value {
        json!({
            "trip_id": trip_id,
            "name": self.name.trim(),
            "latitude": self.latitude,
            "longitude": self.longitude,
            "type": self.category.as_str(),
            "notes": non_empty(&self.notes),
        })
    }
}

/// Visible map area
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapRegion {
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl MapRegion {
    /// Initial region: the trip's own coordinates, else the first saved
    /// location zoomed in closer, else the origin.
    pub fn for_trip(trip: Option<&Trip>, locations: &[Location]) -> Self {
        if let Some((latitude, longitude)) = trip.and_then(Trip::coordinates) {
            return Self {
                latitude,
                longitude,
                latitude_delta: 0.06,
                longitude_delta: 0.03,
            };
        }
        match locations.first() {
            Some(first) => Self {
                latitude: first.latitude,
                longitude: first.longitude,
                latitude_delta: 0.02,
                longitude_delta: 0.02,
            },
            None => Self {
                latitude: 0.0,
                longitude: 0.0,
                latitude_delta: 0.06,
                longitude_delta: 0.03,
            },
        }
    }
}

// ============================================================================
// SHARING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripShare {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub shared_with_email: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Trim and lowercase an email typed into the share form
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::MissingField("an email address"));
    }
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.contains('@') && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !well_formed || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail(email));
    }
    Ok(email)
}
