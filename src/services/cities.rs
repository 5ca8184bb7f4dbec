//! Location suggestions for the trip form, from a bundled city list.

use serde::Deserialize;

use crate::error::AppResult;
use crate::models::City;

const BUNDLED: &str = include_str!("../../data/cities.json");

#[derive(Deserialize)]
struct CityFile {
    top_cities: Vec<City>,
}

#[derive(Debug, Clone)]
pub struct CityIndex {
    cities: Vec<City>,
}

impl CityIndex {
    /// City list shipped with the app
    pub fn bundled() -> AppResult<Self> {
        Self::from_json(BUNDLED)
    }

    pub fn from_json(raw: &str) -> AppResult<Self> {
        let file: CityFile = serde_json::from_str(raw)?;
        Ok(Self { cities: file.top_cities })
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    /// Case-insensitive substring match on the city name.
    /// An empty query suggests nothing.
    pub fn search(&self, query: &str) -> Vec<&City> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.cities
            .iter()
            .filter(|city| city.display_name().to_lowercase().contains(&needle))
            .collect()
    }
}
