use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::details::Details;
use crate::geo::LatLng;
use crate::nullable::null_as_default;

/// A persisted point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub likes_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments_count: u32,
}

impl Spot {
    /// The spot's position, or `None` when either component is missing or out of range.
    pub fn coordinate(&self) -> Option<LatLng> {
        let point = LatLng::new(self.latitude?, self.longitude?);
        point.is_valid().then_some(point)
    }
}

/// Insert payload for a new spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSpot {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub media_urls: Vec<String>,
}

impl NewSpot {
    pub fn new(details: Details, at: LatLng) -> Self {
        Self {
            name: details.name,
            description: details.description,
            latitude: at.lat,
            longitude: at.lng,
            media_urls: Vec::new(),
        }
    }

    /// Materialize the stored row the way the backend would echo it back.
    pub fn into_spot(self, id: String, created_at: DateTime<Utc>) -> Spot {
        Spot {
            id,
            name: self.name,
            description: self.description,
            latitude: Some(self.latitude),
            longitude: Some(self.longitude),
            media_urls: self.media_urls,
            user_id: None,
            created_at: Some(created_at),
            updated_at: Some(created_at),
            likes_count: 0,
            comments_count: 0,
        }
    }
}
