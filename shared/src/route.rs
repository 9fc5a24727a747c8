use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::details::Details;
use crate::geo::{LatLng, path_length_km};
use crate::nullable::null_as_default;

/// Fewest points that make a drawable route.
pub const MIN_ROUTE_POINTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutePathError {
    #[error("unreadable route points: {0}")]
    Unreadable(String),
    #[error("route has no points")]
    Empty,
}

/// Route points normalized at the storage boundary.
///
/// The backend column is JSON and has been written both as a JSON array and as a
/// string holding an encoded array. Both decode to `Points`; anything else is kept as
/// `Unreadable` so one bad row never fails the whole listing.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutePath {
    Points(Vec<LatLng>),
    Unreadable(String),
}

impl Default for RoutePath {
    fn default() -> Self {
        Self::Points(Vec::new())
    }
}

impl RoutePath {
    pub fn from_json(raw: Value) -> Self {
        match raw {
            Value::Null => Self::default(),
            Value::Array(_) => Self::from_array(raw),
            Value::String(encoded) => match serde_json::from_str::<Value>(&encoded) {
                Ok(inner @ Value::Array(_)) => Self::from_array(inner),
                Ok(Value::Null) => Self::default(),
                Ok(other) => Self::Unreadable(format!(
                    "encoded payload is {}, not a point list",
                    json_kind(&other)
                )),
                Err(e) => Self::Unreadable(format!("invalid encoded JSON: {e}")),
            },
            other => Self::Unreadable(format!("expected a point list, found {}", json_kind(&other))),
        }
    }

    fn from_array(raw: Value) -> Self {
        match serde_json::from_value::<Vec<LatLng>>(raw) {
            Ok(points) => Self::Points(points),
            Err(e) => Self::Unreadable(e.to_string()),
        }
    }

    /// Points in stored order with out-of-range coordinates dropped.
    pub fn valid_points(&self) -> Result<Vec<LatLng>, RoutePathError> {
        match self {
            Self::Points(points) => Ok(points.iter().copied().filter(LatLng::is_valid).collect()),
            Self::Unreadable(reason) => Err(RoutePathError::Unreadable(reason.clone())),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl<'de> Deserialize<'de> for RoutePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_json)
    }
}

impl Serialize for RoutePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Points(points) => points.serialize(serializer),
            Self::Unreadable(_) => serializer.serialize_none(),
        }
    }
}

/// A persisted path drawn by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub route_points: RoutePath,
    #[serde(default)]
    pub start_latitude: Option<f64>,
    #[serde(default)]
    pub start_longitude: Option<f64>,
    #[serde(default)]
    pub end_latitude: Option<f64>,
    #[serde(default)]
    pub end_longitude: Option<f64>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub duration_minutes: Option<f64>,
    #[serde(default)]
    pub average_speed: Option<f64>,
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

impl Route {
    /// Valid points in drawing order. Errors when the payload is unreadable or empty.
    pub fn path(&self) -> Result<Vec<LatLng>, RoutePathError> {
        let points = self.route_points.valid_points()?;
        if points.is_empty() {
            return Err(RoutePathError::Empty);
        }
        Ok(points)
    }

    /// Stored distance when present, otherwise the length of the drawn path.
    pub fn distance_km(&self) -> Option<f64> {
        self.distance
            .or_else(|| self.path().ok().map(|points| path_length_km(&points)))
    }
}

/// Insert payload for a new route, points kept verbatim in drawing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRoute {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub route_points: Vec<LatLng>,
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub end_latitude: f64,
    pub end_longitude: f64,
    pub distance: f64,
    pub media_urls: Vec<String>,
}

impl NewRoute {
    /// `None` when the path has fewer than [`MIN_ROUTE_POINTS`] points.
    pub fn from_path(details: Details, points: Vec<LatLng>) -> Option<Self> {
        if points.len() < MIN_ROUTE_POINTS {
            return None;
        }
        let start = *points.first()?;
        let end = *points.last()?;
        Some(Self {
            name: details.name,
            description: details.description,
            distance: path_length_km(&points),
            start_latitude: start.lat,
            start_longitude: start.lng,
            end_latitude: end.lat,
            end_longitude: end.lng,
            route_points: points,
            media_urls: Vec::new(),
        })
    }

    pub fn into_route(self, id: String, created_at: DateTime<Utc>) -> Route {
        Route {
            id,
            name: self.name,
            description: self.description,
            route_points: RoutePath::Points(self.route_points),
            start_latitude: Some(self.start_latitude),
            start_longitude: Some(self.start_longitude),
            end_latitude: Some(self.end_latitude),
            end_longitude: Some(self.end_longitude),
            distance: Some(self.distance),
            duration_minutes: None,
            average_speed: None,
            media_urls: self.media_urls,
            user_id: None,
            created_at: Some(created_at),
            updated_at: Some(created_at),
            likes_count: 0,
            comments_count: 0,
        }
    }
}
