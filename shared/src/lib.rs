pub mod details;
pub mod geo;
mod nullable;
pub mod route;
pub mod spot;

pub use details::{Details, DetailsError};
pub use geo::{Bounds, LatLng, path_length_km};
pub use route::{MIN_ROUTE_POINTS, NewRoute, Route, RoutePath, RoutePathError};
pub use spot::{NewSpot, Spot};
