use std::cell::RefCell;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use rollum_shared::{NewRoute, NewSpot, Route, Spot};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::config::MapConfig;

const SPOTS_PATH: &str = "/rest/v1/app_spots";
const ROUTES_PATH: &str = "/rest/v1/routes";
const NEWEST_FIRST: &str = "select=*&order=created_at.desc";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}")]
    Http { status: u16 },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("not signed in")]
    Unauthenticated,
}

/// Backing store for spots and routes.
pub trait MapStore {
    fn list_spots(&self) -> LocalBoxFuture<'static, Result<Vec<Spot>, StoreError>>;
    fn list_routes(&self) -> LocalBoxFuture<'static, Result<Vec<Route>, StoreError>>;
    fn create_spot(&self, spot: NewSpot) -> LocalBoxFuture<'static, Result<Spot, StoreError>>;
    fn create_route(&self, route: NewRoute) -> LocalBoxFuture<'static, Result<Route, StoreError>>;
}

/// REST store when a base URL is configured, otherwise an empty in-memory one.
pub fn from_config(config: &MapConfig) -> Rc<dyn MapStore> {
    let base_url = config.store_url.trim();
    if base_url.is_empty() {
        tracing::info!("no data store configured, using in-memory store");
        return Rc::new(MemoryStore::default());
    }
    Rc::new(RestStore::new(base_url, &config.store_key))
}

/// Both collections, fetched concurrently.
pub struct Snapshot {
    pub spots: Result<Vec<Spot>, StoreError>,
    pub routes: Result<Vec<Route>, StoreError>,
}

pub async fn fetch_all(store: &dyn MapStore) -> Snapshot {
    let (spots, routes) = futures::join!(store.list_spots(), store.list_routes());
    Snapshot { spots, routes }
}

/// Decode rows one at a time so a single bad row doesn't hide the rest.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, table: &'static str) -> Vec<T> {
    let mut decoded = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.get("id").map(Value::to_string).unwrap_or_default();
        match serde_json::from_value::<T>(row) {
            Ok(item) => decoded.push(item),
            Err(e) => tracing::warn!(table, id = %id, error = %e, "skipping undecodable row"),
        }
    }
    decoded
}

/// PostgREST-style HTTP store.
#[derive(Debug, Clone)]
pub struct RestStore {
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(query) => format!("{}{path}?{query}", self.base_url),
            None => format!("{}{path}", self.base_url),
        }
    }

    async fn list<T: DeserializeOwned>(self, path: &'static str) -> Result<Vec<T>, StoreError> {
        let url = self.url(path, Some(NEWEST_FIRST));
        let resp = gloo_net::http::Request::get(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        check_status(resp.status(), resp.ok())?;

        let rows = resp
            .json::<Vec<Value>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(decode_rows(rows, path))
    }

    async fn insert<B, T>(self, path: &'static str, body: B) -> Result<T, StoreError>
    where
        B: serde::Serialize,
        T: DeserializeOwned,
    {
        let url = self.url(path, None);
        let resp = gloo_net::http::Request::post(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Prefer", "return=representation")
            .json(&body)
            .map_err(|e| StoreError::Decode(e.to_string()))?
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        check_status(resp.status(), resp.ok())?;

        let mut rows = resp
            .json::<Vec<T>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        if rows.is_empty() {
            return Err(StoreError::Decode("insert returned no rows".into()));
        }
        Ok(rows.swap_remove(0))
    }
}

fn check_status(status: u16, ok: bool) -> Result<(), StoreError> {
    match status {
        401 => Err(StoreError::Unauthenticated),
        _ if !ok => Err(StoreError::Http { status }),
        _ => Ok(()),
    }
}

impl MapStore for RestStore {
    fn list_spots(&self) -> LocalBoxFuture<'static, Result<Vec<Spot>, StoreError>> {
        self.clone().list(SPOTS_PATH).boxed_local()
    }

    fn list_routes(&self) -> LocalBoxFuture<'static, Result<Vec<Route>, StoreError>> {
        self.clone().list(ROUTES_PATH).boxed_local()
    }

    fn create_spot(&self, spot: NewSpot) -> LocalBoxFuture<'static, Result<Spot, StoreError>> {
        self.clone().insert(SPOTS_PATH, spot).boxed_local()
    }

    fn create_route(&self, route: NewRoute) -> LocalBoxFuture<'static, Result<Route, StoreError>> {
        self.clone().insert(ROUTES_PATH, route).boxed_local()
    }
}

#[derive(Debug, Default)]
struct MemoryTables {
    spots: Vec<Spot>,
    routes: Vec<Route>,
    next_id: u64,
    fail_writes: Option<StoreError>,
}

/// In-process store. Clones share the same tables; newest rows come first.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Rc<RefCell<MemoryTables>>,
}

impl MemoryStore {
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn with_data(spots: Vec<Spot>, routes: Vec<Route>) -> Self {
        let store = Self::default();
        {
            let mut tables = store.tables.borrow_mut();
            tables.spots = spots;
            tables.routes = routes;
        }
        store
    }

    /// Make every following create fail with `error`; `None` restores normal writes.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn fail_writes(&self, error: Option<StoreError>) {
        self.tables.borrow_mut().fail_writes = error;
    }

    pub fn spots(&self) -> Vec<Spot> {
        self.tables.borrow().spots.clone()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.tables.borrow().routes.clone()
    }

    fn allocate_id(&self, prefix: &str) -> Result<String, StoreError> {
        let mut tables = self.tables.borrow_mut();
        if let Some(error) = tables.fail_writes.clone() {
            return Err(error);
        }
        tables.next_id += 1;
        Ok(format!("{prefix}-{}", tables.next_id))
    }
}

impl MapStore for MemoryStore {
    fn list_spots(&self) -> LocalBoxFuture<'static, Result<Vec<Spot>, StoreError>> {
        futures::future::ready(Ok(self.spots())).boxed_local()
    }

    fn list_routes(&self) -> LocalBoxFuture<'static, Result<Vec<Route>, StoreError>> {
        futures::future::ready(Ok(self.routes())).boxed_local()
    }

    fn create_spot(&self, spot: NewSpot) -> LocalBoxFuture<'static, Result<Spot, StoreError>> {
        let result = self.allocate_id("spot").map(|id| {
            let spot = spot.into_spot(id, chrono::Utc::now());
            self.tables.borrow_mut().spots.insert(0, spot.clone());
            spot
        });
        futures::future::ready(result).boxed_local()
    }

    fn create_route(&self, route: NewRoute) -> LocalBoxFuture<'static, Result<Route, StoreError>> {
        let result = self.allocate_id("route").map(|id| {
            let route = route.into_route(id, chrono::Utc::now());
            self.tables.borrow_mut().routes.insert(0, route.clone());
            route
        });
        futures::future::ready(result).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use rollum_shared::{Details, LatLng, NewRoute, NewSpot, Route, Spot};
    use serde_json::json;

    use super::{MapStore, MemoryStore, RestStore, StoreError, check_status, decode_rows, fetch_all};

    fn details(name: &str) -> Details {
        Details::parse(name, "").unwrap()
    }

    #[test]
    fn bad_rows_are_skipped_individually() {
        let rows = vec![
            json!({"id": "a", "name": "A", "latitude": 1.0, "longitude": 2.0}),
            json!({"id": "b"}),
            json!({"id": "c", "name": "C"}),
        ];
        let spots: Vec<Spot> = decode_rows(rows, "app_spots");
        let ids: Vec<_> = spots.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
    }

    #[test]
    fn unreadable_route_points_still_decode_the_row() {
        let rows = vec![json!({"id": "r", "name": "R", "route_points": "{oops"})];
        let routes: Vec<Route> = decode_rows(rows, "routes");
        assert_eq!(routes.len(), 1);
        assert!(routes[0].path().is_err());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(check_status(200, true), Ok(()));
        assert_eq!(check_status(201, true), Ok(()));
        assert_eq!(check_status(401, false), Err(StoreError::Unauthenticated));
        assert_eq!(check_status(500, false), Err(StoreError::Http { status: 500 }));
    }

    #[test]
    fn rest_urls_are_normalized() {
        let store = RestStore::new("https://db.example.com/", "anon");
        assert_eq!(
            store.url("/rest/v1/routes", Some("select=*")),
            "https://db.example.com/rest/v1/routes?select=*"
        );
    }

    #[test]
    fn memory_store_inserts_newest_first() {
        let store = MemoryStore::default();
        block_on(store.create_spot(NewSpot::new(details("first"), LatLng::new(1.0, 1.0)))).unwrap();
        let second =
            block_on(store.create_spot(NewSpot::new(details("second"), LatLng::new(2.0, 2.0))))
                .unwrap();
        assert_eq!(second.coordinate(), Some(LatLng::new(2.0, 2.0)));

        let spots = block_on(store.list_spots()).unwrap();
        let names: Vec<_> = spots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["second", "first"]);
        assert_ne!(spots[0].id, spots[1].id);
    }

    #[test]
    fn memory_store_keeps_route_points_in_order() {
        let store = MemoryStore::default();
        let points = vec![LatLng::new(55.70, 37.60), LatLng::new(55.71, 37.61)];
        let new_route = NewRoute::from_path(details("loop"), points.clone()).unwrap();
        let route = block_on(store.create_route(new_route)).unwrap();
        assert_eq!(route.path().unwrap(), points);
        assert_eq!(store.routes().len(), 1);
    }

    #[test]
    fn failing_writes_leave_tables_untouched() {
        let store = MemoryStore::default();
        store.fail_writes(Some(StoreError::Unauthenticated));
        let result = block_on(store.create_spot(NewSpot::new(details("x"), LatLng::new(1.0, 1.0))));
        assert_eq!(result, Err(StoreError::Unauthenticated));
        assert!(store.spots().is_empty());
    }

    #[test]
    fn fetch_all_returns_both_collections() {
        let spot: Spot = serde_json::from_value(json!({"id": "s", "name": "S"})).unwrap();
        let store = MemoryStore::with_data(vec![spot], Vec::new());
        let snapshot = block_on(fetch_all(&store));
        assert_eq!(snapshot.spots.unwrap().len(), 1);
        assert!(snapshot.routes.unwrap().is_empty());
    }
}
