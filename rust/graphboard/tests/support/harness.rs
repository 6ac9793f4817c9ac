use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{self, Request, StatusCode},
    Router,
};
use graphboard::{
    chart::Row,
    config::AppConfig,
    error::{Result, ServiceError},
    server::Server,
    state::AppState,
    storage::GraphStore,
    warehouse::Warehouse,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::{
    net::SocketAddr,
    sync::{Arc, Once},
};
use tempfile::TempDir;
use tower::ServiceExt;

static TRACING_INIT: Once = Once::new();

pub const SAMPLE_ROWS: &str = r#"[
    {"day": {"value": "2024-01-01"}, "city": "NY", "n": 1},
    {"day": {"value": "2024-01-01"}, "city": "LA", "n": 2},
    {"day": {"value": "2024-01-02"}, "city": "NY", "n": 5},
    {"day": {"value": "2024-01-02"}, "city": "NY", "n": "oops"}
]"#;

/// Warehouse double that records every query it receives.
#[derive(Default)]
pub struct StubWarehouse {
    rows: Mutex<Vec<Row>>,
    failure: Mutex<Option<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl StubWarehouse {
    pub fn set_rows(&self, json: &str) {
        *self.rows.lock() = serde_json::from_str(json).expect("stub rows should parse");
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    pub fn last_call(&self) -> Option<(String, String)> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl Warehouse for StubWarehouse {
    async fn run_query(&self, sql: &str, location: &str) -> Result<Vec<Row>> {
        self.calls
            .lock()
            .push((sql.to_string(), location.to_string()));
        if let Some(message) = self.failure.lock().clone() {
            return Err(ServiceError::Warehouse(message));
        }
        Ok(self.rows.lock().clone())
    }
}

pub struct GraphboardTestHarness {
    router: Router,
    pub warehouse: Arc<StubWarehouse>,
    _data_dir: TempDir,
}

/// Router backed by a temp-dir graph store and a [`StubWarehouse`] seeded
/// with [`SAMPLE_ROWS`].
pub fn harness() -> GraphboardTestHarness {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });

    let data_dir = TempDir::new().expect("temp dir should be created");
    let config = AppConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        data_dir: data_dir.path().join("graphs"),
        default_location: "EU".to_string(),
        bigquery: None,
    };

    let store = GraphStore::open(&config.data_dir).expect("graph store should open");
    let warehouse = Arc::new(StubWarehouse::default());
    warehouse.set_rows(SAMPLE_ROWS);

    let state = AppState::new(Arc::new(config), store, warehouse.clone());
    let router = Server::with_state(state).router();

    GraphboardTestHarness {
        router,
        warehouse,
        _data_dir: data_dir,
    }
}

impl GraphboardTestHarness {
    pub async fn get(&self, path: &str) -> http::Response<Body> {
        self.send("GET", path, None::<&Value>).await
    }

    pub async fn delete(&self, path: &str) -> http::Response<Body> {
        self.send("DELETE", path, None::<&Value>).await
    }

    pub async fn post<T: Serialize>(&self, path: &str, payload: &T) -> http::Response<Body> {
        self.send("POST", path, Some(payload)).await
    }

    pub async fn put<T: Serialize>(&self, path: &str, payload: &T) -> http::Response<Body> {
        self.send("PUT", path, Some(payload)).await
    }

    async fn send<T: Serialize>(
        &self,
        method: &str,
        path: &str,
        payload: Option<&T>,
    ) -> http::Response<Body> {
        let builder = Request::builder().method(method).uri(path);
        let request = match payload {
            Some(payload) => {
                let body = serde_json::to_vec(payload).expect("request payload should serialize");
                builder
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
            }
            None => builder.body(Body::empty()),
        }
        .expect("failed to build harness request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should handle harness request")
    }
}

pub async fn read_json(response: http::Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("response body should deserialize");
    let value =
        serde_json::from_slice::<Value>(&bytes).expect("response body should be valid JSON");
    (status, value)
}
