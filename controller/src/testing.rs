//! Test doubles for the boiler: an in-memory `BoilerApi` and a real HTTP stub.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;

use boiler_common::{Endpoint, FieldMap, RequestBody};

use crate::client::{BoilerApi, ClientError};

#[derive(Default)]
pub struct FakeBoiler {
    fields: Mutex<HashMap<Endpoint, FieldMap>>,
    posts: Mutex<Vec<(Endpoint, RequestBody)>>,
    latency: Mutex<Option<Duration>>,
    offline: AtomicBool,
    reject_posts: AtomicBool,
    gets: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeBoiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, endpoint: Endpoint, fields: Value) -> Self {
        self.set(endpoint, fields);
        self
    }

    pub fn set(&self, endpoint: Endpoint, fields: Value) {
        let Value::Object(fields) = fields else {
            panic!("fake responses must be JSON objects");
        };
        self.fields.lock().unwrap().insert(endpoint, fields);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_reject_posts(&self, reject: bool) {
        self.reject_posts.store(reject, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn posts(&self) -> Vec<(Endpoint, RequestBody)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn offline_error(endpoint: Endpoint) -> ClientError {
        ClientError::Connect {
            url: endpoint.url("fake-boiler"),
            reason: "connection refused".to_string(),
        }
    }
}

#[async_trait]
impl BoilerApi for FakeBoiler {
    async fn get(&self, endpoint: Endpoint) -> Result<FieldMap, ClientError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(Self::offline_error(endpoint));
        }
        Ok(self
            .fields
            .lock()
            .unwrap()
            .get(&endpoint)
            .cloned()
            .unwrap_or_default())
    }

    async fn post(&self, endpoint: Endpoint, body: RequestBody) -> Result<(), ClientError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Self::offline_error(endpoint));
        }
        self.posts.lock().unwrap().push((endpoint, body));
        if self.reject_posts.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                url: endpoint.url("fake-boiler"),
                status: 500,
            });
        }
        Ok(())
    }

    async fn probe(&self) -> Result<(), ClientError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(Self::offline_error(Endpoint::MainParams))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub path: String,
    pub content_type: String,
    pub body: String,
}

#[derive(Default)]
struct StubInner {
    response: String,
    posts: Vec<RecordedPost>,
}

/// Minimal HTTP device: every GET answers with the same body, every POST is recorded.
pub struct StubDevice {
    addr: SocketAddr,
    inner: Arc<Mutex<StubInner>>,
}

impl StubDevice {
    pub async fn start(fields: Value) -> Self {
        Self::start_raw(&fields.to_string()).await
    }

    pub async fn start_raw(body: &str) -> Self {
        let inner = Arc::new(Mutex::new(StubInner {
            response: body.to_string(),
            posts: Vec::new(),
        }));
        let app = Router::new()
            .route("/{endpoint}", get(serve_fields).post(record_post))
            .with_state(inner.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, inner }
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn posts(&self) -> Vec<RecordedPost> {
        self.inner.lock().unwrap().posts.clone()
    }
}

async fn serve_fields(State(inner): State<Arc<Mutex<StubInner>>>) -> impl IntoResponse {
    let body = inner.lock().unwrap().response.clone();
    (StatusCode::OK, [(CONTENT_TYPE, "application/json")], body)
}

async fn record_post(
    State(inner): State<Arc<Mutex<StubInner>>>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    inner.lock().unwrap().posts.push(RecordedPost {
        path: endpoint,
        content_type,
        body,
    });
    StatusCode::OK
}
