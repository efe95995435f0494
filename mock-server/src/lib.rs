use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

/// Largest page the PCE serves synchronously.
pub const SYNC_PAGE_LIMIT: usize = 500;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub href: String,
    pub key: String,
    pub value: String,
}

#[derive(Deserialize)]
pub struct CreateLabel {
    pub key: String,
    pub value: String,
}

#[derive(Deserialize)]
pub struct UpdateLabel {
    pub value: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Workload {
    pub href: String,
    pub name: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<Value>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub labels: Vec<Value>,
}

#[derive(Deserialize)]
pub struct CreateWorkload {
    pub name: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<Value>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub labels: Vec<Value>,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub max_results: Option<usize>,
}

/// How the mock authenticates and paces async jobs.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub username: String,
    pub secret: String,
    /// Sent as `Retry-After` on async submits.
    pub retry_after_secs: u64,
    /// Monitor polls answered `running` before a job reports `done`.
    pub pending_polls: u32,
    /// Jobs report `failed` instead of `done`.
    pub fail_jobs: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            username: "api_user".to_string(),
            secret: "api_secret".to_string(),
            retry_after_secs: 0,
            pending_polls: 0,
            fail_jobs: false,
        }
    }
}

#[derive(Debug)]
struct Job {
    org: u64,
    polls_left: u32,
    result: Value,
}

#[derive(Debug, Default)]
pub struct Store {
    labels: BTreeMap<u64, Label>,
    workloads: BTreeMap<u64, Workload>,
    jobs: HashMap<Uuid, Job>,
    datafiles: HashMap<Uuid, Value>,
    next_id: u64,
}

impl Store {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_label(&mut self, org: u64, key: &str, value: &str) -> Label {
        let id = self.next_id();
        let label = Label {
            href: format!("/orgs/{org}/labels/{id}"),
            key: key.to_string(),
            value: value.to_string(),
        };
        self.labels.insert(id, label.clone());
        label
    }

    pub fn add_workload(&mut self, org: u64, input: CreateWorkload) -> Workload {
        let id = self.next_id();
        let workload = Workload {
            href: format!("/orgs/{org}/workloads/{id}"),
            name: input.name,
            hostname: input.hostname,
            public_ip: input.public_ip,
            interfaces: input.interfaces,
            online: input.online,
            labels: input.labels,
        };
        self.workloads.insert(id, workload.clone());
        workload
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.labels.values()
    }

    pub fn workloads(&self) -> impl Iterator<Item = &Workload> {
        self.workloads.values()
    }
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<MockConfig>,
}

impl AppState {
    pub fn new(config: MockConfig) -> Self {
        Self::with_store(config, Store::default())
    }

    pub fn with_store(config: MockConfig, store: Store) -> Self {
        Self {
            db: Arc::new(RwLock::new(store)),
            config: Arc::new(config),
        }
    }
}

pub fn app() -> Router {
    app_with_state(AppState::new(MockConfig::default()))
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/api/v2/orgs/{org}/labels", get(list_labels).post(create_label))
        .route("/api/v2/orgs/{org}/labels/{id}", get(get_label).put(update_label))
        .route("/api/v2/orgs/{org}/workloads", get(list_workloads).post(create_workload))
        .route("/api/v2/orgs/{org}/workloads/{id}", get(get_workload).put(update_workload))
        .route("/api/v2/orgs/{org}/jobs/{id}", get(get_job))
        .route("/api/v2/orgs/{org}/datafiles/{id}", get(get_datafile))
        .layer(middleware::from_fn_with_state(state.clone(), require_basic_auth))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, AppState::new(MockConfig::default())).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn require_basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", state.config.username, state.config.secret))
    );
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    next.run(request).await
}

fn wants_async(headers: &HeaderMap) -> bool {
    headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("respond-async"))
}

/// Serve a collection: async job on `Prefer: respond-async`, otherwise one
/// page with the full size in `X-Total-Count`.
async fn list_collection<T: Serialize>(
    state: &AppState,
    org: u64,
    headers: &HeaderMap,
    params: &ListParams,
    items: Vec<T>,
) -> Response {
    let total = items.len();
    if wants_async(headers) {
        let result = match serde_json::to_value(&items) {
            Ok(value) => value,
            Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        };
        let id = Uuid::new_v4();
        state.db.write().await.jobs.insert(
            id,
            Job {
                org,
                polls_left: state.config.pending_polls,
                result,
            },
        );
        info!(%id, total, "async job queued");
        return (
            StatusCode::ACCEPTED,
            [
                (header::RETRY_AFTER, state.config.retry_after_secs.to_string()),
                (header::LOCATION, format!("/orgs/{org}/jobs/{id}")),
            ],
        )
            .into_response();
    }
    let limit = params.max_results.unwrap_or(SYNC_PAGE_LIMIT).min(SYNC_PAGE_LIMIT);
    let page: Vec<T> = items.into_iter().take(limit).collect();
    ([("x-total-count", total.to_string())], Json(page)).into_response()
}

async fn list_labels(
    State(state): State<AppState>,
    Path(org): Path<u64>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Response {
    let labels: Vec<Label> = state.db.read().await.labels().cloned().collect();
    list_collection(&state, org, &headers, &params, labels).await
}

async fn create_label(
    State(state): State<AppState>,
    Path(org): Path<u64>,
    Json(input): Json<CreateLabel>,
) -> Response {
    let mut db = state.db.write().await;
    let exists = db
        .labels()
        .any(|l| l.key == input.key && l.value == input.value);
    if exists {
        let error = serde_json::json!([{"token": "label_exists", "message": "Label already exists"}]);
        return (StatusCode::NOT_ACCEPTABLE, Json(error)).into_response();
    }
    let label = db.add_label(org, &input.key, &input.value);
    (StatusCode::CREATED, Json(label)).into_response()
}

async fn get_label(
    State(state): State<AppState>,
    Path((_org, id)): Path<(u64, u64)>,
) -> Result<Json<Label>, StatusCode> {
    let db = state.db.read().await;
    db.labels.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_label(
    State(state): State<AppState>,
    Path((_org, id)): Path<(u64, u64)>,
    Json(input): Json<UpdateLabel>,
) -> StatusCode {
    let mut db = state.db.write().await;
    match db.labels.get_mut(&id) {
        Some(label) => {
            label.value = input.value;
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn list_workloads(
    State(state): State<AppState>,
    Path(org): Path<u64>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Response {
    let workloads: Vec<Workload> = state.db.read().await.workloads().cloned().collect();
    list_collection(&state, org, &headers, &params, workloads).await
}

async fn create_workload(
    State(state): State<AppState>,
    Path(org): Path<u64>,
    Json(input): Json<CreateWorkload>,
) -> (StatusCode, Json<Workload>) {
    let workload = state.db.write().await.add_workload(org, input);
    (StatusCode::CREATED, Json(workload))
}

async fn get_workload(
    State(state): State<AppState>,
    Path((_org, id)): Path<(u64, u64)>,
) -> Result<Json<Workload>, StatusCode> {
    let db = state.db.read().await;
    db.workloads.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Partial update: only keys present in the body change.
async fn update_workload(
    State(state): State<AppState>,
    Path((_org, id)): Path<(u64, u64)>,
    Json(input): Json<Value>,
) -> StatusCode {
    let mut db = state.db.write().await;
    let Some(workload) = db.workloads.get_mut(&id) else {
        return StatusCode::NOT_FOUND;
    };
    let mut current = match serde_json::to_value(&*workload) {
        Ok(value) => value,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR,
    };
    if let (Some(target), Some(changes)) = (current.as_object_mut(), input.as_object()) {
        for (key, value) in changes {
            if key != "href" {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    match serde_json::from_value(current) {
        Ok(updated) => {
            *workload = updated;
            StatusCode::NO_CONTENT
        }
        Err(_) => StatusCode::NOT_ACCEPTABLE,
    }
}

async fn get_job(
    State(state): State<AppState>,
    Path((_org, id)): Path<(u64, Uuid)>,
) -> Result<Json<Value>, StatusCode> {
    let mut db = state.db.write().await;
    let job = db.jobs.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if job.polls_left > 0 {
        job.polls_left -= 1;
        return Ok(Json(serde_json::json!({"href": format!("/orgs/{}/jobs/{id}", job.org), "status": "running"})));
    }
    if state.config.fail_jobs {
        return Ok(Json(serde_json::json!({
            "href": format!("/orgs/{}/jobs/{id}", job.org),
            "status": "failed",
            "result": {"error": "job_failed"}
        })));
    }
    let org = job.org;
    let result = job.result.clone();
    db.datafiles.insert(id, result);
    Ok(Json(serde_json::json!({
        "href": format!("/orgs/{org}/jobs/{id}"),
        "status": "done",
        "result": {"href": format!("/orgs/{org}/datafiles/{id}")}
    })))
}

async fn get_datafile(
    State(state): State<AppState>,
    Path((_org, id)): Path<(u64, Uuid)>,
) -> Result<Json<Value>, StatusCode> {
    let db = state.db.read().await;
    db.datafiles.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}
