use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{info, warn};

use boiler_common::{mapping::parse_time, BoilerConfig, DeviceInfo, HvacMode};

use crate::{
    client::{BoilerApi, BoilerClient},
    entities::{Command, EntityError, EntityState},
    scheduler::PollScheduler,
    setup::{self, Registry},
    store::{self, ConfigStore},
};

#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
    api: Arc<dyn BoilerApi>,
    config: Arc<Mutex<BoilerConfig>>,
    store: ConfigStore,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct DeviceView {
    #[serde(flatten)]
    device: DeviceInfo,
    host: String,
}

#[derive(Debug, Deserialize)]
struct HostUpdate {
    host: String,
}

#[derive(Debug, Serialize)]
struct HostUpdateResponse {
    #[serde(rename = "restartRequired")]
    restart_required: bool,
    host: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::new();
    let mut config = store.load().await.unwrap_or_else(|err| {
        warn!("failed to load boiler config from store: {err:#}");
        BoilerConfig::default()
    });
    store::apply_env_overrides(&mut config);
    config.sanitize();
    if config.host.is_empty() {
        anyhow::bail!("no boiler host configured; set BOILER_HOST or add \"host\" to config.json");
    }

    let api: Arc<dyn BoilerApi> = Arc::new(BoilerClient::from_config(&config));
    let registry = setup::setup(&config, api.as_ref())
        .await
        .with_context(|| format!("boiler at {} is not reachable", config.host))?;
    if let Err(err) = store.save(&config).await {
        warn!("failed to persist boiler config: {err:#}");
    }

    let scheduler = PollScheduler::start(registry.groups(), api.clone(), config.retry);

    let port = config.http_port;
    let app_state = AppState {
        registry: Arc::new(registry),
        api,
        config: Arc::new(Mutex::new(config)),
        store,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    let served = axum::serve(listener, router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    scheduler.shutdown();
    served?;
    Ok(())
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/entities", get(handle_list_entities))
        .route("/api/entities/{id}", get(handle_get_entity))
        .route("/api/entities/{id}/temperature", post(handle_set_temperature))
        .route("/api/entities/{id}/hvac_mode", post(handle_set_hvac_mode))
        .route("/api/entities/{id}/option", post(handle_select_option))
        .route("/api/entities/{id}/time", post(handle_set_time))
        .route("/api/device", get(handle_get_device))
        .route("/api/host", put(handle_put_host))
        .with_state(app_state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn handle_list_entities(State(state): State<AppState>) -> impl IntoResponse {
    let states: Vec<EntityState> = state
        .registry
        .entities()
        .map(|entity| entity.display_state())
        .collect();
    Json(states)
}

async fn handle_get_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(handle) = state.registry.get(&id) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown entity");
    };
    Json(handle.display_state()).into_response()
}

async fn handle_set_temperature(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(target) = value.trim().parse::<f64>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };

    dispatch(&state, &id, Command::SetTemperature(target)).await
}

async fn handle_set_hvac_mode(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(mode) = HvacMode::parse(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid mode. Use 'heat' or 'off'");
    };

    dispatch(&state, &id, Command::SetHvacMode(mode)).await
}

async fn handle_select_option(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    dispatch(&state, &id, Command::SelectOption(value.clone())).await
}

async fn handle_set_time(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(time) = parse_time(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid time. Use HH:MM");
    };

    dispatch(&state, &id, Command::SetTime(time)).await
}

async fn handle_get_device(State(state): State<AppState>) -> impl IntoResponse {
    let host = state.config.lock().await.host.clone();
    Json(DeviceView {
        device: state.registry.device().clone(),
        host,
    })
}

async fn handle_put_host(
    State(state): State<AppState>,
    Json(update): Json<HostUpdate>,
) -> impl IntoResponse {
    let mut candidate = state.config.lock().await.clone();
    candidate.host = update.host;
    candidate.sanitize();
    if candidate.host.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "host cannot be empty");
    }

    let probe = BoilerClient::from_config(&candidate);
    if let Err(err) = probe.probe().await {
        warn!("new boiler host {} did not answer: {err}", candidate.host);
        return error_response(StatusCode::BAD_GATEWAY, "cannot_connect");
    }

    if let Err(err) = state.store.save(&candidate).await {
        warn!("failed to persist boiler host update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist boiler settings",
        );
    }

    let host = candidate.host.clone();
    *state.config.lock().await = candidate;
    info!(%host, "boiler host updated; restart to reconnect");
    Json(HostUpdateResponse {
        restart_required: true,
        host,
    })
    .into_response()
}

/// Run a command against one entity and answer with its resulting state.
/// Device failures leave the cached state in place and are not reported as errors.
async fn dispatch(state: &AppState, id: &str, command: Command) -> axum::response::Response {
    let Some(handle) = state.registry.get(id) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown entity");
    };

    match handle.set_value(state.api.as_ref(), command).await {
        Ok(()) => {}
        Err(err @ (EntityError::Unsupported { .. } | EntityError::Encode(_))) => {
            return error_response(StatusCode::BAD_REQUEST, &err.to_string());
        }
        Err(err) => warn!(entity = id, "command not confirmed by boiler: {err}"),
    }
    Json(handle.display_state()).into_response()
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBoiler;
    use boiler_common::{Endpoint, RequestBody, RetryPolicy};
    use std::time::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    async fn app_state(api: Arc<FakeBoiler>) -> AppState {
        let config = BoilerConfig {
            host: "192.168.1.40".to_string(),
            entry_id: "e1".to_string(),
            ..BoilerConfig::default()
        };
        let registry = setup::setup(&config, api.as_ref()).await.unwrap();
        AppState {
            registry: Arc::new(registry),
            api,
            config: Arc::new(Mutex::new(config)),
            store: ConfigStore::at(std::env::temp_dir().join(format!(
                "boiler-host-test-{}",
                std::process::id()
            ))),
        }
    }

    fn value_query(value: &str) -> Query<HashMap<String, String>> {
        Query(HashMap::from([("value".to_string(), value.to_string())]))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn lists_every_entity() {
        let state = app_state(Arc::new(FakeBoiler::new())).await;

        let response = handle_list_entities(State(state)).await.into_response();

        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(9));
        assert_eq!(body[0]["kind"], "climate");
        assert_eq!(body[0]["unique_id"], "stout_plus_e1_boiler_climate");
        assert_eq!(body[0]["device"]["identifiers"], json!(["stout_plus", "e1"]));
        assert_eq!(body[0]["device"]["model"], "Stout Plus 9kvt");
        assert_eq!(body[0].get("available"), None);
        assert_eq!(body[0].get("last_error"), None);
    }

    #[tokio::test]
    async fn hanging_poll_blocks_neither_reads_nor_commands() {
        let api = Arc::new(FakeBoiler::new());
        let state = app_state(api.clone()).await;
        api.set_latency(Duration::from_secs(3_600));
        let scheduler =
            PollScheduler::start(state.registry.groups(), api.clone(), RetryPolicy::Fixed);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let listed = tokio::time::timeout(
            Duration::from_secs(30),
            handle_list_entities(State(state.clone())),
        )
        .await
        .expect("listing blocked by a hanging poll")
        .into_response();
        let commanded = tokio::time::timeout(
            Duration::from_secs(30),
            handle_set_temperature(
                State(state),
                Path("stout_plus_e1_boiler_climate".to_string()),
                value_query("35"),
            ),
        )
        .await
        .expect("command blocked by a hanging poll")
        .into_response();
        scheduler.shutdown();

        assert_eq!(listed.status(), StatusCode::OK);
        assert_eq!(body_json(commanded).await["target_temperature"], json!(35.0));
    }

    #[tokio::test]
    async fn unknown_entity_is_not_found() {
        let state = app_state(Arc::new(FakeBoiler::new())).await;

        let response = handle_get_entity(State(state), Path("nope".to_string()))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn temperature_command_reaches_boiler() {
        let api = Arc::new(FakeBoiler::new());
        let state = app_state(api.clone()).await;

        let response = handle_set_temperature(
            State(state),
            Path("stout_plus_e1_room_climate".to_string()),
            value_query("23.5"),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["target_temperature"], json!(23.5));
        assert_eq!(
            api.posts(),
            vec![(Endpoint::ChangeRoomTarget, RequestBody::Raw("[23.5]".to_string()))]
        );
    }

    #[tokio::test]
    async fn invalid_inputs_are_bad_requests() {
        let state = app_state(Arc::new(FakeBoiler::new())).await;
        let room = || Path("stout_plus_e1_room_climate".to_string());

        let not_a_number = handle_set_temperature(State(state.clone()), room(), value_query("warm"))
            .await
            .into_response();
        let out_of_range = handle_set_temperature(State(state.clone()), room(), value_query("40"))
            .await
            .into_response();
        let bad_mode = handle_set_hvac_mode(State(state.clone()), room(), value_query("cool"))
            .await
            .into_response();
        let wrong_entity = handle_set_time(State(state), room(), value_query("07:00"))
            .await
            .into_response();

        assert_eq!(not_a_number.status(), StatusCode::BAD_REQUEST);
        assert_eq!(out_of_range.status(), StatusCode::BAD_REQUEST);
        assert_eq!(bad_mode.status(), StatusCode::BAD_REQUEST);
        assert_eq!(wrong_entity.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn offline_boiler_keeps_previous_option() {
        let api = Arc::new(FakeBoiler::new());
        let state = app_state(api.clone()).await;
        api.set_offline(true);

        let response = handle_select_option(
            State(state),
            Path("stout_plus_e1_power_day".to_string()),
            value_query("4.5"),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["current_option"], Value::Null);
    }

    #[tokio::test]
    async fn unreachable_new_host_is_rejected() {
        let state = app_state(Arc::new(FakeBoiler::new())).await;

        let response = handle_put_host(
            State(state.clone()),
            Json(HostUpdate {
                host: "127.0.0.1:1".to_string(),
            }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(state.config.lock().await.host, "192.168.1.40");
    }
}
