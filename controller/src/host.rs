use std::{
    collections::{BTreeMap, HashMap},
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{error, info, warn};

use trv_common::{
    types::{MAX_ACTUATOR_TEMP_C, MIN_ACTUATOR_TEMP_C},
    MqttConfig, PresetTemperatures, RestoredState, RuntimeConfig, ZoneEngine, ZoneSnapshot,
};

use crate::bus::{MqttBus, StateCache};
use crate::ports::{Clock, StateStore};
use crate::zone_runtime::{RuntimeError, ZoneCommand, ZoneDeps, ZoneHandle, ZoneRuntime, ZoneTimers};

#[derive(Clone)]
struct AppState {
    zones: Arc<BTreeMap<String, ZoneHandle>>,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    zones_dir: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct TimezoneClock {
    timezone: String,
}

impl Clock for TimezoneClock {
    fn now(&self) -> DateTime<FixedOffset> {
        now_in_timezone(&self.timezone).unwrap_or_else(|| Utc::now().fixed_offset())
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime.mqtt);
    if runtime.timezone.parse::<Tz>().is_err() {
        warn!("unknown timezone {:?}, using UTC", runtime.timezone);
    }

    let cache = StateCache::new();
    let (bus, eventloop) = MqttBus::connect(runtime.mqtt.clone(), cache.clone());
    let mqtt_task = bus.spawn_event_loop(eventloop);

    let deps = ZoneDeps {
        cache,
        actuators: Arc::new(bus),
        store: Arc::new(store.clone()),
        clock: Arc::new(TimezoneClock {
            timezone: runtime.timezone.clone(),
        }),
        timers: ZoneTimers::default(),
    };

    let mut zones = Vec::new();
    for config in &runtime.zones {
        match ZoneEngine::new(config) {
            Ok(engine) => zones.push(ZoneRuntime::start(engine, deps.clone()).await),
            Err(err) => warn!("skipping zone {:?}: {err}", config.name),
        }
    }
    if zones.is_empty() {
        warn!("no zones configured in {}", store.runtime_path.display());
    }

    let handles = zones
        .iter()
        .map(|zone| {
            let handle = zone.handle();
            (handle.name().to_string(), handle)
        })
        .collect();
    let app = Router::new()
        .route("/api/zones", get(handle_list_zones))
        .route("/api/zones/{zone}", get(handle_get_zone))
        .route("/api/zones/{zone}/enabled", post(handle_set_enabled))
        .route("/api/zones/{zone}/target", post(handle_set_target))
        .route("/api/zones/{zone}/preset", post(handle_set_preset))
        .route(
            "/api/zones/{zone}/preset-temperatures",
            put(handle_put_preset_temperatures),
        )
        .with_state(AppState {
            zones: Arc::new(handles),
            store,
        });

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for zone in zones {
        zone.shutdown().await;
    }
    mqtt_task.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn apply_env_overrides(mqtt: &mut MqttConfig) {
    if let Ok(host) = std::env::var("MQTT_HOST") {
        mqtt.host = host;
    }
    if let Some(port) = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        mqtt.port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        mqtt.user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        mqtt.pass = pass;
    }
}

async fn handle_list_zones(State(state): State<AppState>) -> impl IntoResponse {
    let zones: Vec<ZoneSnapshot> = state.zones.values().map(ZoneHandle::snapshot).collect();
    Json(zones)
}

async fn handle_get_zone(
    State(state): State<AppState>,
    Path(zone): Path<String>,
) -> impl IntoResponse {
    let Some(handle) = state.zones.get(&zone) else {
        return zone_not_found(&zone);
    };
    Json(handle.snapshot()).into_response()
}

async fn handle_set_enabled(
    State(state): State<AppState>,
    Path(zone): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let enabled = match value.to_ascii_lowercase().as_str() {
        "on" | "heat" => true,
        "off" => false,
        _ => return error_response(StatusCode::BAD_REQUEST, "Invalid value. Use 'on' or 'off'"),
    };

    run_command(&state, &zone, ZoneCommand::SetEnabled(enabled)).await
}

async fn handle_set_target(
    State(state): State<AppState>,
    Path(zone): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(target) = value.parse::<f32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };
    if !valid_temperature(target) {
        return error_response(StatusCode::BAD_REQUEST, "Temperature must be between 5 and 30");
    }

    run_command(&state, &zone, ZoneCommand::SetTargetTemperature(target)).await
}

async fn handle_set_preset(
    State(state): State<AppState>,
    Path(zone): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    run_command(&state, &zone, ZoneCommand::SetPreset(value.clone())).await
}

async fn handle_put_preset_temperatures(
    State(state): State<AppState>,
    Path(zone): Path<String>,
    Json(temperatures): Json<PresetTemperatures>,
) -> impl IntoResponse {
    let PresetTemperatures {
        away,
        present,
        cosy,
    } = temperatures;
    if ![away, present, cosy].into_iter().all(valid_temperature) {
        return error_response(StatusCode::BAD_REQUEST, "Temperatures must be between 5 and 30");
    }
    if !state.zones.contains_key(&zone) {
        return zone_not_found(&zone);
    }

    let command = ZoneCommand::SetPresetTemperatures(temperatures);
    let response = run_command(&state, &zone, command).await;
    if response.status().is_success() {
        if let Err(err) = persist_preset_temperatures(&state.store, &zone, temperatures).await {
            warn!("failed to persist preset temperatures: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist runtime settings",
            );
        }
    }
    response
}

async fn run_command(state: &AppState, zone: &str, command: ZoneCommand) -> Response {
    let Some(handle) = state.zones.get(zone) else {
        return zone_not_found(zone);
    };

    match handle.command(command).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(RuntimeError::InvalidPreset(err)) => {
            error_response(StatusCode::BAD_REQUEST, &format!("Invalid preset: {err}"))
        }
        Err(err) => {
            error!("zone command failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

async fn persist_preset_temperatures(
    store: &AppStore,
    zone: &str,
    temperatures: PresetTemperatures,
) -> anyhow::Result<()> {
    let mut runtime = store.load_runtime_config().await?;
    let config = runtime
        .zones
        .iter_mut()
        .find(|config| config.name == zone)
        .with_context(|| format!("zone {zone:?} missing from runtime config"))?;
    config.away_temp = temperatures.away;
    config.present_temp = temperatures.present;
    config.cosy_temp = temperatures.cosy;
    store.save_runtime_config(&runtime).await
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("THERMOSTAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.thermostat"));
        Self::with_data_dir(data_dir)
    }

    fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            zones_dir: Arc::new(data_dir.join("zones")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }

    fn zone_path(&self, zone: &str) -> PathBuf {
        self.zones_dir.join(format!("{}.json", file_stem(zone)))
    }
}

#[async_trait]
impl StateStore for AppStore {
    async fn restore(&self, zone: &str) -> anyhow::Result<Option<RestoredState>> {
        let _guard = self.lock.lock().await;
        let path = self.zone_path(zone);
        match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice::<RestoredState>(&raw)
                .map(Some)
                .with_context(|| format!("invalid zone state in {}", path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn persist(&self, zone: &str, state: &RestoredState) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(self.zones_dir.as_ref()).await?;
        let payload = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(self.zone_path(zone), payload).await?;
        Ok(())
    }
}

fn file_stem(zone: &str) -> String {
    zone.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn valid_temperature(temp: f32) -> bool {
    temp.is_finite() && (MIN_ACTUATOR_TEMP_C..=MAX_ACTUATOR_TEMP_C).contains(&temp)
}

fn now_in_timezone(timezone: &str) -> Option<DateTime<FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

fn zone_not_found(zone: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, &format!("Unknown zone '{zone}'"))
}

fn error_response(status: StatusCode, message: &str) -> Response {
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
    use pretty_assertions::assert_eq;
    use trv_common::{HvacMode, PresetKind};

    fn temp_store(name: &str) -> AppStore {
        let dir = std::env::temp_dir()
            .join(format!("trv-controller-{name}-{}", std::process::id()));
        AppStore::with_data_dir(dir)
    }

    #[test]
    fn zone_names_map_to_safe_file_names() {
        assert_eq!(file_stem("living room/2"), "living_room_2");
        assert_eq!(file_stem("office-1"), "office-1");
    }

    #[test]
    fn temperatures_are_bounded_to_actuator_range() {
        assert!(valid_temperature(5.0));
        assert!(valid_temperature(30.0));
        assert!(!valid_temperature(4.9));
        assert!(!valid_temperature(f32::NAN));
    }

    #[test]
    fn resolves_known_timezones_only() {
        assert!(now_in_timezone("Europe/Berlin").is_some());
        assert!(now_in_timezone("Mars/Olympus").is_none());
    }

    #[tokio::test]
    async fn zone_state_round_trips_through_files() {
        let store = temp_store("state");
        assert_eq!(store.restore("office").await.unwrap(), None);

        let state = RestoredState {
            hvac_mode: HvacMode::Heat,
            target_temperature: Some(21.5),
            preset: Some(PresetKind::Cosy),
        };
        store.persist("office", &state).await.unwrap();
        assert_eq!(store.restore("office").await.unwrap(), Some(state));

        let _ = tokio::fs::remove_dir_all(store.zones_dir.as_ref()).await;
    }

    #[tokio::test]
    async fn missing_runtime_config_loads_defaults() {
        let store = temp_store("runtime");
        let runtime = store.load_runtime_config().await.unwrap();
        assert_eq!(runtime.timezone, "Europe/Berlin");
        assert!(runtime.zones.is_empty());
        assert_eq!(runtime.mqtt.vendor_prefix, "zigbee2mqtt");
    }
}
