use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use hvac_group_common::{
    group_command_topic, group_state_topic, member_state_topic, slug, source_state_topic,
    DeviceKind, GroupConfig, GroupController, GroupError, GroupMode, GroupState, MemberRegistry,
    MemberRole, MemberSpec, NetworkConfig, PersistedSettings, RuntimeConfig, TemperatureSource,
    CMD_MODE, CMD_TARGET,
};

use crate::{
    group::{spawn_group, GroupHandle, HandleError},
    proxy::{DeviceProxy, MqttDeviceProxy},
    store::SettingsStore,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 4096;
const STATE_REPUBLISH_INTERVAL: Duration = Duration::from_secs(10);

/// Builds the command path for a member added at runtime.
type ProxyFactory = Arc<dyn Fn(&MemberSpec) -> Arc<dyn DeviceProxy> + Send + Sync>;

#[derive(Clone)]
struct AppState {
    group: GroupHandle,
    mqtt: AsyncClient,
    store: SettingsStore,
    router: Arc<RwLock<TopicRouter>>,
    connect: ProxyFactory,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatePayload<'a> {
    #[serde(flatten)]
    state: &'a GroupState,
    updated_at: String,
}

/// What an inbound MQTT topic means to this group.
#[derive(Debug, Clone, PartialEq)]
enum Inbound {
    Source,
    Member(String),
    Target,
    Mode,
}

#[derive(Debug, Deserialize)]
struct AddMemberParams {
    role: MemberRole,
    id: String,
    #[serde(default)]
    kind: DeviceKind,
}

/// One route per topic. A member holding both roles has a single state topic.
struct TopicRouter {
    routes: HashMap<String, Inbound>,
}

impl TopicRouter {
    fn new(config: &GroupConfig) -> Self {
        let mut router = Self {
            routes: HashMap::new(),
        };
        router
            .routes
            .insert(source_state_topic(&config.sensor.id), Inbound::Source);
        for spec in config.heaters.iter().chain(&config.coolers) {
            router.add_member(spec.id.trim());
        }
        router
            .routes
            .insert(group_command_topic(&config.name, CMD_TARGET), Inbound::Target);
        router
            .routes
            .insert(group_command_topic(&config.name, CMD_MODE), Inbound::Mode);
        router
    }

    fn route(&self, topic: &str) -> Option<&Inbound> {
        self.routes.get(topic)
    }

    /// Returns false when the member was already routed.
    fn add_member(&mut self, member_id: &str) -> bool {
        self.routes
            .insert(
                member_state_topic(member_id),
                Inbound::Member(member_id.to_string()),
            )
            .is_none()
    }

    fn remove_member(&mut self, member_id: &str) {
        self.routes.remove(&member_state_topic(member_id));
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = SettingsStore::from_env();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!(
            "failed to load runtime config from {}: {err:#}",
            store.runtime_path().display()
        );
        RuntimeConfig::default()
    });
    let exists = tokio::fs::try_exists(store.runtime_path())
        .await
        .unwrap_or(false);
    if !exists {
        match store.save_runtime_config(&runtime).await {
            Ok(()) => info!(
                "wrote default runtime config to {}",
                store.runtime_path().display()
            ),
            Err(err) => warn!("failed to write default runtime config: {err:#}"),
        }
    }
    apply_env_overrides(&mut runtime.network);

    let config = runtime.group.clone();
    let controller = GroupController::new(config.clone(), runtime.settings.clone())
        .with_context(|| {
            format!(
                "invalid group configuration in {}",
                store.runtime_path().display()
            )
        })?;
    let source = TemperatureSource::new(config.sensor.clone(), config.sensor_max_age_ms);

    let network = &runtime.network;
    let mut mqtt_options = MqttOptions::new(
        format!("hvac-group-{}", slug(&config.name)),
        network.mqtt_host.clone(),
        network.mqtt_port,
    );
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if !network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(network.mqtt_user.clone(), network.mqtt_pass.clone());
    }
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let proxies = build_proxies(controller.registry(), &mqtt);
    let (group, _group_task) = spawn_group(controller, source, proxies.clone());
    info!(
        "group {} started with {} members, sensor {}",
        config.name,
        proxies.len(),
        config.sensor.id
    );

    let connect: ProxyFactory = {
        let mqtt = mqtt.clone();
        Arc::new(move |spec: &MemberSpec| mqtt_proxy(spec, &mqtt))
    };
    let app_state = AppState {
        group,
        mqtt,
        store,
        router: Arc::new(RwLock::new(TopicRouter::new(&config))),
        connect,
    };

    spawn_mqtt_loop(app_state.clone(), eventloop);
    subscribe_topics(&app_state.mqtt, &config, &proxies).await?;
    spawn_state_publish_loop(app_state.clone(), group_state_topic(&config.name));

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/target", post(handle_set_target))
        .route("/api/mode", post(handle_set_mode))
        .route(
            "/api/members",
            get(handle_get_members).post(handle_add_member),
        )
        .route("/api/members/{id}", delete(handle_remove_member))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], runtime.network.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn apply_env_overrides(network: &mut NetworkConfig) {
    if let Ok(host) = std::env::var("MQTT_HOST") {
        network.mqtt_host = host;
    }
    if let Some(port) = env_port("MQTT_PORT") {
        network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        network.mqtt_user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        network.mqtt_pass = pass;
    }
    if let Some(port) = env_port("HVAC_GROUP_HTTP_PORT") {
        network.http_port = port;
    }
}

fn env_port(key: &str) -> Option<u16> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
}

/// One proxy per registered device, shared members included only once.
fn build_proxies(registry: &MemberRegistry, mqtt: &AsyncClient) -> Vec<Arc<dyn DeviceProxy>> {
    registry
        .iter()
        .map(|member| {
            Arc::new(MqttDeviceProxy::new(
                member.id.clone(),
                member.kind,
                mqtt.clone(),
            )) as Arc<dyn DeviceProxy>
        })
        .collect()
}

fn mqtt_proxy(spec: &MemberSpec, mqtt: &AsyncClient) -> Arc<dyn DeviceProxy> {
    Arc::new(MqttDeviceProxy::new(spec.id.clone(), spec.kind, mqtt.clone()))
}

async fn subscribe_topics(
    mqtt: &AsyncClient,
    config: &GroupConfig,
    proxies: &[Arc<dyn DeviceProxy>],
) -> anyhow::Result<()> {
    let topics = [
        source_state_topic(&config.sensor.id),
        group_command_topic(&config.name, CMD_TARGET),
        group_command_topic(&config.name, CMD_MODE),
    ];
    for topic in topics {
        mqtt.subscribe(topic, QoS::AtLeastOnce).await?;
    }

    for proxy in proxies {
        proxy
            .subscribe()
            .await
            .with_context(|| format!("failed to subscribe to member {}", proxy.member_id()))?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) = handle_mqtt_message(
                        &app_state,
                        &message.topic,
                        message.payload.to_vec(),
                    )
                    .await
                    {
                        warn!("mqtt message handling error on {}: {err:#}", message.topic);
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState, topic: String) {
    tokio::spawn(async move {
        let mut updates = app_state.group.subscribe_state();
        let mut interval = tokio::time::interval(STATE_REPUBLISH_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = updates.changed() => {
                    if changed.is_err() {
                        warn!("group state channel closed, stopping state publisher");
                        break;
                    }
                }
            }

            let state = updates.borrow_and_update().clone();
            let payload = StatePayload {
                state: &state,
                updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            };
            match serde_json::to_vec(&payload) {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(topic.as_str(), QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("group state publish failed: {err}");
                    }
                }
                Err(err) => warn!("group state serialization failed: {err}"),
            }
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: &str,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }
    let Some(inbound) = app_state.router.read().await.route(topic).cloned() else {
        debug!("ignoring message on unrouted topic {topic}");
        return Ok(());
    };
    let text = String::from_utf8(payload).context("payload is not UTF-8")?;

    match inbound {
        Inbound::Source => app_state.group.source_payload(text).await?,
        Inbound::Member(member_id) => app_state.group.member_payload(member_id, text).await?,
        Inbound::Target => {
            let value = text
                .trim()
                .parse::<f32>()
                .with_context(|| format!("invalid target temperature {text:?}"))?;
            let state = app_state.group.set_target_temperature(value).await?;
            persist_settings(app_state, &state).await?;
        }
        Inbound::Mode => {
            let mode = text.parse::<GroupMode>()?;
            let state = app_state.group.set_mode(mode).await?;
            persist_settings(app_state, &state).await?;
        }
    }
    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.group.state())
}

async fn handle_set_target(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(target) = value.trim().parse::<f32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };

    match state.group.set_target_temperature(target).await {
        Ok(group_state) => settings_response(&state, group_state).await,
        Err(err) => handle_error_response(err),
    }
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let mode = match value.parse::<GroupMode>() {
        Ok(mode) => mode,
        Err(err) => return handle_error_response(err.into()),
    };

    match state.group.set_mode(mode).await {
        Ok(group_state) => settings_response(&state, group_state).await,
        Err(err) => handle_error_response(err),
    }
}

async fn handle_get_members(State(state): State<AppState>) -> impl IntoResponse {
    match state.group.members().await {
        Ok(members) => Json(members).into_response(),
        Err(err) => handle_error_response(err),
    }
}

async fn handle_add_member(
    State(state): State<AppState>,
    Query(params): Query<AddMemberParams>,
) -> impl IntoResponse {
    let spec = MemberSpec {
        id: params.id.trim().to_string(),
        kind: params.kind,
    };
    let role = params.role;
    let proxy = (state.connect)(&spec);

    let group_state = match state
        .group
        .add_member(role, spec.clone(), proxy.clone())
        .await
    {
        Ok(group_state) => group_state,
        Err(err) => return handle_error_response(err),
    };

    if state.router.write().await.add_member(&spec.id) {
        if let Err(err) = proxy.subscribe().await {
            warn!("failed to subscribe to member {}: {err}", spec.id);
        }
    }

    let persisted = state
        .store
        .update_runtime(|runtime| {
            let specs = match role {
                MemberRole::Heater => &mut runtime.group.heaters,
                MemberRole::Cooler => &mut runtime.group.coolers,
            };
            if !specs.iter().any(|stored| stored.id == spec.id) {
                specs.push(spec.clone());
            }
        })
        .await;
    if let Err(err) = persisted {
        warn!("failed to persist member {}: {err:#}", spec.id);
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist group members",
        );
    }
    Json(group_state).into_response()
}

async fn handle_remove_member(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
) -> impl IntoResponse {
    let group_state = match state.group.remove_member(member_id.clone()).await {
        Ok(group_state) => group_state,
        Err(err) => return handle_error_response(err),
    };

    state.router.write().await.remove_member(&member_id);
    if let Err(err) = state.mqtt.unsubscribe(member_state_topic(&member_id)).await {
        warn!("failed to unsubscribe from member {member_id}: {err}");
    }

    // Removing the last member of a role can switch the mode off.
    let persisted = state
        .store
        .update_runtime(|runtime| {
            runtime.group.heaters.retain(|spec| spec.id != member_id);
            runtime.group.coolers.retain(|spec| spec.id != member_id);
            runtime.settings = PersistedSettings {
                target_temperature: group_state.target_temperature,
                mode: group_state.mode,
            };
        })
        .await;
    if let Err(err) = persisted {
        warn!("failed to persist removal of {member_id}: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist group members",
        );
    }
    Json(group_state).into_response()
}

async fn settings_response(state: &AppState, group_state: GroupState) -> axum::response::Response {
    if let Err(err) = persist_settings(state, &group_state).await {
        warn!("failed to persist group settings: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist group settings",
        );
    }
    Json(group_state).into_response()
}

async fn persist_settings(state: &AppState, group_state: &GroupState) -> anyhow::Result<()> {
    let settings = PersistedSettings {
        target_temperature: group_state.target_temperature,
        mode: group_state.mode,
    };
    state.store.save_settings(&settings).await
}

fn handle_error_response(err: HandleError) -> axum::response::Response {
    let status = match &err {
        HandleError::Group(GroupError::UnknownMember(_)) => StatusCode::NOT_FOUND,
        HandleError::Group(_) => StatusCode::BAD_REQUEST,
        HandleError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_response(status, &err.to_string())
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

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use hvac_group_common::{GroupAction, MemberSpec};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dispatcher::tests::FakeDevice;

    fn living_room() -> GroupConfig {
        GroupConfig {
            name: "Living Room".to_string(),
            heaters: vec![MemberSpec::climate("climate.radiator")],
            coolers: vec![MemberSpec::climate("climate.ac")],
            ..GroupConfig::default()
        }
    }

    async fn app_state(dir: &std::path::Path) -> AppState {
        let config = living_room();
        let controller = GroupController::new(config.clone(), PersistedSettings::default()).unwrap();
        let source = TemperatureSource::new(config.sensor.clone(), config.sensor_max_age_ms);
        let proxies: Vec<Arc<dyn DeviceProxy>> = vec![
            FakeDevice::new("climate.radiator"),
            FakeDevice::new("climate.ac"),
        ];
        let (group, _task) = spawn_group(controller, source, proxies);
        let (mqtt, _eventloop) = AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 8);

        AppState {
            group,
            mqtt,
            store: SettingsStore::new(dir),
            router: Arc::new(RwLock::new(TopicRouter::new(&config))),
            connect: Arc::new(|spec: &MemberSpec| {
                FakeDevice::new(&spec.id) as Arc<dyn DeviceProxy>
            }),
        }
    }

    fn add_params(role: MemberRole, id: &str) -> Query<AddMemberParams> {
        Query(AddMemberParams {
            role,
            id: id.to_string(),
            kind: DeviceKind::Climate,
        })
    }

    fn query(value: &str) -> Query<HashMap<String, String>> {
        Query(HashMap::from([("value".to_string(), value.to_string())]))
    }

    #[test]
    fn routes_group_topics() {
        let router = TopicRouter::new(&living_room());

        assert_eq!(
            router.route("hvac_group/source/sensor_temperature/state"),
            Some(&Inbound::Source)
        );
        assert_eq!(
            router.route("hvac_group/member/climate_ac/state"),
            Some(&Inbound::Member("climate.ac".to_string()))
        );
        assert_eq!(
            router.route("hvac_group/living_room/cmnd/target"),
            Some(&Inbound::Target)
        );
        assert_eq!(
            router.route("hvac_group/living_room/cmnd/mode"),
            Some(&Inbound::Mode)
        );
        assert_eq!(router.route("hvac_group/member/climate_ac/set"), None);
    }

    #[test]
    fn heat_pump_gets_one_route_and_one_proxy() {
        let config = GroupConfig {
            heaters: vec![MemberSpec::climate("climate.heat_pump")],
            coolers: vec![
                MemberSpec::climate("climate.heat_pump"),
                MemberSpec::climate("climate.ac"),
            ],
            ..living_room()
        };
        let mut router = TopicRouter::new(&config);
        assert_eq!(
            router.route("hvac_group/member/climate_heat_pump/state"),
            Some(&Inbound::Member("climate.heat_pump".to_string()))
        );
        assert!(!router.add_member("climate.heat_pump"));

        let controller = GroupController::new(config, PersistedSettings::default()).unwrap();
        let (mqtt, _eventloop) = AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 8);
        let ids: Vec<String> = build_proxies(controller.registry(), &mqtt)
            .iter()
            .map(|proxy| proxy.member_id().to_string())
            .collect();
        assert_eq!(ids, vec!["climate.heat_pump", "climate.ac"]);
    }

    #[test]
    fn maps_group_errors_to_status_codes() {
        let cases = [
            (
                HandleError::Group(GroupError::Validation("bad".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                HandleError::Group(GroupError::UnknownMember("climate.x".to_string())),
                StatusCode::NOT_FOUND,
            ),
            (HandleError::Stopped, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(handle_error_response(err).status(), status);
        }
    }

    #[tokio::test]
    async fn accepted_mode_and_target_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path()).await;

        let response = handle_set_mode(State(state.clone()), query("heat_cool"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let response = handle_set_target(State(state.clone()), query("22.5"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let saved = state.store.load_runtime_config().await.unwrap().settings;
        assert_eq!(
            saved,
            PersistedSettings {
                target_temperature: 22.5,
                mode: GroupMode::HeatCool,
            }
        );
    }

    #[tokio::test]
    async fn rejected_requests_leave_state_alone() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path()).await;

        let response = handle_set_target(State(state.clone()), query("warm"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = handle_set_target(State(state.clone()), query("80"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = handle_set_mode(State(state.clone()), query("dry"))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let current = state.group.state();
        assert_eq!(current.mode, GroupMode::Off);
        assert_eq!(current.action, GroupAction::Off);
        assert!(!tokio::fs::try_exists(state.store.runtime_path()).await.unwrap());
    }

    #[tokio::test]
    async fn members_are_added_and_removed_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path()).await;

        let response = handle_add_member(
            State(state.clone()),
            add_params(MemberRole::Heater, " climate.floor "),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            state
                .router
                .read()
                .await
                .route("hvac_group/member/climate_floor/state"),
            Some(&Inbound::Member("climate.floor".to_string()))
        );

        let response = handle_add_member(
            State(state.clone()),
            add_params(MemberRole::Cooler, "climate.radiator"),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let response = handle_add_member(
            State(state.clone()),
            add_params(MemberRole::Heater, "climate.floor"),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let members = state.group.members().await.unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(
            members[0].roles,
            vec![MemberRole::Heater, MemberRole::Cooler]
        );

        let response = handle_remove_member(State(state.clone()), Path("climate.ac".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            state
                .router
                .read()
                .await
                .route("hvac_group/member/climate_ac/state"),
            None
        );

        let response =
            handle_remove_member(State(state.clone()), Path("climate.ghost".to_string()))
                .await
                .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let stored = state.store.load_runtime_config().await.unwrap().group;
        assert_eq!(stored.heaters, vec![MemberSpec::climate("climate.floor")]);
        assert_eq!(stored.coolers, vec![MemberSpec::climate("climate.radiator")]);
    }

    #[tokio::test]
    async fn mqtt_commands_drive_the_group() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path()).await;

        handle_mqtt_message(
            &state,
            "hvac_group/living_room/cmnd/mode",
            b"HEAT".to_vec(),
        )
        .await
        .unwrap();
        handle_mqtt_message(
            &state,
            "hvac_group/source/sensor_temperature/state",
            b"19.0".to_vec(),
        )
        .await
        .unwrap();

        state.group.members().await.unwrap();
        assert_eq!(state.group.state().action, GroupAction::Heating);

        let err = handle_mqtt_message(
            &state,
            "hvac_group/living_room/cmnd/target",
            b"hot".to_vec(),
        )
        .await;
        assert!(err.is_err());
    }
}
