use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError, RwLock, Weak},
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use trv_common::{ActuatorCommand, ActuatorOperation, MqttConfig, SensorReading, SensorStore};

use crate::ports::ActuatorPort;

const MAX_STATE_PAYLOAD_BYTES: usize = 8 * 1024;

pub type Listener = Arc<dyn Fn(&str, &SensorReading) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: HashMap<u64, (HashSet<String>, Listener)>,
}

#[derive(Clone, Default)]
pub struct StateCache {
    states: Arc<RwLock<HashMap<String, SensorReading>>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, entity_id: &str, reading: SensorReading) {
        {
            let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
            if states.get(entity_id) == Some(&reading) {
                return;
            }
            states.insert(entity_id.to_string(), reading.clone());
        }

        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for (entities, listener) in listeners.entries.values() {
            if entities.contains(entity_id) {
                listener(entity_id, &reading);
            }
        }
    }

    pub fn subscribe(
        &self,
        entities: impl IntoIterator<Item = String>,
        listener: Listener,
    ) -> Subscription {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners
            .entries
            .insert(id, (entities.into_iter().collect(), listener));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
            detached: false,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

impl SensorStore for StateCache {
    fn read_value(&self, entity_id: &str) -> Option<SensorReading> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned()
    }
}

// Detaches its listener on `unsubscribe` or drop. No notification is
// delivered once either returns.
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
    detached: bool,
}

impl Subscription {
    pub fn unsubscribe(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    config: Arc<MqttConfig>,
    cache: StateCache,
}

impl MqttBus {
    pub fn connect(config: MqttConfig, cache: StateCache) -> (Self, EventLoop) {
        let mut options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if !config.user.is_empty() {
            options.set_credentials(config.user.clone(), config.pass.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, 64);
        let bus = Self {
            client,
            config: Arc::new(config),
            cache,
        };
        (bus, eventloop)
    }

    pub fn spawn_event_loop(&self, mut eventloop: EventLoop) -> JoinHandle<()> {
        let client = self.client.clone();
        let config = self.config.clone();
        let cache = self.cache.clone();

        tokio::spawn(async move {
            let filter = state_topic_filter(&config.state_prefix);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::Publish(message))) => {
                        handle_state_message(&config, &cache, &message.topic, &message.payload);
                    }
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("mqtt connected, subscribing to {filter}");
                        if let Err(err) = client.try_subscribe(filter.clone(), QoS::AtLeastOnce) {
                            warn!("mqtt subscribe failed: {err}");
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("mqtt poll error: {err}");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl ActuatorPort for MqttBus {
    async fn command(&self, command: &ActuatorCommand) -> anyhow::Result<()> {
        let (topic, payload) = command_message(&self.config, command);
        debug!("publishing {command} on {topic}: {payload}");
        self.client
            .publish(topic.clone(), QoS::AtLeastOnce, false, payload.to_string())
            .await
            .with_context(|| format!("failed to publish {command} on {topic}"))
    }
}

fn handle_state_message(config: &MqttConfig, cache: &StateCache, topic: &str, payload: &[u8]) {
    let Some(entity_id) = entity_from_state_topic(&config.state_prefix, topic) else {
        debug!("ignoring message on {topic}");
        return;
    };
    if payload.len() > MAX_STATE_PAYLOAD_BYTES {
        warn!(
            "dropping oversized state payload for {entity_id} ({} bytes)",
            payload.len()
        );
        return;
    }
    let Ok(message) = std::str::from_utf8(payload) else {
        warn!("dropping non utf8 state payload for {entity_id}");
        return;
    };

    cache.update(entity_id, SensorReading::parse(message));
}

fn state_topic_filter(prefix: &str) -> String {
    format!("{prefix}/+/state")
}

fn entity_from_state_topic<'a>(prefix: &str, topic: &'a str) -> Option<&'a str> {
    topic
        .strip_prefix(prefix)?
        .strip_prefix('/')?
        .strip_suffix("/state")
        .filter(|entity| !entity.is_empty() && !entity.contains('/'))
}

fn friendly_name(entity_id: &str) -> String {
    entity_id
        .strip_prefix("climate.")
        .unwrap_or(entity_id)
        .replace('_', " ")
}

fn command_message(config: &MqttConfig, command: &ActuatorCommand) -> (String, Value) {
    let entity = &command.entity_id;
    let command_topic = || format!("{}/{entity}/set", config.command_prefix);
    let vendor_topic = || format!("{}/{}/set", config.vendor_prefix, friendly_name(entity));

    match command.operation {
        ActuatorOperation::SetValvePosition(position) => {
            (command_topic(), json!({ "value": one_decimal(position) }))
        }
        ActuatorOperation::SetTargetTemperature(temp) => {
            (command_topic(), json!({ "temperature": one_decimal(temp) }))
        }
        ActuatorOperation::SetManualOperatingMode => {
            (vendor_topic(), json!({ "operating_mode": "manual" }))
        }
        ActuatorOperation::SyncRemoteTemperature(temp) => {
            (vendor_topic(), json!({ "remote_temperature": one_decimal(temp) }))
        }
    }
}

fn one_decimal(value: f32) -> f64 {
    (f64::from(value) * 10.0).round() / 10.0
}
