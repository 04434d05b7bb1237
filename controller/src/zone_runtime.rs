use std::{sync::Arc, time::Duration};

use chrono::{DateTime, FixedOffset};
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use trv_common::{
    ActuatorCommand, ParsePresetError, PresetTemperatures, SensorReading, ZoneEngine, ZoneSnapshot,
};

use crate::bus::{Listener, StateCache, Subscription};
use crate::ports::{ActuatorPort, Clock, StateStore};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("zone {0} is not running")]
    Stopped(String),
    #[error(transparent)]
    InvalidPreset(#[from] ParsePresetError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ZoneCommand {
    SetEnabled(bool),
    SetTargetTemperature(f32),
    SetPreset(String),
    SetPresetTemperatures(PresetTemperatures),
}

type Reply = oneshot::Sender<Result<ZoneSnapshot, RuntimeError>>;

enum ZoneEvent {
    SensorChanged {
        entity_id: String,
        reading: SensorReading,
    },
    ScheduleTick,
    RefreshTick,
    RemoteSync,
    Command(ZoneCommand, Reply),
}

#[derive(Debug, Clone, Copy)]
pub struct ZoneTimers {
    pub schedule: Duration,
    pub refresh: Duration,
    pub remote_sync: Duration,
}

impl Default for ZoneTimers {
    fn default() -> Self {
        Self {
            schedule: Duration::from_secs(60),
            refresh: Duration::from_secs(15),
            remote_sync: Duration::from_secs(25 * 60),
        }
    }
}

#[derive(Clone)]
pub struct ZoneDeps {
    pub cache: StateCache,
    pub actuators: Arc<dyn ActuatorPort>,
    pub store: Arc<dyn StateStore>,
    pub clock: Arc<dyn Clock>,
    pub timers: ZoneTimers,
}

#[derive(Clone)]
pub struct ZoneHandle {
    name: String,
    events: mpsc::UnboundedSender<ZoneEvent>,
    snapshot: watch::Receiver<ZoneSnapshot>,
}

impl ZoneHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> ZoneSnapshot {
        self.snapshot.borrow().clone()
    }

    pub async fn command(&self, command: ZoneCommand) -> Result<ZoneSnapshot, RuntimeError> {
        let stopped = || RuntimeError::Stopped(self.name.clone());
        let (reply, response) = oneshot::channel();
        self.events
            .send(ZoneEvent::Command(command, reply))
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())?
    }
}

pub struct ZoneRuntime {
    handle: ZoneHandle,
    subscription: Subscription,
    tasks: Vec<JoinHandle<()>>,
}

impl ZoneRuntime {
    pub async fn start(mut engine: ZoneEngine, deps: ZoneDeps) -> Self {
        let name = engine.name().to_string();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let listener_tx = events_tx.clone();
        let listener: Listener = Arc::new(move |entity_id: &str, reading: &SensorReading| {
            let event = ZoneEvent::SensorChanged {
                entity_id: entity_id.to_string(),
                reading: reading.clone(),
            };
            if listener_tx.send(event).is_err() {
                debug!("dropping change for {entity_id}, zone stopped");
            }
        });
        let subscription = deps.cache.subscribe(engine.watched_entities(), listener);

        let now = deps.clock.now();
        engine.start(now, &deps.cache);
        match deps.store.restore(&name).await {
            Ok(Some(saved)) => engine.restore(saved, now),
            Ok(None) => debug!(zone = %name, "no saved state"),
            Err(err) => warn!(zone = %name, "failed to restore saved state: {err:#}"),
        }

        let commands = engine.initialization_commands();
        execute(&mut engine, deps.actuators.as_ref(), commands).await;
        engine.record_initial_temperatures(&deps.cache);
        if engine.sync_remote_temp() {
            let commands = engine.remote_temperature_commands();
            execute(&mut engine, deps.actuators.as_ref(), commands).await;
        }
        let commands = engine.evaluate(deps.clock.now());
        execute(&mut engine, deps.actuators.as_ref(), commands).await;
        engine.read_back(&deps.cache);

        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
        let timers = deps.timers;
        let sync_remote_temp = engine.sync_remote_temp();

        let mut tasks = vec![
            tokio::spawn(run_worker(engine, events_rx, snapshot_tx, deps)),
            spawn_timer(events_tx.clone(), timers.schedule, || ZoneEvent::ScheduleTick),
            spawn_timer(events_tx.clone(), timers.refresh, || ZoneEvent::RefreshTick),
        ];
        if sync_remote_temp {
            tasks.push(spawn_timer(events_tx.clone(), timers.remote_sync, || {
                ZoneEvent::RemoteSync
            }));
        }

        info!(zone = %name, "zone started");
        Self {
            handle: ZoneHandle {
                name,
                events: events_tx,
                snapshot: snapshot_rx,
            },
            subscription,
            tasks,
        }
    }

    pub fn handle(&self) -> ZoneHandle {
        self.handle.clone()
    }

    pub async fn shutdown(mut self) {
        self.subscription.unsubscribe();
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(zone = %self.handle.name, "zone task failed: {err}");
                }
            }
        }
        info!(zone = %self.handle.name, "zone stopped");
    }
}

fn spawn_timer(
    events: mpsc::UnboundedSender<ZoneEvent>,
    period: Duration,
    event: fn() -> ZoneEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if events.send(event()).is_err() {
                break;
            }
        }
    })
}

async fn run_worker(
    mut engine: ZoneEngine,
    mut events: mpsc::UnboundedReceiver<ZoneEvent>,
    snapshot: watch::Sender<ZoneSnapshot>,
    deps: ZoneDeps,
) {
    while let Some(event) = events.recv().await {
        let now = deps.clock.now();
        let mut reply = None;

        let commands = match event {
            ZoneEvent::SensorChanged { entity_id, reading } => {
                engine.on_sensor_changed(&entity_id, &reading, now)
            }
            ZoneEvent::ScheduleTick => engine.update_preset(now),
            ZoneEvent::RefreshTick => engine.refresh(&deps.cache),
            ZoneEvent::RemoteSync => {
                debug!(zone = %engine.name(), "syncing remote temperature");
                engine.remote_temperature_commands()
            }
            ZoneEvent::Command(command, sender) => match apply_command(&mut engine, command, now) {
                Ok(commands) => {
                    reply = Some(sender);
                    commands
                }
                Err(err) => {
                    if sender.send(Err(err)).is_err() {
                        debug!(zone = %engine.name(), "command caller went away");
                    }
                    continue;
                }
            },
        };

        execute(&mut engine, deps.actuators.as_ref(), commands).await;
        engine.read_back(&deps.cache);
        snapshot.send_replace(engine.snapshot());

        if let Some(sender) = reply {
            if let Err(err) = deps.store.persist(engine.name(), &engine.restored_state()).await {
                warn!(zone = %engine.name(), "failed to persist zone state: {err:#}");
            }
            if sender.send(Ok(engine.snapshot())).is_err() {
                debug!(zone = %engine.name(), "command caller went away");
            }
        }
    }
}

fn apply_command(
    engine: &mut ZoneEngine,
    command: ZoneCommand,
    now: DateTime<FixedOffset>,
) -> Result<Vec<ActuatorCommand>, RuntimeError> {
    info!(zone = %engine.name(), "command {command:?}");
    let commands = match command {
        ZoneCommand::SetEnabled(enabled) => engine.set_enabled(enabled, now),
        ZoneCommand::SetTargetTemperature(temp) => engine.set_target_temperature(temp, now),
        ZoneCommand::SetPreset(name) => engine.set_preset_by_name(&name, now)?,
        ZoneCommand::SetPresetTemperatures(temps) => engine.set_preset_temperatures(temps, now),
    };
    Ok(commands)
}

async fn execute(
    engine: &mut ZoneEngine,
    port: &dyn ActuatorPort,
    commands: Vec<ActuatorCommand>,
) {
    for command in commands {
        match port.command(&command).await {
            Ok(()) => {
                debug!(zone = %engine.name(), "applied {command}");
                engine.command_applied(&command);
            }
            Err(err) => error!(
                zone = %engine.name(),
                actuator = %command.actuator,
                "failed to apply {command}: {err:#}"
            ),
        }
    }
}
