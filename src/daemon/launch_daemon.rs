// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::bus::{create_bus_driver, I2CDevice};
use crate::config::Config;
use crate::xdb401::{
    create_shared_sensor_state, ChannelInfo, ComponentStatus, DriverError, Measurement, Pollable,
    QueueChannel, SharedSensorState, Step, Xdb401,
};

/// Period of the heartbeat log
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Represents a daemon task that can be started and managed
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    sensor_state: Option<SharedSensorState>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            shutdown_tx,
            sensor_state: None,
        }
    }

    /// Launch the sensor and the heartbeat based on configuration
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let bus = create_bus_driver(&config.bus)
            .with_context(|| format!("Failed to open {} I2C bus", config.bus.bus_type))?;
        let device = I2CDevice::new(bus, config.sensor.address);
        let mut sensor = Xdb401::from_config(device, &config.sensor);

        let state = create_shared_sensor_state(config.sensor.name.clone());
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut channels = Vec::new();

        if let Some(channel) = &config.sensor.temperature {
            let info = sensor.temperature_info(channel.name.clone());
            channels.push(info.clone());
            sensor.set_temperature_sensor(Box::new(QueueChannel::new(info, sender.clone())));
        }
        if let Some(channel) = &config.sensor.pressure {
            let info = sensor.pressure_info(channel.name.clone());
            channels.push(info.clone());
            sensor.set_pressure_sensor(Box::new(QueueChannel::new(info, sender.clone())));
        }
        drop(sender);

        self.start_consumer(receiver, channels, state.clone())?;
        self.start_polling(sensor, state.clone())?;
        self.start_heartbeat(state.clone())?;
        self.sensor_state = Some(state);

        Ok(())
    }

    /// Shared state of the launched sensor
    pub fn sensor_state(&self) -> Option<SharedSensorState> {
        self.sensor_state.clone()
    }

    /// Run the setup check of `sensor` and, if it passes, poll it on a task
    ///
    /// A sensor failing its setup check is left disabled: its status is
    /// recorded in `state` and no polling task is spawned. A zero update
    /// interval is refused before the sensor is touched.
    pub fn start_polling<P>(&mut self, mut sensor: P, state: SharedSensorState) -> Result<()>
    where
        P: Pollable + Send + 'static,
    {
        anyhow::ensure!(
            !sensor.update_interval().is_zero(),
            "Update interval must be greater than 0"
        );

        let setup = sensor.setup();
        sensor.dump_config();

        if let Err(err) = setup {
            error!("Sensor disabled: {}", err);
            let task = tokio::spawn(async move {
                let mut state = state.write().await;
                state.record_failure(&err);
                state.set_status(ComponentStatus::Failed);
                Ok(())
            });
            self.tasks.push(task);
            return Ok(());
        }

        info!(
            "Starting sensor polling every {:?}",
            sensor.update_interval()
        );
        let running = self.running.clone();
        let shutdown = self.shutdown_tx.subscribe();
        let task = tokio::spawn(poll_loop(sensor, state, running, shutdown));

        self.tasks.push(task);
        Ok(())
    }

    /// Move published measurements into the shared state
    fn start_consumer(
        &mut self,
        mut receiver: mpsc::UnboundedReceiver<Measurement>,
        channels: Vec<ChannelInfo>,
        state: SharedSensorState,
    ) -> Result<()> {
        debug!("Starting measurement consumer");

        let channels: HashMap<String, ChannelInfo> = channels
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect();
        let mut shutdown = self.shutdown_tx.subscribe();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    measurement = receiver.recv() => {
                        let Some(measurement) = measurement else { break };
                        match channels.get(&measurement.channel) {
                            Some(info) => info!("{}: {}", info.name, info.format(measurement.value)),
                            None => info!("{}: {} {}", measurement.channel, measurement.value, measurement.unit),
                        }
                        state.write().await.record_measurement(measurement);
                    }
                    _ = shutdown.changed() => break,
                }
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Start a heartbeat task that logs system status periodically
    fn start_heartbeat(&mut self, state: SharedSensorState) -> Result<()> {
        debug!("Starting heartbeat monitor");

        let running = self.running.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                {
                    let state = state.read().await;
                    let stats = state.statistics();
                    debug!(
                        "Daemon heartbeat: {} {:?}, {} cycles completed, {} failed, {} deferred",
                        state.name(),
                        state.status(),
                        stats.completed,
                        stats.failed,
                        stats.deferred
                    );
                }
                tokio::select! {
                    _ = time::sleep(HEARTBEAT_INTERVAL) => {}
                    _ = shutdown.changed() => break,
                }
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Stop all running tasks
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
    }

    /// Wait for all tasks to complete
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Task failed: {:#}", e),
                Err(e) => error!("Task panicked: {}", e),
            }
        }
        Ok(())
    }
}

/// Drive `sensor` from its update interval and its own scheduled callbacks
async fn poll_loop<P: Pollable>(
    mut sensor: P,
    state: SharedSensorState,
    running: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut ticker = time::interval(sensor.update_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while running.load(Ordering::SeqCst) {
        let result = match sensor.next_due() {
            Some(due) => tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = time::sleep_until(time::Instant::from_std(due)) => {
                    sensor.run_pending(time::Instant::now().into_std())
                }
                _ = ticker.tick() => sensor.update(time::Instant::now().into_std()),
            },
            None => tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => sensor.update(time::Instant::now().into_std()),
            },
        };
        record_step(&state, sensor.status(), result).await;
    }

    debug!("Sensor polling stopped");
    Ok(())
}

async fn record_step(
    state: &SharedSensorState,
    status: ComponentStatus,
    result: Result<Step, DriverError>,
) {
    let mut state = state.write().await;
    match result {
        Ok(Step::Published(_)) => state.record_success(),
        Ok(Step::Deferred) => state.record_deferred(),
        Ok(Step::Disabled) => warn!("Tick ignored, sensor is disabled"),
        Ok(Step::Scheduled(_)) | Ok(Step::Idle) => {}
        Err(err) => state.record_failure(&err),
    }
    state.set_status(status);
}
