// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::time::Duration;

use anyhow::Result;
use approx::assert_relative_eq;
use rust_xdb401::bus::drivers::MockXdb401Bus;
use rust_xdb401::bus::I2CDevice;
use rust_xdb401::config::Config;
use rust_xdb401::daemon::Daemon;
use rust_xdb401::xdb401::{create_shared_sensor_state, ComponentStatus, Xdb401};
use tokio::time;

fn fast_config() -> Config {
    let mut config = Config::default();
    config.sensor.update_interval_ms = 1_000;
    config
}

#[tokio::test(start_paused = true)]
async fn test_daemon_publishes_into_shared_state() -> Result<()> {
    let mut daemon = Daemon::new();
    daemon.launch(&fast_config()).await?;
    let state = daemon.sensor_state().expect("sensor state");

    // Cycles start at 0, 1, 2 and 3 s and each takes 15 ms
    time::sleep(Duration::from_millis(3_500)).await;

    {
        let state = state.read().await;
        assert_eq!(state.status(), ComponentStatus::Ok);
        assert_eq!(state.statistics().completed, 4);
        assert_eq!(state.statistics().failed, 0);

        let pressure = state.latest("Pressure").expect("pressure published");
        assert_eq!(pressure.unit, "bar");
        assert_relative_eq!(pressure.value, 10.0, epsilon = 1e-4);

        let temperature = state.latest("Temperature").expect("temperature published");
        assert_eq!(temperature.unit, "°C");
        assert_relative_eq!(temperature.value, 23.0);

        assert_eq!(state.history_len(), 8);
    }

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_disabled_channel_is_not_published() -> Result<()> {
    let mut config = fast_config();
    config.sensor.temperature = None;

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;
    let state = daemon.sensor_state().expect("sensor state");

    time::sleep(Duration::from_millis(1_500)).await;
    {
        let state = state.read().await;
        assert!(state.latest("Pressure").is_some());
        assert!(state.latest("Temperature").is_none());
    }

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_sensor_is_disabled() -> Result<()> {
    let mut config = fast_config();
    config.bus.mock.present = false;

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;
    let state = daemon.sensor_state().expect("sensor state");

    time::sleep(Duration::from_secs(5)).await;
    {
        let state = state.read().await;
        assert_eq!(state.status(), ComponentStatus::Failed);
        assert_eq!(state.statistics().completed, 0);
        assert_eq!(state.statistics().failed, 1);
        assert!(state.last_error().is_some());
        assert!(state.latest("Pressure").is_none());
    }

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_slow_conversions_time_out_and_recover() -> Result<()> {
    let bus = MockXdb401Bus::new(0x7F);
    bus.set_busy_polls(u32::MAX);
    let sensor = Xdb401::new(I2CDevice::new(bus.clone(), 0x7F))
        .with_update_interval(Duration::from_secs(1));
    let state = create_shared_sensor_state("XDB401");

    let mut daemon = Daemon::new();
    daemon.start_polling(sensor, state.clone())?;

    time::sleep(Duration::from_millis(500)).await;
    {
        let state = state.read().await;
        assert_eq!(state.status(), ComponentStatus::Warning);
        assert_eq!(state.statistics().failed, 1);
    }

    // The next conversion completes in time
    bus.set_busy_polls(1);
    time::sleep(Duration::from_secs(1)).await;
    {
        let state = state.read().await;
        assert_eq!(state.status(), ComponentStatus::Ok);
        assert_eq!(state.statistics().completed, 1);
    }

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_zero_update_interval_is_refused() -> Result<()> {
    let bus = MockXdb401Bus::new(0x7F);
    let sensor =
        Xdb401::new(I2CDevice::new(bus.clone(), 0x7F)).with_update_interval(Duration::ZERO);
    let state = create_shared_sensor_state("XDB401");

    let mut daemon = Daemon::new();
    assert!(daemon.start_polling(sensor, state).is_err());
    assert!(bus.transactions().is_empty());

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_all_tasks() -> Result<()> {
    let mut daemon = Daemon::new();
    daemon.launch(&fast_config()).await?;
    time::sleep(Duration::from_millis(10)).await;

    daemon.shutdown();
    time::timeout(Duration::from_secs(1), daemon.join()).await??;
    Ok(())
}
