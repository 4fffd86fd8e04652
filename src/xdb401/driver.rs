// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! XDB401 driver
//!
//! [`Xdb401`] runs the conversion protocol over any [`BusDevice`] without ever
//! blocking. The host calls [`Pollable::update`] on every poll tick and
//! [`Pollable::run_pending`] once [`Pollable::next_due`] is reached; each call
//! performs at most one bus transaction group and returns immediately.

use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use super::channel::{ChannelInfo, SensorChannel};
use super::conversion::{Phase, ScheduledTask, Session, Step};
use super::decoder::{Calibration, RawSample, Reading};
use super::error::DriverError;
use super::policy::{PollDecision, TimeoutPolicy};
use super::registers::{
    RegisterMap, CMD_START_CONVERSION, DATA_LEN, PRESSURE_LEN, TEMPERATURE_LEN,
};
use super::{ComponentStatus, Pollable};
use crate::bus::{BusDevice, BusError};
use crate::config::SensorConfig;

/// Default period between measurement cycles
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// How the data registers are fetched once the conversion is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// One 5-byte read at the pressure register
    #[default]
    Contiguous,
    /// 3 bytes at the pressure register, then 2 at the temperature register
    Split,
}

/// XDB401 pressure and temperature transducer
pub struct Xdb401<D> {
    name: String,
    device: D,
    registers: RegisterMap,
    calibration: Calibration,
    policy: TimeoutPolicy,
    read_mode: ReadMode,
    update_interval: Duration,
    temperature: Option<Box<dyn SensorChannel>>,
    pressure: Option<Box<dyn SensorChannel>>,
    phase: Phase,
    task: Option<ScheduledTask>,
    status: ComponentStatus,
}

impl<D: BusDevice> Xdb401<D> {
    /// Create a driver with the default calibration and timing
    pub fn new(device: D) -> Self {
        Self {
            name: "XDB401".to_string(),
            device,
            registers: RegisterMap::default(),
            calibration: Calibration::default(),
            policy: TimeoutPolicy::default(),
            read_mode: ReadMode::default(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            temperature: None,
            pressure: None,
            phase: Phase::Idle,
            task: None,
            status: ComponentStatus::Ok,
        }
    }

    /// Create a driver from its configuration section.
    ///
    /// Channels are not created here, the host attaches them.
    pub fn from_config(device: D, config: &SensorConfig) -> Self {
        Self::new(device)
            .with_name(config.name.clone())
            .with_calibration(config.decode.calibration())
            .with_policy(config.timing.policy())
            .with_read_mode(config.read_mode)
            .with_update_interval(Duration::from_millis(config.update_interval_ms))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn set_temperature_sensor(&mut self, channel: Box<dyn SensorChannel>) {
        self.temperature = Some(channel);
    }

    pub fn set_pressure_sensor(&mut self, channel: Box<dyn SensorChannel>) {
        self.pressure = Some(channel);
    }

    /// Channel description for the temperature output
    pub fn temperature_info(&self, name: impl Into<String>) -> ChannelInfo {
        ChannelInfo::new(name, "°C", 2)
    }

    /// Channel description for the pressure output in the calibrated unit
    pub fn pressure_info(&self, name: impl Into<String>) -> ChannelInfo {
        ChannelInfo::new(name, self.calibration.unit.symbol(), 3)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> u8 {
        self.device.address()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn policy(&self) -> &TimeoutPolicy {
        &self.policy
    }

    /// Give the device back
    pub fn release(self) -> D {
        self.device
    }

    fn transition(&mut self, next: Phase) {
        debug!(
            "{} 0x{:02X}: {} -> {}",
            self.name,
            self.device.address(),
            self.phase,
            next
        );
        self.phase = next;
    }

    /// End the running cycle on `err`
    fn fail_cycle(&mut self, err: DriverError) -> DriverError {
        warn!("{} 0x{:02X}: {}", self.name, self.device.address(), err);
        self.task = None;
        self.transition(Phase::Failed);
        self.status = ComponentStatus::Warning;
        self.transition(Phase::Idle);
        err
    }

    fn check_conversion(&mut self, mut session: Session, now: Instant) -> Result<Step, DriverError> {
        let status = match self.read_status() {
            Ok(status) => status,
            Err(source) => return Err(self.fail_cycle(DriverError::StatusReadFailed { source })),
        };
        session.polls += 1;
        let elapsed = session.elapsed(now);

        match self.policy.decide(status, elapsed) {
            PollDecision::Ready => {
                debug!(
                    "{}: conversion ready after {:?} ({} polls)",
                    self.name, elapsed, session.polls
                );
                self.read_sensor_data()
            }
            PollDecision::Retry { after } => {
                let due = now + after;
                self.task = Some(ScheduledTask { due, session });
                Ok(Step::Scheduled(due))
            }
            PollDecision::TimedOut => Err(self.fail_cycle(DriverError::ConversionTimeout {
                elapsed,
                polls: session.polls,
            })),
        }
    }

    fn read_status(&mut self) -> Result<u8, BusError> {
        let data = self.device.read_register(self.registers.command, 1)?;
        data.first().copied().ok_or(BusError::ShortRead {
            register: self.registers.command,
            expected: 1,
            received: 0,
        })
    }

    fn read_raw(&mut self) -> Result<RawSample, BusError> {
        match self.read_mode {
            ReadMode::Contiguous => {
                let data = self.device.read_register(self.registers.pressure, DATA_LEN)?;
                let data: [u8; DATA_LEN] = exact(self.registers.pressure, data)?;
                Ok(RawSample::from_bytes(&data))
            }
            ReadMode::Split => {
                let pressure = self.device.read_register(self.registers.pressure, PRESSURE_LEN)?;
                let pressure: [u8; PRESSURE_LEN] = exact(self.registers.pressure, pressure)?;
                let temperature = self
                    .device
                    .read_register(self.registers.temperature, TEMPERATURE_LEN)?;
                let temperature: [u8; TEMPERATURE_LEN] =
                    exact(self.registers.temperature, temperature)?;
                Ok(RawSample::from_parts(&pressure, &temperature))
            }
        }
    }

    fn read_sensor_data(&mut self) -> Result<Step, DriverError> {
        self.transition(Phase::Reading);
        let raw = match self.read_raw() {
            Ok(raw) => raw,
            Err(source) => return Err(self.fail_cycle(DriverError::DataReadFailed { source })),
        };
        let reading = self.calibration.convert(raw);
        self.publish(&reading);

        if self.status == ComponentStatus::Warning {
            info!("{}: measurement recovered", self.name);
        }
        self.status = ComponentStatus::Ok;
        self.transition(Phase::Idle);
        Ok(Step::Published(reading))
    }

    fn publish(&mut self, reading: &Reading) {
        debug!(
            "{}: pressure={} {} (raw {}), temperature={} °C (raw {})",
            self.name,
            reading.pressure,
            reading.pressure_unit,
            reading.raw.pressure,
            reading.temperature_celsius,
            reading.raw.temperature
        );
        if let Some(channel) = self.pressure.as_mut() {
            channel.publish_state(reading.pressure);
        }
        if let Some(channel) = self.temperature.as_mut() {
            channel.publish_state(reading.temperature_celsius);
        }
    }
}

/// Turn a register read into a fixed-size array
fn exact<const N: usize>(register: u8, data: Vec<u8>) -> Result<[u8; N], BusError> {
    let received = data.len();
    data.try_into().map_err(|_| BusError::ShortRead {
        register,
        expected: N,
        received,
    })
}

impl<D: BusDevice> Pollable for Xdb401<D> {
    fn setup(&mut self) -> Result<(), DriverError> {
        let address = self.device.address();
        info!("Setting up {} at 0x{:02X}", self.name, address);
        match self.device.read_register(self.registers.command, 1) {
            Ok(_) => {
                self.status = ComponentStatus::Ok;
                Ok(())
            }
            Err(source) => {
                let err = DriverError::SetupUnreachable { address, source };
                error!("{}: {}, disabling", self.name, err);
                self.status = ComponentStatus::Failed;
                Err(err)
            }
        }
    }

    fn update(&mut self, now: Instant) -> Result<Step, DriverError> {
        if self.status == ComponentStatus::Failed {
            return Ok(Step::Disabled);
        }
        if let Some(task) = &self.task {
            warn!(
                "{}: update skipped, conversion started {:?} ago still pending",
                self.name,
                task.session.elapsed(now)
            );
            return Ok(Step::Deferred);
        }

        self.transition(Phase::CommandSent);
        if let Err(source) = self
            .device
            .write_register(self.registers.command, &[CMD_START_CONVERSION])
        {
            return Err(self.fail_cycle(DriverError::CommandWriteFailed { source }));
        }

        self.transition(Phase::AwaitingConversion);
        let due = now + self.policy.poll_interval;
        self.task = Some(ScheduledTask {
            due,
            session: Session::start(now),
        });
        Ok(Step::Scheduled(due))
    }

    fn run_pending(&mut self, now: Instant) -> Result<Step, DriverError> {
        let Some(task) = self.task else {
            return Ok(Step::Idle);
        };
        if now < task.due {
            return Ok(Step::Scheduled(task.due));
        }
        self.task = None;
        self.check_conversion(task.session, now)
    }

    fn next_due(&self) -> Option<Instant> {
        self.task.map(|task| task.due)
    }

    fn update_interval(&self) -> Duration {
        self.update_interval
    }

    fn status(&self) -> ComponentStatus {
        self.status
    }

    fn dump_config(&self) {
        info!("{}:", self.name);
        info!("  Address: 0x{:02X}", self.device.address());
        info!("  Update interval: {:?}", self.update_interval);
        info!(
            "  Decode: {} (full scale {} MPa), unit {}",
            self.calibration.mode, self.calibration.fullscale_mpa, self.calibration.unit
        );
        info!(
            "  Timing: poll every {:?}, timeout {:?} (max {} polls)",
            self.policy.poll_interval,
            self.policy.deadline,
            self.policy.max_polls()
        );
        info!("  Read mode: {:?}", self.read_mode);
        if let Some(channel) = &self.temperature {
            info!("  Temperature: '{}' [{}]", channel.info().name, channel.info().unit);
        }
        if let Some(channel) = &self.pressure {
            info!("  Pressure: '{}' [{}]", channel.info().name, channel.info().unit);
        }
        if self.status == ComponentStatus::Failed {
            error!("  Communication with {} failed", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::drivers::{MockTransaction, MockXdb401Bus};
    use crate::bus::I2CDevice;
    use crate::xdb401::channel::RecordingChannel;
    use crate::xdb401::decoder::{DecodeMode, PressureUnit};
    use crate::xdb401::registers::{REG_COMMAND, REG_PRESSURE, REG_TEMPERATURE, STATUS_BUSY};
    use approx::assert_relative_eq;
    use std::sync::{Arc, Mutex};

    const ADDRESS: u8 = 0x7F;

    struct Fixture {
        bus: MockXdb401Bus,
        driver: Xdb401<I2CDevice<MockXdb401Bus>>,
        pressure: Arc<Mutex<Vec<f64>>>,
        temperature: Arc<Mutex<Vec<f64>>>,
    }

    fn fixture(calibration: Calibration) -> Fixture {
        let bus = MockXdb401Bus::new(ADDRESS);
        let mut driver =
            Xdb401::new(I2CDevice::new(bus.clone(), ADDRESS)).with_calibration(calibration);
        let pressure = RecordingChannel::new(driver.pressure_info("Pressure"));
        let temperature = RecordingChannel::new(driver.temperature_info("Temperature"));
        let pressure_values = pressure.values();
        let temperature_values = temperature.values();
        driver.set_pressure_sensor(Box::new(pressure));
        driver.set_temperature_sensor(Box::new(temperature));
        Fixture {
            bus,
            driver,
            pressure: pressure_values,
            temperature: temperature_values,
        }
    }

    fn half_pascal_hpa() -> Calibration {
        Calibration::new(DecodeMode::HalfPascal, 10.0, PressureUnit::Hpa)
    }

    /// Drive the pending task on time until the cycle ends
    fn run_to_completion(
        driver: &mut Xdb401<I2CDevice<MockXdb401Bus>>,
        first: Step,
    ) -> Result<Step, DriverError> {
        let mut step = first;
        while let Step::Scheduled(due) = step {
            step = driver.run_pending(due)?;
        }
        Ok(step)
    }

    fn status_reads(transactions: &[MockTransaction]) -> usize {
        transactions
            .iter()
            .filter(|t| {
                matches!(t, MockTransaction::Read { register, .. } if *register == REG_COMMAND)
            })
            .count()
    }

    #[test]
    fn test_busy_busy_ready_publishes_once() {
        let mut f = fixture(half_pascal_hpa());
        f.bus.set_sample(100, 0x1700);
        f.bus.script_status([STATUS_BUSY, STATUS_BUSY, 0x00]);

        let now = Instant::now();
        let step = f.driver.update(now).unwrap();
        assert_eq!(step, Step::Scheduled(now + Duration::from_millis(5)));
        assert_eq!(f.driver.phase(), Phase::AwaitingConversion);

        let step = run_to_completion(&mut f.driver, step).unwrap();
        let Step::Published(reading) = step else {
            panic!("expected a published reading, got {:?}", step);
        };
        assert_relative_eq!(reading.pressure, 0.5);
        assert_relative_eq!(reading.temperature_celsius, 23.0);

        let transactions = f.bus.transactions();
        assert_eq!(
            transactions.first(),
            Some(&MockTransaction::Write {
                address: ADDRESS,
                register: REG_COMMAND,
                data: vec![CMD_START_CONVERSION],
            })
        );
        assert_eq!(status_reads(&transactions), 3);
        assert_eq!(
            transactions.last(),
            Some(&MockTransaction::Read {
                address: ADDRESS,
                register: REG_PRESSURE,
                length: 5,
            })
        );
        assert_eq!(transactions.len(), 5);

        assert_eq!(*f.pressure.lock().unwrap(), vec![0.5]);
        assert_eq!(*f.temperature.lock().unwrap(), vec![23.0]);
        assert_eq!(f.driver.phase(), Phase::Idle);
        assert_eq!(f.driver.status(), ComponentStatus::Ok);
        assert_eq!(f.driver.next_due(), None);
    }

    #[test]
    fn test_timeout_boundary() {
        let mut f = fixture(half_pascal_hpa());
        f.bus.set_busy_polls(u32::MAX);

        let start = Instant::now();
        let mut step = f.driver.update(start).unwrap();
        // Busy at 5, 10, ..., 45 ms reschedules
        for n in 1..=9u64 {
            let due = step.due().unwrap();
            assert_eq!(due, start + Duration::from_millis(5 * n));
            step = f.driver.run_pending(due).unwrap();
        }
        // Busy at exactly 50 ms times out
        let due = step.due().unwrap();
        assert_eq!(due, start + Duration::from_millis(50));
        let err = f.driver.run_pending(due).unwrap_err();
        assert_eq!(
            err,
            DriverError::ConversionTimeout {
                elapsed: Duration::from_millis(50),
                polls: 10,
            }
        );

        assert_eq!(status_reads(&f.bus.transactions()), 10);
        assert_eq!(f.driver.status(), ComponentStatus::Warning);
        assert_eq!(f.driver.phase(), Phase::Idle);
        assert!(f.pressure.lock().unwrap().is_empty());
        assert!(f.temperature.lock().unwrap().is_empty());
    }

    #[test]
    fn test_ready_just_before_deadline() {
        let mut f = fixture(half_pascal_hpa());
        f.bus.set_busy_polls(9);

        let start = Instant::now();
        let step = f.driver.update(start).unwrap();
        let step = run_to_completion(&mut f.driver, step).unwrap();
        assert!(matches!(step, Step::Published(_)));
        assert_eq!(status_reads(&f.bus.transactions()), 10);
    }

    #[test]
    fn test_late_callback_times_out_on_elapsed_time() {
        let mut f = fixture(half_pascal_hpa());
        f.bus.set_busy_polls(u32::MAX);

        let start = Instant::now();
        f.driver.update(start).unwrap();
        let err = f
            .driver
            .run_pending(start + Duration::from_millis(80))
            .unwrap_err();
        assert!(matches!(err, DriverError::ConversionTimeout { polls: 1, .. }));
    }

    #[test]
    fn test_early_run_pending_does_nothing() {
        let mut f = fixture(half_pascal_hpa());
        let start = Instant::now();
        f.driver.update(start).unwrap();
        f.bus.clear_transactions();

        let step = f.driver.run_pending(start + Duration::from_millis(2)).unwrap();
        assert_eq!(step, Step::Scheduled(start + Duration::from_millis(5)));
        assert!(f.bus.transactions().is_empty());
        assert_eq!(f.driver.run_pending(start).unwrap().due(), f.driver.next_due());
    }

    #[test]
    fn test_run_pending_without_cycle_is_idle() {
        let mut f = fixture(half_pascal_hpa());
        assert_eq!(f.driver.run_pending(Instant::now()).unwrap(), Step::Idle);
        assert!(f.bus.transactions().is_empty());
    }

    #[test]
    fn test_overlapping_tick_is_deferred() {
        let mut f = fixture(half_pascal_hpa());
        let start = Instant::now();
        let first = f.driver.update(start).unwrap();
        f.bus.clear_transactions();

        let step = f.driver.update(start + Duration::from_millis(1)).unwrap();
        assert_eq!(step, Step::Deferred);
        assert!(f.bus.transactions().is_empty());
        // The running session is untouched
        assert_eq!(f.driver.next_due(), first.due());
        assert_eq!(f.bus.conversions(), 1);
    }

    #[test]
    fn test_command_write_failure() {
        let mut f = fixture(half_pascal_hpa());
        f.bus.fail_writes(true);

        let err = f.driver.update(Instant::now()).unwrap_err();
        assert!(matches!(err, DriverError::CommandWriteFailed { .. }));
        assert_eq!(f.bus.transactions().len(), 1);
        assert_eq!(f.driver.status(), ComponentStatus::Warning);
        assert_eq!(f.driver.phase(), Phase::Idle);
        assert_eq!(f.driver.next_due(), None);
    }

    #[test]
    fn test_status_read_failure() {
        let mut f = fixture(half_pascal_hpa());
        let step = f.driver.update(Instant::now()).unwrap();
        f.bus.fail_status_reads(true);

        let err = f.driver.run_pending(step.due().unwrap()).unwrap_err();
        assert!(matches!(err, DriverError::StatusReadFailed { .. }));
        assert_eq!(f.driver.next_due(), None);
        assert!(f.pressure.lock().unwrap().is_empty());
    }

    #[test]
    fn test_data_read_failure_publishes_nothing() {
        let mut f = fixture(half_pascal_hpa());
        f.bus.fail_data_reads(true);
        let step = f.driver.update(Instant::now()).unwrap();

        let err = run_to_completion(&mut f.driver, step).unwrap_err();
        assert!(matches!(err, DriverError::DataReadFailed { .. }));
        assert!(f.pressure.lock().unwrap().is_empty());
        assert!(f.temperature.lock().unwrap().is_empty());
        assert_eq!(f.driver.status(), ComponentStatus::Warning);
    }

    #[test]
    fn test_success_clears_warning() {
        let mut f = fixture(half_pascal_hpa());
        f.bus.fail_writes(true);
        assert!(f.driver.update(Instant::now()).is_err());
        assert_eq!(f.driver.status(), ComponentStatus::Warning);

        f.bus.fail_writes(false);
        let step = f.driver.update(Instant::now()).unwrap();
        let step = run_to_completion(&mut f.driver, step).unwrap();
        assert!(matches!(step, Step::Published(_)));
        assert_eq!(f.driver.status(), ComponentStatus::Ok);
    }

    #[test]
    fn test_setup_failure_disables_driver() {
        let mut f = fixture(half_pascal_hpa());
        f.bus.set_present(false);

        let err = f.driver.setup().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(f.driver.status(), ComponentStatus::Failed);
        f.bus.clear_transactions();

        // Even with the device back, the driver stays off the bus
        f.bus.set_present(true);
        for _ in 0..3 {
            assert_eq!(f.driver.update(Instant::now()).unwrap(), Step::Disabled);
        }
        assert!(f.bus.transactions().is_empty());
    }

    #[test]
    fn test_setup_reads_status_register_once() {
        let mut f = fixture(half_pascal_hpa());
        f.driver.setup().unwrap();
        assert_eq!(
            f.bus.transactions(),
            vec![MockTransaction::Read {
                address: ADDRESS,
                register: REG_COMMAND,
                length: 1,
            }]
        );
        assert_eq!(f.driver.status(), ComponentStatus::Ok);
    }

    #[test]
    fn test_split_read_mode() {
        let mut f = fixture(Calibration::new(DecodeMode::FullScale, 10.0, PressureUnit::Bar));
        f.driver = f.driver.with_read_mode(ReadMode::Split);
        f.bus.set_sample(0x40_0000, -256);

        let step = f.driver.update(Instant::now()).unwrap();
        let Step::Published(reading) = run_to_completion(&mut f.driver, step).unwrap() else {
            panic!("expected a published reading");
        };
        assert_relative_eq!(reading.pressure, 50.0, epsilon = 1e-9);
        assert_relative_eq!(reading.temperature_celsius, -1.0);

        let data_reads: Vec<_> = f
            .bus
            .transactions()
            .into_iter()
            .filter(|t| matches!(t, MockTransaction::Read { register, .. } if *register != REG_COMMAND))
            .collect();
        assert_eq!(
            data_reads,
            vec![
                MockTransaction::Read {
                    address: ADDRESS,
                    register: REG_PRESSURE,
                    length: 3,
                },
                MockTransaction::Read {
                    address: ADDRESS,
                    register: REG_TEMPERATURE,
                    length: 2,
                },
            ]
        );
    }

    #[test]
    fn test_channels_are_optional() {
        let bus = MockXdb401Bus::new(ADDRESS);
        bus.set_sample(200, 5888);
        let mut driver = Xdb401::new(I2CDevice::new(bus.clone(), ADDRESS))
            .with_calibration(half_pascal_hpa());

        let step = driver.update(Instant::now()).unwrap();
        let mut step = step;
        while let Step::Scheduled(due) = step {
            step = driver.run_pending(due).unwrap();
        }
        let Step::Published(reading) = step else {
            panic!("expected a published reading");
        };
        assert_relative_eq!(reading.pressure, 1.0);
        assert_relative_eq!(reading.temperature_celsius, 23.0);
    }

    #[test]
    fn test_from_config_defaults() {
        let config = SensorConfig::default();
        let driver = Xdb401::from_config(I2CDevice::new(MockXdb401Bus::new(ADDRESS), ADDRESS), &config);
        assert_eq!(driver.update_interval(), Duration::from_secs(60));
        assert_eq!(*driver.policy(), TimeoutPolicy::default());
        assert_eq!(*driver.calibration(), Calibration::default());
        assert_eq!(driver.pressure_info("Pressure").unit, "bar");
        assert_eq!(driver.address(), ADDRESS);
    }
}
