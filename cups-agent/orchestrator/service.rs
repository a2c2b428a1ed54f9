// The CUPS service
//
// One task owns every piece of state: the CPU snapshot, per-CPU readings and
// the sensors. Ticks, discovery passes, re-discovery requests and
// configuration changes are all handled from a single `select!` loop, so no
// two of them ever overlap. Other tasks see a status snapshot and send
// commands through a `ServiceHandle`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::common::HostState;
use crate::config::{validate_averaging_period, validate_interval, ServiceConfig};
use crate::counters::Cpu;
use crate::error::{CupsError, Result};
use crate::metrics::sensor::average_samples;
use crate::metrics::{FailureHandler, LoadFactorCfg, LoadFactors, SensorKind, Sensors};
use crate::orchestrator::discovery::Discovery;
use crate::orchestrator::readings::Readings;
use crate::transport::Adapter;

const COMMAND_QUEUE: usize = 16;

/// What the rest of the process may observe of the service
#[derive(Debug, Clone, Default)]
pub struct ServiceStatus {
    pub config: ServiceConfig,
    pub dynamic_load_factors: Option<LoadFactors>,
    pub cpu_count: usize,
    pub sensors: Vec<(SensorKind, f64)>,
}

impl ServiceStatus {
    pub fn sensor(&self, kind: SensorKind) -> Option<f64> {
        self.sensors
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, value)| *value)
    }
}

#[derive(Debug)]
pub enum Command {
    /// Replace the whole configuration; it must already be valid
    Apply {
        config: ServiceConfig,
        reply: oneshot::Sender<Result<()>>,
    },
}

#[derive(Debug, Clone)]
pub struct ServiceHandle {
    commands: mpsc::Sender<Command>,
    status: Arc<RwLock<ServiceStatus>>,
}

impl ServiceHandle {
    pub fn status(&self) -> ServiceStatus {
        self.status.read().clone()
    }

    pub fn config(&self) -> ServiceConfig {
        self.status.read().config
    }

    pub async fn apply(&self, config: ServiceConfig) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Apply { config, reply })
            .await
            .map_err(|_| CupsError::ServiceUnavailable("service stopped".to_string()))?;

        response
            .await
            .map_err(|_| CupsError::ServiceUnavailable("service dropped the request".to_string()))?
    }
}

pub struct Service {
    discovery: Discovery,
    readings: Readings,
    cpus: Vec<Cpu>,
    sensors: Sensors,
    config: ServiceConfig,
    host_state: watch::Receiver<HostState>,
    status: Arc<RwLock<ServiceStatus>>,
    restarts: mpsc::UnboundedReceiver<SensorKind>,
    commands: mpsc::Receiver<Command>,
}

impl Service {
    pub fn new(
        adapter: Adapter,
        config: ServiceConfig,
        host_state: watch::Receiver<HostState>,
    ) -> (Self, ServiceHandle) {
        let (restart_tx, restarts) = mpsc::unbounded_channel();
        let on_failure: FailureHandler = Arc::new(move |kind: SensorKind| {
            // The receiver only goes away with the service itself
            let _ = restart_tx.send(kind);
        });

        let (command_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let status = Arc::new(RwLock::new(ServiceStatus {
            config,
            ..Default::default()
        }));

        let samples = average_samples(config.averaging_period_ms, config.interval_ms);
        let service = Self {
            discovery: Discovery::new(adapter),
            readings: Readings::new(),
            cpus: Vec::new(),
            sensors: Sensors::new(on_failure, samples),
            config,
            host_state,
            status: Arc::clone(&status),
            restarts,
            commands,
        };
        service.publish_status();

        let handle = ServiceHandle {
            commands: command_tx,
            status,
        };
        (service, handle)
    }

    pub fn start(self, cancel_token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel_token))
    }

    pub async fn run(mut self, cancel_token: CancellationToken) {
        tracing::info!(
            "Starting CUPS service: interval {} ms, averaging period {} ms, {} load factors",
            self.config.interval_ms,
            self.config.averaging_period_ms,
            self.config.load_factor_cfg
        );

        let mut ticker = Self::ticker(self.config.interval_ms);

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    tracing::info!("CUPS service stopping");
                    break;
                }
                Some(command) = self.commands.recv() => {
                    let interval_ms = self.config.interval_ms;
                    self.handle(command);
                    if self.config.interval_ms != interval_ms {
                        ticker = Self::ticker(self.config.interval_ms);
                    }
                }
                Some(kind) = self.restarts.recv() => {
                    tracing::debug!("{} requested re-discovery", kind.name());
                    self.discovery.restart();
                }
                _ = tokio::time::sleep_until(self.discovery.deadline()) => {
                    let cpus = self.discovery.run();
                    self.on_discovery_complete(cpus);
                }
                _ = ticker.tick() => self.on_tick(),
            }
        }
    }

    fn ticker(interval_ms: u64) -> Interval {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Apply { config, reply } => {
                let result = self.apply(config);
                if reply.send(result).is_err() {
                    tracing::debug!("Configuration requester went away");
                }
            }
        }
    }

    /// Validate first, so a rejected configuration changes nothing
    pub fn apply(&mut self, config: ServiceConfig) -> Result<()> {
        config.validate()?;
        self.set_interval(config.interval_ms)?;
        self.set_averaging_period(config.averaging_period_ms)?;
        self.set_load_factor_cfg(config.load_factor_cfg);
        self.set_static_load_factors(config.static_load_factors);
        Ok(())
    }

    pub fn on_tick(&mut self) {
        let host_off = self.host_state.borrow().is_off();
        self.readings.tick(
            &self.cpus,
            host_off,
            &mut self.sensors,
            self.config.load_factor_cfg,
            self.config.static_load_factors,
        );
        self.publish_status();
    }

    pub fn on_discovery_complete(&mut self, cpus: Vec<Cpu>) {
        if cpus.len() != self.cpus.len() {
            tracing::info!("CPU configuration change detected. CPU count = {}", cpus.len());
            for cpu in &cpus {
                tracing::info!("{}", cpu.describe());
            }
        }
        self.cpus = cpus;
        self.publish_status();
    }

    pub fn set_interval(&mut self, interval_ms: u64) -> Result<()> {
        validate_interval(interval_ms)?;
        if interval_ms != self.config.interval_ms {
            tracing::info!("Interval changed to {} ms", interval_ms);
            self.config.interval_ms = interval_ms;
            self.reset_averages();
        }
        Ok(())
    }

    pub fn set_averaging_period(&mut self, averaging_period_ms: u64) -> Result<()> {
        validate_averaging_period(averaging_period_ms)?;
        if averaging_period_ms != self.config.averaging_period_ms {
            tracing::info!("Averaging period changed to {} ms", averaging_period_ms);
            self.config.averaging_period_ms = averaging_period_ms;
            self.reset_averages();
        }
        Ok(())
    }

    pub fn set_load_factor_cfg(&mut self, cfg: LoadFactorCfg) {
        if cfg != self.config.load_factor_cfg {
            tracing::info!("Load factor configuration changed to {}", cfg);
            self.config.load_factor_cfg = cfg;
            self.publish_status();
        }
    }

    /// Invalid factors fall back to the defaults
    pub fn set_static_load_factors(&mut self, factors: LoadFactors) {
        let factors = match factors.validate() {
            Ok(()) => factors,
            Err(e) => {
                tracing::error!("{}, using default load factors", e);
                LoadFactors::default()
            }
        };
        if factors != self.config.static_load_factors {
            tracing::info!(
                "Static load factors changed to {}/{}/{}",
                factors.core,
                factors.iio,
                factors.memory
            );
            self.config.static_load_factors = factors;
            self.publish_status();
        }
    }

    pub fn interval(&self) -> u64 {
        self.config.interval_ms
    }

    pub fn averaging_period(&self) -> u64 {
        self.config.averaging_period_ms
    }

    pub fn load_factor_cfg(&self) -> LoadFactorCfg {
        self.config.load_factor_cfg
    }

    pub fn static_load_factors(&self) -> LoadFactors {
        self.config.static_load_factors
    }

    pub fn dynamic_load_factors(&self) -> Option<LoadFactors> {
        self.readings.dynamic_factors()
    }

    pub fn cpus(&self) -> &[Cpu] {
        &self.cpus
    }

    pub fn sensors(&self) -> &Sensors {
        &self.sensors
    }

    fn reset_averages(&mut self) {
        let samples = average_samples(self.config.averaging_period_ms, self.config.interval_ms);
        self.sensors.config_changed(samples);
        self.publish_status();
    }

    fn publish_status(&self) {
        let mut status = self.status.write();
        status.config = self.config;
        status.dynamic_load_factors = self.readings.dynamic_factors();
        status.cpu_count = self.cpus.len();
        status.sensors = self.sensors.values();
    }
}
