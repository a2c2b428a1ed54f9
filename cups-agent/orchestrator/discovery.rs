// CPU discovery scheduling
//
// Discovery probes every socket address and produces a fresh snapshot of
// present CPUs. It runs on a long period, or sooner after `restart()`.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::INTERVAL_RANGE;
use crate::counters::Cpu;
use crate::transport::Adapter;

pub const DISCOVERY_PERIOD: Duration = Duration::from_secs(30);

/// Delay of a discovery pass requested after a sensor failure
pub const RESTART_DELAY: Duration = Duration::from_millis(INTERVAL_RANGE.min / 2);

#[derive(Debug)]
pub struct Discovery {
    adapter: Adapter,
    next_run: Instant,
}

impl Discovery {
    /// The first pass is due immediately
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            next_run: Instant::now(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.next_run
    }

    /// Probe all addresses and schedule the next regular pass
    pub fn run(&mut self) -> Vec<Cpu> {
        let cpus: Vec<Cpu> = cups_raw::cpu::addresses()
            .filter_map(|address| Cpu::detect(&self.adapter, address))
            .collect();

        tracing::debug!("Discovery found {} CPUs", cpus.len());
        self.next_run = Instant::now() + DISCOVERY_PERIOD;
        cpus
    }

    /// Bring the next pass forward; a pass already sooner is kept
    pub fn restart(&mut self) {
        let restart_at = Instant::now() + RESTART_DELAY;
        if restart_at < self.next_run {
            tracing::info!("Discovery restart requested");
            self.next_run = restart_at;
        }
    }
}
