// Memory bandwidth monitor
//
// Capacity is sized from populated channels and the DDR frequency, in
// cache lines per second. Traffic comes from the read and write telemetry
// counters of each memory controller sample.

use std::collections::BTreeSet;

use cups_raw::arch::memory::{
    TelemetrySampleIndex, CACHE_LINE_SIZE, CHANNEL_WIDTH, TELEMETRY_COUNTER_WIDTH_BITS,
};
use cups_raw::CpuModel;

use crate::counters::tracker::{mhz_to_hz, CounterTracker};
use crate::counters::{identify, DomainMetric};
use crate::error::Result;
use crate::transport::Adapter;

type TelemetryTracker = CounterTracker<TELEMETRY_COUNTER_WIDTH_BITS>;

#[derive(Debug, Clone)]
struct SampleTrackers {
    index: TelemetrySampleIndex,
    reads: TelemetryTracker,
    writes: TelemetryTracker,
}

#[derive(Debug, Clone)]
pub struct MemoryMetric {
    adapter: Adapter,
    address: u8,
    cpu_id: u32,
    model: CpuModel,
    bus_number: u8,
    dimm_count: usize,
    channel_count: usize,
    frequency_mhz: u32,
    samples: Vec<SampleTrackers>,
}

impl MemoryMetric {
    /// `bus_number` addresses the socket's memory controllers
    pub fn detect(adapter: &Adapter, address: u8, bus_number: u8) -> Option<Self> {
        let (cpu_id, model) = identify(adapter, address)?;

        match Self::discover(adapter, address, cpu_id, model, bus_number) {
            Ok(metric) => Some(metric),
            Err(e) => {
                tracing::error!("Memory discovery failed: {}", e);
                None
            }
        }
    }

    fn discover(
        adapter: &Adapter,
        address: u8,
        cpu_id: u32,
        model: CpuModel,
        bus_number: u8,
    ) -> Result<Self> {
        let tables = model.tables();

        let mut dimm_count = 0;
        let mut channels = BTreeSet::new();
        for slot in tables.dimm_slots {
            if discover!(
                address,
                adapter.is_dimm_populated(address, bus_number, slot),
                "is_dimm_populated"
            ) {
                dimm_count += 1;
                channels.insert(slot.channel);
            }
        }

        let frequency_mhz = discover!(address, adapter.get_memory_frequency(address, model), "get_memory_frequency");

        let samples = tables
            .memory_samples
            .iter()
            .map(|index| SampleTrackers {
                index: *index,
                reads: CounterTracker::new(),
                writes: CounterTracker::new(),
            })
            .collect();

        Ok(Self {
            adapter: adapter.clone(),
            address,
            cpu_id,
            model,
            bus_number,
            dimm_count,
            channel_count: channels.len(),
            frequency_mhz,
            samples,
        })
    }

    pub fn cpu_id(&self) -> u32 {
        self.cpu_id
    }

    pub fn model(&self) -> CpuModel {
        self.model
    }

    pub fn dimm_count(&self) -> usize {
        self.dimm_count
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn frequency_mhz(&self) -> u32 {
        self.frequency_mhz
    }
}

impl DomainMetric for MemoryMetric {
    fn address(&self) -> u8 {
        self.address
    }

    /// Cache lines per second
    fn max_utilization(&self) -> u64 {
        self.channel_count as u64 * mhz_to_hz(self.frequency_mhz) * CHANNEL_WIDTH / CACHE_LINE_SIZE
    }

    fn delta(&mut self) -> Result<Option<f64>> {
        let counters = self
            .samples
            .iter()
            .map(|s| self.adapter.get_memory_rw_counters(self.address, &s.index))
            .collect::<Result<Vec<_>>>()?;

        let address = self.address;
        let rates: Vec<Option<f64>> = self
            .samples
            .iter_mut()
            .zip(&counters)
            .map(|(s, c)| {
                let tag = format!("0x{:02x} memory 0x{:02x}", address, s.index.sample);
                let reads = s.reads.sample(&format!("{} rd", tag), c.reads as u64);
                let writes = s.writes.sample(&format!("{} wr", tag), c.writes as u64);
                reads.zip(writes).map(|(r, w)| r + w)
            })
            .collect();

        Ok(rates.into_iter().sum())
    }

    fn reset(&mut self) {
        for s in &mut self.samples {
            s.reads.reset();
            s.writes.reset();
        }
    }

    fn describe(&self) -> String {
        format!(
            "Memory 0x{:02x}: bus {}, {} DIMMs on {} channels at {} MHz, max {} B/s",
            self.address,
            self.bus_number,
            self.dimm_count,
            self.channel_count,
            self.frequency_mhz,
            self.max_utilization() * CACHE_LINE_SIZE
        )
    }
}
