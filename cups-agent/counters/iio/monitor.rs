// IIO (Integrated IO) bandwidth monitor
//
// Discovery walks the model's link table, keeps active links and sizes the
// aggregate link capacity. Traffic is counted once per (bus, controller
// generation) because lanes behind one controller share its counters.

use cups_raw::arch::iio::{
    free_running, link_speed_gbps, xpp, xpp_counter, ControllerGen, IioCounterScheme,
    LinkDescriptor, LinkStatus, PortType, DWORDS_IN_GIGABYTE, FREE_RUNNING_COUNTER_WIDTH_BITS,
    FULL_DUPLEX, XPP_COUNTER_WIDTH_BITS,
};
use cups_raw::{cpu, CpuModel};

use crate::counters::tracker::CounterTracker;
use crate::counters::{identify, DomainMetric};
use crate::error::Result;
use crate::transport::Adapter;

const BITS_PER_BYTE: u64 = 8;

type XppTracker = CounterTracker<XPP_COUNTER_WIDTH_BITS>;
type FreeRunningTracker = CounterTracker<FREE_RUNNING_COUNTER_WIDTH_BITS>;

type XppGetter = fn(&Adapter, u8, u8, u8) -> Result<u32>;
type XppSetter = fn(&Adapter, u8, u8, u8, u32) -> Result<()>;

/// XPP monitor registers and the values counting starts from
const XPP_CONFIGURATION: [(&str, XppGetter, XppSetter, u32); 3] = [
    ("XPPMR", Adapter::get_xpp_mr, Adapter::set_xpp_mr, xpp::MR_VALUE),
    ("XPPMER", Adapter::get_xpp_mer, Adapter::set_xpp_mer, xpp::MER_VALUE),
    ("XPPERCONF", Adapter::get_xpp_er_conf, Adapter::set_xpp_er_conf, xpp::ER_CONF_VALUE),
];

/// An active link found during discovery
#[derive(Debug, Clone, Copy)]
pub struct ActiveLink {
    pub descriptor: LinkDescriptor,
    pub status: LinkStatus,
    pub speed_gbps: f64,
}

impl std::fmt::Display for ActiveLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {} x{} {} Gbit/s",
            self.descriptor.port, self.descriptor.controller, self.status.width, self.speed_gbps
        )
    }
}

#[derive(Debug, Clone)]
enum LinkCounters {
    Xpp(XppTracker),
    FreeRunning([FreeRunningTracker; 4]),
}

#[derive(Debug, Clone)]
struct MonitoredLink {
    bus: u8,
    device: u8,
    gen: ControllerGen,
    counters: LinkCounters,
}

impl MonitoredLink {
    fn new(link: &LinkDescriptor, scheme: IioCounterScheme) -> Self {
        let counters = match scheme {
            IioCounterScheme::XppMonitor => LinkCounters::Xpp(CounterTracker::new()),
            IioCounterScheme::FreeRunning => LinkCounters::FreeRunning(Default::default()),
        };
        Self {
            bus: link.port.bus,
            device: link.controller.device,
            gen: link.controller.gen,
            counters,
        }
    }

    fn read(&self, adapter: &Adapter, address: u8) -> Result<Vec<u64>> {
        match self.counters {
            LinkCounters::Xpp(_) => {
                let low = adapter.get_xpp_mdl(address, self.bus, self.device)?;
                let high = adapter.get_xpp_mdh(address, self.bus, self.device)?;
                Ok(vec![xpp_counter(low, high)])
            }
            LinkCounters::FreeRunning(_) => {
                let clock = adapter.get_xpp_free_running_clock(address, self.bus, self.device)?;
                let values = free_running::COUNTER_OFFSETS
                    .iter()
                    .map(|offset| {
                        adapter.get_xpp_free_running_counter(address, self.bus, self.device, *offset)
                    })
                    .collect::<Result<Vec<_>>>()?;
                tracing::trace!(
                    "0x{:02x} bus {} dev {}: clock {} counters {:?}",
                    address,
                    self.bus,
                    self.device,
                    clock,
                    values
                );
                Ok(values)
            }
        }
    }

    /// Feed values from [`MonitoredLink::read`]; every tracker is updated
    fn sample(&mut self, tag: &str, values: &[u64]) -> Option<f64> {
        match &mut self.counters {
            LinkCounters::Xpp(tracker) => tracker.sample(tag, values[0]),
            LinkCounters::FreeRunning(trackers) => trackers
                .iter_mut()
                .zip(values)
                .map(|(tracker, value)| tracker.sample(tag, *value))
                .collect::<Vec<_>>()
                .into_iter()
                .sum(),
        }
    }

    fn reset(&mut self) {
        match &mut self.counters {
            LinkCounters::Xpp(tracker) => tracker.reset(),
            LinkCounters::FreeRunning(trackers) => trackers.iter_mut().for_each(|t| t.reset()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IioMetric {
    adapter: Adapter,
    address: u8,
    cpu_id: u32,
    model: CpuModel,
    /// Sum of speed x width x duplex over active links, in Gbit/s
    link_capacity: u64,
    active_links: Vec<ActiveLink>,
    monitored: Vec<MonitoredLink>,
}

impl IioMetric {
    pub fn detect(adapter: &Adapter, address: u8) -> Option<Self> {
        let (cpu_id, model) = identify(adapter, address)?;

        match Self::discover(adapter, address, cpu_id, model) {
            Ok(metric) => Some(metric),
            Err(e) => {
                tracing::error!("IIO discovery failed: {}", e);
                None
            }
        }
    }

    fn discover(adapter: &Adapter, address: u8, cpu_id: u32, model: CpuModel) -> Result<Self> {
        let tables = model.tables();
        let primary = cpu::is_primary(address);

        let mut link_capacity = 0u64;
        let mut active_links = Vec::new();
        let mut monitored: Vec<MonitoredLink> = Vec::new();

        for entry in tables.iio_links {
            let mut link = *entry;
            if primary && link.port.dual_use {
                link.port.kind = PortType::Dmi;
                if !link.controller.can_be_dmi {
                    continue;
                }
            }

            let status = match adapter.get_link_status(address, &link) {
                Ok(status) => status,
                Err(_) => continue,
            };
            if !status.active {
                continue;
            }

            let speed_gbps = link_speed_gbps(status.speed).unwrap_or_else(|| {
                tracing::error!(
                    "0x{:02x} {} / {}: unknown link speed id {}",
                    address,
                    link.port,
                    link.controller,
                    status.speed
                );
                0.0
            });
            link_capacity += (speed_gbps * status.width as f64 * FULL_DUPLEX as f64) as u64;

            active_links.push(ActiveLink {
                descriptor: link,
                status,
                speed_gbps,
            });

            let seen = monitored
                .iter()
                .any(|m| m.bus == link.port.bus && m.gen == link.controller.gen);
            if !seen {
                monitored.push(MonitoredLink::new(&link, tables.iio_counters));
            }
        }

        if tables.iio_counters == IioCounterScheme::XppMonitor {
            for link in &monitored {
                configure_xpp(adapter, address, link.bus, link.device)?;

                if let Ok(gigabytes) = adapter.get_dlu(address, link.bus) {
                    tracing::debug!(
                        "0x{:02x} bus {}: data link utilization {} GB",
                        address,
                        link.bus,
                        gigabytes
                    );
                }
            }
        }

        Ok(Self {
            adapter: adapter.clone(),
            address,
            cpu_id,
            model,
            link_capacity,
            active_links,
            monitored,
        })
    }

    pub fn cpu_id(&self) -> u32 {
        self.cpu_id
    }

    pub fn model(&self) -> CpuModel {
        self.model
    }

    pub fn active_links(&self) -> &[ActiveLink] {
        &self.active_links
    }

    pub fn monitored_count(&self) -> usize {
        self.monitored.len()
    }
}

/// Bring the monitor registers to their counting values, writing only mismatches
fn configure_xpp(adapter: &Adapter, address: u8, bus: u8, device: u8) -> Result<()> {
    for (name, get, set, expected) in XPP_CONFIGURATION {
        let current = discover!(address, get(adapter, address, bus, device), "get_xpp_register");
        if current != expected {
            tracing::debug!(
                "0x{:02x} bus {} dev {}: {} 0x{:08x} -> 0x{:08x}",
                address,
                bus,
                device,
                name,
                current,
                expected
            );
            discover!(address, set(adapter, address, bus, device, expected), "set_xpp_register");
        }
    }
    Ok(())
}

impl DomainMetric for IioMetric {
    fn address(&self) -> u8 {
        self.address
    }

    /// DWORDs per second across all active links
    fn max_utilization(&self) -> u64 {
        self.link_capacity * DWORDS_IN_GIGABYTE / BITS_PER_BYTE
    }

    fn delta(&mut self) -> Result<Option<f64>> {
        let readings = self
            .monitored
            .iter()
            .map(|link| link.read(&self.adapter, self.address))
            .collect::<Result<Vec<_>>>()?;

        let address = self.address;
        let rates: Vec<Option<f64>> = self
            .monitored
            .iter_mut()
            .zip(&readings)
            .map(|(link, values)| {
                let tag = format!("0x{:02x} IIO bus {} {:?}", address, link.bus, link.gen);
                link.sample(&tag, values)
            })
            .collect();

        Ok(rates.into_iter().sum())
    }

    fn reset(&mut self) {
        self.monitored.iter_mut().for_each(MonitoredLink::reset);
    }

    fn describe(&self) -> String {
        let max = self.max_utilization();
        let mut summary = format!(
            "IIO 0x{:02x}: max {} DWORDs/s ({:.1} GB/s), {} active links",
            self.address,
            max,
            max as f64 / DWORDS_IN_GIGABYTE as f64,
            self.active_links.len()
        );
        for link in &self.active_links {
            summary.push_str(&format!("\n  {}", link));
        }
        summary
    }
}
