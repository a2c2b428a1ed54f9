// Typed PECI operations on top of a raw command executor
//
// Every operation encodes a request from cups-raw, hands it to the executor,
// then checks length and completion code before decoding. Failures are
// logged at error level, except for probes (CPU presence, link status) where
// a failure is the normal answer for an empty socket or a disabled link.

use std::sync::Arc;

use cups_raw::arch::core::{turbo_ratio_slot, Capability, CpuBusNumber, PlatformInfo};
use cups_raw::arch::iio::{
    controller_register, free_running, free_running_count, xpp, DataLinkUtilization,
    LinkDescriptor, LinkStatus, XppMonitorDataHigh,
};
use cups_raw::arch::memory::{DimmMtr, DimmSlot, MemoryFrequency, TelemetrySampleIndex};
use cups_raw::peci::{
    decode_response, GetCpuC0Counter, GetCpuId, GetMaxTurboRatio, GetTelemetrySample,
    PeciRequest, PciAddress, ReadMmio64, ReadPciLocal, ReadPciLocalQword, TelemetryCounters,
    WritePciLocal,
};
use cups_raw::{CpuModel, RegisterLayout};

use super::RawPeci;
use crate::error::{CupsError, Result};

#[derive(Clone)]
pub struct Adapter {
    peci: Arc<dyn RawPeci>,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter").finish_non_exhaustive()
    }
}

impl Adapter {
    pub fn new(peci: Arc<dyn RawPeci>) -> Self {
        Self { peci }
    }

    fn execute<R: PeciRequest>(&self, target: u8, request: &R, log_error: bool) -> Result<R::Response> {
        let bytes = request.encode(target);
        tracing::trace!("{} -> 0x{:02x}: {:02x?}", R::NAME, target, bytes);

        let result = self
            .peci
            .transfer(target, &bytes, request.response_len())
            .and_then(|raw| {
                tracing::trace!("{} <- 0x{:02x}: {:02x?}", R::NAME, target, raw);
                decode_response::<R>(&raw).map_err(|source| CupsError::CommandError {
                    target,
                    request: R::NAME,
                    source,
                })
            });

        if let Err(e) = &result {
            if log_error {
                tracing::error!("Failed to execute PECI request {}: {}", R::NAME, e);
            } else {
                tracing::debug!("Failed to execute PECI request {}: {}", R::NAME, e);
            }
        }

        result
    }

    fn read_dword(&self, target: u8, address: PciAddress) -> Result<u32> {
        Ok(self.execute(target, &ReadPciLocal::new(address), true)?.0)
    }

    fn write_dword(&self, target: u8, address: PciAddress, value: u32) -> Result<()> {
        self.execute(target, &WritePciLocal { address, value }, true)?;
        Ok(())
    }

    /// Probe: an absent CPU is not an error worth reporting
    pub fn get_cpu_id(&self, target: u8) -> Result<u32> {
        Ok(self.execute(target, &GetCpuId, false)?.0)
    }

    pub fn get_cpu_c0_counter(&self, target: u8) -> Result<u64> {
        Ok(self.execute(target, &GetCpuC0Counter, true)?.0)
    }

    pub fn get_core_mask_low(&self, target: u8, model: CpuModel) -> Result<u32> {
        self.read_dword(target, model.tables().core.core_mask_low)
    }

    pub fn get_core_mask_high(&self, target: u8, model: CpuModel) -> Result<u32> {
        self.read_dword(target, model.tables().core.core_mask_high)
    }

    pub fn get_max_non_turbo_ratio(&self, target: u8, model: CpuModel) -> Result<u8> {
        let raw = self.read_dword(target, model.tables().core.max_non_turbo_ratio)?;
        Ok(PlatformInfo::from_raw(raw).max_non_turbo_ratio)
    }

    /// Max turbo ratio for `core_count` active cores
    pub fn get_max_turbo_ratio(&self, target: u8, core_count: u32) -> Result<u8> {
        let (group, index) = turbo_ratio_slot(core_count).ok_or_else(|| {
            CupsError::discovery(target, "turbo ratio requested for zero cores")
        })?;

        let ratios = self.execute(target, &GetMaxTurboRatio::for_group(group), true)?;
        Ok(ratios.0[index])
    }

    pub fn is_turbo_enabled(&self, target: u8, model: CpuModel) -> Result<bool> {
        let raw = self.read_dword(target, model.tables().core.capability)?;
        Ok(Capability::from_raw(raw).turbo_enabled)
    }

    pub fn get_cpu_bus_number(&self, target: u8, model: CpuModel) -> Result<u8> {
        let raw = self.read_dword(target, model.tables().core.bus_number)?;
        Ok(CpuBusNumber::from_raw(raw).bus0)
    }

    pub fn is_dimm_populated(&self, target: u8, bus: u8, slot: &DimmSlot) -> Result<bool> {
        let request = ReadMmio64 {
            bus,
            dev: slot.device,
            func: slot.function,
            reg: slot.offset,
        };
        let raw = self.execute(target, &request, true)?.0;
        Ok(DimmMtr::from_raw(raw).dimm_populated)
    }

    /// DDR frequency in MHz
    pub fn get_memory_frequency(&self, target: u8, model: CpuModel) -> Result<u32> {
        let raw = self.read_dword(target, model.tables().memory_frequency)?;
        MemoryFrequency::from_raw(raw).to_mhz().map_err(|e| {
            tracing::error!("Failed to decode memory frequency on 0x{:02x}: {}", target, e);
            CupsError::from(e)
        })
    }

    pub fn get_memory_rw_counters(
        &self,
        target: u8,
        index: &TelemetrySampleIndex,
    ) -> Result<TelemetryCounters> {
        let request = GetTelemetrySample {
            aggregator: index.aggregator,
            sample: index.sample,
        };
        self.execute(target, &request, true)
    }

    /// Probe: disabled links fail to answer and are skipped by discovery
    pub fn get_link_status(&self, target: u8, link: &LinkDescriptor) -> Result<LinkStatus> {
        let address = controller_register(link.status_reg, link.port.bus, link.controller.device);
        let raw = self.execute(target, &ReadPciLocal::new(address), false)?.0;
        Ok(LinkStatus::from_raw(raw))
    }

    pub fn get_xpp_mr(&self, target: u8, bus: u8, dev: u8) -> Result<u32> {
        self.read_dword(target, controller_register(xpp::MR, bus, dev))
    }

    pub fn set_xpp_mr(&self, target: u8, bus: u8, dev: u8, value: u32) -> Result<()> {
        self.write_dword(target, controller_register(xpp::MR, bus, dev), value)
    }

    pub fn get_xpp_mer(&self, target: u8, bus: u8, dev: u8) -> Result<u32> {
        self.read_dword(target, controller_register(xpp::MER, bus, dev))
    }

    pub fn set_xpp_mer(&self, target: u8, bus: u8, dev: u8, value: u32) -> Result<()> {
        self.write_dword(target, controller_register(xpp::MER, bus, dev), value)
    }

    pub fn get_xpp_er_conf(&self, target: u8, bus: u8, dev: u8) -> Result<u32> {
        self.read_dword(target, controller_register(xpp::ER_CONF, bus, dev))
    }

    pub fn set_xpp_er_conf(&self, target: u8, bus: u8, dev: u8, value: u32) -> Result<()> {
        self.write_dword(target, controller_register(xpp::ER_CONF, bus, dev), value)
    }

    pub fn get_xpp_mdl(&self, target: u8, bus: u8, dev: u8) -> Result<u32> {
        self.read_dword(target, controller_register(xpp::MDL, bus, dev))
    }

    pub fn get_xpp_mdh(&self, target: u8, bus: u8, dev: u8) -> Result<XppMonitorDataHigh> {
        let raw = self.read_dword(target, controller_register(xpp::MDH, bus, dev))?;
        Ok(XppMonitorDataHigh::from_raw(raw))
    }

    /// Data link utilization counter of a port, in gigabytes
    pub fn get_dlu(&self, target: u8, bus: u8) -> Result<u8> {
        let raw = self.read_dword(target, controller_register(xpp::DLU, bus, xpp::DLU_DEVICE))?;
        Ok(DataLinkUtilization::from_raw(raw).counter_gigabytes[0])
    }

    pub fn get_xpp_free_running_clock(&self, target: u8, bus: u8, dev: u8) -> Result<u64> {
        let address = controller_register(free_running::CLOCK, bus, dev);
        let raw = self.execute(target, &ReadPciLocalQword::new(address), true)?.0;
        Ok(free_running_count(raw))
    }

    /// `offset` is relative to the first free-running counter
    pub fn get_xpp_free_running_counter(&self, target: u8, bus: u8, dev: u8, offset: u16) -> Result<u64> {
        let address = controller_register(free_running::COUNTER_BASE + offset, bus, dev);
        let raw = self.execute(target, &ReadPciLocalQword::new(address), true)?.0;
        Ok(free_running_count(raw))
    }
}
