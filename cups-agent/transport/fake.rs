// In-memory PECI responder for tests
//
// Responses are keyed by (target, encoded request). Unknown requests fail
// like an absent CPU would. Writes always complete and are recorded.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use cups_raw::arch::memory::{DimmSlot, TelemetrySampleIndex};
use cups_raw::peci::{
    command, GetCpuC0Counter, GetCpuId, GetMaxTurboRatio, GetTelemetrySample, PciAddress,
    PeciRequest, ReadMmio64, ReadPciLocal, ReadPciLocalQword,
};
use cups_raw::wire::COMPLETION_SUCCESS;

use super::RawPeci;
use crate::error::{CupsError, Result};

#[derive(Default)]
struct State {
    responses: HashMap<(u8, Vec<u8>), Vec<u8>>,
    writes: Vec<(u8, Vec<u8>)>,
}

#[derive(Clone, Default)]
pub struct FakePeci {
    state: Arc<Mutex<State>>,
}

fn success(payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![COMPLETION_SUCCESS];
    bytes.extend_from_slice(payload);
    bytes
}

impl FakePeci {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond<R: PeciRequest>(&self, target: u8, request: &R, payload: &[u8]) {
        self.state
            .lock()
            .responses
            .insert((target, request.encode(target)), success(payload));
    }

    pub fn forget<R: PeciRequest>(&self, target: u8, request: &R) {
        self.state.lock().responses.remove(&(target, request.encode(target)));
    }

    pub fn respond_cpu_id(&self, target: u8, cpu_id: u32) {
        self.respond(target, &GetCpuId, &cpu_id.to_le_bytes());
    }

    pub fn respond_c0(&self, target: u8, value: u64) {
        self.respond(target, &GetCpuC0Counter, &value.to_le_bytes());
    }

    pub fn respond_turbo_ratios(&self, target: u8, group: u8, ratios: [u8; 4]) {
        self.respond(target, &GetMaxTurboRatio::for_group(group), &ratios);
    }

    pub fn respond_dword(&self, target: u8, address: PciAddress, value: u32) {
        self.respond(target, &ReadPciLocal::new(address), &value.to_le_bytes());
    }

    pub fn respond_qword(&self, target: u8, address: PciAddress, value: u64) {
        self.respond(target, &ReadPciLocalQword::new(address), &value.to_le_bytes());
    }

    pub fn respond_mmio(&self, target: u8, bus: u8, slot: &DimmSlot, value: u32) {
        let request = ReadMmio64 {
            bus,
            dev: slot.device,
            func: slot.function,
            reg: slot.offset,
        };
        self.respond(target, &request, &value.to_le_bytes());
    }

    pub fn respond_telemetry(&self, target: u8, index: TelemetrySampleIndex, reads: u32, writes: u32) {
        let request = GetTelemetrySample {
            aggregator: index.aggregator,
            sample: index.sample,
        };
        let mut payload = reads.to_le_bytes().to_vec();
        payload.extend_from_slice(&writes.to_le_bytes());
        self.respond(target, &request, &payload);
    }

    /// Drop every response for `target`, as if the CPU went away
    pub fn remove_target(&self, target: u8) {
        self.state.lock().responses.retain(|(t, _), _| *t != target);
    }

    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().writes.clone()
    }
}

impl RawPeci for FakePeci {
    fn transfer(&self, target: u8, request: &[u8], _response_len: usize) -> Result<Vec<u8>> {
        let mut state = self.state.lock();

        if request.first() == Some(&command::WR_ENDPOINT_CONFIG) {
            state.writes.push((target, request.to_vec()));
            return Ok(vec![COMPLETION_SUCCESS]);
        }

        state
            .responses
            .get(&(target, request.to_vec()))
            .cloned()
            .ok_or_else(|| CupsError::TransportError {
                target,
                reason: "no response".to_string(),
            })
    }
}
