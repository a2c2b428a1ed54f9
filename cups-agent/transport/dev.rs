// PECI character device access through the legacy xfer ioctl

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use super::RawPeci;
use crate::error::{CupsError, Result};

pub const DEFAULT_DEVICE: &str = "/dev/peci-0";

const BUFFER_SIZE: usize = 255;
const PECI_IOC_BASE: u8 = 0xb7;
const PECI_IOC_XFER: u8 = 0;

#[repr(C, packed)]
pub struct PeciXferMsg {
    addr: u8,
    tx_len: u8,
    rx_len: u8,
    flags: u8,
    tx_buf: [u8; BUFFER_SIZE],
    rx_buf: [u8; BUFFER_SIZE],
}

nix::ioctl_readwrite!(peci_ioc_xfer, PECI_IOC_BASE, PECI_IOC_XFER, PeciXferMsg);

pub struct DevPeci {
    file: parking_lot::Mutex<File>,
    path: String,
}

impl DevPeci {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| CupsError::TransportError {
                target: 0,
                reason: format!("Failed to open {}: {}", path.display(), e),
            })?;

        tracing::info!("Opened PECI device {} (fd {})", path.display(), file.as_raw_fd());

        Ok(Self {
            file: parking_lot::Mutex::new(file),
            path: path.display().to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl RawPeci for DevPeci {
    fn transfer(&self, target: u8, request: &[u8], response_len: usize) -> Result<Vec<u8>> {
        if request.is_empty() || request.len() > BUFFER_SIZE || response_len > BUFFER_SIZE {
            return Err(CupsError::TransportError {
                target,
                reason: format!(
                    "Message does not fit the transfer buffer (tx {}, rx {})",
                    request.len(),
                    response_len
                ),
            });
        }

        let mut msg = PeciXferMsg {
            addr: target,
            tx_len: request.len() as u8,
            rx_len: response_len as u8,
            flags: 0,
            tx_buf: [0; BUFFER_SIZE],
            rx_buf: [0; BUFFER_SIZE],
        };
        msg.tx_buf[..request.len()].copy_from_slice(request);

        let file = self.file.lock();
        // SAFETY: msg is a live, correctly sized peci_xfer_msg for the duration of the call
        unsafe { peci_ioc_xfer(file.as_raw_fd(), &mut msg) }.map_err(|e| {
            CupsError::TransportError {
                target,
                reason: format!("ioctl on {} failed: {}", self.path, e),
            }
        })?;

        Ok(msg.rx_buf[..response_len].to_vec())
    }
}
