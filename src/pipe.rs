//! Pipe pair transport, used only for development and testing.
//!
//! Host-to-target data goes to the file at `path`; target-to-host data
//! is read from `path` with `"t2h"` appended.

use std::fs::{File, OpenOptions};

use log::error;

use crate::com::{read_retry, write_retry};
use crate::error::{Error, Result};

pub struct PipePort {
    tx_port: File,
    rx_port: File,
}

impl PipePort {
    pub fn open(path: &str) -> Result<Self> {
        let path_t2h = format!("{}t2h", path);

        let tx_port = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                error!("failed to open tx port: {}", e);
                Error::OpenPortFailed
            })?;
        let rx_port = File::open(&path_t2h).map_err(|e| {
            error!("failed to open rx port: {}", e);
            Error::OpenPortFailed
        })?;

        Ok(PipePort { tx_port, rx_port })
    }

    pub fn rx_blocking(&mut self, buf: &mut [u8]) -> Result<usize> {
        read_retry(&mut self.rx_port, buf)
    }

    pub fn tx_blocking(&mut self, data: &[u8]) -> Result<()> {
        write_retry(&mut self.tx_port, data)
    }
}
