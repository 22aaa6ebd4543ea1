//! Opening the device link.

use std::net::TcpStream;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serscript_protocol::{StreamTransport, Transport};
use tracing::info;

use crate::cli::LinkArgs;

/// Read timeout used when the configuration sets none.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the device is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// A local serial port.
    Serial {
        /// Port path.
        path: String,
        /// Baud rate.
        baud: u32,
    },
    /// A TCP socket bridging to a UART.
    Tcp(String),
}

impl LinkTarget {
    /// Select the target from command-line flags.
    pub fn from_args(link: &LinkArgs, baud: u32) -> Result<Self> {
        match (&link.serial, &link.tcp) {
            (Some(path), None) => Ok(LinkTarget::Serial {
                path: path.clone(),
                baud,
            }),
            (None, Some(addr)) => Ok(LinkTarget::Tcp(addr.clone())),
            _ => bail!("exactly one of --serial or --tcp is required"),
        }
    }

    /// Open the link with the given read timeout.
    pub fn open(&self, timeout: Duration) -> Result<Box<dyn Transport>> {
        match self {
            LinkTarget::Serial { path, baud } => {
                let port = serialport::new(path.as_str(), *baud)
                    .timeout(timeout)
                    .open()
                    .with_context(|| format!("failed to open serial port {}", path))?;
                info!("Link: opened {} at {} baud", path, baud);
                Ok(Box::new(StreamTransport::new(port)))
            }
            LinkTarget::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str())
                    .with_context(|| format!("failed to connect to {}", addr))?;
                stream
                    .set_read_timeout(Some(timeout))
                    .context("failed to set read timeout")?;
                stream.set_nodelay(true).context("failed to set TCP_NODELAY")?;
                info!("Link: connected to {}", addr);
                Ok(Box::new(StreamTransport::new(stream)))
            }
        }
    }
}

/// The read timeout from an optional millisecond setting.
pub fn read_timeout(millis: Option<u64>) -> Duration {
    millis.map(Duration::from_millis).unwrap_or(DEFAULT_READ_TIMEOUT)
}
