//! Minimal serial terminal for an FT231X.
//!
//! Lines read from stdin are written to the port; data read from the port is
//! copied to stdout. Logs go to stderr (or journald).

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use ft231x_bridge::config::BridgeConfig;
use ft231x_bridge::tracing::{self, prelude::*};
use ft231x_bridge::transport::usb::{find_device, NusbHost};
use ft231x_bridge::transport::AlwaysGranted;
use ft231x_bridge::{Error, Parity, SerialPort, StopBits};

#[derive(Debug, Parser)]
#[command(name = "ft231x-term", version, about = "Serial terminal for FTDI FT231X bridges")]
struct Args {
    /// TOML file with [device], [port] and [transfer] tables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// USB vendor id, in hex
    #[arg(long, value_parser = parse_hex_u16)]
    vid: Option<u16>,

    /// USB product id, in hex
    #[arg(long, value_parser = parse_hex_u16)]
    pid: Option<u16>,

    /// Only open the device with this serial number
    #[arg(long)]
    serial: Option<String>,

    #[arg(short, long)]
    baud: Option<u32>,

    #[arg(long)]
    data_bits: Option<u8>,

    /// none, odd, even, mark or space
    #[arg(long)]
    parity: Option<Parity>,

    /// 1, 1.5 or 2
    #[arg(long)]
    stop_bits: Option<StopBits>,

    /// Bulk IN request size, including the 2-byte status prefix
    #[arg(long, default_value_t = 64)]
    read_size: usize,
}

fn parse_hex_u16(s: &str) -> Result<u16, std::num::ParseIntError> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16)
}

impl Args {
    fn bridge_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load_from(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if let Some(vid) = self.vid {
            config.device.vendor_id = vid;
        }
        if let Some(pid) = self.pid {
            config.device.product_id = pid;
        }
        if let Some(serial) = &self.serial {
            config.device.serial_number = Some(serial.clone());
        }
        if let Some(baud) = self.baud {
            config.port.baud_rate = baud;
        }
        if let Some(data_bits) = self.data_bits {
            config.port.data_bits = data_bits;
        }
        if let Some(parity) = self.parity {
            config.port.parity = parity;
        }
        if let Some(stop_bits) = self.stop_bits {
            config.port.stop_bits = stop_bits;
        }
        config.transfer = config.transfer.with_env_overrides();
        Ok(config)
    }
}

type Port = SerialPort<NusbHost, AlwaysGranted>;

async fn forward_stdin(port: Arc<Port>, running: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = running.cancelled() => break,
            line = lines.next_line() => line,
        };
        let mut line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("End of input.");
                break;
            }
            Err(e) => {
                error!(error = %e, "Failed to read stdin.");
                break;
            }
        };
        line.push('\n');

        match port.write(line.as_bytes(), &running).await {
            Ok(n) => trace!(bytes = n, "Wrote line."),
            Err(Error::Cancelled) => break,
            Err(e) => {
                error!(error = %e, "Write failed.");
                running.cancel();
                break;
            }
        }
    }
}

async fn copy_to_stdout(port: Arc<Port>, read_size: usize, running: CancellationToken) {
    let mut stdout = tokio::io::stdout();
    loop {
        match port.read(read_size, &running).await {
            Ok(result) if result.is_empty() => continue,
            Ok(result) => {
                if stdout.write_all(&result.data).await.is_err() || stdout.flush().await.is_err() {
                    running.cancel();
                    break;
                }
            }
            Err(Error::Cancelled) => break,
            Err(e) => {
                error!(error = %e, "Read failed.");
                running.cancel();
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_journald_or_stdout();

    let args = Args::parse();
    let config = args.bridge_config()?;

    let device = find_device(&config.device).with_context(|| {
        format!(
            "no device {:04x}:{:04x} attached",
            config.device.vendor_id, config.device.product_id
        )
    })?;
    info!(device = %device, "Found device.");

    let mut port = SerialPort::new(NusbHost, AlwaysGranted, device, config.port)
        .with_options(config.transfer);
    port.open().await?;
    let port = Arc::new(port);

    let running = CancellationToken::new();
    let tracker = TaskTracker::new();
    tracker.spawn(forward_stdin(port.clone(), running.clone()));
    tracker.spawn(copy_to_stdout(port.clone(), args.read_size, running.clone()));
    tracker.close();
    info!("Started.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = running.cancelled() => {},
    }

    trace!("Shutting down.");
    running.cancel();
    tracker.wait().await;

    // Last reference; dropping it closes the port
    drop(port);
    info!("Exiting.");
    Ok(())
}
