//! Opening the serial port that carries the actuator protocol.

use std::time::Duration;

use anyhow::{Context, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::link::DeviceLink;
use crate::automation::config::SerialConfig;

/// A device link over a physical serial port.
pub type SerialLink = DeviceLink<Box<dyn SerialPort>>;

/// Opens the configured port (8N1, no flow control).
///
/// The port's own read timeout is kept short so `await_ack` can check its
/// overall deadline between reads.
pub fn open_serial(config: &SerialConfig) -> Result<SerialLink> {
    crate::log(&format!(
        "Opening serial port {} at {} baud",
        config.port, config.baud_rate
    ));

    let port = serialport::new(&config.port, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(config.read_poll_ms))
        .open()
        .with_context(|| format!("Failed to open serial port {}", config.port))?;

    Ok(DeviceLink::new(
        port,
        Duration::from_millis(config.ack_timeout_ms),
    ))
}
