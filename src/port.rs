use anyhow::{Context, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::time::Duration;

use crate::cli::SerialOpts;

pub fn open_port(opts: &SerialOpts) -> Result<Box<dyn SerialPort>> {
    let builder = serialport::new(&opts.dev, opts.baud)
        .timeout(Duration::from_millis(opts.timeout_ms.max(1)))
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(if opts.rtscts {
            FlowControl::Hardware
        } else {
            FlowControl::None
        });

    builder.open().with_context(|| {
        format!(
            "opening serial port {} at {} baud (8N1, rtscts={})",
            opts.dev, opts.baud, opts.rtscts
        )
    })
}
