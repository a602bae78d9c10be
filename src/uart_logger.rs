//! Log drain.
//!
//! Empties [`HEATER_LOG`] and [`MAIN_LOG`] from the main loop and writes one
//! line per entry:
//!
//! ```text
//! [seq] LEVEL src: message
//! ```
//!
//! On the ESP-IDF target the lines go to a TX-only UART.
//!
//! # Hardware Setup
//!
//! ```text
//! ESP32-S3 GPIO43 (TX) ──────▶ USB-UART RX
//!                               └─▶ PC Serial Monitor
//! ```

use crate::log_globals::{HEATER_LOG, MAIN_LOG};
use crate::logging::{BufWriter, LogEntry, LogStream};

#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::gpio;
#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::peripheral::Peripheral;
#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::uart::{self, UartTxDriver};

/// Longest formatted line.
pub const LINE_LEN: usize = 160;

/// UART configuration for logging.
pub struct UartLoggerConfig {
    pub baud_rate: u32,
    pub tx_pin: u8,
}

impl Default for UartLoggerConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            tx_pin: 43,
        }
    }
}

/// Format one entry as `[seq] LEVEL src: message\n`.
///
/// Returns the number of bytes written.
pub fn format_log_entry(source: &str, entry: &LogEntry, buf: &mut [u8]) -> usize {
    use core::fmt::Write;

    let mut writer = BufWriter::new(buf);
    let _ = writeln!(writer, "[{}] {} {}: {}", entry.seq, entry.level.as_str(), source, entry.message());
    writer.len()
}

fn drain_stream<const N: usize>(stream: &LogStream<N>, write: &mut impl FnMut(&[u8])) -> usize {
    let mut line = [0u8; LINE_LEN];
    let mut count = 0;
    while let Some(entry) = stream.drain() {
        let len = format_log_entry(stream.name(), &entry, &mut line);
        write(&line[..len]);
        count += 1;
    }
    count
}

fn report_dropped<const N: usize>(stream: &LogStream<N>, write: &mut impl FnMut(&[u8])) {
    use core::fmt::Write;

    let dropped = stream.dropped();
    if dropped == 0 {
        return;
    }
    let mut line = [0u8; 64];
    let mut writer = BufWriter::new(&mut line);
    let _ = writeln!(writer, "[-] WARN {}: dropped {} messages", stream.name(), dropped);
    let len = writer.len();
    write(&line[..len]);
    stream.reset_dropped();
}

/// Drain `streams` in order, heater first, and report drops.
///
/// Returns the number of entries written.
pub fn drain_streams<const N: usize>(streams: &[&LogStream<N>], mut write: impl FnMut(&[u8])) -> usize {
    let mut count = 0;
    for stream in streams {
        count += drain_stream(stream, &mut write);
        report_dropped(stream, &mut write);
    }
    count
}

/// Drain the global streams into `write`.
pub fn drain_logs(write: impl FnMut(&[u8])) -> usize {
    drain_streams(&[&HEATER_LOG, &MAIN_LOG], write)
}

/// Initialize UART0 TX-only for logging output.
#[cfg(target_os = "espidf")]
pub fn init_uart_logger<'d>(
    uart: impl Peripheral<P = esp_idf_svc::hal::uart::UART0> + 'd,
    tx_pin: impl Peripheral<P = impl gpio::OutputPin> + 'd,
    config: &UartLoggerConfig,
) -> Result<UartTxDriver<'d>, esp_idf_svc::sys::EspError> {
    let uart_config = uart::config::Config::default().baudrate(esp_idf_svc::hal::units::Hertz(config.baud_rate));

    UartTxDriver::new(
        uart,
        tx_pin,
        Option::<gpio::AnyIOPin>::None, // CTS
        Option::<gpio::AnyIOPin>::None, // RTS
        &uart_config,
    )
}

/// Drain the global streams to `uart`. Called once per main loop pass.
#[cfg(target_os = "espidf")]
pub fn drain_to_uart(uart: &mut UartTxDriver<'_>) -> usize {
    drain_logs(|line| {
        let _ = uart.write(line);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;

    #[test]
    fn test_format_log_entry() {
        let stream = LogStream::<4>::new("heater");
        stream.push(LogLevel::Warn, b"overheat guard");
        let entry = stream.drain().unwrap();

        let mut buf = [0u8; LINE_LEN];
        let len = format_log_entry(stream.name(), &entry, &mut buf);

        assert_eq!(core::str::from_utf8(&buf[..len]).unwrap(), "[0] WARN heater: overheat guard\n");
    }

    #[test]
    fn test_drain_streams_in_order_with_drops() {
        let heater = LogStream::<2>::new("heater");
        let main = LogStream::<2>::new("main");
        heater.push(LogLevel::Info, b"a");
        heater.push(LogLevel::Info, b"b");
        heater.push(LogLevel::Info, b"c");
        main.push(LogLevel::Error, b"d");

        let mut out = String::new();
        let count = drain_streams(&[&heater, &main], |line| out.push_str(core::str::from_utf8(line).unwrap()));

        assert_eq!(count, 3);
        assert_eq!(
            out,
            "[0] INFO heater: a\n[1] INFO heater: b\n[-] WARN heater: dropped 1 messages\n[0] ERROR main: d\n"
        );
        assert_eq!(heater.dropped(), 0);
    }
}
