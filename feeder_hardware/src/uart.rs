//! Raspberry Pi UART link via rppal.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use feeder_traits::{BoxError, CommandSink};
use parking_lot::Mutex;
use rppal::uart::{Parity, Uart};
use tracing::{debug, warn};

use crate::error::{HwError, Result};
use crate::link::{LineReader, SharedReader, SlicedPort};

/// How long one pump read holds the port before letting a writer in.
const READ_SLICE: Duration = Duration::from_millis(100);

fn uart_err(e: rppal::uart::Error) -> HwError {
    HwError::Uart(e.to_string())
}

/// Open `path` at `baud` 8N1 and return the write and read halves.
pub fn open_uart(path: &Path, baud: u32) -> Result<(UartWriter, LineReader)> {
    let mut uart = Uart::with_path(path, baud, Parity::None, 8, 1).map_err(uart_err)?;
    uart.set_read_mode(0, READ_SLICE).map_err(uart_err)?;
    debug!(path = %path.display(), baud, "uart opened");
    let port = Arc::new(Mutex::new(uart));
    let reader = LineReader::spawn(SharedReader::new(Arc::clone(&port)));
    Ok((UartWriter { port }, reader))
}

pub struct UartWriter {
    port: Arc<Mutex<Uart>>,
}

impl CommandSink for UartWriter {
    fn send_line(&mut self, line: &str) -> std::result::Result<(), BoxError> {
        let mut port = self.port.lock();
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        let mut written = 0;
        while written < bytes.len() {
            match port.write(&bytes[written..]) {
                Ok(0) => return Err(HwError::Disconnected.into()),
                Ok(n) => written += n,
                Err(e) => {
                    warn!(error = %e, "uart write failed");
                    return Err(uart_err(e).into());
                }
            }
        }
        Ok(())
    }
}

impl SlicedPort for Uart {
    fn read_slice(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read(buf).map_err(std::io::Error::other)
    }
}
