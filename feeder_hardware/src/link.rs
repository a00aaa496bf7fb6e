//! Newline-delimited text link over any byte stream.
//!
//! The write half sends one command per call. The read half is a pump thread
//! that splits the stream into lines and hands them over a channel, so the
//! ingestor can wait with a timeout regardless of the underlying transport.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as xch;
use feeder_traits::{BoxError, CommandSink, EventSource};
use parking_lot::{Mutex, MutexGuard};

use crate::error::{HwError, Result};

/// Write half: appends `\n` and flushes after every command.
pub struct LineWriter<W: Write> {
    inner: W,
}

impl<W: Write> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        self.inner
            .write_all(line.as_bytes())
            .and_then(|()| self.inner.write_all(b"\n"))
            .and_then(|()| self.inner.flush())
            .map_err(HwError::from_io)
    }
}

impl<W: Write> CommandSink for LineWriter<W> {
    fn send_line(&mut self, line: &str) -> std::result::Result<(), BoxError> {
        tracing::trace!(line, "tx");
        self.write_line(line).map_err(Into::into)
    }
}

/// Read half fed by a background pump.
pub struct LineReader {
    rx: xch::Receiver<Result<String>>,
}

impl LineReader {
    /// Spawn a pump thread over `reader`. The thread ends at EOF or on a
    /// hard read error; after that `read_line` reports `Disconnected`.
    pub fn spawn<R: Read + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = xch::bounded(64);
        std::thread::spawn(move || pump(reader, &tx));
        Self { rx }
    }
}

fn pump<R: Read>(reader: R, tx: &xch::Sender<Result<String>>) {
    let mut reader = BufReader::new(reader);
    let mut buf = String::new();
    loop {
        buf.clear();
        match reader.read_line(&mut buf) {
            Ok(0) => {
                tracing::debug!("device stream closed");
                return;
            }
            Ok(_) => {
                let line = buf.trim_end_matches(['\r', '\n']).to_string();
                tracing::trace!(%line, "rx");
                if tx.send(Ok(line)).is_err() {
                    return;
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                tracing::warn!("dropping non-UTF-8 device line");
            }
            Err(e) => {
                let _ = tx.send(Err(HwError::from_io(e)));
                return;
            }
        }
    }
}

impl EventSource for LineReader {
    fn read_line(&mut self, timeout: Duration) -> std::result::Result<Option<String>, BoxError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(line)) => Ok(Some(line)),
            Ok(Err(e)) => Err(e.into()),
            Err(xch::RecvTimeoutError::Timeout) => Ok(None),
            Err(xch::RecvTimeoutError::Disconnected) => Err(HwError::Disconnected.into()),
        }
    }
}

/// A half-duplex port whose reads block for at most one timeout slice.
pub trait SlicedPort: Send {
    /// Read whatever arrived within one slice; `Ok(0)` means nothing yet.
    fn read_slice(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// Read side of a port shared with a writer.
///
/// Every slice ends with a fair unlock, so a writer blocked on the same
/// mutex takes the port before the pump reads again.
pub struct SharedReader<P> {
    port: Arc<Mutex<P>>,
}

impl<P: SlicedPort> SharedReader<P> {
    pub fn new(port: Arc<Mutex<P>>) -> Self {
        Self { port }
    }
}

impl<P: SlicedPort> Read for SharedReader<P> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            let mut port = self.port.lock();
            let res = port.read_slice(buf);
            MutexGuard::unlock_fair(port);
            match res {
                Ok(0) => continue,
                other => return other,
            }
        }
    }
}

/// Open a serial device node that is already configured (baud, raw mode).
pub fn open_tty(path: &Path) -> Result<(LineWriter<File>, LineReader)> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let reader = file.try_clone()?;
    tracing::info!(path = %path.display(), "opened device link");
    Ok((LineWriter::new(file), LineReader::spawn(reader)))
}
