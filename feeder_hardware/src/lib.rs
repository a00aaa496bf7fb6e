//! Device-link adapters for the feeder controller.
//!
//! - [`link`]: newline-delimited text over any byte stream (tty nodes, pipes)
//! - [`sim`]: in-process simulated dispenser firmware
//! - `uart` (feature `hardware`): Raspberry Pi UART via rppal
pub mod error;
pub mod link;
pub mod sim;
#[cfg(feature = "hardware")]
pub mod uart;

pub use error::HwError;
pub use link::{LineReader, LineWriter, SharedReader, SlicedPort, open_tty};
pub use sim::{SimConfig, SimEvents, SimSink, SimulatedFeeder};
#[cfg(feature = "hardware")]
pub use uart::{UartWriter, open_uart};
