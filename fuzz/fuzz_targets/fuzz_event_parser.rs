#![no_main]
use feeder_core::{DeviceCommand, DeviceEvent};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let _ = DeviceEvent::parse(data);
    // Whatever parses as a command must survive a Display round trip.
    if let Ok(cmd) = DeviceCommand::parse(data) {
        let again = DeviceCommand::parse(&cmd.to_string());
        assert!(again.is_ok(), "re-parse failed for {cmd}");
    }
});
