#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validate errors are fine; panics are not.
    if let Ok(cfg) = feeder_config::load_toml(data) {
        if cfg.validate().is_ok() {
            let _ = feeder_core::ControllerCfg::from(&cfg);
        }
    }
});
