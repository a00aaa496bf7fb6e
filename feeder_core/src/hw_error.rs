//! Maps `Box<dyn Error>` from trait boundaries to typed `FeederError`.
//!
//! The traits in `feeder_traits` use `Box<dyn Error + Send + Sync>` so any
//! transport can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `feeder_hardware::HwError`.

use crate::error::FeederError;

/// Map a device-link error to a typed `FeederError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_link_error(e: &(dyn std::error::Error + 'static)) -> FeederError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<feeder_hardware::error::HwError>() {
            return match hw {
                feeder_hardware::error::HwError::Disconnected => FeederError::Disconnected,
                other => FeederError::Link(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("disconnected") {
        FeederError::Disconnected
    } else {
        FeederError::Link(s)
    }
}

pub fn map_store_error(e: &(dyn std::error::Error + 'static)) -> FeederError {
    FeederError::Store(e.to_string())
}

pub fn map_detection_error(e: &(dyn std::error::Error + 'static)) -> FeederError {
    FeederError::Detection(e.to_string())
}
