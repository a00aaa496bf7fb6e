//! Status strings the controller writes to `dispenser.status`.

use std::fmt;

use crate::config::WatchdogStatus;

/// Progress and terminal states of a feed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Starting,
    Opening,
    Feeding,
    Completed,
    /// Watchdog fired; hopper presumed empty.
    OutOfStock,
    /// Watchdog fired; alternate wording used by some deployments.
    ErrorNoFood,
    /// Rival showed up; carries the rival species name.
    Aborted { rival: String },
    LowFoodOpen,
    TooMuchFood,
    InvalidAmount,
    /// The DISPENSE command could not be written.
    LinkError,
    /// A new request arrived while another dispense was in flight.
    Busy,
    /// The device closed the lid on its own mid-dispense.
    ForcedClosed,
}

impl FeedStatus {
    pub fn aborted(rival: &str) -> Self {
        Self::Aborted {
            rival: rival.to_string(),
        }
    }

    /// Whether this status ends a request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Starting | Self::Opening | Self::Feeding)
    }
}

impl From<WatchdogStatus> for FeedStatus {
    fn from(w: WatchdogStatus) -> Self {
        match w {
            WatchdogStatus::OutOfStock => Self::OutOfStock,
            WatchdogStatus::ErrorNoFood => Self::ErrorNoFood,
        }
    }
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::Opening => f.write_str("opening"),
            Self::Feeding => f.write_str("feeding"),
            Self::Completed => f.write_str("completed"),
            Self::OutOfStock => f.write_str("out_of_stock"),
            Self::ErrorNoFood => f.write_str("error_no_food"),
            Self::Aborted { rival } => write!(f, "aborted_{rival}_detected"),
            Self::LowFoodOpen => f.write_str("low_food_open"),
            Self::TooMuchFood => f.write_str("too_much_food"),
            Self::InvalidAmount => f.write_str("error_invalid_amount"),
            Self::LinkError => f.write_str("error_link"),
            Self::Busy => f.write_str("error_busy"),
            Self::ForcedClosed => f.write_str("forced_closed"),
        }
    }
}
