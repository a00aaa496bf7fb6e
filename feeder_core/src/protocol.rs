//! Device link wire format.
//!
//! One command or event per line, ASCII, space separated:
//!
//! ```text
//! host -> device   OPEN_LID | CLOSE_LID | DISPENSE <grams>
//! device -> host   LIVE <g> | WEIGHT <g> | DONE | FORCED_CLOSED
//!                  OPEN | LID_OPENED | OPEN_LID
//!                  CLOSED | LID_CLOSED | CLOSE_LID
//! ```
//!
//! Unknown lines decode to [`DeviceEvent::Unrecognized`]; only a known
//! keyword with a bad numeric payload is a protocol error.

use std::fmt;

use crate::error::FeederError;

/// Outbound command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    OpenLid,
    CloseLid,
    Dispense { amount_g: f32 },
}

impl DeviceCommand {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::OpenLid)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Self::CloseLid)
    }

    pub fn is_dispense(&self) -> bool {
        matches!(self, Self::Dispense { .. })
    }

    /// Parse a command line, the inverse of `Display`. Used by the simulator
    /// and the CLI `send` subcommand.
    pub fn parse(line: &str) -> Result<Self, FeederError> {
        let mut parts = line.split_whitespace();
        let head = parts.next().unwrap_or_default().to_ascii_uppercase();
        match head.as_str() {
            "OPEN_LID" => Ok(Self::OpenLid),
            "CLOSE_LID" => Ok(Self::CloseLid),
            "DISPENSE" => {
                let amount_g = parse_grams(&head, parts.next())?;
                Ok(Self::Dispense { amount_g })
            }
            _ => Err(FeederError::Protocol(format!("unknown command: {line:?}"))),
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenLid => f.write_str("OPEN_LID"),
            Self::CloseLid => f.write_str("CLOSE_LID"),
            // Whole grams go out without a fraction; the firmware parses both.
            Self::Dispense { amount_g } if amount_g.fract().abs() < f32::EPSILON => {
                write!(f, "DISPENSE {amount_g:.0}")
            }
            Self::Dispense { amount_g } => write!(f, "DISPENSE {amount_g}"),
        }
    }
}

/// Inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    LiveWeight(f32),
    FinalWeight(f32),
    DispenseDone,
    ForcedClosed,
    LidOpened,
    LidClosed,
    Unrecognized(String),
}

impl DeviceEvent {
    /// Decode one line. Surrounding whitespace and keyword case are ignored.
    pub fn parse(line: &str) -> Result<Self, FeederError> {
        let trimmed = line.trim();
        let mut parts = trimmed.split_whitespace();
        let Some(head) = parts.next() else {
            return Ok(Self::Unrecognized(String::new()));
        };
        let head = head.to_ascii_uppercase();
        let event = match head.as_str() {
            "LIVE" => Self::LiveWeight(parse_grams(&head, parts.next())?),
            "WEIGHT" => Self::FinalWeight(parse_grams(&head, parts.next())?),
            "DONE" => Self::DispenseDone,
            "FORCED_CLOSED" => Self::ForcedClosed,
            "OPEN" | "LID_OPENED" | "OPEN_LID" => Self::LidOpened,
            "CLOSED" | "LID_CLOSED" | "CLOSE_LID" => Self::LidClosed,
            _ => return Ok(Self::Unrecognized(trimmed.to_string())),
        };
        Ok(event)
    }
}

fn parse_grams(keyword: &str, payload: Option<&str>) -> Result<f32, FeederError> {
    let raw = payload.ok_or_else(|| FeederError::Protocol(format!("{keyword}: missing value")))?;
    let g: f32 = raw
        .parse()
        .map_err(|_| FeederError::Protocol(format!("{keyword}: bad number {raw:?}")))?;
    if !g.is_finite() {
        return Err(FeederError::Protocol(format!(
            "{keyword}: non-finite value {raw:?}"
        )));
    }
    Ok(g)
}
