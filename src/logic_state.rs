//! Four-valued signal model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value carried by a gate output.
///
/// `Floating` is an undriven output (a disabled tristate buffer, an empty
/// junction). `Undefined` is a conflict between drivers or an unknown that
/// propagated through combinational logic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicState {
    #[default]
    Low,
    High,
    Floating,
    Undefined,
}

impl LogicState {
    /// Converts a boolean into a driven state.
    pub fn from_bool(value: bool) -> Self {
        if value {
            LogicState::High
        } else {
            LogicState::Low
        }
    }

    /// True for `Low` and `High`.
    pub fn is_driven(self) -> bool {
        matches!(self, LogicState::Low | LogicState::High)
    }

    /// Merges two drivers of the same wire.
    ///
    /// `Floating` is the identity and `Undefined` absorbs everything.
    /// Opposing driven values conflict to `Undefined`.
    pub fn join(self, other: Self) -> Self {
        match (self, other) {
            (LogicState::Floating, x) | (x, LogicState::Floating) => x,
            (LogicState::Undefined, _) | (_, LogicState::Undefined) => LogicState::Undefined,
            (a, b) if a == b => a,
            _ => LogicState::Undefined,
        }
    }
}

impl From<bool> for LogicState {
    fn from(value: bool) -> Self {
        LogicState::from_bool(value)
    }
}

impl fmt::Display for LogicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            LogicState::Low => "0",
            LogicState::High => "1",
            LogicState::Floating => "Z",
            LogicState::Undefined => "X",
        };
        f.write_str(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LogicState; 4] = [
        LogicState::Low,
        LogicState::High,
        LogicState::Floating,
        LogicState::Undefined,
    ];

    #[test]
    fn test_default_is_low() {
        assert_eq!(LogicState::default(), LogicState::Low);
    }

    #[test]
    fn test_bool_conversion() {
        assert_eq!(LogicState::from(true), LogicState::High);
        assert_eq!(LogicState::from_bool(false), LogicState::Low);
    }

    #[test]
    fn test_join_table() {
        use LogicState::*;
        assert_eq!(Floating.join(Floating), Floating);
        assert_eq!(Floating.join(High), High);
        assert_eq!(Low.join(Floating), Low);
        assert_eq!(Low.join(Low), Low);
        assert_eq!(Low.join(High), Undefined);
        assert_eq!(Undefined.join(Floating), Undefined);
    }

    #[test]
    fn test_join_is_commutative() {
        for a in ALL {
            for b in ALL {
                assert_eq!(a.join(b), b.join(a), "{a} join {b}");
            }
        }
    }

    #[test]
    fn test_is_driven() {
        assert!(LogicState::Low.is_driven());
        assert!(LogicState::High.is_driven());
        assert!(!LogicState::Floating.is_driven());
        assert!(!LogicState::Undefined.is_driven());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&LogicState::Floating).unwrap();
        assert_eq!(json, "\"floating\"");
        let back: LogicState = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(back, LogicState::High);
    }
}
