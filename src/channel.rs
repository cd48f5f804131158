//! The control-channel allow-list.
//!
//! Two fixed sets of message kinds are permitted to cross the trust boundary,
//! one per direction. A kind outside its direction's set is never delivered:
//! no reply, no log entry, no error. The enums below are the complete
//! capability surface of the untrusted side — review them as a unit whenever
//! a kind is added.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Direction of travel across the trust boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Untrusted surface → privileged process.
    Inbound,
    /// Privileged process → untrusted surface.
    Outbound,
}

/// Message kinds an untrusted surface may send toward the privileged process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InboundKind {
    GetPreferences,
    GetLogMessages,
    SfLogin,
    SfLogout,
    SendLog,
    FindText,
}

/// Message kinds the privileged process may push toward an untrusted surface.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    CurrentPreferences,
    LogMessages,
    LogMessage,
    ResponseLogin,
    ResponseLogout,
    ResponseGeneric,
    StartFind,
}

/// String-level membership check used at the transport edge. Inside the
/// gateway the typed enums make the same check exhaustive at compile time.
pub fn is_permitted(direction: Direction, kind: &str) -> bool {
    match direction {
        Direction::Inbound => kind.parse::<InboundKind>().is_ok(),
        Direction::Outbound => kind.parse::<OutboundKind>().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INBOUND: &[&str] = &[
        "get_preferences",
        "get_log_messages",
        "sf_login",
        "sf_logout",
        "send_log",
        "find_text",
    ];

    const OUTBOUND: &[&str] = &[
        "current_preferences",
        "log_messages",
        "log_message",
        "response_login",
        "response_logout",
        "response_generic",
        "start_find",
    ];

    #[test]
    fn every_inbound_kind_is_permitted_inbound() {
        for kind in INBOUND {
            assert!(is_permitted(Direction::Inbound, kind), "{kind}");
        }
    }

    #[test]
    fn every_outbound_kind_is_permitted_outbound() {
        for kind in OUTBOUND {
            assert!(is_permitted(Direction::Outbound, kind), "{kind}");
        }
    }

    #[test]
    fn directions_do_not_leak_into_each_other() {
        for kind in INBOUND {
            assert!(!is_permitted(Direction::Outbound, kind), "{kind}");
        }
        for kind in OUTBOUND {
            assert!(!is_permitted(Direction::Inbound, kind), "{kind}");
        }
    }

    #[test]
    fn unknown_kinds_are_rejected_in_both_directions() {
        for kind in ["sf_query", "eval", "", "SF_LOGIN", "sf_login ", "log-message"] {
            assert!(!is_permitted(Direction::Inbound, kind), "{kind}");
            assert!(!is_permitted(Direction::Outbound, kind), "{kind}");
        }
    }

    #[test]
    fn wire_names_round_trip_through_strum() {
        assert_eq!(InboundKind::SfLogin.as_ref(), "sf_login");
        assert_eq!("sf_logout".parse::<InboundKind>(), Ok(InboundKind::SfLogout));
        assert_eq!(OutboundKind::StartFind.to_string(), "start_find");
        assert_eq!(
            "response_generic".parse::<OutboundKind>(),
            Ok(OutboundKind::ResponseGeneric)
        );
    }

    #[test]
    fn kinds_serialize_as_snake_case_strings() {
        let json = serde_json::to_string(&OutboundKind::ResponseLogin).unwrap();
        assert_eq!(json, "\"response_login\"");
        let kind: InboundKind = serde_json::from_str("\"find_text\"").unwrap();
        assert_eq!(kind, InboundKind::FindText);
    }
}
