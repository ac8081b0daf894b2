use chrono::NaiveDate;
use serde::Deserialize;

use crate::limits::MAX_LINE_LEN;
use crate::model::*;

/// One request line, tagged by `"op"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Auth {
        password: String,
    },

    // ── Availability ─────────────────────────────────────────
    CheckAvailability {
        property_id: PropertyId,
        start: NaiveDate,
        end: NaiveDate,
        #[serde(default)]
        exclude: Option<ReservationId>,
        /// Apply the rental-listing gate, as the booking path does.
        #[serde(default)]
        booking: bool,
    },
    UnavailableDays {
        property_id: PropertyId,
        start: NaiveDate,
        end: NaiveDate,
    },

    // ── Reservations ─────────────────────────────────────────
    CreateReservation {
        property_id: PropertyId,
        start: NaiveDate,
        end: NaiveDate,
        #[serde(default)]
        contact: ContactDetails,
        /// Registered user placing the booking; absent for guests.
        #[serde(default)]
        user_id: Option<UserId>,
    },
    SetReservationStatus {
        id: ReservationId,
        status: ReservationStatus,
    },
    RescheduleReservation {
        id: ReservationId,
        start: NaiveDate,
        end: NaiveDate,
    },
    GetReservation {
        id: ReservationId,
    },
    ListReservations {
        #[serde(default)]
        status: Option<ReservationStatus>,
        #[serde(default)]
        property_id: Option<PropertyId>,
        #[serde(default)]
        user_id: Option<UserId>,
    },
    ListPropertyReservations {
        property_id: PropertyId,
    },
    ListUserReservations {
        user_id: UserId,
    },

    // ── Blocked ranges ───────────────────────────────────────
    CreateBlockedRange {
        property_id: PropertyId,
        start: NaiveDate,
        end: NaiveDate,
        #[serde(default)]
        reason: Option<String>,
    },
    UpdateBlockedRange {
        id: BlockedRangeId,
        #[serde(default)]
        start: Option<NaiveDate>,
        #[serde(default)]
        end: Option<NaiveDate>,
        /// Absent keeps the reason, `null` clears it.
        #[serde(default, with = "crate::model::double_option")]
        reason: Option<Option<String>>,
    },
    DeleteBlockedRange {
        id: BlockedRangeId,
    },
    ListBlockedRanges {
        property_id: PropertyId,
    },
    ListBlockedInRange {
        property_id: PropertyId,
        start: NaiveDate,
        end: NaiveDate,
    },
    IsBlocked {
        property_id: PropertyId,
        start: NaiveDate,
        end: NaiveDate,
    },

    // ── Directory ────────────────────────────────────────────
    PutProperty {
        property: Property,
    },
    PutUser {
        user: UserProfile,
    },

    // ── Session ──────────────────────────────────────────────
    Listen {
        property_id: PropertyId,
    },
    Unlisten {
        property_id: PropertyId,
    },
    UnlistenAll,
    Compact,
}

/// Dates as they arrive on the wire. Ordering is checked by the engine, so
/// this never goes through `Interval::new`.
pub fn interval(start: NaiveDate, end: NaiveDate) -> Interval {
    Interval { start, end }
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(CommandError::Empty);
    }
    if trimmed.len() > MAX_LINE_LEN {
        return Err(CommandError::TooLong(trimmed.len()));
    }
    serde_json::from_str(trimmed).map_err(|e| CommandError::Parse(e.to_string()))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    TooLong(usize),
    Parse(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty command"),
            CommandError::TooLong(len) => write!(f, "command too long: {len} bytes"),
            CommandError::Parse(s) => write!(f, "parse error: {s}"),
        }
    }
}

impl std::error::Error for CommandError {}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const PID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn parse_auth() {
        let cmd = parse_command(r#"{"op":"auth","password":"rentcal"}"#).unwrap();
        assert_eq!(cmd, Command::Auth { password: "rentcal".into() });
    }

    #[test]
    fn parse_check_availability_defaults() {
        let line = format!(r#"{{"op":"check_availability","property_id":"{PID}","start":"2025-06-01","end":"2025-06-04"}}"#);
        match parse_command(&line).unwrap() {
            Command::CheckAvailability { property_id, start, end, exclude, booking } => {
                assert_eq!(property_id.to_string(), PID);
                assert_eq!(start, d("2025-06-01"));
                assert_eq!(end, d("2025-06-04"));
                assert_eq!(exclude, None);
                assert!(!booking);
            }
            other => panic!("expected CheckAvailability, got {other:?}"),
        }
    }

    #[test]
    fn parse_guest_reservation() {
        let line = format!(
            r#"{{"op":"create_reservation","property_id":"{PID}","start":"2025-06-01","end":"2025-06-04",
                "contact":{{"name":"Ana","email":"ana@example.com","phone":"+351"}}}}"#
        );
        match parse_command(&line).unwrap() {
            Command::CreateReservation { contact, user_id, .. } => {
                assert_eq!(user_id, None);
                assert_eq!(contact.name.as_deref(), Some("Ana"));
                assert_eq!(contact.country, None);
            }
            other => panic!("expected CreateReservation, got {other:?}"),
        }
    }

    #[test]
    fn parse_member_reservation_without_contact() {
        let uid = Ulid::new();
        let line = format!(
            r#"{{"op":"create_reservation","property_id":"{PID}","start":"2025-06-01","end":"2025-06-04","user_id":"{uid}"}}"#
        );
        match parse_command(&line).unwrap() {
            Command::CreateReservation { contact, user_id, .. } => {
                assert_eq!(user_id, Some(uid));
                assert_eq!(contact, ContactDetails::default());
            }
            other => panic!("expected CreateReservation, got {other:?}"),
        }
    }

    #[test]
    fn parse_status_uses_upper_case() {
        let line = format!(r#"{{"op":"set_reservation_status","id":"{PID}","status":"CANCELLED"}}"#);
        match parse_command(&line).unwrap() {
            Command::SetReservationStatus { status, .. } => {
                assert_eq!(status, ReservationStatus::Cancelled)
            }
            other => panic!("expected SetReservationStatus, got {other:?}"),
        }
        let bad = format!(r#"{{"op":"set_reservation_status","id":"{PID}","status":"cancelled"}}"#);
        assert!(matches!(parse_command(&bad), Err(CommandError::Parse(_))));
    }

    #[test]
    fn parse_update_blocked_range_reason() {
        let keep = format!(r#"{{"op":"update_blocked_range","id":"{PID}","end":"2025-07-09"}}"#);
        match parse_command(&keep).unwrap() {
            Command::UpdateBlockedRange { start, end, reason, .. } => {
                assert_eq!(start, None);
                assert_eq!(end, Some(d("2025-07-09")));
                assert_eq!(reason, None);
            }
            other => panic!("expected UpdateBlockedRange, got {other:?}"),
        }

        let clear = format!(r#"{{"op":"update_blocked_range","id":"{PID}","reason":null}}"#);
        match parse_command(&clear).unwrap() {
            Command::UpdateBlockedRange { reason, .. } => assert_eq!(reason, Some(None)),
            other => panic!("expected UpdateBlockedRange, got {other:?}"),
        }

        let set = format!(r#"{{"op":"update_blocked_range","id":"{PID}","reason":"painting"}}"#);
        match parse_command(&set).unwrap() {
            Command::UpdateBlockedRange { reason, .. } => {
                assert_eq!(reason, Some(Some("painting".into())))
            }
            other => panic!("expected UpdateBlockedRange, got {other:?}"),
        }
    }

    #[test]
    fn parse_list_reservations_filter() {
        let cmd = parse_command(r#"{"op":"list_reservations","status":"PENDING"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::ListReservations {
                status: Some(ReservationStatus::Pending),
                property_id: None,
                user_id: None,
            }
        );
    }

    #[test]
    fn parse_put_property() {
        let line = format!(
            r#"{{"op":"put_property","property":{{"id":"{PID}","price":800,"listing":"RENT","status":"AVAILABLE"}}}}"#
        );
        match parse_command(&line).unwrap() {
            Command::PutProperty { property } => {
                assert_eq!(property.price, 800);
                assert!(property.is_bookable());
            }
            other => panic!("expected PutProperty, got {other:?}"),
        }
    }

    #[test]
    fn parse_unit_ops() {
        assert_eq!(parse_command(r#"{"op":"unlisten_all"}"#).unwrap(), Command::UnlistenAll);
        assert_eq!(parse_command(r#" {"op":"compact"} "#).unwrap(), Command::Compact);
    }

    #[test]
    fn parse_bad_date_errors() {
        let line = format!(r#"{{"op":"is_blocked","property_id":"{PID}","start":"2025-02-30","end":"2025-03-02"}}"#);
        assert!(matches!(parse_command(&line), Err(CommandError::Parse(_))));
    }

    #[test]
    fn parse_unknown_op_errors() {
        assert!(matches!(
            parse_command(r#"{"op":"drop_everything"}"#),
            Err(CommandError::Parse(_))
        ));
    }

    #[test]
    fn parse_empty_errors() {
        assert_eq!(parse_command("   "), Err(CommandError::Empty));
    }
}
