//! # Check-in Matching
//!
//! After a code verifies, the check-in still has to be attributed to the
//! right scheduled appointment. Members check in early or late, so each
//! appointment's `[start, end]` interval is widened by a configurable
//! tolerance (default two hours) on both sides, inclusive.
//!
//! When several widened intervals cover the timestamp, the appointment
//! whose `start` is nearest wins; ties fall back to the earliest-created
//! appointment, then the lowest id, so matching is deterministic.
//!
//! A verified check-in is never dropped: with no matching appointment the
//! record is written as `unmatched` and held for manual reconciliation, and
//! a match that collides with an approved absence exception is recorded
//! with a review flag instead of overwriting either side.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::exceptions::{Exception, ExceptionStatus};

/// Scheduled appointment, owned by the scheduling collaborator and
/// read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: u32,
    pub group: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Excused,
    Unmatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMethod {
    Totp,
    Staff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub member: String,
    pub appointment: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub method: VerificationMethod,
    pub needs_review: bool,
}

/// Appointment whose widened interval contains `at`, with the tie-breaks
/// described in the module docs. Bounds are inclusive on both sides.
pub fn match_appointment<'a>(
    appointments: &'a [Appointment],
    at: DateTime<Utc>,
    tolerance: Duration,
) -> Option<&'a Appointment> {
    appointments
        .iter()
        .filter(|appointment| {
            appointment.start - tolerance <= at && at <= appointment.end + tolerance
        })
        .min_by_key(|appointment| {
            (
                (appointment.start - at).num_seconds().abs(),
                appointment.created_at,
                appointment.id,
            )
        })
}

/// Turns a verified check-in into the attendance record to persist.
///
/// `exceptions` is the member's own exception list; an approved one
/// covering the matched appointment flags the record for review rather
/// than suppressing it.
pub fn resolve(
    member: &str,
    appointments: &[Appointment],
    exceptions: &[Exception],
    at: DateTime<Utc>,
    tolerance: Duration,
) -> AttendanceRecord {
    let Some(appointment) = match_appointment(appointments, at, tolerance) else {
        return AttendanceRecord {
            member: member.to_string(),
            appointment: None,
            timestamp: at,
            status: AttendanceStatus::Unmatched,
            method: VerificationMethod::Totp,
            needs_review: true,
        };
    };

    let excused = exceptions.iter().any(|exception| {
        exception.member == member
            && exception.appointment == appointment.id
            && exception.status == ExceptionStatus::Approved
    });

    AttendanceRecord {
        member: member.to_string(),
        appointment: Some(appointment.id),
        timestamp: at,
        status: AttendanceStatus::Present,
        method: VerificationMethod::Totp,
        needs_review: excused,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, hour, minute, 0).unwrap()
    }

    fn appointment(id: u32, start: DateTime<Utc>, end: DateTime<Utc>) -> Appointment {
        Appointment {
            id,
            group: "tuesday".to_string(),
            start,
            end,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, id).unwrap(),
        }
    }

    #[test]
    fn test_tolerance_bounds_are_inclusive() {
        let appointments = [appointment(1, at(10, 0), at(11, 0))];
        let tolerance = Duration::hours(2);

        assert!(match_appointment(&appointments, at(8, 0), tolerance).is_some());
        assert!(match_appointment(&appointments, at(7, 59), tolerance).is_none());
        assert!(match_appointment(&appointments, at(13, 0), tolerance).is_some());
        assert!(match_appointment(&appointments, at(13, 1), tolerance).is_none());
    }

    #[test]
    fn test_nearest_start_wins() {
        let appointments = [
            appointment(1, at(10, 0), at(11, 0)),
            appointment(2, at(12, 0), at(13, 0)),
        ];

        let matched = match_appointment(&appointments, at(10, 30), Duration::hours(2)).unwrap();
        assert_eq!(matched.id, 1);

        let matched = match_appointment(&appointments, at(11, 45), Duration::hours(2)).unwrap();
        assert_eq!(matched.id, 2);
    }

    #[test]
    fn test_equally_near_prefers_earliest_created() {
        // Both starts are two hours from the check-in; id 1 was created
        // first (see the `appointment` helper).
        let appointments = [
            appointment(2, at(14, 0), at(15, 0)),
            appointment(1, at(10, 0), at(11, 0)),
        ];

        let matched = match_appointment(&appointments, at(12, 0), Duration::hours(2)).unwrap();
        assert_eq!(matched.id, 1);
    }

    #[test]
    fn test_no_match_yields_unmatched_record() {
        let appointments = [appointment(1, at(10, 0), at(11, 0))];

        let record = resolve("m-1", &appointments, &[], at(16, 0), Duration::hours(2));
        assert_eq!(record.status, AttendanceStatus::Unmatched);
        assert_eq!(record.appointment, None);
        assert!(record.needs_review);
    }

    #[test]
    fn test_match_produces_present_record() {
        let appointments = [appointment(1, at(10, 0), at(11, 0))];

        let record = resolve("m-1", &appointments, &[], at(10, 15), Duration::hours(2));
        assert_eq!(record.status, AttendanceStatus::Present);
        assert_eq!(record.appointment, Some(1));
        assert_eq!(record.method, VerificationMethod::Totp);
        assert!(!record.needs_review);
    }

    #[test]
    fn test_approved_exception_flags_but_keeps_the_record() {
        let appointments = [appointment(1, at(10, 0), at(11, 0))];
        let mut exception = Exception::pending(9, "m-1", 1);
        exception.approve().unwrap();

        let record = resolve(
            "m-1",
            &appointments,
            &[exception],
            at(10, 15),
            Duration::hours(2),
        );
        assert_eq!(record.status, AttendanceStatus::Present);
        assert_eq!(record.appointment, Some(1));
        assert!(record.needs_review);
    }

    #[test]
    fn test_pending_exception_does_not_flag() {
        let appointments = [appointment(1, at(10, 0), at(11, 0))];
        let exception = Exception::pending(9, "m-1", 1);

        let record = resolve(
            "m-1",
            &appointments,
            &[exception],
            at(10, 15),
            Duration::hours(2),
        );
        assert!(!record.needs_review);
    }
}
