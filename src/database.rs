//! # Redis
//!
//! System of record for everything the verification flow reads and writes.
//! Atomic single-key operations cover the few spots that need coordination
//! (secret exposure, check-in dedup, id allocation), so no transactions are
//! required.
//!
//! ## Schema
//!
//! - `member:{id}` — hash with `group`, `secret` (Base32), `exposed`
//!   (present once the provisioning payload has been viewed)
//! - `appointments:{group}` — JSON array of appointments, written by the
//!   scheduling collaborator through the boundary route
//! - `exceptions:{member}` — JSON array of absence exceptions
//! - `exceptions:seq` — id counter for newly filed exceptions
//! - `attendance:{member}` — list of JSON attendance records, append-only
//! - `checkin:{member}:{appointment}` — dedup marker claimed with `SET NX`
//!   so concurrent verified check-ins collapse into one record
//!
//! Connections ride a [`ConnectionManager`] with bounded connect and
//! response timeouts; a store timeout surfaces as an error to the caller
//! and never as an implicit allow.

use std::time::Duration;

use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

use crate::{
    checkin::{Appointment, AttendanceRecord, VerificationMethod},
    error::AppError,
    exceptions::Exception,
};

pub async fn init_redis(redis_url: &str) -> ConnectionManager {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100))
        .set_response_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url).unwrap();
    let connection_manager = client
        .get_connection_manager_with_config(config)
        .await
        .unwrap();

    connection_manager
}

fn member_key(member: &str) -> String {
    format!("member:{member}")
}

pub async fn put_member(
    conn: &mut ConnectionManager,
    member: &str,
    group: &str,
) -> Result<(), AppError> {
    let _: () = conn.hset(member_key(member), "group", group).await?;
    Ok(())
}

pub async fn get_member_group(
    conn: &mut ConnectionManager,
    member: &str,
) -> Result<Option<String>, AppError> {
    Ok(conn.hget(member_key(member), "group").await?)
}

pub async fn get_secret(
    conn: &mut ConnectionManager,
    member: &str,
) -> Result<Option<String>, AppError> {
    Ok(conn.hget(member_key(member), "secret").await?)
}

/// Stores a freshly generated secret and re-arms the one-time provisioning
/// view. Previously valid codes die with the old secret.
pub async fn set_secret(
    conn: &mut ConnectionManager,
    member: &str,
    secret: &str,
) -> Result<(), AppError> {
    let key = member_key(member);
    let _: () = conn.hset(&key, "secret", secret).await?;
    let _: () = conn.hdel(&key, "exposed").await?;
    Ok(())
}

/// Claims the one provisioning view of the member's secret. `HSETNX` makes
/// the claim atomic, so concurrent readers cannot both see the payload.
pub async fn try_expose_secret(
    conn: &mut ConnectionManager,
    member: &str,
) -> Result<bool, AppError> {
    Ok(conn.hset_nx(member_key(member), "exposed", "1").await?)
}

pub async fn get_appointments(
    conn: &mut ConnectionManager,
    group: &str,
) -> Result<Vec<Appointment>, AppError> {
    let raw: Option<String> = conn.get(format!("appointments:{group}")).await?;
    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

pub async fn put_appointments(
    conn: &mut ConnectionManager,
    group: &str,
    appointments: &[Appointment],
) -> Result<(), AppError> {
    let json = serde_json::to_string(appointments)?;
    let _: () = conn.set(format!("appointments:{group}"), json).await?;
    Ok(())
}

pub async fn get_exceptions(
    conn: &mut ConnectionManager,
    member: &str,
) -> Result<Vec<Exception>, AppError> {
    let raw: Option<String> = conn.get(format!("exceptions:{member}")).await?;
    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

pub async fn put_exceptions(
    conn: &mut ConnectionManager,
    member: &str,
    exceptions: &[Exception],
) -> Result<(), AppError> {
    let json = serde_json::to_string(exceptions)?;
    let _: () = conn.set(format!("exceptions:{member}"), json).await?;
    Ok(())
}

pub async fn file_exception(
    conn: &mut ConnectionManager,
    member: &str,
    appointment: u32,
) -> Result<Exception, AppError> {
    let id: u32 = conn.incr("exceptions:seq", 1).await?;
    let exception = Exception::pending(id, member, appointment);

    let mut exceptions = get_exceptions(conn, member).await?;
    exceptions.push(exception.clone());
    put_exceptions(conn, member, &exceptions).await?;

    Ok(exception)
}

/// Appends an attendance record. Verified check-ins are unique per
/// `(member, appointment)`; returns `false` when a duplicate was collapsed.
/// Unmatched and staff-written records are always appended.
pub async fn record_attendance(
    conn: &mut ConnectionManager,
    record: &AttendanceRecord,
) -> Result<bool, AppError> {
    if record.method == VerificationMethod::Totp {
        if let Some(appointment) = record.appointment {
            let claimed: bool = conn
                .set_nx(format!("checkin:{}:{appointment}", record.member), "1")
                .await?;
            if !claimed {
                return Ok(false);
            }
        }
    }

    let json = serde_json::to_string(record)?;
    let _: () = conn
        .rpush(format!("attendance:{}", record.member), json)
        .await?;
    Ok(true)
}
