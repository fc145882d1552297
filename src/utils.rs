use crate::{checkin::Appointment, error::AppError};

const MAX_IDENTIFIER_LEN: usize = 64;

/// Member/device identifiers double as store key fragments, so they are
/// restricted to a safe charset before any lookup happens.
pub fn validate_identifier(identifier: &str) -> Result<(), AppError> {
    if identifier.is_empty() || identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(AppError::MalformedPayload);
    }
    if !identifier
        .bytes()
        .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
    {
        return Err(AppError::MalformedPayload);
    }

    Ok(())
}

pub fn validate_appointments(appointments: &[Appointment]) -> Result<(), AppError> {
    for appointment in appointments {
        if appointment.end < appointment.start {
            return Err(AppError::MalformedPayload);
        }
    }

    Ok(())
}
