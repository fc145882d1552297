//! # Absence Exceptions
//!
//! A member who knows they will miss an appointment files an exception
//! ahead of time. Staff review it, and the check-in matcher consults the
//! approved ones so an excused absence and a verified presence for the same
//! appointment never silently overwrite each other.
//!
//! Lifecycle: `pending -> approved` or `pending -> rejected`, terminal
//! after that. Re-applying the state an exception is already in is a no-op
//! so a double-submitted review does not error; moving between the two
//! terminal states is refused, a new exception must be filed instead.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exception {
    pub id: u32,
    pub member: String,
    pub appointment: u32,
    pub status: ExceptionStatus,
}

impl Exception {
    pub fn pending(id: u32, member: &str, appointment: u32) -> Self {
        Self {
            id,
            member: member.to_string(),
            appointment,
            status: ExceptionStatus::Pending,
        }
    }

    pub fn approve(&mut self) -> Result<(), AppError> {
        self.transition(ExceptionStatus::Approved)
    }

    pub fn reject(&mut self) -> Result<(), AppError> {
        self.transition(ExceptionStatus::Rejected)
    }

    fn transition(&mut self, target: ExceptionStatus) -> Result<(), AppError> {
        match self.status {
            ExceptionStatus::Pending => {
                self.status = target;
                Ok(())
            }
            current if current == target => Ok(()),
            _ => Err(AppError::InvalidTransition),
        }
    }
}
