use serde_json::{json, Value};
use thiserror::Error;

use super::code::RoomCode;

/// Everything that can go wrong while handling a room event. All variants
/// are recoverable, sender-local conditions: the mutation is aborted and the
/// sender alone is told.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RoomError {
  #[error("Room not found")]
  RoomNotFound { code: RoomCode },
  #[error("Room is full")]
  RoomFull { code: RoomCode, occupants: Vec<String> },
  #[error("Username already taken")]
  NameTaken { name: String, existing: Vec<String> },
  #[error("Only host can {action}")]
  NotHost { action: &'static str },
  #[error("User not found in room")]
  MemberNotFound { name: String },
  #[error("Invalid video: {reason}")]
  InvalidVideo { reason: String },
  #[error("Invalid payload: {reason}")]
  InvalidPayload { reason: String },
  #[error("Failed to generate unique room code")]
  CodeSpaceExhausted,
}

impl RoomError {
  /// Structural context attached to the sender-only error event.
  pub(crate) fn details(&self) -> Option<Value> {
    match self {
      Self::RoomNotFound { code } => Some(json!({ "requestedRoom": code })),
      Self::RoomFull { code, occupants } => {
        Some(json!({ "requestedRoom": code, "currentUsers": occupants }))
      }
      Self::NameTaken { name, existing } => {
        Some(json!({ "requestedName": name, "existingUsers": existing }))
      }
      Self::MemberNotFound { name } => Some(json!({ "member": name })),
      Self::InvalidVideo { reason } | Self::InvalidPayload { reason } => {
        Some(json!({ "reason": reason }))
      }
      Self::NotHost { .. } | Self::CodeSpaceExhausted => None,
    }
  }
}
