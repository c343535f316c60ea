use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use ulid::Ulid;

use super::error::RoomError;
use super::event::ServerEvent;
use super::room::Room;
use super::{MemberId, Registry, RoomCode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
  User,
  System,
}

impl MessageKind {
  fn is_user(&self) -> bool {
    matches!(self, Self::User)
  }
}

/// One immutable chat entry. User posts carry the author's name and color;
/// server-synthesized notices carry an icon hint instead.
#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
  pub id: Ulid,
  #[serde(rename = "type", skip_serializing_if = "MessageKind::is_user")]
  pub kind: MessageKind,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  pub message: String,
  pub timestamp: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

impl ChatMessage {
  pub(crate) fn user(username: String, color: String, message: String) -> Self {
    Self {
      id: Ulid::new(),
      kind: MessageKind::User,
      username: Some(username),
      message,
      timestamp: Utc::now(),
      color: Some(color),
      icon: None,
    }
  }

  pub(crate) fn system(message: String, icon: &str) -> Self {
    Self {
      id: Ulid::new(),
      kind: MessageKind::System,
      username: None,
      message,
      timestamp: Utc::now(),
      color: None,
      icon: Some(icon.to_string()),
    }
  }
}

impl Registry {
  /// Appends a user message (trimmed, non-empty) and fans it out room-wide,
  /// sender included.
  pub(crate) fn post_message(
    &self,
    code: &RoomCode,
    id: MemberId,
    body: &str,
  ) -> Result<(), RoomError> {
    let body = body.trim();
    if body.is_empty() {
      return Err(RoomError::InvalidPayload { reason: "empty message".into() });
    }

    let room = self.room(code)?;
    let mut room = room.write();
    let (username, color) = {
      let member = room
        .member(id)
        .ok_or_else(|| RoomError::MemberNotFound { name: id.to_string() })?;
      (member.username.clone(), member.color.clone())
    };

    let message = ChatMessage::user(username, color, body.to_string());
    room.push_message(message.clone(), self.config().chat_history_cap);
    self.broadcast(&room, &ServerEvent::NewMessage { message });
    Ok(())
  }

  /// Server-synthesized notice, appended and broadcast like any message.
  pub(crate) fn post_system(&self, room: &mut Room, body: String, icon: &str) {
    let message = ChatMessage::system(body, icon);
    room.push_message(message.clone(), self.config().chat_history_cap);
    self.broadcast(room, &ServerEvent::NewMessage { message });
  }

  /// Ephemeral on-screen reaction; room-wide, never stored.
  pub(crate) fn send_reaction(&self, code: &RoomCode, id: MemberId, emoji: String) {
    let Ok(room) = self.room(code) else { return };
    let room = room.read();
    let Some(member) = room.member(id) else { return };

    let mut rng = rand::thread_rng();
    self.broadcast(
      &room,
      &ServerEvent::NewReaction {
        id: Ulid::new(),
        username: member.username.clone(),
        emoji,
        timestamp: Utc::now().timestamp_millis(),
        x: rng.gen_range(0.0..100.0),
        y: rng.gen_range(0.0..100.0),
      },
    );
  }

  /// Typing relays skip the wire when the state did not change; debounce is
  /// the client's job.
  pub(crate) fn set_typing(&self, code: &RoomCode, id: MemberId, is_typing: bool) {
    let Ok(room) = self.room(code) else { return };
    let mut room = room.write();
    let username = {
      let Some(member) = room.member_mut(id) else { return };
      if member.is_typing == is_typing {
        return;
      }
      member.is_typing = is_typing;
      member.username.clone()
    };
    self.broadcast_except(&room, id, &ServerEvent::UserTyping { username, is_typing });
  }
}
