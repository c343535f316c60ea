use std::fmt;

use axum::extract::ws::Message;
use axum::Error;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use ulid::Ulid;

pub type MemberSender = UnboundedSender<Result<Message, Error>>;

/// Opaque per-connection identifier. Regenerated on reconnect, so a user who
/// drops and comes back is a new member.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct MemberId(Ulid);

impl MemberId {
  pub(crate) fn new() -> Self {
    Self(Ulid::new())
  }
}

impl fmt::Display for MemberId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0.to_string().to_lowercase())
  }
}

/// One connected participant in a room.
#[derive(Clone, Debug)]
pub struct Member {
  pub id: MemberId,
  pub username: String,
  pub color: String,
  pub is_typing: bool,
}

impl Member {
  pub(crate) fn new(id: MemberId, username: String, color: String) -> Self {
    Self { id, username, color, is_typing: false }
  }
}

const PALETTE: [&str; 12] = [
  "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
  "#BB8FCE", "#85C1E9", "#F8C471", "#82E0AA",
];

/// Display color by join order. Early members get maximally distinct palette
/// entries; past the palette we fall back to a random vibrant hue.
pub(crate) fn color_for(join_index: usize) -> String {
  match PALETTE.get(join_index) {
    Some(color) => (*color).to_string(),
    None => format!("hsl({}, 75%, 60%)", rand::thread_rng().gen_range(0..360)),
  }
}
