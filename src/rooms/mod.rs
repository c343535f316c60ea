mod chat;
mod code;
mod config;
mod error;
mod event;
mod member;
mod membership;
mod playback;
mod room;
mod signal;
mod voice;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

pub use self::config::Config;

pub(crate) use self::code::RoomCode;
pub(crate) use self::error::RoomError;
pub(crate) use self::event::ServerEvent;
pub(crate) use self::member::{MemberId, MemberSender};
pub(crate) use self::playback::{PlaybackAction, VideoSource};
pub(crate) use self::room::{Room, RoomInfo};

/// Per-connection session record. Every inbound event resolves its room
/// through this map, never through state attached to the socket.
#[derive(Debug)]
struct Session {
  sender: MemberSender,
  room: Option<RoomCode>,
  username: Option<String>,
}

/// Process-wide room registry and fan-out hub. Cloning shares the maps, so
/// handlers and timers all see the same state.
///
/// Lock order: a room lock may be held while the session map is read for
/// sends; the session lock is never held across a room lookup.
#[derive(Clone, Default)]
pub struct Registry {
  config: Config,
  sessions: Arc<RwLock<HashMap<MemberId, Session>>>,
  rooms: Arc<RwLock<HashMap<RoomCode, Arc<RwLock<Room>>>>>,
}

impl Registry {
  pub fn new(config: Config) -> Self {
    Self { config, sessions: Default::default(), rooms: Default::default() }
  }

  pub(crate) fn config(&self) -> &Config {
    &self.config
  }

  /// Registers a live connection and hands back its id.
  pub(crate) fn add_connection(&self, sender: MemberSender) -> MemberId {
    let id = MemberId::new();
    debug!("add connection");
    self
      .sessions
      .write()
      .insert(id, Session { sender, room: None, username: None });
    id
  }

  /// Tears down a connection, leaving its room if it had joined one.
  /// Returns the room code when the room just became empty so the caller
  /// can arm the sweep.
  pub(crate) fn remove_connection(&self, id: MemberId) -> Option<RoomCode> {
    debug!("remove connection");
    let session = self.sessions.write().remove(&id)?;
    if let Some(username) = &session.username {
      info!("{username} disconnected");
    }
    let code = session.room?;
    self.leave(&code, id)
  }

  /// Registers a fresh room under a guaranteed-unique code. Exhausting the
  /// retry bound is a configuration-level failure reported to the caller.
  pub(crate) fn create_room(&self) -> Result<RoomCode, RoomError> {
    let mut rooms = self.rooms.write();
    for _ in 0..self.config.code_attempts {
      let code = RoomCode::generate();
      if rooms.contains_key(&code) {
        continue;
      }
      info!("room {code} created");
      rooms.insert(code.clone(), Arc::new(RwLock::new(Room::new(code.clone()))));
      return Ok(code);
    }
    Err(RoomError::CodeSpaceExhausted)
  }

  pub(crate) fn room_info(&self, code: &RoomCode) -> Option<RoomInfo> {
    let room = self.rooms.read().get(code)?.clone();
    let room = room.read();
    Some(RoomInfo {
      room_code: room.code.clone(),
      user_count: room.members.len(),
      has_video: room.video.is_some(),
    })
  }

  pub(crate) fn room(&self, code: &RoomCode) -> Result<Arc<RwLock<Room>>, RoomError> {
    self
      .rooms
      .read()
      .get(code)
      .cloned()
      .ok_or_else(|| RoomError::RoomNotFound { code: code.clone() })
  }

  pub(crate) fn session_room(&self, id: MemberId) -> Option<RoomCode> {
    self.sessions.read().get(&id).and_then(|session| session.room.clone())
  }

  fn set_session_room(&self, id: MemberId, room: Option<RoomCode>, username: Option<String>) {
    if let Some(session) = self.sessions.write().get_mut(&id) {
      session.room = room;
      session.username = username;
    }
  }

  /// Deletes the room if it is still empty. Armed by the caller when a room
  /// empties; state is re-read at fire time, so a rejoin within the window
  /// makes this a no-op.
  pub(crate) fn sweep(&self, code: &RoomCode) {
    let mut rooms = self.rooms.write();
    let Some(room) = rooms.get(code) else { return };
    let deletable = {
      let room = room.read();
      room.members.is_empty() && room.empty_since.is_some()
    };
    if deletable {
      rooms.remove(code);
      info!("room {code} swept after sitting empty");
    }
  }

  pub(crate) fn send_to(&self, id: MemberId, event: &ServerEvent) {
    let sender = self.sessions.read().get(&id).map(|session| session.sender.clone());
    let Some(sender) = sender else {
      warn!("send to unknown connection {id}");
      return;
    };
    if sender.send(Ok(Message::Text(event.to_string()))).is_err() {
      debug!("connection {id} gone, send dropped");
    }
  }

  pub(crate) fn broadcast(&self, room: &Room, event: &ServerEvent) {
    for member in &room.members {
      self.send_to(member.id, event);
    }
  }

  pub(crate) fn broadcast_except(&self, room: &Room, skip: MemberId, event: &ServerEvent) {
    for member in room.members.iter().filter(|member| member.id != skip) {
      self.send_to(member.id, event);
    }
  }
}
