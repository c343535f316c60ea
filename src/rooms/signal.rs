use tracing::debug;

use super::event::ServerEvent;
use super::{MemberId, Registry, RoomCode};

impl Registry {
  /// Forwards an opaque negotiation payload to one named connection. The
  /// payload is never inspected; both ends must be members of the room.
  pub(crate) fn relay_to(
    &self,
    code: &RoomCode,
    from: MemberId,
    target: MemberId,
    event: ServerEvent,
  ) {
    let Ok(room) = self.room(code) else { return };
    let room = room.read();
    if room.member(from).is_none() || room.member(target).is_none() {
      debug!("relay dropped from={from} target={target}");
      return;
    }
    self.send_to(target, &event);
  }

  /// Screen-share lifecycle notices go to everyone else in the room; the
  /// sharer's identity comes from its session, not the payload.
  pub(crate) fn screen_share(&self, code: &RoomCode, id: MemberId, active: bool) {
    let Ok(room) = self.room(code) else { return };
    let room = room.read();
    let Some(member) = room.member(id) else { return };

    let event = if active {
      ServerEvent::ScreenShareStarted { username: member.username.clone(), socket_id: id }
    } else {
      ServerEvent::ScreenShareStopped { username: member.username.clone(), socket_id: id }
    };
    self.broadcast_except(&room, id, &event);
  }
}
