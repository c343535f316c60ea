use serde::Serialize;
use tracing::info;

use super::event::{ServerEvent, VoiceAction};
use super::room::Room;
use super::{MemberId, Registry, RoomCode};

/// One participant of the active voice session.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoicePeer {
  pub username: String,
  pub socket_id: MemberId,
}

/// Ephemeral voice-chat sub-group. Exists only while it has members; the
/// initiator is kept for attribution, not control.
#[derive(Clone, Debug)]
pub struct VoiceSession {
  pub initiator: String,
  pub members: Vec<VoicePeer>,
}

impl VoiceSession {
  pub(crate) fn start(initiator: String, id: MemberId) -> Self {
    let peer = VoicePeer { username: initiator.clone(), socket_id: id };
    Self { initiator, members: vec![peer] }
  }

  pub(crate) fn contains(&self, id: MemberId) -> bool {
    self.members.iter().any(|peer| peer.socket_id == id)
  }

  pub(crate) fn push(&mut self, username: String, id: MemberId) {
    self.members.push(VoicePeer { username, socket_id: id });
  }

  pub(crate) fn remove(&mut self, id: MemberId) -> Option<VoicePeer> {
    let index = self.members.iter().position(|peer| peer.socket_id == id)?;
    Some(self.members.remove(index))
  }

  pub(crate) fn member_names(&self) -> Vec<String> {
    self.members.iter().map(|peer| peer.username.clone()).collect()
  }

  pub(crate) fn ids(&self) -> Vec<MemberId> {
    self.members.iter().map(|peer| peer.socket_id).collect()
  }
}

impl Registry {
  /// Starts a session, or joins the active one; only one session exists per
  /// room and starting twice is a join.
  pub(crate) fn voice_start(&self, code: &RoomCode, id: MemberId) {
    {
      let Ok(room) = self.room(code) else { return };
      let mut room = room.write();
      let Some(member) = room.member(id) else { return };

      if room.voice.is_none() {
        let initiator = member.username.clone();
        let color = member.color.clone();
        room.voice = Some(VoiceSession::start(initiator.clone(), id));
        info!("{initiator} started voice chat in room {code}");

        self.post_system(&mut room, format!("{initiator} started a voice chat"), "🎤");
        self.broadcast_except(
          &room,
          id,
          &ServerEvent::VoiceChatNotification {
            initiator: initiator.clone(),
            initiator_color: color,
            message: format!("{initiator} started Voice chat, want to join?"),
          },
        );
        self.send_to(
          id,
          &ServerEvent::VoiceChatStarted { initiator: initiator.clone(), members: vec![initiator] },
        );
        return;
      }
    }

    self.voice_join(code, id);
  }

  pub(crate) fn voice_join(&self, code: &RoomCode, id: MemberId) {
    let Ok(room) = self.room(code) else { return };
    let mut room = room.write();
    let Some(member) = room.member(id) else { return };
    let username = member.username.clone();

    let (existing, members, initiator, peer_ids) = {
      let Some(voice) = room.voice.as_mut() else { return };
      if voice.contains(id) {
        return;
      }
      let existing = voice.members.clone();
      voice.push(username.clone(), id);
      (existing, voice.member_names(), voice.initiator.clone(), voice.ids())
    };
    info!("{username} joined voice chat in room {code}");

    self.post_system(&mut room, format!("{username} joined the voice chat"), "🔊");
    // Each current voice member learns about the newcomer; only the newcomer
    // gets the existing roster, which seeds its peer connections.
    for peer in &peer_ids {
      self.send_to(
        *peer,
        &ServerEvent::VoiceChatMemberJoined {
          new_member: username.clone(),
          socket_id: id,
          members: members.clone(),
          existing_members: (*peer == id).then(|| existing.clone()),
        },
      );
    }
    self.broadcast(
      &room,
      &ServerEvent::VoiceChatMemberUpdated {
        members: members.clone(),
        action: VoiceAction::Joined,
        new_member: Some(username),
        left_member: None,
      },
    );
    self.send_to(id, &ServerEvent::VoiceChatStarted { initiator, members });
  }

  pub(crate) fn voice_leave(&self, code: &RoomCode, id: MemberId) {
    let Ok(room) = self.room(code) else { return };
    let mut room = room.write();
    let Some(left) = Self::voice_remove(&mut room, id) else { return };
    info!("{} left voice chat in room {code}", left.username);

    self.post_system(&mut room, format!("{} left the voice chat", left.username), "🔇");
    if room.voice.is_none() {
      self.post_system(&mut room, "Voice chat ended".to_string(), "🎤");
      self.broadcast(&room, &ServerEvent::VoiceChatEnded);
    } else {
      self.notify_voice_left(&room, &left);
    }
  }

  /// Voice cleanup on ungraceful departure. Same state transitions as an
  /// explicit leave, without the system chat messages.
  pub(crate) fn voice_disconnect(&self, room: &mut Room, id: MemberId) {
    let Some(left) = Self::voice_remove(room, id) else { return };
    if room.voice.is_none() {
      self.broadcast(room, &ServerEvent::VoiceChatEnded);
    } else {
      self.notify_voice_left(room, &left);
    }
  }

  /// Mute state is relayed verbatim; the server stores nothing and the
  /// clients resolve conflicts last-write-wins.
  pub(crate) fn mute_status(&self, code: &RoomCode, id: MemberId, username: String, is_muted: bool) {
    let Ok(room) = self.room(code) else { return };
    let room = room.read();
    if room.member(id).is_none() {
      return;
    }
    self.broadcast_except(&room, id, &ServerEvent::VoiceChatMuteStatus { username, is_muted });
  }

  // Session membership may never be present-but-empty.
  fn voice_remove(room: &mut Room, id: MemberId) -> Option<VoicePeer> {
    let voice = room.voice.as_mut()?;
    let left = voice.remove(id)?;
    if voice.members.is_empty() {
      room.voice = None;
    }
    Some(left)
  }

  fn notify_voice_left(&self, room: &Room, left: &VoicePeer) {
    let Some(voice) = &room.voice else { return };
    let members = voice.member_names();
    for peer in &voice.members {
      self.send_to(
        peer.socket_id,
        &ServerEvent::VoiceChatMemberLeft {
          left_member: left.username.clone(),
          socket_id: left.socket_id,
          members: members.clone(),
        },
      );
    }
    self.broadcast(
      room,
      &ServerEvent::VoiceChatMemberUpdated {
        members,
        action: VoiceAction::Left,
        new_member: None,
        left_member: Some(left.username.clone()),
      },
    );
  }
}

#[cfg(test)]
mod tests {
  use super::super::testing::{drain, event_of, join};
  use super::super::Config;
  use super::*;

  #[test]
  fn starting_voice_chat_notifies_the_room_and_confirms_the_initiator() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, mut alice_rx) = join(&registry, &code, "Alice");
    let (_bob, mut bob_rx) = join(&registry, &code, "Bob");
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    registry.voice_start(&code, alice);

    let alice_events = drain(&mut alice_rx);
    let started = event_of(&alice_events, "voice-chat-started").unwrap();
    assert_eq!(started["initiator"], "Alice");
    assert!(event_of(&alice_events, "voice-chat-notification").is_none());

    let bob_events = drain(&mut bob_rx);
    let notified = event_of(&bob_events, "voice-chat-notification").unwrap();
    assert_eq!(notified["initiator"], "Alice");
  }

  #[test]
  fn starting_twice_is_a_join() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, _alice_rx) = join(&registry, &code, "Alice");
    let (bob, mut bob_rx) = join(&registry, &code, "Bob");
    registry.voice_start(&code, alice);
    drain(&mut bob_rx);

    registry.voice_start(&code, bob);

    let room = registry.room(&code).unwrap();
    let room = room.read();
    let voice = room.voice.as_ref().unwrap();
    assert_eq!(voice.initiator, "Alice");
    assert_eq!(voice.member_names(), vec!["Alice", "Bob"]);

    let bob_events = drain(&mut bob_rx);
    let joined = event_of(&bob_events, "voice-chat-member-joined").unwrap();
    assert_eq!(joined["newMember"], "Bob");
    assert_eq!(joined["existingMembers"][0]["username"], "Alice");
  }

  #[test]
  fn last_member_leaving_ends_the_session() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, mut alice_rx) = join(&registry, &code, "Alice");
    registry.voice_start(&code, alice);
    drain(&mut alice_rx);

    registry.voice_leave(&code, alice);

    let room = registry.room(&code).unwrap();
    assert!(room.read().voice.is_none());
    assert!(event_of(&drain(&mut alice_rx), "voice-chat-ended").is_some());
  }

  #[test]
  fn leaving_keeps_the_session_for_the_rest() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, mut alice_rx) = join(&registry, &code, "Alice");
    let (bob, _bob_rx) = join(&registry, &code, "Bob");
    registry.voice_start(&code, alice);
    registry.voice_join(&code, bob);
    drain(&mut alice_rx);

    registry.voice_leave(&code, bob);

    let room = registry.room(&code).unwrap();
    assert_eq!(room.read().voice.as_ref().unwrap().member_names(), vec!["Alice"]);
    let alice_events = drain(&mut alice_rx);
    let left = event_of(&alice_events, "voice-chat-member-left").unwrap();
    assert_eq!(left["leftMember"], "Bob");
    assert!(event_of(&alice_events, "voice-chat-ended").is_none());
  }

  #[test]
  fn joining_without_an_active_session_is_a_no_op() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, _alice_rx) = join(&registry, &code, "Alice");

    registry.voice_join(&code, alice);

    let room = registry.room(&code).unwrap();
    assert!(room.read().voice.is_none());
  }
}
