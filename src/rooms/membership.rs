use chrono::Utc;
use tracing::info;

use super::error::RoomError;
use super::event::{ServerEvent, UserView};
use super::member::{self, Member};
use super::{MemberId, Registry, RoomCode};

/// What the caller still has to arrange after a successful join.
pub(crate) struct JoinEffects {
  /// A video is set; arm the delayed catch-up sync for this member.
  pub needs_catchup: bool,
}

impl Registry {
  /// Admission control: room exists, capacity, unique display name, in that
  /// order. The first member becomes host automatically and silently.
  pub(crate) fn join(
    &self,
    id: MemberId,
    code: &RoomCode,
    username: &str,
  ) -> Result<JoinEffects, RoomError> {
    let username = username.trim();
    if username.is_empty() || username.chars().count() > 20 {
      return Err(RoomError::InvalidPayload { reason: "username must be 1-20 characters".into() });
    }
    if self.session_room(id).is_some() {
      return Err(RoomError::InvalidPayload { reason: "already in a room".into() });
    }

    let room = self.room(code)?;
    let mut room = room.write();
    if room.members.len() >= self.config().room_capacity {
      return Err(RoomError::RoomFull { code: code.clone(), occupants: room.member_names() });
    }
    if room.member_by_name(username).is_some() {
      return Err(RoomError::NameTaken { name: username.into(), existing: room.member_names() });
    }

    let color = member::color_for(room.members.len());
    room.members.push(Member::new(id, username.to_string(), color.clone()));
    room.empty_since = None;
    let became_host = room.host_id.is_none();
    if became_host {
      room.host_id = Some(id);
    }
    self.set_session_room(id, Some(code.clone()), Some(username.to_string()));
    info!("{username} joined room {code}");

    if became_host {
      self.send_to(id, &ServerEvent::HostStatus { is_host: true });
    }
    self.send_to(
      id,
      &ServerEvent::RoomJoined {
        room_code: code.clone(),
        users: room.user_views(),
        video: room.video.clone(),
        video_state: room.playback.snapshot(),
        messages: room.recent_messages(self.config().join_snapshot_messages).to_vec(),
        is_host: room.is_host(id),
      },
    );

    // A live voice session greets the newcomer right away.
    if let Some(voice) = &room.voice {
      let initiator = voice.initiator.clone();
      let members = voice.member_names();
      let initiator_color = room
        .member_by_name(&initiator)
        .map(|m| m.color.clone())
        .unwrap_or_else(|| "#4ECDC4".to_string());
      self.send_to(
        id,
        &ServerEvent::VoiceChatNotification {
          initiator: initiator.clone(),
          initiator_color,
          message: format!("{initiator} started Voice chat, want to join?"),
        },
      );
      self.send_to(id, &ServerEvent::VoiceChatStarted { initiator, members });
    }

    let user = UserView {
      id,
      username: username.to_string(),
      color,
      is_host: room.is_host(id),
    };
    self.broadcast_except(&room, id, &ServerEvent::UserJoined { user });
    self.broadcast(&room, &ServerEvent::UsersUpdated { users: room.user_views() });
    self.post_system(&mut room, format!("{username} joined the room"), "👋");

    Ok(JoinEffects { needs_catchup: room.video.is_some() })
  }

  /// Removes a member: voice cleanup, deterministic host succession, empty
  /// marking. Returns the room code when the room just became empty so the
  /// caller can arm the sweep.
  pub(crate) fn leave(&self, code: &RoomCode, id: MemberId) -> Option<RoomCode> {
    let room = self.room(code).ok()?;
    let mut room = room.write();
    let index = room.members.iter().position(|member| member.id == id)?;

    let member = room.members.remove(index);
    self.voice_disconnect(&mut room, id);
    info!("{} left room {code}", member.username);

    if room.members.is_empty() {
      room.host_id = None;
      room.empty_since = Some(Utc::now());
      return Some(code.clone());
    }

    // Successor is the earliest-joined remaining member.
    if room.host_id == Some(id) {
      let successor = room.members[0].id;
      room.host_id = Some(successor);
      self.send_to(successor, &ServerEvent::HostStatus { is_host: true });
    }

    self.broadcast(
      &room,
      &ServerEvent::UserLeft { user_id: id, username: member.username.clone() },
    );
    self.broadcast(&room, &ServerEvent::UsersUpdated { users: room.user_views() });
    self.post_system(&mut room, format!("{} left the room", member.username), "🚪");
    None
  }

  /// Mid-session authority transfer, host-only. Every member hears its own
  /// host status; exactly one hears `true`.
  pub(crate) fn transfer_host(
    &self,
    code: &RoomCode,
    id: MemberId,
    target_name: &str,
  ) -> Result<(), RoomError> {
    let room = self.room(code)?;
    let mut room = room.write();
    if !room.is_host(id) {
      return Err(RoomError::NotHost { action: "transfer host" });
    }
    let target_id = room
      .member_by_name(target_name)
      .map(|member| member.id)
      .ok_or_else(|| RoomError::MemberNotFound { name: target_name.into() })?;

    room.host_id = Some(target_id);
    info!("host of room {code} transferred to {target_name}");

    for member in &room.members {
      self.send_to(member.id, &ServerEvent::HostStatus { is_host: member.id == target_id });
    }
    self.broadcast(&room, &ServerEvent::UsersUpdated { users: room.user_views() });
    self.post_system(&mut room, format!("{target_name} is now the host"), "👑");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::super::testing::{connect, drain, event_of, join};
  use super::super::Config;
  use super::*;

  #[test]
  fn first_member_becomes_host_and_gets_a_snapshot() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, mut alice_rx) = join(&registry, &code, "Alice");

    let events = drain(&mut alice_rx);
    assert_eq!(event_of(&events, "host-status").unwrap()["isHost"], true);
    let snapshot = event_of(&events, "room-joined").unwrap();
    assert_eq!(snapshot["roomCode"], code.as_str());
    assert_eq!(snapshot["isHost"], true);
    assert_eq!(snapshot["users"][0]["username"], "Alice");

    let room = registry.room(&code).unwrap();
    assert_eq!(room.read().host_id, Some(alice));
  }

  #[test]
  fn exactly_one_host_exists_in_a_populated_room() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    join(&registry, &code, "Alice");
    join(&registry, &code, "Bob");
    join(&registry, &code, "Carol");

    let room = registry.room(&code).unwrap();
    let room = room.read();
    let hosts: Vec<_> = room.user_views().into_iter().filter(|u| u.is_host).collect();
    assert_eq!(hosts.len(), 1);
    assert_eq!(Some(hosts[0].id), room.host_id);
  }

  #[test]
  fn duplicate_names_are_rejected_without_mutation() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    join(&registry, &code, "Alice");

    let (imposter, _rx) = connect(&registry);
    let result = registry.join(imposter, &code, "Alice");
    assert!(matches!(result, Err(RoomError::NameTaken { .. })));

    let room = registry.room(&code).unwrap();
    assert_eq!(room.read().members.len(), 1);
  }

  #[test]
  fn the_seventh_join_hits_capacity() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    for n in 0..6 {
      join(&registry, &code, &format!("user{n}"));
    }

    let (late, _rx) = connect(&registry);
    let result = registry.join(late, &code, "late");
    assert!(matches!(result, Err(RoomError::RoomFull { .. })));

    let room = registry.room(&code).unwrap();
    assert_eq!(room.read().members.len(), 6);
  }

  #[test]
  fn usernames_are_validated_before_the_room_is_touched() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (blank, _rx) = connect(&registry);
    assert!(registry.join(blank, &code, "   ").is_err());
    let (verbose, _rx) = connect(&registry);
    assert!(registry.join(verbose, &code, &"x".repeat(21)).is_err());
  }

  #[test]
  fn host_succession_is_by_join_order() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, _alice_rx) = join(&registry, &code, "Alice");
    let (bob, mut bob_rx) = join(&registry, &code, "Bob");
    let (carol, _carol_rx) = join(&registry, &code, "Carol");
    drain(&mut bob_rx);

    registry.leave(&code, alice);

    let room = registry.room(&code).unwrap();
    assert_eq!(room.read().host_id, Some(bob));
    assert_ne!(room.read().host_id, Some(carol));
    assert_eq!(event_of(&drain(&mut bob_rx), "host-status").unwrap()["isHost"], true);
  }

  #[test]
  fn departures_notify_the_remaining_members() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (_alice, mut alice_rx) = join(&registry, &code, "Alice");
    let (bob, _bob_rx) = join(&registry, &code, "Bob");
    drain(&mut alice_rx);

    registry.leave(&code, bob);

    let events = drain(&mut alice_rx);
    assert_eq!(event_of(&events, "user-left").unwrap()["username"], "Bob");
    let users = event_of(&events, "users-updated").unwrap();
    assert_eq!(users["users"].as_array().unwrap().len(), 1);
  }

  #[test]
  fn emptying_a_room_marks_it_and_requests_a_sweep() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, _alice_rx) = join(&registry, &code, "Alice");

    let emptied = registry.leave(&code, alice);
    assert_eq!(emptied, Some(code.clone()));

    let room = registry.room(&code).unwrap();
    let room = room.read();
    assert!(room.empty_since.is_some());
    assert_eq!(room.host_id, None);
  }

  #[test]
  fn rejoining_an_emptied_room_clears_the_mark_and_restores_hosthood() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, _alice_rx) = join(&registry, &code, "Alice");
    registry.remove_connection(alice);

    // Same display name, fresh connection: a brand-new member.
    let (alice2, mut rx) = join(&registry, &code, "Alice");
    let room = registry.room(&code).unwrap();
    assert!(room.read().empty_since.is_none());
    assert_eq!(room.read().host_id, Some(alice2));
    assert_eq!(event_of(&drain(&mut rx), "host-status").unwrap()["isHost"], true);
  }

  #[test]
  fn transfer_host_is_host_gated_and_renotifies_everyone() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, mut alice_rx) = join(&registry, &code, "Alice");
    let (bob, mut bob_rx) = join(&registry, &code, "Bob");
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    let refused = registry.transfer_host(&code, bob, "Alice");
    assert!(matches!(refused, Err(RoomError::NotHost { .. })));

    registry.transfer_host(&code, alice, "Bob").unwrap();
    let room = registry.room(&code).unwrap();
    assert_eq!(room.read().host_id, Some(bob));
    assert_eq!(event_of(&drain(&mut bob_rx), "host-status").unwrap()["isHost"], true);
    assert_eq!(event_of(&drain(&mut alice_rx), "host-status").unwrap()["isHost"], false);
  }

  #[test]
  fn transfer_to_an_unknown_member_fails() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, _alice_rx) = join(&registry, &code, "Alice");

    let result = registry.transfer_host(&code, alice, "Nobody");
    assert!(matches!(result, Err(RoomError::MemberNotFound { .. })));
  }
}
