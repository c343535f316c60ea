use chrono::{DateTime, Utc};
use serde::Serialize;

use super::chat::ChatMessage;
use super::code::RoomCode;
use super::event::UserView;
use super::member::{Member, MemberId};
use super::playback::{PlaybackState, VideoSource};
use super::voice::VoiceSession;

/// Authoritative state of one watch session.
#[derive(Debug)]
pub struct Room {
  pub code: RoomCode,
  /// Insertion order is join order; host succession relies on it.
  pub members: Vec<Member>,
  pub host_id: Option<MemberId>,
  pub video: Option<VideoSource>,
  pub playback: PlaybackState,
  pub messages: Vec<ChatMessage>,
  pub voice: Option<VoiceSession>,
  /// Set when the last member leaves, cleared on rejoin; the sweep checks it.
  pub empty_since: Option<DateTime<Utc>>,
}

impl Room {
  pub(crate) fn new(code: RoomCode) -> Self {
    Self {
      code,
      members: Vec::new(),
      host_id: None,
      video: None,
      playback: PlaybackState::reset(Utc::now()),
      messages: Vec::new(),
      voice: None,
      empty_since: None,
    }
  }

  pub(crate) fn member(&self, id: MemberId) -> Option<&Member> {
    self.members.iter().find(|member| member.id == id)
  }

  pub(crate) fn member_mut(&mut self, id: MemberId) -> Option<&mut Member> {
    self.members.iter_mut().find(|member| member.id == id)
  }

  pub(crate) fn member_by_name(&self, username: &str) -> Option<&Member> {
    self.members.iter().find(|member| member.username == username)
  }

  pub(crate) fn member_names(&self) -> Vec<String> {
    self.members.iter().map(|member| member.username.clone()).collect()
  }

  pub(crate) fn is_host(&self, id: MemberId) -> bool {
    self.host_id == Some(id)
  }

  pub(crate) fn user_views(&self) -> Vec<UserView> {
    self
      .members
      .iter()
      .map(|member| UserView {
        id: member.id,
        username: member.username.clone(),
        color: member.color.clone(),
        is_host: self.is_host(member.id),
      })
      .collect()
  }

  pub(crate) fn push_message(&mut self, message: ChatMessage, cap: usize) {
    self.messages.push(message);
    if self.messages.len() > cap {
      let excess = self.messages.len() - cap;
      self.messages.drain(..excess);
    }
  }

  pub(crate) fn recent_messages(&self, count: usize) -> &[ChatMessage] {
    &self.messages[self.messages.len().saturating_sub(count)..]
  }
}

/// Lookup summary for the pre-join HTTP check.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
  pub room_code: RoomCode,
  pub user_count: usize,
  pub has_video: bool,
}
