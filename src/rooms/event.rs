use std::fmt;

use serde::Serialize;
use serde_json::Value;
use ulid::Ulid;

use super::chat::ChatMessage;
use super::code::RoomCode;
use super::member::MemberId;
use super::playback::{PlaybackAction, PlaybackSnapshot, VideoSource};
use super::voice::VoicePeer;

/// Wire view of a member, host flag included.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
  pub id: MemberId,
  pub username: String,
  pub color: String,
  pub is_host: bool,
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceAction {
  Joined,
  Left,
}

/// Everything the server can push to a client. The `type` tag is the event
/// name on the wire.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
  #[serde(rename_all = "camelCase")]
  RoomJoined {
    room_code: RoomCode,
    users: Vec<UserView>,
    video: Option<VideoSource>,
    video_state: PlaybackSnapshot,
    messages: Vec<ChatMessage>,
    is_host: bool,
  },
  Error {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
  },
  #[serde(rename_all = "camelCase")]
  HostStatus { is_host: bool },
  UserJoined { user: UserView },
  #[serde(rename_all = "camelCase")]
  UserLeft { user_id: MemberId, username: String },
  UsersUpdated { users: Vec<UserView> },
  VideoSet { video: VideoSource },
  #[serde(rename_all = "camelCase")]
  VideoSync {
    action: PlaybackAction,
    current_time: f64,
    is_playing: bool,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    synced_by: Option<String>,
  },
  #[serde(rename_all = "camelCase")]
  InitialVideoSync { action: PlaybackAction, current_time: f64, timestamp: i64 },
  SyncSuccess { message: String },
  SyncError { message: String },
  NewMessage { message: ChatMessage },
  NewReaction { id: Ulid, username: String, emoji: String, timestamp: i64, x: f64, y: f64 },
  #[serde(rename_all = "camelCase")]
  UserTyping { username: String, is_typing: bool },
  VoiceChatStarted { initiator: String, members: Vec<String> },
  #[serde(rename_all = "camelCase")]
  VoiceChatNotification { initiator: String, initiator_color: String, message: String },
  #[serde(rename_all = "camelCase")]
  VoiceChatMemberJoined {
    new_member: String,
    socket_id: MemberId,
    members: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    existing_members: Option<Vec<VoicePeer>>,
  },
  #[serde(rename_all = "camelCase")]
  VoiceChatMemberLeft { left_member: String, socket_id: MemberId, members: Vec<String> },
  #[serde(rename_all = "camelCase")]
  VoiceChatMemberUpdated {
    members: Vec<String>,
    action: VoiceAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_member: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    left_member: Option<String>,
  },
  VoiceChatEnded,
  #[serde(rename_all = "camelCase")]
  VoiceChatMuteStatus { username: String, is_muted: bool },
  #[serde(rename_all = "camelCase")]
  VoiceOffer { offer: Value, from_socket_id: MemberId },
  #[serde(rename_all = "camelCase")]
  VoiceAnswer { answer: Value, from_socket_id: MemberId },
  #[serde(rename_all = "camelCase")]
  VoiceIceCandidate { candidate: Value, from_socket_id: MemberId },
  #[serde(rename_all = "camelCase")]
  ScreenShareStarted { username: String, socket_id: MemberId },
  #[serde(rename_all = "camelCase")]
  ScreenShareStopped { username: String, socket_id: MemberId },
  RequestScreenShareWebrtc { from: MemberId },
  WebrtcOffer { from: MemberId, offer: Value },
  WebrtcAnswer { from: MemberId, answer: Value },
  WebrtcIceCandidate { from: MemberId, candidate: Value },
}

impl fmt::Display for ServerEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&serde_json::to_string(self).map_err(|_| fmt::Error)?)
  }
}
