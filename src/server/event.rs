use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::rooms::{MemberId, PlaybackAction, VideoSource};

/// Everything a client may send over the socket. Closed set: a frame whose
/// `type` tag or payload shape matches no variant is rejected as invalid.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub(super) enum ClientEvent {
  #[serde(rename_all = "camelCase")]
  JoinRoom { room_code: String, username: String },
  SetVideo { video: VideoSource },
  #[serde(rename_all = "camelCase")]
  VideoAction {
    action: PlaybackAction,
    #[serde(default)]
    current_time: Option<f64>,
  },
  #[serde(rename_all = "camelCase")]
  VideoSyncRequest { action: PlaybackAction, current_time: f64 },
  SendMessage { message: String },
  SendReaction { emoji: String },
  TypingStart,
  TypingStop,
  #[serde(rename_all = "camelCase")]
  TransferHost { new_host_username: String },
  // The username fields below are accepted for wire compatibility but never
  // trusted; the sender's session supplies its identity.
  StartVoiceChat {
    #[serde(default)]
    username: Option<String>,
  },
  JoinVoiceChat {
    #[serde(default)]
    username: Option<String>,
  },
  LeaveVoiceChat {
    #[serde(default)]
    username: Option<String>,
  },
  #[serde(rename_all = "camelCase")]
  VoiceOffer { offer: Value, target_socket_id: MemberId },
  #[serde(rename_all = "camelCase")]
  VoiceAnswer { answer: Value, target_socket_id: MemberId },
  #[serde(rename_all = "camelCase")]
  VoiceIceCandidate { candidate: Value, target_socket_id: MemberId },
  #[serde(rename_all = "camelCase")]
  VoiceChatMuteStatus { username: String, is_muted: bool },
  ScreenShareStarted {
    #[serde(default)]
    username: Option<String>,
  },
  ScreenShareStopped {
    #[serde(default)]
    username: Option<String>,
  },
  RequestScreenShareWebrtc { to: MemberId },
  WebrtcOffer { to: MemberId, offer: Value },
  WebrtcAnswer { to: MemberId, answer: Value },
  WebrtcIceCandidate { to: MemberId, candidate: Value },
}

impl ClientEvent {
  pub(super) fn name(&self) -> &'static str {
    match self {
      Self::JoinRoom { .. } => "join-room",
      Self::SetVideo { .. } => "set-video",
      Self::VideoAction { .. } => "video-action",
      Self::VideoSyncRequest { .. } => "video-sync-request",
      Self::SendMessage { .. } => "send-message",
      Self::SendReaction { .. } => "send-reaction",
      Self::TypingStart => "typing-start",
      Self::TypingStop => "typing-stop",
      Self::TransferHost { .. } => "transfer-host",
      Self::StartVoiceChat { .. } => "start-voice-chat",
      Self::JoinVoiceChat { .. } => "join-voice-chat",
      Self::LeaveVoiceChat { .. } => "leave-voice-chat",
      Self::VoiceOffer { .. } => "voice-offer",
      Self::VoiceAnswer { .. } => "voice-answer",
      Self::VoiceIceCandidate { .. } => "voice-ice-candidate",
      Self::VoiceChatMuteStatus { .. } => "voice-chat-mute-status",
      Self::ScreenShareStarted { .. } => "screen-share-started",
      Self::ScreenShareStopped { .. } => "screen-share-stopped",
      Self::RequestScreenShareWebrtc { .. } => "request-screen-share-webrtc",
      Self::WebrtcOffer { .. } => "webrtc-offer",
      Self::WebrtcAnswer { .. } => "webrtc-answer",
      Self::WebrtcIceCandidate { .. } => "webrtc-ice-candidate",
    }
  }
}

impl FromStr for ClientEvent {
  type Err = serde_json::Error;

  fn from_str(s: &str) -> serde_json::Result<Self> {
    serde_json::from_str(s)
  }
}
