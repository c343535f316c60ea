use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::RoomError;
use super::event::ServerEvent;
use super::{MemberId, Registry, RoomCode};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackAction {
  Play,
  Pause,
  Seek,
}

/// Authoritative playback clock. `position` is true as of `last_update`; a
/// playing video's current position must be extrapolated from wall time.
#[derive(Clone, Copy, Debug)]
pub struct PlaybackState {
  pub is_playing: bool,
  pub position: f64,
  pub last_update: DateTime<Utc>,
}

impl PlaybackState {
  pub(crate) fn reset(now: DateTime<Utc>) -> Self {
    Self { is_playing: false, position: 0.0, last_update: now }
  }

  /// Applies a play/pause/seek report. Seek never changes the play state.
  pub(crate) fn apply(&mut self, action: PlaybackAction, position: Option<f64>, now: DateTime<Utc>) {
    if let Some(position) = position {
      self.position = position;
    }
    self.last_update = now;
    match action {
      PlaybackAction::Play => self.is_playing = true,
      PlaybackAction::Pause => self.is_playing = false,
      PlaybackAction::Seek => {}
    }
  }

  /// Where the video should be at `now`, accounting for time elapsed since
  /// the last authoritative update.
  pub(crate) fn extrapolated_at(&self, now: DateTime<Utc>) -> f64 {
    if self.is_playing {
      let elapsed = (now - self.last_update).num_milliseconds() as f64 / 1000.0;
      self.position + elapsed.max(0.0)
    } else {
      self.position
    }
  }

  pub(crate) fn snapshot(&self) -> PlaybackSnapshot {
    PlaybackSnapshot {
      is_playing: self.is_playing,
      current_time: self.position,
      last_update: self.last_update.timestamp_millis(),
    }
  }
}

/// Wire view of the playback clock.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
  pub is_playing: bool,
  pub current_time: f64,
  pub last_update: i64,
}

/// Closed set of playable sources. Kind-specific fields only where a
/// platform needs them; anything else is rejected before it reaches a room.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VideoSource {
  Youtube {
    #[serde(rename = "videoId")]
    video_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
  },
  Local {
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
  },
  Hls { url: String },
  Dash { url: String },
  Direct { url: String },
  Vimeo { url: String },
  Dailymotion { url: String },
  Twitch { url: String },
  Embed { url: String },
  Generic { url: String },
}

impl VideoSource {
  pub(crate) fn validate(&self) -> Result<(), RoomError> {
    match self {
      Self::Youtube { video_id, .. } => {
        let well_formed = !video_id.is_empty()
          && video_id.len() <= 16
          && video_id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !well_formed {
          return Err(RoomError::InvalidVideo { reason: "malformed YouTube video id".into() });
        }
      }
      Self::Local { url, .. } => {
        if url.is_empty() {
          return Err(RoomError::InvalidVideo { reason: "missing local file url".into() });
        }
      }
      Self::Hls { url }
      | Self::Dash { url }
      | Self::Direct { url }
      | Self::Vimeo { url }
      | Self::Dailymotion { url }
      | Self::Twitch { url }
      | Self::Embed { url }
      | Self::Generic { url } => {
        if !url.starts_with("http://") && !url.starts_with("https://") {
          return Err(RoomError::InvalidVideo { reason: "url must be http(s)".into() });
        }
      }
    }
    Ok(())
  }
}

impl Registry {
  /// Host-only (the single authoritative source of "what plays"). Replacing
  /// the video always hard-resets the playback clock.
  pub(crate) fn set_video(
    &self,
    code: &RoomCode,
    id: MemberId,
    video: VideoSource,
  ) -> Result<(), RoomError> {
    video.validate()?;
    let room = self.room(code)?;
    let mut room = room.write();
    if !room.is_host(id) {
      return Err(RoomError::NotHost { action: "set video" });
    }

    room.playback = PlaybackState::reset(Utc::now());
    room.video = Some(video.clone());
    info!("video set in room {code}");

    self.broadcast(&room, &ServerEvent::VideoSet { video });
    Ok(())
  }

  /// Permissive passive mirroring: any member's play/pause/seek is applied
  /// and relayed to the rest as advisory state, never acknowledged.
  pub(crate) fn video_action(
    &self,
    code: &RoomCode,
    id: MemberId,
    action: PlaybackAction,
    position: Option<f64>,
  ) {
    let Ok(room) = self.room(code) else { return };
    let mut room = room.write();
    if room.member(id).is_none() || room.video.is_none() {
      return;
    }

    room.playback.apply(action, position, Utc::now());
    let sync = ServerEvent::VideoSync {
      action,
      current_time: room.playback.position,
      is_playing: room.playback.is_playing,
      timestamp: room.playback.last_update.timestamp_millis(),
      synced_by: None,
    };
    self.broadcast_except(&room, id, &sync);
  }

  /// Host-gated forced realignment of every other member. The sender gets an
  /// explicit ack so its client can decide whether to retry.
  pub(crate) fn sync_all(
    &self,
    code: &RoomCode,
    id: MemberId,
    action: PlaybackAction,
    position: f64,
  ) -> Result<(), RoomError> {
    let room = self.room(code)?;
    let mut room = room.write();
    let synced_by = {
      let member = room
        .member(id)
        .ok_or_else(|| RoomError::MemberNotFound { name: id.to_string() })?;
      member.username.clone()
    };
    if !room.is_host(id) {
      return Err(RoomError::NotHost { action: "sync video" });
    }
    if room.video.is_none() {
      return Err(RoomError::InvalidPayload { reason: "no video set".into() });
    }

    room.playback.apply(action, Some(position), Utc::now());
    info!("{synced_by} synced room {code} at {position}s");

    let sync = ServerEvent::VideoSync {
      action,
      current_time: room.playback.position,
      is_playing: room.playback.is_playing,
      timestamp: room.playback.last_update.timestamp_millis(),
      synced_by: Some(synced_by),
    };
    self.broadcast_except(&room, id, &sync);
    self.send_to(id, &ServerEvent::SyncSuccess { message: "Sync sent to all users".into() });
    Ok(())
  }

  /// Timer target for the late-joiner catch-up. State is re-read at fire
  /// time; a member or video gone by then makes this a no-op.
  pub(crate) fn initial_sync(&self, code: &RoomCode, id: MemberId) {
    let Ok(room) = self.room(code) else { return };
    let room = room.read();
    if room.member(id).is_none() || room.video.is_none() {
      return;
    }

    let now = Utc::now();
    let action = if room.playback.is_playing { PlaybackAction::Play } else { PlaybackAction::Pause };
    self.send_to(
      id,
      &ServerEvent::InitialVideoSync {
        action,
        current_time: room.playback.extrapolated_at(now),
        timestamp: now.timestamp_millis(),
      },
    );
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::super::testing::{connect, drain, event_of, join};
  use super::super::Config;
  use super::*;

  fn youtube() -> VideoSource {
    VideoSource::Youtube { video_id: "abc123def45".into(), url: None }
  }

  #[test]
  fn extrapolation_advances_exactly_with_wall_time_while_playing() {
    let t0 = Utc::now();
    let mut playback = PlaybackState::reset(t0);
    playback.apply(PlaybackAction::Play, Some(100.0), t0);

    let t1 = t0 + Duration::seconds(5);
    let t2 = t0 + Duration::seconds(9);
    let p1 = playback.extrapolated_at(t1);
    let p2 = playback.extrapolated_at(t2);
    assert_eq!(p1, 105.0);
    assert_eq!(p2, 109.0);
    assert!(p2 >= p1);
  }

  #[test]
  fn extrapolation_is_frozen_while_paused() {
    let t0 = Utc::now();
    let mut playback = PlaybackState::reset(t0);
    playback.apply(PlaybackAction::Play, Some(100.0), t0);
    playback.apply(PlaybackAction::Pause, Some(42.0), t0 + Duration::seconds(3));

    assert_eq!(playback.extrapolated_at(t0 + Duration::seconds(60)), 42.0);
  }

  #[test]
  fn seek_moves_position_without_changing_play_state() {
    let t0 = Utc::now();
    let mut playback = PlaybackState::reset(t0);
    playback.apply(PlaybackAction::Play, Some(10.0), t0);
    playback.apply(PlaybackAction::Seek, Some(300.0), t0);
    assert!(playback.is_playing);
    assert_eq!(playback.position, 300.0);
  }

  #[test]
  fn youtube_descriptor_rejects_ill_formed_ids() {
    let bad = VideoSource::Youtube { video_id: "abc 123".into(), url: None };
    assert!(matches!(bad.validate(), Err(RoomError::InvalidVideo { .. })));
    let empty = VideoSource::Youtube { video_id: String::new(), url: None };
    assert!(matches!(empty.validate(), Err(RoomError::InvalidVideo { .. })));
    assert!(youtube().validate().is_ok());
  }

  #[test]
  fn stream_descriptors_require_http_urls() {
    let bad = VideoSource::Hls { url: "ftp://example.com/x.m3u8".into() };
    assert!(matches!(bad.validate(), Err(RoomError::InvalidVideo { .. })));
    let good = VideoSource::Hls { url: "https://example.com/x.m3u8".into() };
    assert!(good.validate().is_ok());
  }

  #[test]
  fn set_video_is_host_gated_and_silent_for_non_hosts() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, mut alice_rx) = join(&registry, &code, "Alice");
    let (bob, mut bob_rx) = join(&registry, &code, "Bob");
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    let result = registry.set_video(&code, bob, youtube());
    assert!(matches!(result, Err(RoomError::NotHost { .. })));
    assert!(event_of(&drain(&mut alice_rx), "video-set").is_none());

    registry.set_video(&code, alice, youtube()).unwrap();
    let events = drain(&mut bob_rx);
    let video_set = event_of(&events, "video-set").unwrap();
    assert_eq!(video_set["video"]["videoId"], "abc123def45");
  }

  #[test]
  fn switching_videos_hard_resets_the_clock() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, _alice_rx) = join(&registry, &code, "Alice");

    registry.set_video(&code, alice, youtube()).unwrap();
    registry.video_action(&code, alice, PlaybackAction::Play, Some(120.0));
    registry
      .set_video(&code, alice, VideoSource::Hls { url: "https://example.com/x.m3u8".into() })
      .unwrap();

    let room = registry.room(&code).unwrap();
    let room = room.read();
    assert!(!room.playback.is_playing);
    assert_eq!(room.playback.position, 0.0);
  }

  #[test]
  fn video_action_relays_to_everyone_but_the_sender() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, mut alice_rx) = join(&registry, &code, "Alice");
    let (bob, mut bob_rx) = join(&registry, &code, "Bob");
    registry.set_video(&code, alice, youtube()).unwrap();
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    registry.video_action(&code, bob, PlaybackAction::Play, Some(7.5));

    let events = drain(&mut alice_rx);
    let sync = event_of(&events, "video-sync").unwrap();
    assert_eq!(sync["action"], "play");
    assert_eq!(sync["currentTime"], 7.5);
    assert!(sync.get("syncedBy").is_none());
    assert!(event_of(&drain(&mut bob_rx), "video-sync").is_none());
  }

  #[test]
  fn video_action_without_a_video_is_dropped() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, _alice_rx) = join(&registry, &code, "Alice");

    registry.video_action(&code, alice, PlaybackAction::Play, Some(10.0));

    let room = registry.room(&code).unwrap();
    let room = room.read();
    assert!(!room.playback.is_playing);
    assert_eq!(room.playback.position, 0.0);
  }

  #[test]
  fn sync_all_broadcasts_with_attribution_and_acks_the_host() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, mut alice_rx) = join(&registry, &code, "Alice");
    let (_bob, mut bob_rx) = join(&registry, &code, "Bob");
    registry.set_video(&code, alice, youtube()).unwrap();
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    registry.sync_all(&code, alice, PlaybackAction::Play, 42.0).unwrap();

    let events = drain(&mut bob_rx);
    let sync = event_of(&events, "video-sync").unwrap();
    assert_eq!(sync["action"], "play");
    assert_eq!(sync["currentTime"], 42.0);
    assert_eq!(sync["syncedBy"], "Alice");
    let alice_events = drain(&mut alice_rx);
    assert!(event_of(&alice_events, "sync-success").is_some());
    assert!(event_of(&alice_events, "video-sync").is_none());
  }

  #[test]
  fn sync_all_from_a_non_host_fails_without_broadcast() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, mut alice_rx) = join(&registry, &code, "Alice");
    let (bob, _bob_rx) = join(&registry, &code, "Bob");
    registry.set_video(&code, alice, youtube()).unwrap();
    drain(&mut alice_rx);

    let result = registry.sync_all(&code, bob, PlaybackAction::Pause, 10.0);
    assert!(matches!(result, Err(RoomError::NotHost { .. })));
    assert!(event_of(&drain(&mut alice_rx), "video-sync").is_none());
  }

  #[test]
  fn initial_sync_extrapolates_for_a_playing_video() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, _alice_rx) = join(&registry, &code, "Alice");
    registry.set_video(&code, alice, youtube()).unwrap();
    registry.video_action(&code, alice, PlaybackAction::Play, Some(100.0));

    let (bob, mut bob_rx) = join(&registry, &code, "Bob");
    drain(&mut bob_rx);
    registry.initial_sync(&code, bob);

    let events = drain(&mut bob_rx);
    let sync = event_of(&events, "initial-video-sync").unwrap();
    assert_eq!(sync["action"], "play");
    assert!(sync["currentTime"].as_f64().unwrap() >= 100.0);
  }

  #[test]
  fn initial_sync_for_a_departed_member_is_inert() {
    let registry = Registry::new(Config::default());
    let code = registry.create_room().unwrap();
    let (alice, _alice_rx) = join(&registry, &code, "Alice");
    registry.set_video(&code, alice, youtube()).unwrap();

    let (ghost, mut ghost_rx) = connect(&registry);
    registry.initial_sync(&code, ghost);
    assert!(drain(&mut ghost_rx).is_empty());
  }
}
