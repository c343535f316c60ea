use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Error;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::{IntervalStream, UnboundedReceiverStream};
use tracing::{debug, info, instrument, warn};

use crate::rooms::{MemberId, Registry, RoomCode, RoomError, ServerEvent};
use crate::server::event::ClientEvent;
use crate::server::state::ServerState;

pub(crate) async fn socket(
  ws: WebSocketUpgrade,
  State(state): State<ServerState>,
  ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
  ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

#[instrument(name = "socket", skip_all, fields(addr = addr.to_string()))]
async fn handle_socket(socket: WebSocket, state: ServerState, addr: SocketAddr) {
  let (ws_sender, ws_receiver) = socket.split();
  let (sender, receiver) = mpsc::unbounded_channel();
  let registry = state.registry.clone();
  let member_id = registry.add_connection(sender.clone());
  let alive = Arc::new(AtomicBool::new(true));
  info!("{member_id} connected");

  tokio::select! {
    _ = forward_outbound(receiver, ws_sender) => {},
    _ = heartbeats(member_id, sender, alive.clone(), registry.config().heartbeat_interval) => {},
    _ = read_inbound(member_id, ws_receiver, alive, registry.clone()) => {},
  }

  if let Some(emptied) = registry.remove_connection(member_id) {
    schedule_sweep(registry, emptied);
  }
}

async fn forward_outbound(
  receiver: UnboundedReceiver<Result<Message, Error>>,
  ws_sender: SplitSink<WebSocket, Message>,
) -> Result<()> {
  UnboundedReceiverStream::new(receiver).forward(ws_sender).await.map_err(Into::into)
}

#[instrument(name = "heartbeat", skip_all, fields(member = member_id.to_string()))]
async fn heartbeats(
  member_id: MemberId,
  sender: UnboundedSender<Result<Message, Error>>,
  alive: Arc<AtomicBool>,
  interval: Duration,
) -> Result<()> {
  let mut stream = IntervalStream::new(tokio::time::interval(interval));
  while stream.next().await.is_some() {
    if alive.load(Ordering::Relaxed) {
      debug!("send ping");
      alive.store(false, Ordering::Relaxed);
      sender.send(Ok(Message::Ping("".into())))?;
    } else {
      info!("connection timeout");
      break;
    }
  }
  Ok(())
}

#[instrument(name = "message", skip_all, fields(member = member_id.to_string()))]
async fn read_inbound(
  member_id: MemberId,
  mut ws_receiver: SplitStream<WebSocket>,
  alive: Arc<AtomicBool>,
  registry: Registry,
) {
  while let Some(Ok(message)) = ws_receiver.next().await {
    if let Message::Close(_) = message {
      info!("disconnected");
      break;
    }

    if let Err(e) = handle_message(message, member_id, &alive, &registry) {
      warn!("{e}");
    }
  }
}

fn handle_message(
  message: Message,
  member_id: MemberId,
  alive: &AtomicBool,
  registry: &Registry,
) -> Result<()> {
  match message {
    Message::Text(payload) => handle_event(payload, member_id, registry),
    Message::Binary(_) => bail!("unsupported binary message"),
    Message::Pong(_) => {
      debug!("recv pong");
      alive.store(true, Ordering::Relaxed);
      Ok(())
    }
    _ => Ok(()),
  }
}

fn handle_event(payload: String, member_id: MemberId, registry: &Registry) -> Result<()> {
  let event: ClientEvent = match payload.parse() {
    Ok(event) => event,
    Err(e) => {
      debug!("unparseable event: {e}");
      registry.send_to(
        member_id,
        &ServerEvent::Error {
          message: "Invalid payload".into(),
          details: Some(serde_json::json!({ "reason": e.to_string() })),
        },
      );
      return Ok(());
    }
  };
  info!("recv event event={}", event.name());

  match event {
    ClientEvent::JoinRoom { room_code, username } => {
      handle_join(member_id, room_code, username, registry);
    }
    scoped => {
      // Everything else is implicitly scoped to the sender's joined room.
      let Some(code) = registry.session_room(member_id) else {
        debug!("event from connection outside any room");
        return Ok(());
      };
      dispatch(scoped, code, member_id, registry);
    }
  }
  Ok(())
}

fn handle_join(member_id: MemberId, room_code: String, username: String, registry: &Registry) {
  let code = RoomCode::from(room_code);
  match registry.join(member_id, &code, &username) {
    Ok(effects) => {
      if effects.needs_catchup {
        schedule_catchup(registry.clone(), code, member_id);
      }
    }
    Err(e) => send_error(registry, member_id, e),
  }
}

fn dispatch(event: ClientEvent, code: RoomCode, member_id: MemberId, registry: &Registry) {
  match event {
    ClientEvent::JoinRoom { .. } => unreachable!("handled before dispatch"),
    ClientEvent::SetVideo { video } => {
      if let Err(e) = registry.set_video(&code, member_id, video) {
        send_error(registry, member_id, e);
      }
    }
    ClientEvent::VideoAction { action, current_time } => {
      registry.video_action(&code, member_id, action, current_time);
    }
    ClientEvent::VideoSyncRequest { action, current_time } => {
      if let Err(e) = registry.sync_all(&code, member_id, action, current_time) {
        registry.send_to(member_id, &ServerEvent::SyncError { message: e.to_string() });
      }
    }
    ClientEvent::SendMessage { message } => {
      if let Err(e) = registry.post_message(&code, member_id, &message) {
        send_error(registry, member_id, e);
      }
    }
    ClientEvent::SendReaction { emoji } => registry.send_reaction(&code, member_id, emoji),
    ClientEvent::TypingStart => registry.set_typing(&code, member_id, true),
    ClientEvent::TypingStop => registry.set_typing(&code, member_id, false),
    ClientEvent::TransferHost { new_host_username } => {
      if let Err(e) = registry.transfer_host(&code, member_id, &new_host_username) {
        send_error(registry, member_id, e);
      }
    }
    ClientEvent::StartVoiceChat { .. } => registry.voice_start(&code, member_id),
    ClientEvent::JoinVoiceChat { .. } => registry.voice_join(&code, member_id),
    ClientEvent::LeaveVoiceChat { .. } => registry.voice_leave(&code, member_id),
    ClientEvent::VoiceChatMuteStatus { username, is_muted } => {
      registry.mute_status(&code, member_id, username, is_muted);
    }
    ClientEvent::VoiceOffer { offer, target_socket_id } => {
      let event = ServerEvent::VoiceOffer { offer, from_socket_id: member_id };
      registry.relay_to(&code, member_id, target_socket_id, event);
    }
    ClientEvent::VoiceAnswer { answer, target_socket_id } => {
      let event = ServerEvent::VoiceAnswer { answer, from_socket_id: member_id };
      registry.relay_to(&code, member_id, target_socket_id, event);
    }
    ClientEvent::VoiceIceCandidate { candidate, target_socket_id } => {
      let event = ServerEvent::VoiceIceCandidate { candidate, from_socket_id: member_id };
      registry.relay_to(&code, member_id, target_socket_id, event);
    }
    ClientEvent::ScreenShareStarted { .. } => registry.screen_share(&code, member_id, true),
    ClientEvent::ScreenShareStopped { .. } => registry.screen_share(&code, member_id, false),
    ClientEvent::RequestScreenShareWebrtc { to } => {
      registry.relay_to(&code, member_id, to, ServerEvent::RequestScreenShareWebrtc {
        from: member_id,
      });
    }
    ClientEvent::WebrtcOffer { to, offer } => {
      registry.relay_to(&code, member_id, to, ServerEvent::WebrtcOffer { from: member_id, offer });
    }
    ClientEvent::WebrtcAnswer { to, answer } => {
      registry
        .relay_to(&code, member_id, to, ServerEvent::WebrtcAnswer { from: member_id, answer });
    }
    ClientEvent::WebrtcIceCandidate { to, candidate } => {
      registry.relay_to(&code, member_id, to, ServerEvent::WebrtcIceCandidate {
        from: member_id,
        candidate,
      });
    }
  }
}

fn send_error(registry: &Registry, member_id: MemberId, error: RoomError) {
  registry.send_to(
    member_id,
    &ServerEvent::Error { message: error.to_string(), details: error.details() },
  );
}

// Both timers re-read room state at fire time instead of closing over a
// snapshot, so a timer that outlived its trigger is inert.

fn schedule_sweep(registry: Registry, code: RoomCode) {
  tokio::spawn(async move {
    tokio::time::sleep(registry.config().empty_room_ttl).await;
    registry.sweep(&code);
  });
}

fn schedule_catchup(registry: Registry, code: RoomCode, member_id: MemberId) {
  tokio::spawn(async move {
    tokio::time::sleep(registry.config().catchup_delay).await;
    registry.initial_sync(&code, member_id);
  });
}
