use std::time::Duration;

/// Runtime knobs for the room registry.
#[derive(Clone, Copy, Debug)]
pub struct Config {
  /// Maximum number of members per room.
  pub room_capacity: usize,
  /// Chat messages retained per room; oldest evicted first.
  pub chat_history_cap: usize,
  /// How many recent messages a joiner receives in its snapshot.
  pub join_snapshot_messages: usize,
  /// How long a room may sit empty before the sweep deletes it.
  pub empty_room_ttl: Duration,
  /// Grace delay before the catch-up sync is sent to a new member, so the
  /// client player has time to initialize.
  pub catchup_delay: Duration,
  /// Attempts to find a free room code before giving up.
  pub code_attempts: usize,
  /// Interval between WebSocket liveness pings.
  pub heartbeat_interval: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      room_capacity: 6,
      chat_history_cap: 100,
      join_snapshot_messages: 50,
      empty_room_ttl: Duration::from_secs(10 * 60),
      catchup_delay: Duration::from_secs(2),
      code_attempts: 10,
      heartbeat_interval: Duration::from_secs(10),
    }
  }
}
