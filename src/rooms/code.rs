use std::fmt;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

const CODE_LEN: usize = 6;
const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Short external key for a room. Six uppercase base-36 characters.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
  /// Candidate code from a timestamp+random composite. Uniqueness is the
  /// registry's responsibility; this only keeps collision odds low.
  pub(crate) fn generate() -> Self {
    let stamp = to_base36(Utc::now().timestamp_millis() as u64);
    let mut code = String::with_capacity(CODE_LEN);
    code.push_str(&stamp[stamp.len().saturating_sub(2)..]);

    let mut rng = rand::thread_rng();
    while code.len() < CODE_LEN {
      code.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
    }
    Self(code)
  }

  pub(crate) fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<String> for RoomCode {
  fn from(code: String) -> Self {
    Self(code.trim().to_uppercase())
  }
}

impl fmt::Display for RoomCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

fn to_base36(mut n: u64) -> String {
  let mut digits = Vec::new();
  loop {
    digits.push(ALPHABET[(n % 36) as usize] as char);
    n /= 36;
    if n == 0 {
      break;
    }
  }
  digits.iter().rev().collect()
}
