mod rooms;
mod socket;

pub(crate) use self::rooms::{create_room, room_info};
pub(crate) use self::socket::socket;
