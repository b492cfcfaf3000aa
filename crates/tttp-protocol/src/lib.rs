//! TTTP wire protocol: length-prefixed text framing and the fixed message
//! vocabulary exchanged between tic-tac-toe clients and the match server.

pub mod framing;
pub mod messages;
pub mod types;

pub use framing::{FrameConfig, FrameError, read_frame, write_frame};
pub use messages::{ClientCommand, ProtocolError, ServerMessage, WAITING_TEXT, YOUR_MOVE_TEXT};
pub use types::{InvalidMark, Mark};
