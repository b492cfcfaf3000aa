//! TTTP match server: listener, pairing, and per-peer sessions.

pub mod connection;
pub mod coordinator;
pub mod session;
pub mod tcp_server;

pub use connection::{CLOSE_GRACE, Outbox, PeerConnection, REPLY_BUFFER, deliver};
pub use coordinator::Coordinator;
pub use session::{GameMatch, JoinRejected, PeerSession, SessionError, SessionState};
pub use tcp_server::{
    ConnectionId, ConnectionLimitReached, ConnectionMap, GameServer, IdGenerator, ServerConfig,
};
