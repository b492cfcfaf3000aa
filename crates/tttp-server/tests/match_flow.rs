//! End-to-end matches over real TCP connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tttp_protocol::{FrameConfig, FrameError, read_frame, write_frame};
use tttp_server::{GameServer, ServerConfig};

const WAITING: &str = "WAITING Waiting for opponent to connect";

async fn start_server() -> (SocketAddr, Arc<GameServer>) {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        max_connections: 16,
        ..ServerConfig::default()
    };
    let server = Arc::new(GameServer::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let srv = Arc::clone(&server);
    tokio::spawn(async move {
        srv.run_with_listener(listener).await.unwrap();
    });
    (addr, server)
}

struct Peer {
    stream: TcpStream,
    config: FrameConfig,
}

impl Peer {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            config: FrameConfig::default(),
        }
    }

    async fn recv(&mut self) -> Result<String, FrameError> {
        tokio::time::timeout(
            Duration::from_secs(5),
            read_frame(&mut self.stream, &self.config),
        )
        .await
        .expect("timed out waiting for the server")
    }

    async fn expect(&mut self, line: &str) {
        assert_eq!(self.recv().await.unwrap(), line);
    }

    async fn expect_closed(&mut self) {
        assert!(matches!(self.recv().await, Err(FrameError::ConnectionClosed)));
    }

    async fn send(&mut self, line: &str) {
        write_frame(&mut self.stream, line, &self.config)
            .await
            .unwrap();
    }
}

/// Connect two peers and consume the pairing handshake.
async fn paired(addr: SocketAddr) -> (Peer, Peer) {
    let mut x = Peer::connect(addr).await;
    x.expect("WELCOME X").await;
    x.expect(WAITING).await;

    let mut o = Peer::connect(addr).await;
    o.expect("WELCOME O").await;
    x.expect("MESSAGE Your move").await;
    (x, o)
}

/// Play `cell` for `mover` and check the ongoing-game notifications.
async fn play(mover: &mut Peer, other: &mut Peer, cell: usize) {
    mover.send(&format!("MOVE {cell}")).await;
    mover.expect("VALID_MOVE").await;
    other.expect(&format!("OPPONENT_MOVED {cell}")).await;
}

#[tokio::test]
async fn test_pairing_handshake_and_first_move() {
    let (addr, _server) = start_server().await;
    let (mut x, mut o) = paired(addr).await;

    x.send("MOVE 4").await;
    x.expect("VALID_MOVE").await;
    o.expect("OPPONENT_MOVED 4").await;
}

#[tokio::test]
async fn test_win_sends_end_move_and_defeat() {
    let (addr, _server) = start_server().await;
    let (mut x, mut o) = paired(addr).await;

    play(&mut x, &mut o, 0).await;
    play(&mut o, &mut x, 3).await;
    play(&mut x, &mut o, 1).await;
    play(&mut o, &mut x, 4).await;

    x.send("MOVE 2").await;
    x.expect("VALID_MOVE").await;
    x.expect("VICTORY").await;
    o.expect("OPPONENT_MOVED_END 2").await;
    o.expect("DEFEAT").await;

    x.send("MOVE 8").await;
    x.expect("MESSAGE Game is over").await;
}

#[tokio::test]
async fn test_draw_ties_both_peers() {
    let (addr, _server) = start_server().await;
    let (mut x, mut o) = paired(addr).await;

    // X O X / X O O / O X X
    play(&mut x, &mut o, 0).await;
    play(&mut o, &mut x, 1).await;
    play(&mut x, &mut o, 2).await;
    play(&mut o, &mut x, 4).await;
    play(&mut x, &mut o, 3).await;
    play(&mut o, &mut x, 5).await;
    play(&mut x, &mut o, 7).await;
    play(&mut o, &mut x, 6).await;

    x.send("MOVE 8").await;
    x.expect("VALID_MOVE").await;
    x.expect("TIE").await;
    o.expect("OPPONENT_MOVED_END 8").await;
    o.expect("TIE").await;
}

#[tokio::test]
async fn test_rule_violations_are_messages() {
    let (addr, _server) = start_server().await;
    let (mut x, mut o) = paired(addr).await;

    o.send("MOVE 0").await;
    o.expect("MESSAGE Not your turn").await;

    x.send("MOVE 9").await;
    x.expect("MESSAGE Cell out of range").await;
    x.send("MOVE -3").await;
    x.expect("MESSAGE Cell out of range").await;

    play(&mut x, &mut o, 4).await;
    o.send("MOVE 4").await;
    o.expect("MESSAGE Cell already occupied").await;

    // The rejected moves changed nothing: O still holds the turn.
    play(&mut o, &mut x, 0).await;
}

#[tokio::test]
async fn test_opponent_drop_sends_one_other_player_left() {
    let (addr, _server) = start_server().await;
    let (mut x, mut o) = paired(addr).await;
    play(&mut x, &mut o, 4).await;

    drop(o);
    x.expect("OTHER_PLAYER_LEFT").await;

    x.send("MOVE 0").await;
    x.expect("MESSAGE Game is over").await;
    x.send("QUIT").await;
    x.expect_closed().await;
}

#[tokio::test]
async fn test_malformed_line_closes_only_the_offender() {
    let (addr, _server) = start_server().await;
    let (mut x, mut o) = paired(addr).await;

    o.send("MOVE four").await;
    o.expect_closed().await;

    x.expect("OTHER_PLAYER_LEFT").await;
    x.send("QUIT").await;
    x.expect_closed().await;
}

#[tokio::test]
async fn test_waiting_peer_can_quit_and_is_not_paired() {
    let (addr, _server) = start_server().await;

    let mut a = Peer::connect(addr).await;
    a.expect("WELCOME X").await;
    a.expect(WAITING).await;
    a.send("MOVE 4").await;
    a.expect("MESSAGE You don't have an opponent yet").await;
    a.send("QUIT").await;
    a.expect_closed().await;

    // A's match is gone; B opens a fresh one.
    let mut b = Peer::connect(addr).await;
    b.expect("WELCOME X").await;
    b.expect(WAITING).await;

    let mut c = Peer::connect(addr).await;
    c.expect("WELCOME O").await;
    b.expect("MESSAGE Your move").await;
}

#[tokio::test]
async fn test_concurrent_matches_are_independent() {
    let (addr, server) = start_server().await;
    let (mut x1, mut o1) = paired(addr).await;
    let (mut x2, mut o2) = paired(addr).await;

    play(&mut x1, &mut o1, 4).await;
    play(&mut x2, &mut o2, 4).await;
    play(&mut o1, &mut x1, 0).await;

    drop(o2);
    x2.expect("OTHER_PLAYER_LEFT").await;

    play(&mut x1, &mut o1, 8).await;

    // The dropped peer is unregistered once its session has closed.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while server.connections.len().await != 3 {
        assert!(tokio::time::Instant::now() < deadline, "dropped peer still registered");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
