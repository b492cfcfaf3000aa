//! Per-peer transport: a reader task that decodes client commands and a
//! writer task that drains the peer's queues onto the stream.
//!
//! A peer receives two kinds of messages. Notifications (greetings and news
//! from the opponent) go through the peer's [`Outbox`] and never block the
//! sender; a match produces only a handful of them. Replies to the peer's own
//! commands go through a bounded queue instead: once [`REPLY_BUFFER`] of them
//! are waiting, [`PeerConnection::reply`] blocks, the session stops asking
//! for commands, and the reader stops reading the socket. A peer that never
//! reads therefore stalls only itself.
//!
//! Receiving through a channel instead of reading the stream directly makes
//! [`PeerConnection::recv`] cancel-safe, so sessions can race it against
//! pairing and shutdown in `select!`.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tttp_protocol::{ClientCommand, FrameConfig, FrameError, ServerMessage, read_frame, write_frame};

use crate::session::SessionError;
use crate::tcp_server::ConnectionId;

/// Replies that may wait for the writer before the session stops reading.
pub const REPLY_BUFFER: usize = 8;

/// How long [`PeerConnection::close`] waits for queued messages to be written.
pub const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Sending side of a peer's notification queue.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// Queue a notification for the peer behind `outbox`.
///
/// A closed outbox means that peer's connection is already shutting down;
/// the message is dropped and noted at debug level.
pub fn deliver(outbox: &Outbox, message: ServerMessage) {
    if let Err(err) = outbox.send(message) {
        tracing::debug!("Outbox closed, dropping {}", err.0);
    }
}

/// One accepted connection, split into background reader and writer tasks.
pub struct PeerConnection {
    id: ConnectionId,
    outbox: Outbox,
    replies: mpsc::Sender<ServerMessage>,
    inbound: mpsc::Receiver<Result<ClientCommand, SessionError>>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
    close_tx: oneshot::Sender<()>,
}

impl PeerConnection {
    /// Spawn the reader and writer tasks for a connection.
    pub fn spawn<R, W>(id: ConnectionId, reader: R, writer: W, frame: FrameConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbox, notifications) = mpsc::unbounded_channel();
        let (replies, replies_rx) = mpsc::channel(REPLY_BUFFER);
        // One command of read-ahead: the session handles commands strictly
        // one at a time anyway.
        let (inbound_tx, inbound) = mpsc::channel(1);
        let (close_tx, close_rx) = oneshot::channel();

        let reader_task = tokio::spawn(read_loop(id, reader, inbound_tx, frame.clone()));
        let writer_task = tokio::spawn(write_loop(
            id,
            writer,
            notifications,
            replies_rx,
            close_rx,
            frame,
        ));

        Self {
            id,
            outbox,
            replies,
            inbound,
            reader_task,
            writer_task,
            close_tx,
        }
    }

    /// Identifier assigned at accept time.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// A new handle to this peer's notification queue.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Queue a notification for this peer without waiting.
    pub fn notify(&self, message: ServerMessage) {
        deliver(&self.outbox, message);
    }

    /// Queue a reply to one of this peer's commands, waiting while
    /// [`REPLY_BUFFER`] replies are still unwritten.
    pub async fn reply(&self, message: ServerMessage) {
        if let Err(err) = self.replies.send(message).await {
            tracing::debug!("Writer for {:?} is gone, dropping {}", self.id, err.0);
        }
    }

    /// Next command from the peer. Any error is final: the reader task stops
    /// after reporting it.
    pub async fn recv(&mut self) -> Result<ClientCommand, SessionError> {
        self.inbound
            .recv()
            .await
            .unwrap_or(Err(SessionError::Transport(FrameError::ConnectionClosed)))
    }

    /// Stop reading, flush everything already queued, and close the stream.
    ///
    /// Messages queued by the opponent after this point are dropped. A peer
    /// that still has not taken the backlog after [`CLOSE_GRACE`] is cut off.
    pub async fn close(self) {
        let Self {
            id,
            outbox,
            replies,
            reader_task,
            mut writer_task,
            close_tx,
            ..
        } = self;

        reader_task.abort();
        drop(outbox);
        drop(replies);
        let _ = close_tx.send(());
        match tokio::time::timeout(CLOSE_GRACE, &mut writer_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Writer for {id:?} ended abnormally: {e}"),
            Err(_) => {
                tracing::warn!("{id:?} is not reading, dropping its unsent messages");
                writer_task.abort();
            }
        }
    }
}

async fn read_loop<R>(
    id: ConnectionId,
    mut reader: R,
    inbound: mpsc::Sender<Result<ClientCommand, SessionError>>,
    frame: FrameConfig,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let result = match read_frame(&mut reader, &frame).await {
            Ok(line) => line.parse::<ClientCommand>().map_err(SessionError::from),
            Err(e) => Err(SessionError::from(e)),
        };
        if let Ok(command) = &result {
            tracing::trace!("Connection {id:?} sent {command}");
        }
        let fatal = result.is_err();
        if inbound.send(result).await.is_err() || fatal {
            break;
        }
    }
}

async fn write_loop<W>(
    id: ConnectionId,
    mut writer: W,
    mut notifications: mpsc::UnboundedReceiver<ServerMessage>,
    mut replies: mpsc::Receiver<ServerMessage>,
    mut close_rx: oneshot::Receiver<()>,
    frame: FrameConfig,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        // Notifications first: the greeting must precede any reply.
        let message = tokio::select! {
            biased;
            Some(message) = notifications.recv() => message,
            Some(message) = replies.recv() => message,
            _ = &mut close_rx => {
                notifications.close();
                replies.close();
                while let Some(message) = backlog(&mut notifications, &mut replies) {
                    if !write_message(id, &mut writer, &message, &frame).await {
                        break;
                    }
                }
                break;
            }
        };
        if !write_message(id, &mut writer, &message, &frame).await {
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        tracing::debug!("Shutdown of {id:?} failed: {e}");
    }
}

/// Next message still queued after both queues were closed.
fn backlog(
    notifications: &mut mpsc::UnboundedReceiver<ServerMessage>,
    replies: &mut mpsc::Receiver<ServerMessage>,
) -> Option<ServerMessage> {
    notifications
        .try_recv()
        .ok()
        .or_else(|| replies.try_recv().ok())
}

/// Write one message; `false` once the stream is unusable.
async fn write_message<W>(
    id: ConnectionId,
    writer: &mut W,
    message: &ServerMessage,
    frame: &FrameConfig,
) -> bool
where
    W: AsyncWrite + Unpin,
{
    match write_frame(writer, &message.to_string(), frame).await {
        Ok(()) => {
            tracing::trace!("Sent {message} to {id:?}");
            true
        }
        Err(e) => {
            tracing::info!("Write to {id:?} failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split};
    use tttp_protocol::{Mark, ProtocolError};

    fn connect() -> (PeerConnection, tokio::io::DuplexStream) {
        let (server_side, client_side) = duplex(4096);
        let (reader, writer) = split(server_side);
        let connection = PeerConnection::spawn(ConnectionId(1), reader, writer, FrameConfig::default());
        (connection, client_side)
    }

    #[tokio::test]
    async fn test_recv_decodes_commands() {
        let (mut connection, mut client) = connect();
        let config = FrameConfig::default();
        write_frame(&mut client, "MOVE 3", &config).await.unwrap();
        write_frame(&mut client, "QUIT", &config).await.unwrap();

        assert_eq!(connection.recv().await.unwrap(), ClientCommand::Move(3));
        assert_eq!(connection.recv().await.unwrap(), ClientCommand::Quit);
    }

    #[tokio::test]
    async fn test_malformed_command_is_a_protocol_error() {
        let (mut connection, mut client) = connect();
        write_frame(&mut client, "MOVE x", &FrameConfig::default())
            .await
            .unwrap();

        let err = connection.recv().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::InvalidInteger { .. })
        ));
        // The reader stopped; later reads report the connection as gone.
        assert!(matches!(
            connection.recv().await,
            Err(SessionError::Transport(FrameError::ConnectionClosed))
        ));
    }

    #[tokio::test]
    async fn test_peer_hangup_reports_connection_closed() {
        let (mut connection, client) = connect();
        drop(client);
        assert!(matches!(
            connection.recv().await,
            Err(SessionError::Transport(FrameError::ConnectionClosed))
        ));
    }

    #[tokio::test]
    async fn test_close_flushes_queued_messages_then_eof() {
        let (connection, mut client) = connect();
        let config = FrameConfig::default();
        connection.notify(ServerMessage::Welcome(Mark::X));
        connection.reply(ServerMessage::ValidMove).await;
        connection.notify(ServerMessage::OtherPlayerLeft);

        // A stray handle still held elsewhere must not keep the stream open.
        let stray = connection.outbox();
        connection.close().await;
        deliver(&stray, ServerMessage::Tie);

        let mut received = Vec::new();
        loop {
            match read_frame(&mut client, &config).await {
                Ok(line) => received.push(line),
                Err(FrameError::ConnectionClosed) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(received.len(), 3);
        assert_eq!(received[0], "WELCOME X");
        assert!(received.contains(&"VALID_MOVE".to_string()));
        assert!(received.contains(&"OTHER_PLAYER_LEFT".to_string()));
    }

    #[tokio::test]
    async fn test_notifications_keep_their_order() {
        let (connection, mut client) = connect();
        let config = FrameConfig::default();
        let outbox = connection.outbox();
        connection.notify(ServerMessage::Welcome(Mark::O));
        deliver(&outbox, ServerMessage::OpponentMovedEnd(2));
        deliver(&outbox, ServerMessage::Defeat);

        assert_eq!(read_frame(&mut client, &config).await.unwrap(), "WELCOME O");
        assert_eq!(
            read_frame(&mut client, &config).await.unwrap(),
            "OPPONENT_MOVED_END 2"
        );
        assert_eq!(read_frame(&mut client, &config).await.unwrap(), "DEFEAT");
    }

    #[tokio::test]
    async fn test_reply_blocks_while_the_peer_is_not_reading() {
        let (server_side, _client) = duplex(16);
        let (reader, writer) = split(server_side);
        let connection = PeerConnection::spawn(ConnectionId(1), reader, writer, FrameConfig::default());

        let queued = tokio::time::timeout(Duration::from_millis(200), async {
            for _ in 0..REPLY_BUFFER * 4 {
                connection.reply(ServerMessage::Message("Not your turn".to_string())).await;
            }
        })
        .await;
        assert!(queued.is_err(), "replies kept queueing for a stalled peer");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_gives_up_on_a_peer_that_never_reads() {
        let (server_side, _client) = duplex(16);
        let (reader, writer) = split(server_side);
        let connection = PeerConnection::spawn(ConnectionId(1), reader, writer, FrameConfig::default());
        for _ in 0..32 {
            connection.notify(ServerMessage::OtherPlayerLeft);
        }

        let started = tokio::time::Instant::now();
        connection.close().await;
        assert!(started.elapsed() >= CLOSE_GRACE);
    }
}
