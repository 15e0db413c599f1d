use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::codec::{self, FrameBuffer};
use super::mailbox::Mailbox;
use super::protocol::{
    ClientMessage, EntityState, HANDSHAKE_READ_SIZE, HANDSHAKE_STATUS_SUCCESS, READ_CHUNK_SIZE,
    RETRY_BACKOFF, ServerMessage, StatePatch,
};
use super::publisher::StatePublisher;

/// Observable status of a live session. A `Session` only exists after a
/// successful handshake, so earlier phases are unrepresentable; `Closed`
/// means the workers have stopped (fatal I/O error or peer close).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to open connection: {0}")]
    Connection(#[source] io::Error),
    #[error("handshake I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("handshake rejected by server: {reply:?}")]
    HandshakeRejected { reply: String },
}

/// State shared with the sender and receiver threads.
#[derive(Debug)]
struct Shared {
    mailbox: Mailbox<StatePatch>,
    connected: AtomicBool,
}

impl Shared {
    fn mark_lost(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// A live connection to the server. Owns the socket, the outbound queue
/// feeding the sender thread, and the mailbox filled by the receiver thread.
#[derive(Debug)]
pub struct Session {
    stream: TcpStream,
    shared: Arc<Shared>,
    outbound: Sender<ClientMessage>,
    publisher: StatePublisher,
    sender_handle: JoinHandle<()>,
    receiver_handle: JoinHandle<()>,
}

impl Session {
    /// Synchronous single-shot handshake: connect, send `CONNECT`, require a
    /// `SUCCESS` response. No retries and no timeout knobs; the caller
    /// decides what a startup failure means. Only after the acknowledged
    /// handshake does the socket go non-blocking and the workers start.
    pub fn connect(addr: SocketAddr) -> Result<Self, ConnectError> {
        let mut stream = TcpStream::connect(addr).map_err(ConnectError::Connection)?;
        log::debug!("Handshaking with {}", addr);

        let hello = codec::encode(&ClientMessage::Connect)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        stream.write_all(&hello)?;

        let mut buf = [0u8; HANDSHAKE_READ_SIZE];
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(ConnectError::HandshakeRejected {
                reply: "(peer closed)".to_string(),
            });
        }

        let mut frames = FrameBuffer::new();
        frames.extend(&buf[..n]);
        let line = match frames.next_line() {
            Some(line) => line,
            None => String::from_utf8_lossy(&buf[..n]).into_owned(),
        };
        match codec::decode_server(&line) {
            Ok(ServerMessage::Response { ref status })
                if status.as_str() == HANDSHAKE_STATUS_SUCCESS => {}
            _ => {
                // Dropping the stream closes the socket.
                return Err(ConnectError::HandshakeRejected { reply: line });
            }
        }

        stream.set_nonblocking(true)?;

        let shared = Arc::new(Shared {
            mailbox: Mailbox::new(),
            connected: AtomicBool::new(true),
        });
        let (outbound, queue) = mpsc::channel();

        let sender_handle = {
            let stream = stream.try_clone()?;
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("rebound-sender".to_string())
                .spawn(move || sender_loop(stream, queue, shared))?
        };
        let receiver_handle = {
            let stream = stream.try_clone()?;
            let shared = Arc::clone(&shared);
            // The handshake read may have pulled data in behind the ack;
            // the receiver picks up from that remainder.
            thread::Builder::new()
                .name("rebound-receiver".to_string())
                .spawn(move || receiver_loop(stream, shared, frames))?
        };

        log::info!("Connected to {}", addr);

        Ok(Self {
            stream,
            shared,
            outbound,
            publisher: StatePublisher::new(Instant::now()),
            sender_handle,
            receiver_handle,
        })
    }

    pub fn state(&self) -> ConnectionState {
        if self.shared.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Closed
        }
    }

    /// False once either worker has hit a fatal I/O error or the peer closed
    /// the connection. The tick-driving caller should stop and disconnect.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Once-per-tick synchronization point, called after the caller's motion
    /// integration: applies a pending authoritative correction to `state`,
    /// then publishes the (possibly corrected) state. Never blocks.
    pub fn tick(&mut self, state: &mut EntityState, now: Instant) {
        if let Some(patch) = self.shared.mailbox.take() {
            log::debug!("Applying authoritative state: {:?}", patch);
            state.apply(&patch);
        }

        if !self.is_connected() {
            return;
        }
        for message in self.publisher.publish(state, now) {
            if self.outbound.send(message).is_err() {
                // Sender thread is gone; its queue receiver dropped with it.
                self.shared.mark_lost();
                break;
            }
        }
    }

    /// Tears the session down: closes the outbound queue, shuts the socket
    /// down to unblock the receiver, and joins both workers.
    pub fn disconnect(self) {
        self.shared.mark_lost();
        drop(self.outbound);
        let _ = self.stream.shutdown(Shutdown::Both);
        let _ = self.sender_handle.join();
        let _ = self.receiver_handle.join();
        log::info!("Disconnected from server");
    }
}

/// Drains the outbound queue and writes to the socket. Blocks only while the
/// queue is empty; exits when the queue closes or the socket fails.
fn sender_loop(mut stream: TcpStream, queue: Receiver<ClientMessage>, shared: Arc<Shared>) {
    while let Ok(message) = queue.recv() {
        let bytes = match codec::encode(&message) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("Dropping unencodable message: {}", err);
                continue;
            }
        };
        if let Err(err) = write_persistent(&mut stream, &bytes) {
            log::warn!("Sender loop terminating: {}", err);
            shared.mark_lost();
            return;
        }
    }
    log::debug!("Outbound queue closed, sender loop exiting");
}

/// Writes the whole message, retrying the same remaining bytes across
/// would-block conditions. A full send buffer must never drop a message.
fn write_persistent(stream: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < bytes.len() {
        match stream.write(&bytes[written..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => written += n,
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(RETRY_BACKOFF);
            }
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Reads the socket continuously, reassembles line frames, and publishes
/// authoritative corrections into the mailbox. Malformed lines are skipped.
/// `frames` carries any bytes the handshake read pulled in past the ack.
fn receiver_loop(mut stream: TcpStream, shared: Arc<Shared>, mut frames: FrameBuffer) {
    while let Some(line) = frames.next_line() {
        dispatch_line(&line, &shared);
    }
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => {
                log::info!("Server closed the connection");
                break;
            }
            Ok(n) => {
                frames.extend(&chunk[..n]);
                while let Some(line) = frames.next_line() {
                    dispatch_line(&line, &shared);
                }
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                if !shared.connected.load(Ordering::SeqCst) {
                    break;
                }
                thread::sleep(RETRY_BACKOFF);
            }
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                log::warn!("Receiver loop terminating: {}", err);
                break;
            }
        }
    }
    shared.mark_lost();
}

fn dispatch_line(line: &str, shared: &Shared) {
    if line.is_empty() {
        return;
    }
    match codec::decode_server(line) {
        Ok(ServerMessage::Authoritative { state }) => {
            log::debug!("Received authoritative state: {:?}", state);
            shared.mailbox.put(state);
        }
        Ok(ServerMessage::Response { status }) => {
            log::debug!("Ignoring post-handshake response: {}", status);
        }
        Err(err) => {
            log::warn!("Bad message from server: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::io::BufReader;
    use std::net::TcpListener;
    use std::time::Duration;

    fn spawn_server<F>(serve: F) -> SocketAddr
    where
        F: FnOnce(TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            serve(stream);
        });
        addr
    }

    fn read_line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line
    }

    #[test]
    fn test_handshake_success() {
        let addr = spawn_server(|stream| {
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let hello = read_line(&mut reader);
            assert_eq!(hello.trim_end(), r#"{"type":"CONNECT"}"#);
            (&stream)
                .write_all(b"{\"type\":\"response\",\"status\":\"SUCCESS\"}\n")
                .unwrap();
            // Hold the connection open until the client is done.
            thread::sleep(Duration::from_millis(200));
        });

        let session = Session::connect(addr).unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
        assert!(session.is_connected());
        session.disconnect();
    }

    #[test]
    fn test_handshake_rejected_on_fail_status() {
        let addr = spawn_server(|stream| {
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            read_line(&mut reader);
            (&stream)
                .write_all(b"{\"type\":\"response\",\"status\":\"FAIL\"}\n")
                .unwrap();
        });

        let err = Session::connect(addr).unwrap_err();
        let ConnectError::HandshakeRejected { reply } = err else {
            panic!("expected rejection, got {err:?}");
        };
        assert!(reply.contains("FAIL"));
    }

    #[test]
    fn test_handshake_rejected_on_garbage() {
        let addr = spawn_server(|stream| {
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            read_line(&mut reader);
            (&stream).write_all(b"garbage\n").unwrap();
        });

        let err = Session::connect(addr).unwrap_err();
        assert!(matches!(err, ConnectError::HandshakeRejected { .. }));
    }

    #[test]
    fn test_connect_fails_without_server() {
        // Bind and drop to get an address nothing is listening on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let err = Session::connect(addr).unwrap_err();
        assert!(matches!(err, ConnectError::Connection(_)));
    }

    #[test]
    fn test_tick_publishes_delta_and_applies_correction() {
        let (delta_tx, delta_rx) = mpsc::channel();
        let addr = spawn_server(move |stream| {
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            read_line(&mut reader);
            (&stream)
                .write_all(b"{\"type\":\"response\",\"status\":\"SUCCESS\"}\n")
                .unwrap();

            // First tick's delta.
            delta_tx.send(read_line(&mut reader)).unwrap();

            // Two corrections before the client's next tick: only the
            // second may be observed (most-recent-wins mailbox).
            (&stream)
                .write_all(b"{\"type\":\"authoritative\",\"state\":{\"x\":500.0}}\n")
                .unwrap();
            (&stream)
                .write_all(b"{\"type\":\"authoritative\",\"state\":{\"x\":123.0,\"color\":[0,0,255]}}\n")
                .unwrap();
            thread::sleep(Duration::from_millis(500));
        });

        let mut session = Session::connect(addr).unwrap();
        let mut state = EntityState {
            x: 10.0,
            y: 20.0,
            velocity: 3.0,
            direction: 45.0,
            color: [255, 0, 0],
        };

        session.tick(&mut state, Instant::now());
        let delta = delta_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let message: ClientMessage = serde_json::from_str(delta.trim_end()).unwrap();
        let ClientMessage::Delta { state: patch } = message else {
            panic!("expected delta, got {message:?}");
        };
        assert_eq!(patch, StatePatch::full(&state.rounded()));

        // Give the receiver thread time to drain both corrections.
        thread::sleep(Duration::from_millis(200));
        session.tick(&mut state, Instant::now());
        assert_eq!(state.x, 123.0);
        assert_eq!(state.color, [0, 0, 255]);
        // Fields absent from the correction keep their local values.
        assert_eq!(state.y, 20.0);
        assert_eq!(state.velocity, 3.0);

        session.disconnect();
    }

    #[test]
    fn test_write_persistent_survives_full_send_buffer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut writer = TcpStream::connect(addr).unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        writer.set_nonblocking(true).unwrap();

        // Large enough to overwhelm the socket buffers and force WouldBlock
        // mid-message; the pattern makes any dropped or reordered byte show
        // up as a content mismatch.
        let payload: Vec<u8> = (0..4 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
        let total = payload.len();

        let reader = thread::spawn(move || {
            // Let the writer fill the send buffer before draining.
            thread::sleep(Duration::from_millis(50));
            let mut received = Vec::with_capacity(total);
            let mut chunk = [0u8; 65536];
            while received.len() < total {
                let n = peer.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
            }
            received
        });

        write_persistent(&mut writer, &payload).unwrap();
        let received = reader.join().unwrap();
        assert_eq!(received.len(), total);
        assert_eq!(received, payload);
    }

    #[test]
    fn test_correction_pipelined_with_handshake_ack() {
        let addr = spawn_server(|stream| {
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            read_line(&mut reader);
            // Ack and first correction in one segment: the bytes behind the
            // ack land in the handshake read and must not be lost.
            (&stream)
                .write_all(
                    b"{\"type\":\"response\",\"status\":\"SUCCESS\"}\n{\"type\":\"authoritative\",\"state\":{\"x\":42.0}}\n",
                )
                .unwrap();
            thread::sleep(Duration::from_millis(500));
        });

        let mut session = Session::connect(addr).unwrap();
        let mut state = EntityState {
            x: 10.0,
            y: 20.0,
            velocity: 3.0,
            direction: 45.0,
            color: [255, 0, 0],
        };

        thread::sleep(Duration::from_millis(100));
        session.tick(&mut state, Instant::now());
        assert_eq!(state.x, 42.0);

        session.disconnect();
    }

    #[test]
    fn test_peer_close_marks_connection_lost() {
        let addr = spawn_server(|stream| {
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            read_line(&mut reader);
            (&stream)
                .write_all(b"{\"type\":\"response\",\"status\":\"SUCCESS\"}\n")
                .unwrap();
            // Dropping the stream closes the connection.
        });

        let session = Session::connect(addr).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while session.is_connected() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!session.is_connected());
        assert_eq!(session.state(), ConnectionState::Closed);
        session.disconnect();
    }
}
