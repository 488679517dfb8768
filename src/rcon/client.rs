//! Implementation of the RCON client state machine.

use super::{
    chat::ChatBuffer,
    packet::{Packet, PacketType},
    reader::FrameReader,
    reassembly::{CompletionRule, Progress, ReassemblyState},
    ConnectionState, MAX_LEN_SERVERBOUND,
};
use crate::{
    config::RconConfig,
    errors::{FrameError, RconError},
    socket::Transport,
};
use bytes::Bytes;
use rand::random;
use std::time::Duration;
use tokio::{
    net::TcpStream,
    time::{timeout, Instant},
};

/// A command sent to the server whose response has not been fully read yet.
#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    id: i32,
    issued_at: Instant,
}

/// A packet sorted by what it means to the client.
#[derive(Debug)]
enum Routed {
    Chat(Bytes),
    Response(Packet),
    AuthResponse(Packet),
}

/// Struct that stores the connection and other state of the RCON protocol with the server.
///
/// The client reads from the socket only while one of its methods is running.
/// Chat messages the server pushes in the meantime are picked up by the next
/// [`authenticate`](Self::authenticate), [`execute`](Self::execute) or
/// [`listen`](Self::listen) call and kept until [`flush_chat`](Self::flush_chat).
///
/// Any network error, timeout or protocol violation faults the connection:
/// it is shut down, and every further call fails until a new client is
/// connected.
///
/// # Examples
///
/// ```no_run
/// use squad_rcon::rcon::RconClient;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), squad_rcon::errors::RconError> {
///     let mut client = RconClient::connect("localhost", 21114, Duration::from_secs(5)).await?;
///     client.authenticate("password").await?;
///
///     let output = client.execute("ShowNextMap").await?;
///     println!("{output}");
///
///     for message in client.flush_chat() {
///         println!("{message}");
///     }
///
///     client.close().await
/// }
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct RconClient<T = TcpStream> {
    transport: T,
    reader: FrameReader,
    state: ConnectionState,
    timeout: Duration,
    chat_type: Option<i32>,
    rule: Box<dyn CompletionRule>,
    chat: ChatBuffer,
    pending: Option<PendingRequest>,
    next_id: i32,
    closed: bool,
}

impl RconClient<TcpStream> {
    /// Connect to the given host and port, speaking the Squad dialect.
    /// Note: to authenticate use the `authenticate` method, this method does not take a password.
    ///
    /// # Arguments
    /// * `host` - A string slice that holds the hostname of the server to connect to.
    /// * `port` - The port to connect to.
    /// * `timeout` - How long to wait for the connection, and later for each response.
    ///
    /// # Errors
    /// Returns `Err` if there was a network error or the connection timed out.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, RconError> {
        let config = RconConfig {
            host: host.to_string(),
            port,
            timeout_ms: timeout.as_millis() as u64,
            ..RconConfig::default()
        };

        Self::connect_with_config(&config).await
    }

    /// Connect using every setting of `config`.
    ///
    /// # Errors
    /// Returns `Err` if there was a network error or the connection timed out.
    pub async fn connect_with_config(config: &RconConfig) -> Result<Self, RconError> {
        let addr = format!("{}:{}", config.host, config.port);
        tracing::debug!(%addr, dialect = ?config.dialect, "connecting");

        let socket = match timeout(config.timeout(), TcpStream::connect(&addr)).await {
            Ok(socket) => socket?,
            Err(_) => return Err(RconError::Timeout(config.timeout())),
        };

        Ok(Self::from_transport(socket, config))
    }
}

impl<T: Transport> RconClient<T> {
    /// Wrap an already open transport. The host and port of `config` are ignored.
    pub fn from_transport(transport: T, config: &RconConfig) -> Self {
        Self {
            transport,
            reader: FrameReader::new(config.max_packet_size),
            state: ConnectionState::Connected,
            timeout: config.timeout(),
            chat_type: config.dialect.chat_type(),
            rule: config.dialect.completion_rule(),
            chat: ChatBuffer::default(),
            pending: None,
            next_id: (random::<i32>() & 0x0fff_ffff) + 1,
            closed: false,
        }
    }

    /// Replace the rule deciding when a response is complete.
    #[must_use]
    pub fn with_completion_rule(mut self, rule: Box<dyn CompletionRule>) -> Self {
        self.rule = rule;
        self
    }

    /// Change the time to wait for each response.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Current state of the connection.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Authenticate with the server, with the given password.
    ///
    /// # Arguments
    /// * `password` - A string slice that holds the RCON password.
    ///
    /// # Errors
    /// Returns [`RconError::AuthFailed`] if the server rejected the password,
    /// [`RconError::InvalidState`] unless the client is freshly connected, and
    /// the appropriate error for network, timeout and protocol failures. All
    /// but `InvalidState` and `PayloadTooLong` fault the connection.
    pub async fn authenticate(&mut self, password: &str) -> Result<(), RconError> {
        if self.state != ConnectionState::Connected {
            return Err(RconError::InvalidState(self.state));
        }

        let packet = Packet::new(self.next_request_id(), PacketType::Auth, password.to_string());
        if packet.size() > MAX_LEN_SERVERBOUND {
            return Err(RconError::PayloadTooLong);
        }

        self.state = ConnectionState::Authenticating;
        tracing::debug!(id = packet.id, "authenticating");

        match self.authenticate_raw(packet).await {
            Ok(()) => {
                self.state = ConnectionState::Ready;
                tracing::debug!("authenticated");
                Ok(())
            }
            Err(err) => Err(self.fault(err).await),
        }
    }

    /// Run the given command on the server and return the result.
    ///
    /// Responses split over several packets are joined according to the
    /// dialect's completion rule. Chat recieved meanwhile is buffered.
    ///
    /// # Arguments
    /// * `command` - A string slice that holds the command to run.
    ///
    /// # Errors
    /// Returns [`RconError::RequestPending`] if an earlier call was abandoned
    /// before its response arrived, [`RconError::InvalidState`] unless the
    /// client is authenticated, [`RconError::PayloadTooLong`] if the command
    /// does not fit in one packet, and the appropriate error for network,
    /// timeout and protocol failures.
    pub async fn execute(&mut self, command: &str) -> Result<String, RconError> {
        self.ensure_idle().await?;

        let packet = Packet::new(self.next_request_id(), PacketType::ExecCommand, command.to_string());
        if packet.size() > MAX_LEN_SERVERBOUND {
            return Err(RconError::PayloadTooLong);
        }

        let pending = PendingRequest {
            id: packet.id,
            issued_at: Instant::now(),
        };
        self.pending = Some(pending);
        tracing::debug!(id = pending.id, command, "executing");

        match self.execute_raw(packet).await {
            Ok(body) => {
                self.pending = None;
                tracing::debug!(
                    id = pending.id,
                    len = body.len(),
                    elapsed = ?pending.issued_at.elapsed(),
                    "response complete"
                );
                Ok(String::from_utf8_lossy(&body).into_owned())
            }
            Err(err) => Err(self.fault(err).await),
        }
    }

    /// Read from the connection for up to `window` while no command is
    /// running, buffering the chat messages that arrive.
    ///
    /// Returns how many chat messages were recieved. Collect them with
    /// [`flush_chat`](Self::flush_chat).
    ///
    /// # Errors
    /// Fails like [`execute`](Self::execute) does. Anything but chat arriving
    /// while idle is a protocol violation.
    pub async fn listen(&mut self, window: Duration) -> Result<usize, RconError> {
        self.ensure_idle().await?;

        match self.listen_raw(window).await {
            Ok(received) => Ok(received),
            Err(err) => Err(self.fault(err).await),
        }
    }

    /// Take every chat message recieved since the last flush, oldest first.
    pub fn flush_chat(&mut self) -> Vec<String> {
        self.chat.flush()
    }

    /// Number of chat messages waiting to be flushed.
    #[must_use]
    pub fn pending_chat(&self) -> usize {
        self.chat.len()
    }

    /// Disconnect from the server and close the RCON connection.
    /// Closing an already closed or faulted client does nothing.
    ///
    /// # Errors
    /// Returns `Err` if there was an issue closing the connection.
    pub async fn close(&mut self) -> Result<(), RconError> {
        self.state = ConnectionState::Disconnected;
        self.pending = None;

        if self.closed {
            return Ok(());
        }

        self.closed = true;
        tracing::debug!("closing connection");
        self.transport.close().await.map_err(RconError::from)
    }

    async fn authenticate_raw(&mut self, packet: Packet) -> Result<(), RconError> {
        let id = packet.id;
        self.transport.send(&packet.encode()).await?;

        let deadline = Instant::now() + self.timeout;

        loop {
            match self.next_routed(deadline, None).await? {
                // some servers send an empty response before the real answer
                Some(Routed::Response(packet)) if packet.id == id => continue,
                Some(Routed::AuthResponse(packet)) if packet.id == -1 => {
                    return Err(RconError::AuthFailed)
                }
                Some(Routed::AuthResponse(packet)) if packet.id == id => return Ok(()),
                Some(Routed::AuthResponse(packet) | Routed::Response(packet)) => {
                    return Err(FrameError::RequestIdMismatch {
                        expected: Some(id),
                        got: packet.id,
                    }
                    .into())
                }
                Some(Routed::Chat(_)) | None => return Err(RconError::Timeout(self.timeout)),
            }
        }
    }

    async fn execute_raw(&mut self, packet: Packet) -> Result<Bytes, RconError> {
        self.transport.send(&packet.encode()).await?;

        let probe_id = if self.rule.sends_probe() {
            let probe = Packet::new(self.next_request_id(), PacketType::ResponseValue, Bytes::new());
            self.transport.send(&probe.encode()).await?;
            Some(probe.id)
        } else {
            None
        };

        let mut state = ReassemblyState::new(packet.id, probe_id);
        let mut deadline = Instant::now() + self.timeout;

        loop {
            let quiet = self.rule.quiet_window(&state);

            let fragment = match self.next_routed(deadline, quiet).await? {
                Some(Routed::Response(fragment)) => fragment,
                Some(Routed::AuthResponse(packet)) => {
                    return Err(FrameError::UnexpectedPacketType(packet.packet_type.into()).into())
                }
                // chat is buffered by next_routed, silence ends the response
                Some(Routed::Chat(_)) | None => return Ok(state.into_body()),
            };

            match self.rule.on_fragment(&mut state, fragment)? {
                Progress::NeedMore => deadline = Instant::now() + self.timeout,
                Progress::Done => return Ok(state.into_body()),
                Progress::DoneAfterMarker(marker) => {
                    self.reader
                        .expect_marker(&mut self.transport, marker, self.timeout)
                        .await?;
                    return Ok(state.into_body());
                }
            }
        }
    }

    async fn listen_raw(&mut self, window: Duration) -> Result<usize, RconError> {
        let before = self.chat.len();
        let deadline = Instant::now() + window;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            // a packet cut off by the end of the window still gets the full timeout
            let packet = match self
                .reader
                .next_packet(&mut self.transport, remaining + self.timeout, Some(remaining))
                .await?
            {
                Some(packet) => packet,
                None => break,
            };

            match self.classify(packet)? {
                Routed::Chat(body) => self.chat.push(&body),
                Routed::Response(packet) | Routed::AuthResponse(packet) => {
                    return Err(FrameError::RequestIdMismatch {
                        expected: None,
                        got: packet.id,
                    }
                    .into())
                }
            }
        }

        Ok(self.chat.len() - before)
    }

    /// Read until a packet that is not chat arrives, buffering chat on the way.
    /// Returns `Ok(None)` if the stream stayed silent for `quiet`.
    ///
    /// While a quiet window is running, chat counts as traffic: it restarts
    /// both the window and the timeout.
    async fn next_routed(
        &mut self,
        mut deadline: Instant,
        quiet: Option<Duration>,
    ) -> Result<Option<Routed>, RconError> {
        loop {
            let budget = deadline.saturating_duration_since(Instant::now());
            let packet = match self
                .reader
                .next_packet(&mut self.transport, budget, quiet)
                .await
            {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(None),
                Err(RconError::Timeout(_)) => return Err(RconError::Timeout(self.timeout)),
                Err(err) => return Err(err),
            };

            match self.classify(packet)? {
                Routed::Chat(body) => {
                    self.chat.push(&body);
                    if quiet.is_some() {
                        deadline = Instant::now() + self.timeout;
                    }
                }
                routed => return Ok(Some(routed)),
            }
        }
    }

    fn classify(&self, packet: Packet) -> Result<Routed, FrameError> {
        let code = i32::from(packet.packet_type);

        if self.chat_type == Some(code) {
            return Ok(Routed::Chat(packet.body));
        }

        match packet.packet_type {
            PacketType::ResponseValue => Ok(Routed::Response(packet)),
            PacketType::AUTH_RESPONSE => Ok(Routed::AuthResponse(packet)),
            _ => Err(FrameError::UnexpectedPacketType(code)),
        }
    }

    /// Fail unless the client is authenticated with no request in flight.
    async fn ensure_idle(&mut self) -> Result<(), RconError> {
        if let Some(pending) = self.pending {
            tracing::warn!(id = pending.id, "previous request was abandoned mid-response");
            return Err(self.fault(RconError::RequestPending).await);
        }

        if self.state == ConnectionState::Ready {
            Ok(())
        } else {
            Err(RconError::InvalidState(self.state))
        }
    }

    /// Move to [`ConnectionState::Faulted`] and shut the transport down.
    async fn fault(&mut self, err: RconError) -> RconError {
        tracing::warn!(
            error = %err,
            state = %self.state,
            mid_frame = self.reader.has_partial(),
            "connection faulted"
        );

        self.state = ConnectionState::Faulted;
        self.pending = None;

        if !self.closed {
            self.closed = true;
            if let Err(close_err) = self.transport.close().await {
                tracing::debug!(error = %close_err, "failed to shut down faulted connection");
            }
        }

        err
    }

    fn next_request_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = if id == i32::MAX { 1 } else { id + 1 };
        id
    }
}
