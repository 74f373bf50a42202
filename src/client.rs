//! EtherNet/IP client implementation.
//!
//! This module provides an asynchronous client that owns the TCP
//! connection, the encapsulation session and the request/response
//! correlation. Requests are matched to replies through the 40-bit
//! token the client writes into the sender-context field: the device
//! echoes the context back verbatim, so every in-flight request waits
//! on its own oneshot channel while a single reader task resolves them
//! in whatever order the replies arrive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::codec::EnipCodec;
use crate::error::{EnipError, Result};
use crate::parser::{parse_rr_response, TagResult};
use crate::types::{
    CipValue, CommandSpecificData, EncapFrame, EncapStatus, ListIdentityReply, ListServicesReply,
    MessageRouterRequest, MultipleServicePacket, RoutePath, SingleServicePacket, UnconnectedSend,
};

/// Default EtherNet/IP TCP port.
pub const DEFAULT_PORT: u16 = 44818;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// Default per-request response timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 9_000;

/// Default auto-reconnect probe interval in seconds.
pub const DEFAULT_RECONNECT_INTERVAL: u64 = 5;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Device address (host:port)
    pub address: String,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// How long a request waits for its correlated reply
    pub request_timeout: Duration,
    /// Route for Unconnected Send wrapping; `None` sends directly
    pub route: Option<RoutePath>,
    /// Reconnect and re-register automatically after a drop
    pub auto_reconnect: bool,
    /// Probe interval of the auto-reconnect task
    pub reconnect_interval: Duration,
}

impl ClientConfig {
    /// Create a new configuration with the given address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            route: None,
            auto_reconnect: false,
            reconnect_interval: Duration::from_secs(DEFAULT_RECONNECT_INTERVAL),
        }
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-request response timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Route requests through an Unconnected Send wrapper.
    pub fn route(mut self, route: RoutePath) -> Self {
        self.route = Some(route);
        self
    }

    /// Route requests to a processor in the given backplane slot.
    pub fn slot(self, slot: u8) -> Self {
        self.route(RoutePath::backplane_slot(slot))
    }

    /// Enable automatic reconnection.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No TCP connection
    Disconnected,
    /// TCP handshake in progress
    Connecting,
    /// TCP up, no session registered
    TcpConnected,
    /// RegisterSession in flight
    Registering,
    /// Session registered; tag services available
    Authenticated,
}

/// Events emitted by the client.
#[derive(Debug, Clone)]
pub enum EnipEvent {
    /// TCP connection established
    Connected,
    /// Session registered with the device
    Registered,
    /// Connection closed or lost
    Disconnected,
    /// Any inbound frame, correlated or not
    FrameReceived(EncapFrame),
    /// A non-fatal protocol error on the inbound path
    Error(String),
}

type FrameSink = SplitSink<Framed<TcpStream, EnipCodec>, EncapFrame>;
type FrameStream = SplitStream<Framed<TcpStream, EnipCodec>>;

/// State owned by the transport layer, serialized behind one lock.
struct Session {
    state: SessionState,
    session_handle: Option<u32>,
    pending: HashMap<u64, oneshot::Sender<EncapFrame>>,
    writer: Option<FrameSink>,
    reader_task: Option<JoinHandle<()>>,
}

impl Session {
    fn teardown(&mut self) {
        self.state = SessionState::Disconnected;
        self.session_handle = None;
        self.writer = None;
        // Dropping the senders wakes every in-flight request with a
        // channel-closed error.
        self.pending.clear();
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

struct Shared {
    config: ClientConfig,
    session: Mutex<Session>,
    events: broadcast::Sender<EnipEvent>,
    user_disconnected: AtomicBool,
}

impl Shared {
    fn emit(&self, event: EnipEvent) {
        let _ = self.events.send(event);
    }
}

/// EtherNet/IP client.
///
/// # Example
///
/// ```rust,ignore
/// use voltage_enip::{ClientConfig, EnipClient};
///
/// #[tokio::main]
/// async fn main() -> voltage_enip::Result<()> {
///     let config = ClientConfig::new("192.168.1.10:44818").slot(0);
///     let mut client = EnipClient::new(config);
///     client.connect().await?;
///
///     let result = client.read_tag("MotorSpeed").await?;
///     println!("MotorSpeed = {:?}", result.value);
///     Ok(())
/// }
/// ```
pub struct EnipClient {
    shared: Arc<Shared>,
    reconnect_task: Option<JoinHandle<()>>,
}

impl EnipClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                config,
                session: Mutex::new(Session {
                    state: SessionState::Disconnected,
                    session_handle: None,
                    pending: HashMap::new(),
                    writer: None,
                    reader_task: None,
                }),
                events,
                user_disconnected: AtomicBool::new(false),
            }),
            reconnect_task: None,
        }
    }

    /// Get the current session state.
    pub async fn state(&self) -> SessionState {
        self.shared.session.lock().await.state
    }

    /// The session handle assigned by the device, if registered.
    pub async fn session_handle(&self) -> Option<u32> {
        self.shared.session.lock().await.session_handle
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<EnipEvent> {
        self.shared.events.subscribe()
    }

    /// Connect to the device and register a session.
    ///
    /// The returned result reflects the registration outcome, not just
    /// the TCP handshake. Fails with [`EnipError::AlreadyConnected`]
    /// when a connection attempt is already under way.
    pub async fn connect(&mut self) -> Result<()> {
        self.shared.user_disconnected.store(false, Ordering::SeqCst);
        let outcome = connect_inner(&self.shared).await;

        // One manual attempt arms the probe, even a failed one; only a
        // duplicate connect on a live session does not count.
        if self.shared.config.auto_reconnect
            && self.reconnect_task.is_none()
            && !matches!(outcome, Err(EnipError::AlreadyConnected))
        {
            let shared = Arc::clone(&self.shared);
            self.reconnect_task = Some(tokio::spawn(run_reconnect(shared)));
        }
        outcome
    }

    /// Disconnect from the device.
    ///
    /// Sends a best-effort UnRegisterSession, closes the socket and
    /// suppresses auto-reconnect until the next [`connect`](Self::connect).
    pub async fn disconnect(&mut self) -> Result<()> {
        self.shared.user_disconnected.store(true, Ordering::SeqCst);
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
        }

        let mut session = self.shared.session.lock().await;
        if session.state == SessionState::Disconnected {
            return Ok(());
        }
        if let (Some(handle), Some(writer)) = (session.session_handle, session.writer.as_mut()) {
            // The device does not answer UnRegisterSession; fire and forget.
            writer
                .send(EncapFrame::unregister_session(handle))
                .await
                .ok();
        }
        session.teardown();
        drop(session);

        self.shared.emit(EnipEvent::Disconnected);
        Ok(())
    }

    /// Send a frame and await its correlated reply.
    ///
    /// The frame's sender context is overwritten with a fresh token;
    /// the reply is whichever inbound frame echoes it, or a
    /// [`EnipError::RequestTimeout`] after the configured deadline.
    pub async fn send(&self, frame: EncapFrame) -> Result<EncapFrame> {
        send_via(&self.shared, frame).await
    }

    /// Read one tag.
    pub async fn read_tag(&self, tag: impl Into<String>) -> Result<TagResult> {
        let request = SingleServicePacket::read(tag).to_request()?;
        let mut results = self.round_trip(request).await?;
        results
            .pop()
            .ok_or_else(|| EnipError::invalid_cip("Reply carried no service result"))
    }

    /// Write one tag. Only atomic numeric values can be written.
    pub async fn write_tag(
        &self,
        tag: impl Into<String>,
        value: CipValue,
    ) -> Result<TagResult> {
        let request = SingleServicePacket::write(tag, value).to_request()?;
        let mut results = self.round_trip(request).await?;
        results
            .pop()
            .ok_or_else(|| EnipError::invalid_cip("Reply carried no service result"))
    }

    /// Read several tags in one Multiple Service Packet.
    ///
    /// Results come back in request order; a failed tag carries its own
    /// status without affecting its siblings.
    pub async fn read_tags(&self, tags: &[&str]) -> Result<Vec<TagResult>> {
        let mut batch = MultipleServicePacket::new();
        for tag in tags {
            batch.insert(SingleServicePacket::read(*tag));
        }
        self.round_trip(batch.to_request()?).await
    }

    /// Write several tags in one Multiple Service Packet.
    pub async fn write_tags(&self, writes: Vec<(&str, CipValue)>) -> Result<Vec<TagResult>> {
        let mut batch = MultipleServicePacket::new();
        for (tag, value) in writes {
            batch.insert(SingleServicePacket::write(tag, value));
        }
        self.round_trip(batch.to_request()?).await
    }

    /// Send a prepared Multiple Service Packet.
    pub async fn send_service_packet(
        &self,
        batch: &MultipleServicePacket,
    ) -> Result<Vec<TagResult>> {
        self.round_trip(batch.to_request()?).await
    }

    /// Query the device identity.
    pub async fn list_identity(&self) -> Result<ListIdentityReply> {
        let reply = self.send(EncapFrame::list_identity()).await?;
        check_encap_status(&reply)?;
        match reply.csd {
            CommandSpecificData::ListIdentity(identity) => Ok(identity),
            CommandSpecificData::Empty => Ok(ListIdentityReply::default()),
            _ => Err(EnipError::invalid_frame("ListIdentity reply expected")),
        }
    }

    /// Query the encapsulation services the device offers.
    pub async fn list_services(&self) -> Result<ListServicesReply> {
        let reply = self.send(EncapFrame::list_services()).await?;
        check_encap_status(&reply)?;
        match reply.csd {
            CommandSpecificData::ListServices(services) => Ok(services),
            CommandSpecificData::Empty => Ok(ListServicesReply::default()),
            _ => Err(EnipError::invalid_frame("ListServices reply expected")),
        }
    }

    /// Send a NOP keep-alive. NOP frames are never answered, so nothing
    /// is awaited.
    pub async fn nop(&self) -> Result<()> {
        let mut session = self.shared.session.lock().await;
        let writer = session.writer.as_mut().ok_or(EnipError::NotConnected)?;
        writer.send(EncapFrame::nop()).await
    }

    /// Wrap a CIP request per the configured route, exchange it through
    /// SendRRData and drill the reply into tag results.
    async fn round_trip(&self, request: MessageRouterRequest) -> Result<Vec<TagResult>> {
        let cip: Bytes = match self.shared.config.route {
            Some(route) => {
                let mut wrapper = UnconnectedSend::new(request);
                wrapper.route = route;
                wrapper.to_bytes()?
            }
            None => request.to_bytes()?,
        };

        let session_handle = {
            let session = self.shared.session.lock().await;
            session.session_handle.ok_or(EnipError::NotConnected)?
        };

        let reply = self
            .send(EncapFrame::send_rr_data(session_handle, cip))
            .await?;
        check_encap_status(&reply)?;

        match &reply.csd {
            CommandSpecificData::SendRRData(csd) => parse_rr_response(csd),
            _ => Err(EnipError::invalid_frame("SendRRData reply expected")),
        }
    }
}

impl Drop for EnipClient {
    fn drop(&mut self) {
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
        }
        // The reader task holds no Arc cycle; aborting here lets the
        // runtime reclaim it even if the caller never disconnected.
        if let Ok(mut session) = self.shared.session.try_lock() {
            if let Some(task) = session.reader_task.take() {
                task.abort();
            }
        }
    }
}

/// Reject a reply whose encapsulation status is non-success.
fn check_encap_status(frame: &EncapFrame) -> Result<()> {
    if frame.status().is_success() {
        Ok(())
    } else {
        Err(EnipError::Device(frame.status()))
    }
}

/// Open the TCP connection, start the reader and register a session.
async fn connect_inner(shared: &Arc<Shared>) -> Result<()> {
    {
        let mut session = shared.session.lock().await;
        if session.state != SessionState::Disconnected {
            return Err(EnipError::AlreadyConnected);
        }
        session.state = SessionState::Connecting;
    }

    debug!(address = %shared.config.address, "connecting");
    let stream = match timeout(
        shared.config.connect_timeout,
        TcpStream::connect(&shared.config.address),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            shared.session.lock().await.state = SessionState::Disconnected;
            return Err(EnipError::Io(e));
        }
        Err(_) => {
            shared.session.lock().await.state = SessionState::Disconnected;
            return Err(EnipError::ConnectionTimeout);
        }
    };

    // Tag exchanges are small and latency-bound
    stream.set_nodelay(true).ok();

    let (writer, reader) = Framed::new(stream, EnipCodec::new()).split();
    {
        let mut session = shared.session.lock().await;
        session.writer = Some(writer);
        session.state = SessionState::TcpConnected;
        if let Some(old) = session.reader_task.take() {
            old.abort();
        }
        session.reader_task = Some(tokio::spawn(run_reader(Arc::clone(shared), reader)));
    }
    shared.emit(EnipEvent::Connected);

    register_inner(shared).await
}

/// Register an encapsulation session over the live connection.
async fn register_inner(shared: &Arc<Shared>) -> Result<()> {
    {
        let mut session = shared.session.lock().await;
        match session.state {
            SessionState::TcpConnected => session.state = SessionState::Registering,
            SessionState::Authenticated => return Ok(()),
            SessionState::Registering => return Err(EnipError::AlreadyConnected),
            _ => return Err(EnipError::NotConnected),
        }
    }

    let reply = match send_via(shared, EncapFrame::register_session()).await {
        Ok(reply) => reply,
        Err(e) => {
            let mut session = shared.session.lock().await;
            if session.state == SessionState::Registering {
                session.state = SessionState::TcpConnected;
            }
            return Err(e);
        }
    };

    if !reply.status().is_success() {
        let mut session = shared.session.lock().await;
        session.state = SessionState::TcpConnected;
        return Err(EnipError::Device(reply.status()));
    }
    if let Some(csd) = reply.as_register_session() {
        if !csd.is_protocol_supported() {
            warn!(
                version = csd.protocol_version,
                "device announced an unexpected protocol version"
            );
        }
    }

    let handle = reply.header.session_handle;
    {
        let mut session = shared.session.lock().await;
        session.session_handle = Some(handle);
        session.state = SessionState::Authenticated;
    }
    debug!(session_handle = handle, "session registered");
    shared.emit(EnipEvent::Registered);
    Ok(())
}

/// Stamp a token, register a waiter and write the frame out; resolve on
/// the correlated reply or the request timeout, whichever comes first.
async fn send_via(shared: &Arc<Shared>, mut frame: EncapFrame) -> Result<EncapFrame> {
    let (tx, rx) = oneshot::channel();
    let token;
    {
        let mut session = shared.session.lock().await;
        if session.state == SessionState::Disconnected
            || session.state == SessionState::Connecting
            || session.writer.is_none()
        {
            return Err(EnipError::NotConnected);
        }

        token = {
            let mut candidate = generate_token();
            // Timestamp + random digits collide only across concurrent
            // requests in the same millisecond; step until free.
            while session.pending.contains_key(&candidate) {
                candidate = (candidate + 1) & 0xFF_FFFF_FFFF;
            }
            candidate
        };
        frame.header.set_token(token);
        session.pending.insert(token, tx);

        let writer = session.writer.as_mut().ok_or(EnipError::NotConnected)?;
        if let Err(e) = writer.send(frame).await {
            session.pending.remove(&token);
            return Err(e);
        }
    }

    let deadline = shared.config.request_timeout;
    match timeout(deadline, rx).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(_)) => Err(EnipError::ChannelClosed),
        Err(_) => {
            // The waiter is consumed by exactly one of: correlation or
            // this expiry. Drop the table entry so a straggler reply is
            // treated as unmatched.
            shared.session.lock().await.pending.remove(&token);
            warn!(token, timeout_ms = deadline.as_millis() as u64, "request timed out");
            Err(EnipError::RequestTimeout(deadline.as_millis() as u64))
        }
    }
}

/// Generate a 40-bit correlation token: the eight low-order decimal
/// digits of the millisecond clock, followed by four random decimal
/// digits.
fn generate_token() -> u64 {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let suffix = rand::thread_rng().gen_range(0..10_000u64);
    (now_ms % 100_000_000) * 10_000 + suffix
}

/// Inbound loop: resolve correlated requests, broadcast every frame,
/// clear the cached session when the device stops honoring it.
async fn run_reader(shared: Arc<Shared>, mut reader: FrameStream) {
    loop {
        match reader.next().await {
            Some(Ok(frame)) => {
                if frame.status() == EncapStatus::InvalidSessionHandle {
                    let mut session = shared.session.lock().await;
                    warn!("device rejected session handle; re-registration required");
                    session.session_handle = None;
                    if session.state == SessionState::Authenticated {
                        session.state = SessionState::TcpConnected;
                    }
                }

                let token = frame.header.token();
                let waiter = shared.session.lock().await.pending.remove(&token);
                match waiter {
                    Some(tx) => {
                        // A dead receiver means the request timed out a
                        // moment ago; the frame still goes to broadcast.
                        tx.send(frame.clone()).ok();
                    }
                    None => {
                        debug!(token, "uncorrelated frame");
                    }
                }
                shared.emit(EnipEvent::FrameReceived(frame));
            }
            Some(Err(e)) => {
                // Structural decode failures consume exactly one frame;
                // framing stays intact, so keep reading.
                warn!(error = %e, "failed to decode inbound frame");
                shared.emit(EnipEvent::Error(e.to_string()));
            }
            None => {
                debug!("connection closed by peer");
                shared.session.lock().await.teardown();
                shared.emit(EnipEvent::Disconnected);
                return;
            }
        }
    }
}

/// Periodic probe: reconnect a dead socket, re-register a live one.
/// Runs only after a manual connect and never after a requested
/// disconnect.
async fn run_reconnect(shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(shared.config.reconnect_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if shared.user_disconnected.load(Ordering::SeqCst) {
            return;
        }

        let state = shared.session.lock().await.state;
        match state {
            SessionState::Disconnected => {
                debug!("auto-reconnect: reopening connection");
                if let Err(e) = connect_inner(&shared).await {
                    warn!(error = %e, "auto-reconnect failed");
                }
            }
            SessionState::TcpConnected => {
                debug!("auto-reconnect: re-registering session");
                if let Err(e) = register_inner(&shared).await {
                    warn!(error = %e, "re-registration failed");
                }
            }
            _ => {}
        }
    }
}
