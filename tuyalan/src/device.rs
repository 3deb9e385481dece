//! High-level device interface
//!
//! A [`Device`] owns one link to one device and runs three background
//! tasks over it:
//!
//! - the **dispatcher**, which drains the outbound queue one message per
//!   tick and backs off when sends keep failing,
//! - the **reader**, which splits the inbound stream into frames and routes
//!   each one to a waiting request or a command handler,
//! - the **keepalive**, which queues pings and drops the link when the
//!   device stops answering.
//!
//! Tasks hold weak references, so dropping every handle stops them at
//! their next tick.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use tuyalan_core::constants::{CONNECTION_FAILED, MAX_SEND_RETRIES, SEND_RETRY_DELAY};
use tuyalan_core::{Backoff, Cipher, Command, LinkState, Message, Session};
use tuyalan_transport::{Error as TransportError, FrameReader, FrameWriter, TcpTransport, Transport};
use tuyalan_types::Datapoints;

use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::listeners::{ListenerRegistry, Waiter};
use crate::observer::StateObserver;
use crate::queue::{OutboundQueue, QueuedMessage};

/// Tuya local-protocol device
///
/// Cheap to clone; clones share the same link and state.
///
/// # Examples
///
/// ```no_run
/// use tuyalan::{Device, DeviceConfig};
///
/// #[tokio::main]
/// async fn main() -> tuyalan::Result<()> {
///     let config = DeviceConfig::new("bf1234567890abcdef", "192.168.1.50", "0123456789abcdef");
///     let device = Device::new(config)?;
///
///     let state = device.get().await?;
///     println!("Battery: {:?}", state.get("104"));
///
///     device.set_value("103", true).await?;
///     device.disable().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Device {
    inner: Arc<Inner>,
}

struct Inner {
    config: DeviceConfig,
    cipher: Cipher,
    transport: Arc<dyn Transport>,
    session: Session,

    /// Current socket, replaced wholesale on reconnect
    link: Mutex<Option<Link>>,
    connect_lock: AsyncMutex<()>,
    generation: AtomicU64,

    queue: Mutex<OutboundQueue>,
    backoff: Mutex<Backoff>,
    listeners: ListenerRegistry,

    state: RwLock<Datapoints>,
    observers: RwLock<Vec<Arc<dyn StateObserver>>>,

    /// Cancelled by `disable()` or when the last handle is dropped
    shutdown: CancellationToken,
    dispatcher_started: AtomicBool,
    keepalive_started: AtomicBool,
}

struct Link {
    generation: u64,
    writer: Arc<AsyncMutex<FrameWriter>>,
    cancel: CancellationToken,
}

impl Device {
    /// Create a device reached over TCP
    ///
    /// No network activity happens until the first `get()`, `set()` or
    /// `connect()`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not validate, in particular when the
    /// local key is not 16 bytes long.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let transport = TcpTransport::new(config.host.clone(), config.port)
            .with_connect_timeout(config.timeout);

        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a device over a custom transport
    pub fn with_transport(config: DeviceConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let cipher = config.cipher()?;

        debug!(
            device_id = %config.device_id,
            version = %config.version,
            addr = %transport.remote_addr(),
            "Created device"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                cipher,
                transport,
                session: Session::new(),
                link: Mutex::new(None),
                connect_lock: AsyncMutex::new(()),
                generation: AtomicU64::new(0),
                queue: Mutex::new(OutboundQueue::new()),
                backoff: Mutex::new(Backoff::new()),
                listeners: ListenerRegistry::new(),
                state: RwLock::new(Datapoints::new()),
                observers: RwLock::new(Vec::new()),
                shutdown: CancellationToken::new(),
                dispatcher_started: AtomicBool::new(false),
                keepalive_started: AtomicBool::new(false),
            }),
        })
    }

    pub fn device_id(&self) -> &str {
        &self.inner.config.device_id
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Copy of the last known datapoint values
    pub fn state(&self) -> Datapoints {
        self.inner.state.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.is_connected()
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.session.is_disabled()
    }

    pub fn link_state(&self) -> LinkState {
        self.inner.session.state()
    }

    /// Register an observer for unsolicited updates
    pub fn subscribe(&self, observer: Arc<dyn StateObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Poll the device and merge its datapoints into the snapshot
    ///
    /// Returns the merged snapshot. A disabled device returns the snapshot
    /// without touching the network.
    ///
    /// # Errors
    ///
    /// - [`Error::ResponseTimeout`] if no response arrives in time; the link
    ///   is torn down
    /// - [`Error::Connection`] / [`Error::ConnectionTimeout`] if the request
    ///   could not be sent
    pub async fn get(&self) -> Result<Datapoints> {
        let inner = &self.inner;
        if inner.session.is_disabled() {
            return Ok(self.state());
        }
        inner.start_dispatcher();

        let (sequence, waiter) = inner.register_listener();
        let _registration = inner.listeners.hold(sequence);
        let payload = json!({
            "gwId": inner.config.gateway_id(),
            "devId": inner.config.device_id,
        });
        inner.enqueue(
            Message::with_payload(Command::Get, sequence, payload),
            !inner.config.version.is_legacy(),
            true,
        );

        let response = match timeout(inner.config.timeout, waiter).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(Error::Disabled),
            Err(_) => {
                debug!(device_id = %inner.config.device_id, sequence, "Response timed out");
                inner.teardown(None).await;
                return Err(Error::ResponseTimeout { sequence });
            }
        };

        if let Some(dps) = response.datapoints() {
            inner.merge(dps);
        }

        Ok(self.state())
    }

    /// Queue a partial datapoint update
    ///
    /// Fire-and-forget: success shows up later as an unsolicited update or
    /// in the next `get()`.
    pub async fn set(&self, dps: Datapoints) -> Result<()> {
        let inner = &self.inner;
        if inner.session.is_disabled() {
            return Ok(());
        }
        inner.start_dispatcher();

        let sequence = inner.session.next_sequence();
        let payload = json!({
            "devId": inner.config.device_id,
            "uid": "",
            "t": chrono::Utc::now().timestamp(),
            "dps": Value::from(dps),
        });
        inner.enqueue(Message::with_payload(Command::Set, sequence, payload), true, false);

        Ok(())
    }

    /// Queue an update of a single datapoint
    pub async fn set_value(&self, code: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let mut dps = Datapoints::new();
        dps.insert(code, value);
        self.set(dps).await
    }

    /// Open the link if it is not already open
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionTimeout`] (and marks the error datapoint)
    /// if the device does not accept the connection in time.
    pub async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    /// Close the link; a no-op when already closed
    pub async fn disconnect(&self) {
        self.inner.teardown(None).await;
    }

    /// Close the link for good
    ///
    /// Background tasks stop, pending requests fail with
    /// [`Error::Disabled`] and every later call becomes a no-op.
    pub async fn disable(&self) {
        let inner = &self.inner;
        if !inner.session.disable() {
            return;
        }

        info!(
            device_id = %inner.config.device_id,
            pending = inner.listeners.len(),
            "Disabling device"
        );

        inner.shutdown.cancel();
        inner.teardown(None).await;
        inner.queue.lock().clear();
        inner.listeners.clear();
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{})",
            self.inner.config.device_id, self.inner.config.host, self.inner.config.port
        )
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("config", &self.inner.config)
            .field("link_state", &self.inner.session.state())
            .field("disabled", &self.inner.session.is_disabled())
            .finish()
    }
}

impl Inner {
    fn start_dispatcher(self: &Arc<Self>) {
        if self.dispatcher_started.swap(true, Ordering::AcqRel) {
            return;
        }

        tokio::spawn(run_dispatcher(Arc::downgrade(self), self.shutdown.clone()));
    }

    fn start_keepalive(self: &Arc<Self>) {
        if self.keepalive_started.swap(true, Ordering::AcqRel) {
            return;
        }

        tokio::spawn(run_keepalive(
            Arc::downgrade(self),
            self.shutdown.clone(),
            self.config.ping_interval,
        ));
    }

    fn enqueue(&self, message: Message, encrypt: bool, expects_response: bool) {
        let sequence = message.sequence;
        let command = message.command;

        let mut queue = self.queue.lock();
        queue.push(QueuedMessage::new(
            message,
            encrypt,
            expects_response,
            self.config.message_ttl,
        ));
        trace!(
            device_id = %self.config.device_id,
            sequence,
            %command,
            queue_len = queue.len(),
            "Queued message"
        );
    }

    /// Allocate a sequence number no pending request holds
    fn register_listener(&self) -> (u32, Waiter) {
        loop {
            let sequence = self.session.next_sequence();
            if let Some(waiter) = self.listeners.register(sequence) {
                return (sequence, waiter);
            }
        }
    }

    async fn connect(self: &Arc<Self>) -> Result<()> {
        if self.session.is_disabled() || self.session.is_connected() {
            return Ok(());
        }

        let _guard = self.connect_lock.lock().await;
        if !self.session.begin_connect() {
            return Ok(());
        }

        let addr = self.transport.remote_addr();
        debug!(device_id = %self.config.device_id, %addr, "Connecting");

        let connection = match timeout(self.config.timeout, self.transport.connect()).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(TransportError::ConnectionTimeout(_))) | Err(_) => {
                self.session.close();
                self.state
                    .write()
                    .insert(self.config.error_datapoint.clone(), CONNECTION_FAILED);

                debug!(device_id = %self.config.device_id, %addr, "Connection timed out");
                return Err(Error::ConnectionTimeout {
                    addr,
                    timeout: self.config.timeout,
                });
            }
            Ok(Err(e)) => {
                self.session.close();
                return Err(Error::Connection {
                    addr,
                    reason: e.to_string(),
                });
            }
        };

        if self.session.is_disabled() {
            self.session.close();
            return Ok(());
        }
        self.session.mark_connected()?;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let cancel = self.shutdown.child_token();
        let (reader, writer) = connection.into_split();

        *self.link.lock() = Some(Link {
            generation,
            writer: Arc::new(AsyncMutex::new(writer)),
            cancel: cancel.clone(),
        });

        tokio::spawn(run_reader(Arc::downgrade(self), reader, cancel, generation));
        self.start_dispatcher();
        self.start_keepalive();

        info!(device_id = %self.config.device_id, %addr, generation, "Connected");
        Ok(())
    }

    /// Drop the current link
    ///
    /// With `Some(generation)` only that particular link is dropped, so a
    /// reader that outlived its socket cannot close a newer one.
    async fn teardown(&self, generation: Option<u64>) {
        let link = {
            let mut slot = self.link.lock();
            match (slot.as_ref(), generation) {
                (Some(link), Some(expected)) if link.generation != expected => return,
                _ => slot.take(),
            }
        };

        let Some(link) = link else {
            return;
        };

        link.cancel.cancel();
        if self.session.close() {
            info!(
                device_id = %self.config.device_id,
                generation = link.generation,
                "Disconnected"
            );
        }

        // The peer may already be gone
        let shutdown = async { link.writer.lock().await.shutdown().await };
        match timeout(SEND_RETRY_DELAY, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!(error = %e, "Write side shutdown failed"),
            Err(_) => trace!("Write side shutdown timed out"),
        }
    }

    /// Send one frame, reconnecting and retrying on failure
    async fn send(self: &Arc<Self>, frame: &[u8]) -> Result<()> {
        let mut retries = MAX_SEND_RETRIES;

        loop {
            let err = match self.send_once(frame).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if err.requires_reconnect() {
                self.teardown(None).await;
            }

            if retries == 0 || self.session.is_disabled() {
                return Err(self.classify_send_failure(err));
            }

            debug!(
                device_id = %self.config.device_id,
                retries_left = retries,
                error = %err,
                "Retrying send"
            );
            retries -= 1;
            sleep(SEND_RETRY_DELAY).await;
        }
    }

    async fn send_once(self: &Arc<Self>, frame: &[u8]) -> Result<()> {
        self.connect().await?;

        let writer = self
            .link
            .lock()
            .as_ref()
            .map(|link| Arc::clone(&link.writer))
            .ok_or(TransportError::NotConnected)?;

        writer.lock().await.send(frame).await?;
        Ok(())
    }

    fn classify_send_failure(&self, err: Error) -> Error {
        match err {
            Error::Transport(e) => Error::Connection {
                addr: self.transport.remote_addr(),
                reason: e.to_string(),
            },
            e @ (Error::Connection { .. } | Error::ConnectionTimeout { .. }) => e,
            other => Error::SendFailed {
                addr: self.transport.remote_addr(),
                reason: other.to_string(),
            },
        }
    }

    /// One dispatcher tick
    async fn dispatch_one(self: &Arc<Self>) {
        let (entry, expired) = self.queue.lock().next(Instant::now());

        for stale in expired {
            debug!(
                device_id = %self.config.device_id,
                sequence = stale.message.sequence,
                command = %stale.message.command,
                "Dropping expired message"
            );
        }

        let Some(entry) = entry else {
            return;
        };

        let sequence = entry.message.sequence;
        debug!(device_id = %self.config.device_id, "Sending {}", entry.message);

        let result = match entry.message.encode(&self.cipher, entry.encrypt) {
            Ok(frame) => self.send(&frame).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => self.backoff.lock().record_success(),
            Err(err) => {
                let (failures, interval, backing_off) = {
                    let mut backoff = self.backoff.lock();
                    let interval = backoff.record_failure();
                    (backoff.failures(), interval, backoff.is_backing_off())
                };

                if backing_off {
                    warn!(
                        device_id = %self.config.device_id,
                        failures,
                        interval_ms = interval.as_millis() as u64,
                        error = %err,
                        "Send failed, backing off"
                    );
                } else {
                    debug!(device_id = %self.config.device_id, failures, error = %err, "Send failed");
                }

                if entry.expects_response {
                    self.listeners.resolve(sequence, Err(err));
                }
            }
        }
    }

    async fn handle_frame(&self, buf: &[u8]) {
        let message = match Message::decode(buf, &self.cipher) {
            Ok(message) => message,
            Err(e) if e.is_framing() => {
                debug!(device_id = %self.config.device_id, error = %e, "Invalid message");
                return;
            }
            Err(e) => {
                debug!(device_id = %self.config.device_id, error = %e, "Failed to decode message");
                return;
            }
        };

        debug!(device_id = %self.config.device_id, "Received {}", message);

        if let Some(waiter) = self.listeners.take(message.sequence) {
            // A waiter that already gave up is not an error
            let _ = waiter.send(Ok(message));
            return;
        }

        match message.command {
            Command::Ping => self.session.record_pong(),
            Command::GratuitousUpdate => {
                if let Some(dps) = message.datapoints() {
                    let snapshot = self.merge(dps);
                    self.notify(&snapshot).await;
                }
            }
            command => trace!(
                device_id = %self.config.device_id,
                sequence = message.sequence,
                %command,
                "Dropping unsolicited message"
            ),
        }
    }

    fn merge(&self, update: &Map<String, Value>) -> Datapoints {
        let mut state = self.state.write();
        let changed = state.merge(update);

        debug!(device_id = %self.config.device_id, ?changed, "Updated state");
        state.clone()
    }

    async fn notify(&self, snapshot: &Datapoints) {
        let observers = self.observers.read().clone();

        for observer in observers {
            observer.state_updated(&self.config.device_id, snapshot).await;
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_dispatcher(device: Weak<Inner>, shutdown: CancellationToken) {
    loop {
        let interval = {
            let Some(inner) = device.upgrade() else {
                break;
            };
            if inner.session.is_disabled() {
                break;
            }

            inner.dispatch_one().await;
            inner.backoff.lock().interval()
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }

    trace!("Dispatcher stopped");
}

async fn run_keepalive(device: Weak<Inner>, shutdown: CancellationToken, interval: Duration) {
    loop {
        {
            let Some(inner) = device.upgrade() else {
                break;
            };
            if inner.session.is_disabled() {
                break;
            }

            if inner.backoff.lock().is_backing_off() {
                debug!(device_id = %inner.config.device_id, "Currently in backoff, not queueing ping");
            } else {
                inner.session.record_ping();
                inner.enqueue(
                    Message::new(Command::Ping, 0),
                    !inner.config.version.is_legacy(),
                    false,
                );
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(interval) => {}
        }

        let Some(inner) = device.upgrade() else {
            break;
        };
        if inner.session.is_stale() {
            debug!(device_id = %inner.config.device_id, "No pong since last ping");
            inner.teardown(None).await;
        }
    }

    trace!("Keepalive stopped");
}

async fn run_reader(
    device: Weak<Inner>,
    mut reader: FrameReader,
    cancel: CancellationToken,
    generation: u64,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = reader.next_frame() => frame,
        };

        let Some(inner) = device.upgrade() else {
            break;
        };

        match frame {
            Some(Ok(buf)) => inner.handle_frame(&buf).await,
            Some(Err(e)) => {
                if e.is_reset() {
                    debug!(device_id = %inner.config.device_id, error = %e, "Connection reset by device");
                } else {
                    warn!(device_id = %inner.config.device_id, error = %e, "Read failed");
                }
                inner.teardown(Some(generation)).await;
                break;
            }
            None => {
                debug!(device_id = %inner.config.device_id, "Connection closed by device");
                inner.teardown(Some(generation)).await;
                break;
            }
        }
    }

    trace!(generation, "Reader stopped");
}
