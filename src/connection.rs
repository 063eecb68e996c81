use std::collections::VecDeque;
use std::fmt;
use std::hash;
use std::io;
use std::net;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::endpoint::{self, Endpoint, HostContext, State, Stats};
use crate::epoch::Epoch;
use crate::error::SendError;
use crate::socket::DatagramTx;
use crate::ticker::{self, CancellationToken};
use crate::{Channel, DisconnectCause};

/// Represents a connection event.
#[derive(Debug)]
pub enum Event {
    /// Produced when the handshake with a peer has completed.
    Connect(Connection),
    /// Produced once, when a connection closes for any reason.
    Disconnect(Connection, DisconnectCause),
    /// Produced when a message has been received.
    Receive(Connection, Channel, Box<[u8]>),
}

/// Queue of events shared between connections and the server or client which owns them.
#[derive(Default)]
pub(crate) struct EventQueue {
    events: Mutex<VecDeque<Event>>,
    ready: Condvar,
}

impl EventQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: Event) {
        self.lock().push_back(event);
        self.ready.notify_all();
    }

    pub fn pop(&self) -> Option<Event> {
        self.lock().pop_front()
    }

    pub fn wait(&self) -> Event {
        let mut events = self.lock();

        loop {
            if let Some(event) = events.pop_front() {
                return event;
            }

            events = self
                .ready
                .wait(events)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Event> {
        let events = self.lock();

        let (mut events, _) = self
            .ready
            .wait_timeout_while(events, timeout, |events| events.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        events.pop_front()
    }

    /// Discards pending events, releasing the connection handles they hold.
    pub fn clear(&self) {
        let events = std::mem::take(&mut *self.lock());

        drop(events);
    }
}

struct Core {
    // Protocol state
    endpoint: Endpoint,
    // Source of timestamps, shared with sibling connections
    epoch: Epoch,
    // Socket send handle
    socket_tx: Arc<dyn DatagramTx>,
    // Destination of connection events
    events: Arc<EventQueue>,
}

struct Shared {
    core: Mutex<Core>,
    // Signalled when acknowledgements free send window space, or the connection closes
    writable: Condvar,
    // Remote address
    addr: net::SocketAddr,
    // Stops the tick thread
    ticker: CancellationToken,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.ticker.cancel();
    }
}

struct EndpointContext<'a> {
    shared: &'a Arc<Shared>,
    socket_tx: &'a dyn DatagramTx,
    events: &'a EventQueue,
}

impl<'a> EndpointContext<'a> {
    fn handle(&self) -> Connection {
        Connection {
            shared: Arc::clone(self.shared),
        }
    }
}

impl<'a> HostContext for EndpointContext<'a> {
    fn send_datagram(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.socket_tx.send_to(bytes, &self.shared.addr)
    }

    fn on_connect(&mut self) {
        self.events.push(Event::Connect(self.handle()));
    }

    fn on_disconnect(&mut self, cause: DisconnectCause) {
        self.events.push(Event::Disconnect(self.handle(), cause));
    }

    fn on_receive(&mut self, channel: Channel, payload: Box<[u8]>) {
        self.events.push(Event::Receive(self.handle(), channel, payload));
    }
}

/// A handle to a connection with a remote peer. Handles are cheap to clone, and all clones refer
/// to the same connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Creates a connection to `addr`, sends a Hello, and starts its tick thread.
    pub(crate) fn create(
        addr: net::SocketAddr,
        config: &endpoint::Config,
        epoch: Epoch,
        socket_tx: Arc<dyn DatagramTx>,
        events: Arc<EventQueue>,
    ) -> io::Result<Self> {
        let core = Core {
            endpoint: Endpoint::new(config, epoch.now_ms()),
            epoch,
            socket_tx,
            events,
        };

        let connection = Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                writable: Condvar::new(),
                addr,
                ticker: CancellationToken::new(),
            }),
        };

        connection.with_endpoint(|endpoint, now_ms, ctx| endpoint.open(now_ms, ctx));

        // The tick thread must not keep the connection alive
        let weak = Arc::downgrade(&connection.shared);

        ticker::spawn(
            format!("skiff-tick {}", addr),
            connection.shared.ticker.clone(),
            move || {
                let shared = weak.upgrade()?;
                Connection { shared }.tick()
            },
        )?;

        Ok(connection)
    }

    /// Creates a connection to `addr` in response to its first datagram, which is processed
    /// immediately.
    pub(crate) fn accept(
        addr: net::SocketAddr,
        first_datagram: &[u8],
        config: &endpoint::Config,
        epoch: Epoch,
        socket_tx: Arc<dyn DatagramTx>,
        events: Arc<EventQueue>,
    ) -> io::Result<Self> {
        let connection = Self::create(addr, config, epoch, socket_tx, events)?;

        connection.handle_datagram(first_datagram);

        Ok(connection)
    }

    fn with_endpoint<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Endpoint, u64, &mut EndpointContext) -> R,
    {
        let mut core = self.shared.lock();

        let result = Self::with_core(&self.shared, &mut core, f);

        let closed = core.endpoint.is_closed();

        drop(core);

        if closed {
            self.shared.ticker.cancel();
        }

        self.shared.writable.notify_all();

        result
    }

    fn with_core<F, R>(shared: &Arc<Shared>, core: &mut Core, f: F) -> R
    where
        F: FnOnce(&mut Endpoint, u64, &mut EndpointContext) -> R,
    {
        let Core {
            endpoint,
            epoch,
            socket_tx,
            events,
        } = core;

        let mut ctx = EndpointContext {
            shared,
            socket_tx: &**socket_tx,
            events: &**events,
        };

        f(endpoint, epoch.now_ms(), &mut ctx)
    }

    pub(crate) fn handle_datagram(&self, bytes: &[u8]) {
        self.with_endpoint(|endpoint, now_ms, ctx| endpoint.handle_datagram(bytes, now_ms, ctx));
    }

    // Returns the delay until the next tick, or None once closed
    fn tick(&self) -> Option<Duration> {
        self.with_endpoint(|endpoint, now_ms, ctx| {
            endpoint.tick(now_ms, ctx);
            endpoint.next_tick_delay_ms(now_ms).map(Duration::from_millis)
        })
    }

    /// Sends a message on the reliable channel. If the send window cannot hold the message, blocks
    /// until acknowledgements free enough space.
    ///
    /// Fails with [`SendError::SendAfterClose`] if the connection is closed, including while
    /// waiting. Fails with [`SendError::MessageTooLarge`] if the message could never fit in the send
    /// window.
    pub fn send_reliable(&self, payload: &[u8]) -> Result<(), SendError> {
        let mut core = self.shared.lock();

        loop {
            let result = Self::with_core(&self.shared, &mut core, |endpoint, now_ms, ctx| {
                endpoint.send_reliable(payload, now_ms, ctx)
            });

            match result {
                Err(SendError::WouldBlock) => {
                    core = self
                        .shared
                        .writable
                        .wait(core)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                result => {
                    let closed = core.endpoint.is_closed();

                    drop(core);

                    if closed {
                        self.shared.ticker.cancel();
                    }

                    return result;
                }
            }
        }
    }

    /// Sends a message on the reliable channel, failing with [`SendError::WouldBlock`] instead of
    /// waiting for space in the send window.
    pub fn try_send_reliable(&self, payload: &[u8]) -> Result<(), SendError> {
        self.with_endpoint(|endpoint, now_ms, ctx| endpoint.send_reliable(payload, now_ms, ctx))
    }

    /// Sends a message on the unreliable channel. Messages sent before the handshake completes are
    /// held and sent once it does.
    pub fn send_unreliable(&self, payload: &[u8]) -> Result<(), SendError> {
        self.with_endpoint(|endpoint, _, ctx| endpoint.send_unreliable(payload, ctx))
    }

    /// Disconnects gracefully. Blocked senders are released, and no more messages will be sent or
    /// received once this function has been called.
    pub fn disconnect(&self) {
        self.with_endpoint(|endpoint, _, ctx| endpoint.disconnect(ctx));
    }

    pub fn state(&self) -> State {
        self.shared.lock().endpoint.state()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().endpoint.is_closed()
    }

    /// Returns traffic counters for this connection.
    pub fn stats(&self) -> Stats {
        self.shared.lock().endpoint.stats()
    }

    /// Returns the current retransmission timeout.
    pub fn rto(&self) -> Duration {
        Duration::from_millis(self.shared.lock().endpoint.rto_ms())
    }

    pub fn peer_addr(&self) -> net::SocketAddr {
        self.shared.addr
    }

    #[cfg(test)]
    fn unacknowledged(&self) -> usize {
        self.shared.lock().endpoint.unacknowledged()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Connection {}

impl hash::Hash for Connection {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.shared).hash(state);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.shared.addr)
            .finish()
    }
}
