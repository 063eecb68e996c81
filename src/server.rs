use std::collections::HashMap;
use std::net;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time;

use crate::connection::{Connection, EventQueue};
use crate::endpoint;
use crate::epoch::Epoch;
use crate::error::{Error, Result};
use crate::frame::serial;
use crate::socket;
use crate::socket::DatagramTx;
use crate::ticker::CancellationToken;

pub use crate::connection::Event;

const PEER_COUNT_MAX_DEFAULT: usize = 4096;
const PEER_COUNT_MAX_MAX: usize = 65536;

/// Configuration for a [`Server`] object.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum number of clients which may be connected at any given time.
    ///
    /// Minimum value: 1 \
    /// Maximum value: 65,536 \
    /// Default value: 4,096
    pub peer_count_max: usize,

    /// Configuration applied to each accepted connection.
    pub connection: endpoint::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            peer_count_max: PEER_COUNT_MAX_DEFAULT,
            connection: Default::default(),
        }
    }
}

impl Config {
    fn validate(&self) -> Result<()> {
        if !(1..=PEER_COUNT_MAX_MAX).contains(&self.peer_count_max) {
            return Err(Error::InvalidConfig(format!(
                "peer_count_max must lie within 1..={}",
                PEER_COUNT_MAX_MAX
            )));
        }

        self.connection.validate()
    }
}

type PeerTable = Arc<Mutex<HashMap<net::SocketAddr, Connection>>>;

fn lock_peers(peers: &PeerTable) -> MutexGuard<'_, HashMap<net::SocketAddr, Connection>> {
    peers.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ServerCore {
    // Saved configuration
    config: Config,
    // Source of integer timestamps
    epoch: Epoch,
    // Socket send handle
    socket_tx: Arc<socket::SocketTx>,
    // Table of connected peers
    peers: PeerTable,
    // Queue of pending events
    events: Arc<EventQueue>,
}

impl ServerCore {
    fn accept(&self, frame_bytes: &[u8], sender_addr: &net::SocketAddr) {
        // Connections are only created in response to an intact Hello
        if !serial::is_hello(frame_bytes) {
            return;
        }

        let mut peers = lock_peers(&self.peers);

        if peers.len() >= self.config.peer_count_max {
            tracing::debug!("peer table full, ignoring hello from {}", sender_addr);
            return;
        }

        let socket_tx = Arc::clone(&self.socket_tx) as Arc<dyn DatagramTx>;

        let result = Connection::accept(
            *sender_addr,
            frame_bytes,
            &self.config.connection,
            self.epoch,
            socket_tx,
            Arc::clone(&self.events),
        );

        match result {
            Ok(connection) => {
                tracing::debug!("accepted peer {}", sender_addr);
                peers.insert(*sender_addr, connection);
            }
            Err(err) => {
                tracing::warn!("failed to accept peer {}: {}", sender_addr, err);
            }
        }
    }

    fn handle_frame(&self, frame_bytes: &[u8], sender_addr: &net::SocketAddr) {
        let known = lock_peers(&self.peers).get(sender_addr).cloned();

        if let Some(connection) = known {
            if !connection.is_closed() {
                connection.handle_datagram(frame_bytes);
                return;
            }

            // The address is free for a new connection
            lock_peers(&self.peers).remove(sender_addr);
        }

        self.accept(frame_bytes, sender_addr);
    }

    /// Reads and processes as many frames as possible from socket_rx without blocking.
    fn handle_frames(&self, socket_rx: &mut socket::SocketRx) {
        while let Ok(Some((frame_bytes, sender_addr))) = socket_rx.try_read_frame() {
            self.handle_frame(frame_bytes, &sender_addr);
        }
    }

    /// Reads and processes frames until `token` is cancelled.
    fn run(&self, socket_rx: &mut socket::SocketRx, token: &CancellationToken) {
        while !token.is_cancelled() {
            match socket_rx.wait_for_frame(None) {
                Ok(Some((frame_bytes, sender_addr))) => {
                    self.handle_frame(frame_bytes, &sender_addr);
                    // Process any further frames without blocking
                    self.handle_frames(socket_rx);
                }
                Ok(None) => (),
                Err(err) => {
                    tracing::trace!("socket receive failed: {}", err);
                }
            }
        }
    }
}

/// A skiff server.
pub struct Server {
    // Table of connected peers
    peers: PeerTable,
    // Queue of pending events
    events: Arc<EventQueue>,
    // Cached from socket initialization
    local_addr: net::SocketAddr,
    // Stops the receive thread
    receiver_token: CancellationToken,
    receiver_waker: socket::Waker,
    receiver: Option<thread::JoinHandle<()>>,
}

impl Server {
    /// Equivalent to calling [`Server::bind_with_config`] with default configuration.
    pub fn bind<A>(bind_addr: A) -> Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        Self::bind_with_config(bind_addr, Default::default())
    }

    /// Binds a UDP socket at the provided address, and returns a new server object. Received
    /// datagrams are processed on a background thread. Errors encountered during socket
    /// initialization are forwarded to the caller.
    pub fn bind_with_config<A>(bind_addr: A, config: Config) -> Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        config.validate()?;

        let (socket_tx, mut socket_rx) = socket::new(bind_addr, config.connection.mtu)?;

        let peers = PeerTable::default();
        let events = Arc::new(EventQueue::default());

        let core = ServerCore {
            config,
            epoch: Epoch::default(),
            socket_tx: Arc::new(socket_tx),
            peers: Arc::clone(&peers),
            events: Arc::clone(&events),
        };

        let local_addr = socket_rx.local_addr();
        let receiver_waker = socket_rx.waker();
        let receiver_token = CancellationToken::new();

        let token = receiver_token.clone();

        let receiver = thread::Builder::new()
            .name(format!("skiff-server {}", local_addr))
            .spawn(move || core.run(&mut socket_rx, &token))?;

        Ok(Self {
            peers,
            events,
            local_addr,
            receiver_token,
            receiver_waker,
            receiver: Some(receiver),
        })
    }

    // Forgets peers as their disconnections are reported
    fn retire(&self, event: Event) -> Event {
        if let Event::Disconnect(connection, _) = &event {
            let addr = connection.peer_addr();
            let mut peers = lock_peers(&self.peers);

            if peers.get(&addr) == Some(connection) {
                peers.remove(&addr);
            }
        }

        event
    }

    /// Returns the next event immediately, if one is available.
    ///
    /// Returns `None` if no events are available.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop().map(|event| self.retire(event))
    }

    /// Blocks until an event is available, and returns it.
    pub fn wait_event(&mut self) -> Event {
        let event = self.events.wait();

        self.retire(event)
    }

    /// Blocks until an event is available, and returns it. Waits for a maximum duration of
    /// `timeout`.
    ///
    /// Returns `None` if no events were available within `timeout`.
    pub fn wait_event_timeout(&mut self, timeout: time::Duration) -> Option<Event> {
        self.events.wait_timeout(timeout).map(|event| self.retire(event))
    }

    /// Returns the local address of the internal UDP socket.
    pub fn local_addr(&self) -> net::SocketAddr {
        self.local_addr
    }

    /// Returns the number of peers in the peer table.
    ///
    /// *Note*: Peers remain in the peer table until their disconnect event has been returned.
    pub fn peer_count(&self) -> usize {
        lock_peers(&self.peers).len()
    }

    /// Returns a handle to the connection with the peer at `addr`, if one exists.
    pub fn peer(&self, addr: &net::SocketAddr) -> Option<Connection> {
        lock_peers(&self.peers).get(addr).cloned()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.receiver_token.cancel();
        self.receiver_waker.wake();

        if let Some(receiver) = self.receiver.take() {
            if receiver.join().is_err() {
                tracing::warn!("server receive thread panicked");
            }
        }

        let peers = std::mem::take(&mut *lock_peers(&self.peers));

        for connection in peers.values() {
            connection.disconnect();
        }

        // Pending events hold connection handles
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::frame::{checksum, PacketHeader, ReliableHeader, ReliableKind};

    const EVENT_TIMEOUT: time::Duration = time::Duration::from_secs(5);

    fn hello() -> Vec<u8> {
        let header = PacketHeader::Reliable(ReliableHeader {
            kind: ReliableKind::Hello,
            sequence: 0,
        });

        let mut buffer = vec![0; serial::RELIABLE_HEADER_SIZE];
        let len = serial::encode(&header, &[], &mut buffer);
        buffer.truncate(len);
        checksum::seal(&mut buffer);

        buffer
    }

    fn raw_socket() -> net::UdpSocket {
        net::UdpSocket::bind("127.0.0.1:0").unwrap()
    }

    #[test]
    fn invalid_config() {
        let config = Config {
            peer_count_max: 0,
            ..Default::default()
        };

        assert!(matches!(
            Server::bind_with_config("127.0.0.1:0", config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn accepts_only_hello() {
        let mut server = Server::bind("127.0.0.1:0").unwrap();
        let socket = raw_socket();

        // Intact unreliable datagram, then a corrupted Hello
        let mut unreliable = vec![0; serial::UNRELIABLE_HEADER_SIZE + 3];
        unreliable[8] = 0x01;
        checksum::seal(&mut unreliable);
        socket.send_to(&unreliable, server.local_addr()).unwrap();

        let mut corrupted = hello();
        corrupted[10] ^= 0x01;
        socket.send_to(&corrupted, server.local_addr()).unwrap();

        assert!(server.wait_event_timeout(time::Duration::from_millis(200)).is_none());
        assert_eq!(server.peer_count(), 0);

        socket.send_to(&hello(), server.local_addr()).unwrap();

        match server.wait_event_timeout(EVENT_TIMEOUT) {
            Some(Event::Connect(connection)) => {
                assert_eq!(connection.peer_addr(), socket.local_addr().unwrap());
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(server.peer_count(), 1);
    }

    #[test]
    fn peer_count_limit() {
        let config = Config {
            peer_count_max: 1,
            ..Default::default()
        };
        let mut server = Server::bind_with_config("127.0.0.1:0", config).unwrap();

        let first = raw_socket();
        let second = raw_socket();

        first.send_to(&hello(), server.local_addr()).unwrap();
        assert!(matches!(server.wait_event_timeout(EVENT_TIMEOUT), Some(Event::Connect(_))));

        second.send_to(&hello(), server.local_addr()).unwrap();
        assert!(server.wait_event_timeout(time::Duration::from_millis(200)).is_none());

        assert_eq!(server.peer_count(), 1);
        assert!(server.peer(&first.local_addr().unwrap()).is_some());
        assert!(server.peer(&second.local_addr().unwrap()).is_none());
    }
}
