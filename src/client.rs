use std::net;
use std::sync::Arc;
use std::thread;
use std::time;

use crate::connection::{self, Connection, EventQueue};
use crate::endpoint::{self, State, Stats};
use crate::epoch::Epoch;
use crate::error::{Result, SendError};
use crate::socket;
use crate::socket::DatagramTx;
use crate::ticker::CancellationToken;
use crate::{Channel, DisconnectCause};

/// Configuration for a [`Client`] object.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Configuration of the connection to the server.
    pub connection: endpoint::Config,
}

/// Represents a client event.
#[derive(Debug)]
pub enum Event {
    /// Produced when a connection to the server has been established.
    Connect,
    /// Produced once, when the connection closes for any reason.
    Disconnect(DisconnectCause),
    /// Produced when a message has been received.
    Receive(Channel, Box<[u8]>),
}

impl From<connection::Event> for Event {
    fn from(event: connection::Event) -> Self {
        match event {
            connection::Event::Connect(_) => Event::Connect,
            connection::Event::Disconnect(_, cause) => Event::Disconnect(cause),
            connection::Event::Receive(_, channel, payload) => Event::Receive(channel, payload),
        }
    }
}

/// A skiff client connection.
pub struct Client {
    // Connection to the server
    connection: Connection,
    // Queue of pending events
    events: Arc<EventQueue>,
    // Cached from socket initialization
    local_addr: net::SocketAddr,
    // Stops the receive thread
    receiver_token: CancellationToken,
    receiver_waker: socket::Waker,
    receiver: Option<thread::JoinHandle<()>>,
}

fn run(
    connection: &Connection,
    socket_rx: &mut socket::ConnectedSocketRx,
    token: &CancellationToken,
) {
    while !token.is_cancelled() {
        match socket_rx.wait_for_frame(None) {
            Ok(Some(frame_bytes)) => {
                connection.handle_datagram(frame_bytes);

                // Process any further frames without blocking
                while let Ok(Some(frame_bytes)) = socket_rx.try_read_frame() {
                    connection.handle_datagram(frame_bytes);
                }
            }
            Ok(None) => (),
            Err(err) => {
                tracing::trace!("socket receive failed: {}", err);
            }
        }
    }
}

impl Client {
    /// Equivalent to calling [`Client::connect_with_config`] with default configuration.
    pub fn connect<A>(server_addr: A) -> Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        Self::connect_with_config(server_addr, Default::default())
    }

    /// Binds a UDP socket to an ephemeral address, initiates a connection to a server at the
    /// provided address, and returns a new client object. Errors encountered during socket
    /// initialization are forwarded to the caller.
    ///
    /// The connection is established asynchronously; [`Event::Connect`] is produced once the
    /// server has answered.
    pub fn connect_with_config<A>(server_addr: A, config: Config) -> Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        config.connection.validate()?;

        let bind_address = (net::Ipv4Addr::UNSPECIFIED, 0);

        let (socket_tx, mut socket_rx) =
            socket::new_connected(bind_address, server_addr, config.connection.mtu)?;

        let events = Arc::new(EventQueue::default());

        let socket_tx = Arc::new(socket_tx) as Arc<dyn DatagramTx>;

        let connection = Connection::create(
            socket_rx.peer_addr(),
            &config.connection,
            Epoch::default(),
            socket_tx,
            Arc::clone(&events),
        )?;

        let local_addr = socket_rx.local_addr();
        let receiver_waker = socket_rx.waker();
        let receiver_token = CancellationToken::new();

        let token = receiver_token.clone();
        let receiver_connection = connection.clone();

        let receiver = thread::Builder::new()
            .name(format!("skiff-client {}", local_addr))
            .spawn(move || run(&receiver_connection, &mut socket_rx, &token))?;

        Ok(Self {
            connection,
            events,
            local_addr,
            receiver_token,
            receiver_waker,
            receiver: Some(receiver),
        })
    }

    /// Returns the next event immediately, if one is available.
    ///
    /// Returns `None` if no events are available.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop().map(Event::from)
    }

    /// Blocks until an event is available, and returns it.
    pub fn wait_event(&mut self) -> Event {
        self.events.wait().into()
    }

    /// Blocks until an event is available, and returns it. Waits for a maximum duration of
    /// `timeout`.
    ///
    /// Returns `None` if no events were available within `timeout`.
    pub fn wait_event_timeout(&mut self, timeout: time::Duration) -> Option<Event> {
        self.events.wait_timeout(timeout).map(Event::from)
    }

    /// Sends a message on the reliable channel, blocking while the send window is full. See
    /// [`Connection::send_reliable`].
    pub fn send_reliable(&self, payload: &[u8]) -> std::result::Result<(), SendError> {
        self.connection.send_reliable(payload)
    }

    /// Sends a message on the reliable channel without blocking. See
    /// [`Connection::try_send_reliable`].
    pub fn try_send_reliable(&self, payload: &[u8]) -> std::result::Result<(), SendError> {
        self.connection.try_send_reliable(payload)
    }

    /// Sends a message on the unreliable channel.
    pub fn send_unreliable(&self, payload: &[u8]) -> std::result::Result<(), SendError> {
        self.connection.send_unreliable(payload)
    }

    /// Disconnects gracefully. No more messages will be sent or received once this function has
    /// been called.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    pub fn state(&self) -> State {
        self.connection.state()
    }

    pub fn stats(&self) -> Stats {
        self.connection.stats()
    }

    /// Returns a handle to the underlying connection, which may be used from other threads.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns the local address of the internal UDP socket.
    pub fn local_addr(&self) -> net::SocketAddr {
        self.local_addr
    }

    /// Returns the server address for this connection.
    pub fn server_addr(&self) -> net::SocketAddr {
        self.connection.peer_addr()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.connection.disconnect();

        self.receiver_token.cancel();
        self.receiver_waker.wake();

        if let Some(receiver) = self.receiver.take() {
            if receiver.join().is_err() {
                tracing::warn!("client receive thread panicked");
            }
        }

        // Pending events hold connection handles
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Error;

    #[test]
    fn invalid_config() {
        let config = Config {
            connection: endpoint::Config {
                mtu: 16,
                ..Default::default()
            },
        };

        assert!(matches!(
            Client::connect_with_config("127.0.0.1:9", config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn unanswered_hello_times_out() {
        let silent = net::UdpSocket::bind("127.0.0.1:0").unwrap();

        let config = Config {
            connection: endpoint::Config {
                idle_timeout_ms: 300,
                ..Default::default()
            },
        };

        let mut client = Client::connect_with_config(silent.local_addr().unwrap(), config).unwrap();

        match client.wait_event_timeout(time::Duration::from_secs(5)) {
            Some(Event::Disconnect(DisconnectCause::Timeout)) => (),
            other => panic!("unexpected event {:?}", other),
        }

        assert_eq!(client.state(), State::Closed(DisconnectCause::Timeout));
        assert_eq!(client.send_reliable(b"late"), Err(SendError::SendAfterClose));
    }
}
