use std::io;
use std::net;
use std::sync::Arc;
use std::time;

const SOCKET_POLLING_KEY: usize = 0;

/// The sending half of a socket, shared by every connection using it.
pub trait DatagramTx: Send + Sync {
    /// Sends a datagram to `addr`. A full socket buffer is reported as success, since the datagram
    /// is simply lost and the reliable channel recovers from loss.
    fn send_to(&self, bytes: &[u8], addr: &net::SocketAddr) -> io::Result<()>;
}

/// Wakes a thread blocked in `wait_for_frame`.
#[derive(Clone)]
pub struct Waker {
    poller: Arc<polling::Poller>,
}

impl Waker {
    pub fn wake(&self) {
        // A failed notification leaves the waiter to its own timeout
        let _ = self.poller.notify();
    }
}

pub struct SocketTx {
    // Reference to non-blocking server socket
    socket: Arc<net::UdpSocket>,
}

pub struct SocketRx {
    // Reference to non-blocking server socket
    socket: Arc<net::UdpSocket>,
    // Cached from socket initialization
    local_addr: net::SocketAddr,
    // Polling objects
    poller: Arc<polling::Poller>,
    poller_events: polling::Events,
    // Always-allocated receive buffer
    recv_buffer: Box<[u8]>,
}

pub struct ConnectedSocketTx {
    // Reference to non-blocking client socket
    socket: Arc<net::UdpSocket>,
}

pub struct ConnectedSocketRx {
    // Reference to non-blocking client socket
    socket: Arc<net::UdpSocket>,
    // Cached from socket initialization
    local_addr: net::SocketAddr,
    peer_addr: net::SocketAddr,
    // Polling objects
    poller: Arc<polling::Poller>,
    poller_events: polling::Events,
    // Always-allocated receive buffer
    recv_buffer: Box<[u8]>,
}

fn filter_send_result(result: io::Result<usize>) -> io::Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
        Err(err) => Err(err),
    }
}

fn filter_recv_result<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) => match err.kind() {
            // The only acceptable error is WouldBlock, indicating no packet
            io::ErrorKind::WouldBlock => Ok(None),
            _ => Err(err),
        },
    }
}

impl DatagramTx for SocketTx {
    fn send_to(&self, bytes: &[u8], addr: &net::SocketAddr) -> io::Result<()> {
        filter_send_result(self.socket.send_to(bytes, addr))
    }
}

impl SocketRx {
    /// If a datagram can be read from the socket, returns it. Returns Ok(None) otherwise.
    pub fn try_read_frame(&mut self) -> io::Result<Option<(&[u8], net::SocketAddr)>> {
        let received = filter_recv_result(self.socket.recv_from(&mut self.recv_buffer))?;

        Ok(received.map(|(frame_len, sender_addr)| (&self.recv_buffer[..frame_len], sender_addr)))
    }

    /// Blocks for a duration of up to `timeout` for an incoming datagram and returns it. Returns
    /// Ok(None) if no datagram arrived in the alloted time, or if the wait was interrupted by a
    /// [`Waker`].
    pub fn wait_for_frame(
        &mut self,
        timeout: Option<time::Duration>,
    ) -> io::Result<Option<(&[u8], net::SocketAddr)>> {
        // Wait for a readable event (must be done prior to each wait() call)
        self.poller
            .modify(&*self.socket, polling::Event::readable(SOCKET_POLLING_KEY))?;

        self.poller_events.clear();

        let n = self.poller.wait(&mut self.poller_events, timeout)?;

        if n > 0 {
            self.try_read_frame()
        } else {
            Ok(None)
        }
    }

    pub fn waker(&self) -> Waker {
        Waker {
            poller: Arc::clone(&self.poller),
        }
    }

    pub fn local_addr(&self) -> net::SocketAddr {
        self.local_addr
    }
}

pub fn new<A>(bind_address: A, frame_size_max: usize) -> io::Result<(SocketTx, SocketRx)>
where
    A: net::ToSocketAddrs,
{
    let socket = net::UdpSocket::bind(bind_address)?;
    socket.set_nonblocking(true)?;

    let local_addr = socket.local_addr()?;

    let poller = polling::Poller::new()?;

    unsafe {
        poller.add(&socket, polling::Event::readable(SOCKET_POLLING_KEY))?;
    }

    let socket_rc = Arc::new(socket);

    let tx = SocketTx {
        socket: Arc::clone(&socket_rc),
    };

    let rx = SocketRx {
        socket: socket_rc,
        local_addr,
        poller: Arc::new(poller),
        poller_events: polling::Events::new(),
        recv_buffer: vec![0; frame_size_max].into_boxed_slice(),
    };

    Ok((tx, rx))
}

impl DatagramTx for ConnectedSocketTx {
    // The socket is connected, so the address is implied
    fn send_to(&self, bytes: &[u8], _addr: &net::SocketAddr) -> io::Result<()> {
        filter_send_result(self.socket.send(bytes))
    }
}

impl ConnectedSocketRx {
    /// If a datagram can be read from the socket, returns it. Returns Ok(None) otherwise.
    pub fn try_read_frame(&mut self) -> io::Result<Option<&[u8]>> {
        let received = filter_recv_result(self.socket.recv(&mut self.recv_buffer))?;

        Ok(received.map(|frame_len| &self.recv_buffer[..frame_len]))
    }

    /// Blocks for a duration of up to `timeout` for an incoming datagram and returns it. Returns
    /// Ok(None) if no datagram arrived in the alloted time, or if the wait was interrupted by a
    /// [`Waker`].
    pub fn wait_for_frame(&mut self, timeout: Option<time::Duration>) -> io::Result<Option<&[u8]>> {
        // Wait for a readable event (must be done prior to each wait() call)
        self.poller
            .modify(&*self.socket, polling::Event::readable(SOCKET_POLLING_KEY))?;

        self.poller_events.clear();

        let n = self.poller.wait(&mut self.poller_events, timeout)?;

        if n > 0 {
            self.try_read_frame()
        } else {
            Ok(None)
        }
    }

    pub fn waker(&self) -> Waker {
        Waker {
            poller: Arc::clone(&self.poller),
        }
    }

    pub fn local_addr(&self) -> net::SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> net::SocketAddr {
        self.peer_addr
    }
}

pub fn new_connected<A, B>(
    bind_address: A,
    connect_address: B,
    frame_size_max: usize,
) -> io::Result<(ConnectedSocketTx, ConnectedSocketRx)>
where
    A: net::ToSocketAddrs,
    B: net::ToSocketAddrs,
{
    let socket = net::UdpSocket::bind(bind_address)?;
    socket.set_nonblocking(true)?;
    socket.connect(connect_address)?;

    let local_addr = socket.local_addr()?;
    let peer_addr = socket.peer_addr()?;

    let poller = polling::Poller::new()?;

    unsafe {
        poller.add(&socket, polling::Event::readable(SOCKET_POLLING_KEY))?;
    }

    let socket_rc = Arc::new(socket);

    let tx = ConnectedSocketTx {
        socket: Arc::clone(&socket_rc),
    };

    let rx = ConnectedSocketRx {
        socket: socket_rc,
        local_addr,
        peer_addr,
        poller: Arc::new(poller),
        poller_events: polling::Events::new(),
        recv_buffer: vec![0; frame_size_max].into_boxed_slice(),
    };

    Ok((tx, rx))
}
