use std::time::Duration;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Routes library logs to the test harness. Filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn bind_server(config: skiff::server::Config) -> skiff::Server {
    init_tracing();

    skiff::Server::bind_with_config(("127.0.0.1", 0), config)
        .expect("failed to create skiff server")
}

pub fn wait_server_connect(server: &mut skiff::Server) -> skiff::Connection {
    match server.wait_event_timeout(EVENT_TIMEOUT) {
        Some(skiff::ServerEvent::Connect(peer)) => peer,
        other => panic!("expected connect event, got {:?}", other),
    }
}

pub fn wait_client_connect(client: &mut skiff::Client) {
    match client.wait_event_timeout(EVENT_TIMEOUT) {
        Some(skiff::ClientEvent::Connect) => (),
        other => panic!("expected connect event, got {:?}", other),
    }
}

/// Starts a server and connects a single client to it. Returns the server, the server's handle
/// for the client's connection, and the client.
pub fn connected_pair(
    server_config: skiff::server::Config,
    client_config: skiff::client::Config,
) -> (skiff::Server, skiff::Connection, skiff::Client) {
    let mut server = bind_server(server_config);

    let mut client = skiff::Client::connect_with_config(server.local_addr(), client_config)
        .expect("failed to create skiff client");

    let peer = wait_server_connect(&mut server);
    wait_client_connect(&mut client);

    assert_eq!(peer.peer_addr().port(), client.local_addr().port());

    (server, peer, client)
}

/// A reliable Hello, built by hand: checksum, reliable channel, Hello kind, sequence 0.
pub fn raw_hello() -> Vec<u8> {
    const CRC64: crc::Crc<u64> = crc::Crc::<u64>::new(&crc::CRC_64_ECMA_182);

    let mut packet = vec![0u8; 8];
    packet.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);

    let checksum = CRC64.checksum(&packet[8..]);
    packet[..8].copy_from_slice(&checksum.to_be_bytes());

    packet
}
