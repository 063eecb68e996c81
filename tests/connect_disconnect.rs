#[allow(dead_code)]
mod common;

use std::thread;
use std::time::Duration;

use common::EVENT_TIMEOUT;

#[test]
fn connect_disconnect() {
    let (mut server, peer, mut client) =
        common::connected_pair(Default::default(), Default::default());

    assert_eq!(client.state(), skiff::ConnectionState::Connected);
    assert_eq!(peer.state(), skiff::ConnectionState::Connected);
    assert_eq!(server.peer_count(), 1);

    client.disconnect();

    match client.wait_event_timeout(EVENT_TIMEOUT) {
        Some(skiff::ClientEvent::Disconnect(skiff::DisconnectCause::Local)) => (),
        other => panic!("expected local disconnect, got {:?}", other),
    }

    match server.wait_event_timeout(EVENT_TIMEOUT) {
        Some(skiff::ServerEvent::Disconnect(closed, skiff::DisconnectCause::PeerClosed)) => {
            assert_eq!(closed, peer);
        }
        other => panic!("expected peer disconnect, got {:?}", other),
    }

    // Each side reports exactly one disconnect
    assert!(client.wait_event_timeout(Duration::from_millis(200)).is_none());
    assert!(server.wait_event_timeout(Duration::from_millis(200)).is_none());

    assert_eq!(server.peer_count(), 0);
}

#[test]
fn server_disconnects_client() {
    let (mut server, peer, mut client) =
        common::connected_pair(Default::default(), Default::default());

    peer.disconnect();

    match server.wait_event_timeout(EVENT_TIMEOUT) {
        Some(skiff::ServerEvent::Disconnect(_, skiff::DisconnectCause::Local)) => (),
        other => panic!("expected local disconnect, got {:?}", other),
    }

    match client.wait_event_timeout(EVENT_TIMEOUT) {
        Some(skiff::ClientEvent::Disconnect(skiff::DisconnectCause::PeerClosed)) => (),
        other => panic!("expected peer disconnect, got {:?}", other),
    }
}

#[test]
fn multi_client_connect_disconnect() {
    const CLIENT_COUNT: usize = 8;

    let mut server = common::bind_server(Default::default());
    let server_addr = server.local_addr();

    let client_threads = (0..CLIENT_COUNT)
        .map(|_| {
            thread::spawn(move || {
                let mut client =
                    skiff::Client::connect(server_addr).expect("failed to create skiff client");

                common::wait_client_connect(&mut client);

                // Dropping a client disconnects it
                drop(client);
            })
        })
        .collect::<Vec<_>>();

    let mut connects = 0;
    let mut disconnects = 0;

    while disconnects < CLIENT_COUNT {
        match server.wait_event_timeout(EVENT_TIMEOUT) {
            Some(skiff::ServerEvent::Connect(_)) => {
                connects += 1;
            }
            Some(skiff::ServerEvent::Disconnect(_, cause)) => {
                assert_eq!(cause, skiff::DisconnectCause::PeerClosed);
                disconnects += 1;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    for client_thread in client_threads {
        client_thread.join().unwrap();
    }

    assert_eq!(connects, CLIENT_COUNT);
    assert_eq!(server.peer_count(), 0);
}
