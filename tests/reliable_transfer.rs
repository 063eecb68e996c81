#[allow(dead_code)]
mod common;

use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::EVENT_TIMEOUT;

const MESSAGE_COUNT: usize = 500;
const MESSAGE_SIZE_MAX: usize = 4000;

fn random_messages(seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..MESSAGE_COUNT)
        .map(|_| {
            let mut message = vec![0u8; rng.gen_range(0..=MESSAGE_SIZE_MAX)];
            rng.fill(&mut message[..]);
            message
        })
        .collect()
}

fn digest(messages: &[Vec<u8>]) -> md5::Digest {
    let mut context = md5::Context::new();

    for message in messages.iter() {
        context.consume(message);
    }

    context.compute()
}

#[test]
fn client_to_server() {
    let (mut server, _peer, client) =
        common::connected_pair(Default::default(), Default::default());

    let messages = random_messages(0x5eed);
    let expected_digest = digest(&messages);

    let sender = client.connection().clone();

    let sender_thread = thread::spawn(move || {
        for message in messages.iter() {
            sender.send_reliable(message).unwrap();
        }
        messages
    });

    let mut received = Vec::new();

    while received.len() < MESSAGE_COUNT {
        match server.wait_event_timeout(EVENT_TIMEOUT) {
            Some(skiff::ServerEvent::Receive(_, skiff::Channel::Reliable, payload)) => {
                received.push(payload.into_vec());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    let messages = sender_thread.join().unwrap();

    assert_eq!(digest(&received), expected_digest);
    assert_eq!(received, messages);

    let stats = client.stats();
    assert!(stats.packets_sent as usize >= MESSAGE_COUNT);
    assert_eq!(stats.corrupt_dropped, 0);
}

#[test]
fn server_echoes_client() {
    let (mut server, _peer, mut client) =
        common::connected_pair(Default::default(), Default::default());

    let messages = random_messages(0xec40);

    let server_thread = thread::spawn(move || {
        let mut echoed = 0;

        while echoed < MESSAGE_COUNT {
            match server.wait_event_timeout(EVENT_TIMEOUT) {
                Some(skiff::ServerEvent::Receive(peer, skiff::Channel::Reliable, payload)) => {
                    // Blocking here does not stall the server's receive path
                    peer.send_reliable(&payload).unwrap();
                    echoed += 1;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }

        server
    });

    let sender = client.connection().clone();
    let outbound = messages.clone();

    let sender_thread = thread::spawn(move || {
        for message in outbound.iter() {
            sender.send_reliable(message).unwrap();
        }
    });

    let mut received = Vec::new();

    while received.len() < MESSAGE_COUNT {
        match client.wait_event_timeout(EVENT_TIMEOUT) {
            Some(skiff::ClientEvent::Receive(skiff::Channel::Reliable, payload)) => {
                received.push(payload.into_vec());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    sender_thread.join().unwrap();
    let _server = server_thread.join().unwrap();

    assert_eq!(digest(&received), digest(&messages));
}

#[test]
fn backpressure() {
    let client_config = skiff::client::Config {
        connection: skiff::ConnectionConfig {
            send_window_size: 4,
            ..Default::default()
        },
    };

    let (mut server, _peer, client) = common::connected_pair(Default::default(), client_config);

    // Each message takes two segments, so the window holds at most two messages
    let messages = (0..200u32)
        .map(|i| {
            let mut message = vec![i as u8; 1500];
            message[..4].copy_from_slice(&i.to_be_bytes());
            message
        })
        .collect::<Vec<_>>();

    let sender = client.connection().clone();
    let outbound = messages.clone();

    let sender_thread = thread::spawn(move || {
        for message in outbound.iter() {
            sender.send_reliable(message).unwrap();
        }
    });

    for expected in messages.iter() {
        match server.wait_event_timeout(EVENT_TIMEOUT) {
            Some(skiff::ServerEvent::Receive(_, skiff::Channel::Reliable, payload)) => {
                assert_eq!(&payload[..], &expected[..]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    sender_thread.join().unwrap();

    assert_eq!(
        client.try_send_reliable(&[0; 5 * 1186]),
        Err(skiff::SendError::MessageTooLarge {
            len: 5 * 1186,
            max: 4 * 1186
        })
    );
}
