#[allow(dead_code)]
mod common;

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

#[test]
fn unreliable_transfer() {
    let (mut server, _peer, client) =
        common::connected_pair(Default::default(), Default::default());

    let messages = (0..100u32)
        .map(|i| {
            let mut message = i.to_be_bytes().to_vec();
            message.resize(4 + i as usize * 10, i as u8);
            message
        })
        .collect::<HashSet<_>>();

    for message in messages.iter() {
        client.send_unreliable(message).unwrap();
        thread::sleep(Duration::from_millis(1));
    }

    let mut received = 0;

    while let Some(event) = server.wait_event_timeout(Duration::from_millis(500)) {
        match event {
            skiff::ServerEvent::Receive(_, skiff::Channel::Unreliable, payload) => {
                // Whatever arrives is intact
                assert!(messages.contains(&payload[..]));
                received += 1;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert!(received > 0);
}

#[test]
fn unreliable_size_limit() {
    let (_server, _peer, client) = common::connected_pair(Default::default(), Default::default());

    // One datagram, less the 9-byte unreliable header
    assert_eq!(client.send_unreliable(&[0; 1191]), Ok(()));
    assert_eq!(
        client.send_unreliable(&[0; 1192]),
        Err(skiff::SendError::MessageTooLarge {
            len: 1192,
            max: 1191
        })
    );
}
