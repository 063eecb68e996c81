static EVENT_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(1000);

fn main() {
    let config = skiff::server::Config {
        peer_count_max: 1,
        connection: skiff::ConnectionConfig {
            idle_timeout_ms: 4_000,
            ..Default::default()
        },
    };

    let mut server = skiff::Server::bind_with_config(("127.0.0.1", 8888), config)
        .expect("failed to create skiff server");

    loop {
        while let Some(event) = server.wait_event_timeout(EVENT_TIMEOUT) {
            match event {
                skiff::ServerEvent::Connect(peer) => {
                    println!("server::Event::Connect {}", peer.peer_addr());
                }
                skiff::ServerEvent::Disconnect(peer, cause) => {
                    println!("server::Event::Disconnect {} ({})", peer.peer_addr(), cause);
                }
                skiff::ServerEvent::Receive(peer, channel, payload) => {
                    println!("server::Event::Receive {:?} {:02X?}", channel, payload);

                    let result = match channel {
                        skiff::Channel::Reliable => peer.send_reliable(&payload),
                        skiff::Channel::Unreliable => peer.send_unreliable(&payload),
                    };

                    if let Err(err) = result {
                        println!("echo failed: {}", err);
                    }
                }
            }
        }

    }
}
