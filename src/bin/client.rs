static EVENT_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(1000);

fn main() {
    let config = skiff::client::Config {
        connection: skiff::ConnectionConfig {
            idle_timeout_ms: 4_000,
            ..Default::default()
        }
        .with_delay_mode(skiff::DelayMode::Fast),
    };

    let mut client = skiff::Client::connect_with_config(("127.0.0.1", 8888), config)
        .expect("failed to create skiff client");

    let mut counter = 0u32;

    loop {
        let result = client
            .send_reliable(&counter.to_be_bytes())
            .and_then(|()| client.send_unreliable(&[0x00, 0x01, 0x02]));

        if let Err(err) = result {
            println!("send failed: {}", err);
            break;
        }

        counter += 1;

        while let Some(event) = client.wait_event_timeout(EVENT_TIMEOUT) {
            match event {
                skiff::ClientEvent::Connect => {
                    println!("client::Event::Connect");
                }
                skiff::ClientEvent::Disconnect(cause) => {
                    println!("client::Event::Disconnect ({})", cause);
                }
                skiff::ClientEvent::Receive(channel, payload) => {
                    println!("client::Event::Receive {:?} {:02X?}", channel, payload);
                }
            }
        }
    }
}
