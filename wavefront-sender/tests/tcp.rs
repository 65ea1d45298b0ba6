use std::{
    io::{BufRead as _, BufReader},
    net::TcpListener,
    sync::mpsc,
    thread,
    time::Duration,
};

use wavefront_sender::{Category, ProxySenderBuilder, SendError, Tags};

fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind listener");
    let port = listener.local_addr().expect("listener has no address").port();
    (listener, port)
}

#[test]
fn metrics_are_delivered_over_tcp() {
    let (listener, port) = listen();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("failed to accept");
        let mut reader = BufReader::new(stream);
        for _ in 0..2 {
            let mut line = String::new();
            reader.read_line(&mut line).expect("failed to read line");
            tx.send(line).expect("receiver gone");
        }
    });

    let sender = ProxySenderBuilder::new()
        .with_metrics_port(port)
        .with_source("integration")
        .with_flush_interval(Duration::from_millis(20))
        .build_and_start()
        .expect("failed to build sender");

    let tags = Tags::from([("env".to_string(), "test".to_string())]);
    sender.send_metric("cpu.usage", 0.25, Some(1700000000), "", &tags).unwrap();
    sender.send_delta_counter("requests", 3.0, None, "web-1", &Tags::new()).unwrap();

    let first = rx.recv_timeout(Duration::from_secs(5)).expect("no first line");
    let second = rx.recv_timeout(Duration::from_secs(5)).expect("no second line");
    assert_eq!(first, "\"cpu.usage\" 0.25 1700000000 source=\"integration\" \"env\"=\"test\"\n");
    assert_eq!(second, "\"\u{2206}requests\" 3.0 source=\"web-1\"\n");

    sender.close();
    assert_eq!(sender.failure_count(), 0);
}

#[test]
fn unreachable_proxy_surfaces_connect_error() {
    // Bind and drop a listener to find a port that nothing is listening on.
    let (listener, port) = listen();
    drop(listener);

    let sender = ProxySenderBuilder::new()
        .with_events_port(port)
        .with_connect_timeout(Duration::from_millis(500))
        .build()
        .expect("failed to build sender");

    assert!(sender.is_configured(Category::Event));
    let result = sender.send_metric("m", 1.0, None, "", &Tags::new());
    assert!(matches!(result, Err(SendError::NotConfigured(Category::Metric))));

    let result = sender.send_event("deploy", 1700000000, 0, "", &Tags::new(), &Default::default());
    assert!(matches!(result, Err(SendError::Connect { .. })));
}
