//! Tests for the generic endpoint: the HTML index page, SSE streaming,
//! fan-out correctness, shutdown draining, and cancellation.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use client::Channel;
use server::{Fan, Server};

const T: Duration = Duration::from_secs(2);

fn start_server(fan: &Arc<Fan>) -> Server {
    Server::builder()
        .register_generic(fan.clone())
        .build_and_start()
        .unwrap()
}

/// Wait until `fan` has exactly `n` parked subscribers.
fn wait_parked(fan: &Fan, n: usize) {
    let deadline = Instant::now() + T;
    while fan.num_calls() != n {
        assert!(
            Instant::now() < deadline,
            "fan stuck at {} parked (want {n})",
            fan.num_calls()
        );
        thread::sleep(Duration::from_millis(1));
    }
}

fn wait_active(server: &Server, expected: usize) {
    let deadline = Instant::now() + T;
    while server.active_calls() != expected {
        assert!(
            Instant::now() < deadline,
            "active_calls stuck at {} (want {expected})",
            server.active_calls()
        );
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_index_page_for_non_stream_path() {
    let fan = Arc::new(Fan::new());
    let server = start_server(&fan);
    let channel = Channel::new(server.connector());

    let sub = channel.subscribe("/anything").unwrap();
    assert_eq!(
        sub.initial_metadata().unwrap().get("content-type"),
        Some("text/html; charset=UTF-8")
    );
    let frame = sub.next_frame().unwrap().expect("index page frame");
    let body = String::from_utf8(frame.to_vec()).unwrap();
    assert!(body.contains("Method: /anything. Count:"), "{body}");
    assert!(body.ends_with("</body></html>\n"));

    assert_eq!(sub.next_frame().unwrap(), None);
    assert!(sub.wait_status().unwrap().is_ok());
}

#[test]
fn test_index_page_counter_advances_per_call() {
    let fan = Arc::new(Fan::new());
    let server = start_server(&fan);
    let channel = Channel::new(server.connector());

    let first = channel.subscribe("/a").unwrap().next_frame().unwrap().unwrap();
    let second = channel.subscribe("/b").unwrap().next_frame().unwrap().unwrap();
    assert_ne!(first, second);
}

#[test]
fn test_sse_stream_frames_in_publish_order() {
    let fan = Arc::new(Fan::new());
    let server = start_server(&fan);
    let channel = Channel::new(server.connector());

    let sub = channel.subscribe("/stream").unwrap();
    assert_eq!(
        sub.initial_metadata().unwrap().get("content-type"),
        Some("text/event-stream; charset=UTF-8")
    );
    wait_parked(&fan, 1);

    for payload in ["A", "B", "C"] {
        fan.publish(payload);
        thread::sleep(Duration::from_millis(20));
    }

    for expected in ["A", "B", "C"] {
        let frame = sub.next_frame().unwrap().expect("stream frame");
        let text = String::from_utf8(frame.to_vec()).unwrap();
        assert!(text.starts_with(expected), "frame {text:?}");
        assert!(text.ends_with("\n\n"), "frame {text:?}");
    }

    // Shutdown plus one final publish flushes the parked subscriber with
    // the sentinel and an OK status.
    wait_parked(&fan, 1);
    fan.shutdown();
    fan.publish("ignored");

    let frame = sub.next_frame().unwrap().expect("sentinel frame");
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.starts_with("data: ! "), "frame {text:?}");
    assert!(text.ends_with("\n\n"));
    assert_eq!(sub.next_frame().unwrap(), None);
    assert!(sub.wait_status().unwrap().is_ok());
}

#[test]
fn test_subscribe_after_shutdown_gets_sentinel_immediately() {
    let fan = Arc::new(Fan::new());
    let server = start_server(&fan);
    let channel = Channel::new(server.connector());

    fan.shutdown();
    let sub = channel.subscribe("/stream").unwrap();
    let frame = sub.next_frame().unwrap().expect("sentinel frame");
    assert!(String::from_utf8_lossy(&frame).starts_with("data: ! "));
    assert_eq!(sub.next_frame().unwrap(), None);
    assert!(sub.wait_status().unwrap().is_ok());
}

#[test]
fn test_index_page_still_served_after_shutdown() {
    let fan = Arc::new(Fan::new());
    let server = start_server(&fan);
    let channel = Channel::new(server.connector());

    fan.shutdown();
    let sub = channel.subscribe("/landing").unwrap();
    let frame = sub.next_frame().unwrap().expect("index frame");
    assert!(String::from_utf8_lossy(&frame).contains("Method: /landing. Count:"));
    assert!(sub.wait_status().unwrap().is_ok());
}

#[test]
fn test_late_subscriber_misses_earlier_publish() {
    let fan = Arc::new(Fan::new());
    let server = start_server(&fan);
    let channel = Channel::new(server.connector());

    let early = channel.subscribe("/stream").unwrap();
    wait_parked(&fan, 1);
    fan.publish("first");
    wait_parked(&fan, 1);

    let late = channel.subscribe("/stream").unwrap();
    wait_parked(&fan, 2);
    fan.publish("second");

    let first = early.next_frame().unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).starts_with("first"));
    let second = early.next_frame().unwrap().unwrap();
    assert!(String::from_utf8_lossy(&second).starts_with("second"));

    let only = late.next_frame().unwrap().unwrap();
    assert!(
        String::from_utf8_lossy(&only).starts_with("second"),
        "late subscriber must not see the earlier publish"
    );
}

#[test]
fn test_fanout_many_subscribers_see_every_publish_in_order() {
    const SUBSCRIBERS: usize = 100;
    const PUBLISHES: usize = 50;

    let fan = Arc::new(Fan::new());
    let server = start_server(&fan);
    let channel = Channel::new(server.connector());

    let subs: Vec<_> = (0..SUBSCRIBERS)
        .map(|_| channel.subscribe("/stream").unwrap())
        .collect();
    wait_parked(&fan, SUBSCRIBERS);

    let readers: Vec<_> = subs
        .into_iter()
        .map(|sub| {
            thread::spawn(move || {
                let mut seen = Vec::with_capacity(PUBLISHES);
                for _ in 0..PUBLISHES {
                    let frame = sub.next_frame().unwrap().expect("stream frame");
                    let text = String::from_utf8(frame.to_vec()).unwrap();
                    let num: usize = text
                        .split_whitespace()
                        .nth(1)
                        .and_then(|w| w.parse().ok())
                        .expect("frame carries its publish number");
                    seen.push(num);
                }
                sub.cancel();
                seen
            })
        })
        .collect();

    for i in 0..PUBLISHES {
        // Every subscriber re-parks right after its write completes, so
        // waiting for a full house between publishes guarantees nobody
        // misses a payload.
        wait_parked(&fan, SUBSCRIBERS);
        fan.publish(format!("pub {i} "));
    }

    let expected: Vec<usize> = (0..PUBLISHES).collect();
    for reader in readers {
        assert_eq!(reader.join().unwrap(), expected);
    }
    drop(server);
}

#[test]
fn test_cancelled_subscriber_is_freed_within_one_publish_cycle() {
    let fan = Arc::new(Fan::new());
    let server = start_server(&fan);
    let channel = Channel::new(server.connector());

    // Baseline: the armed generic subscriber plus the unknown catch-all.
    wait_active(&server, 2);

    let sub = channel.subscribe("/stream").unwrap();
    wait_parked(&fan, 1);
    wait_active(&server, 3);

    sub.cancel();
    // The dead stream is discovered on the next delivery attempt.
    fan.publish("poke");
    wait_active(&server, 2);
    assert_eq!(fan.num_calls(), 0);
}

#[test]
fn test_num_calls_tracks_parked_subscribers() {
    let fan = Arc::new(Fan::new());
    let server = start_server(&fan);
    let channel = Channel::new(server.connector());

    assert_eq!(fan.num_calls(), 0);
    let _a = channel.subscribe("/stream").unwrap();
    let _b = channel.subscribe("/stream").unwrap();
    wait_parked(&fan, 2);
    drop(server);
}
