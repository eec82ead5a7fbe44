//! Tests for the teardown sequence: router first, queue drain second,
//! dispatcher join last.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use client::{Channel, ClientError};
use protocol_echo::{Arith, MathRequest, arith_service};
use server::{Fan, Server};

const T: Duration = Duration::from_secs(2);

fn wait_parked(fan: &Fan, n: usize) {
    let deadline = Instant::now() + T;
    while fan.num_calls() != n {
        assert!(Instant::now() < deadline, "fan never reached {n} parked");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_shutdown_with_idle_armed_slots_does_not_hang() {
    let mut server = Server::builder()
        .register_service(arith_service())
        .build_and_start()
        .unwrap();
    server.shutdown();
    assert_eq!(server.active_calls(), 0, "armed state objects freed");
}

#[test]
fn test_shutdown_is_idempotent_and_drop_safe() {
    let mut server = Server::builder()
        .register_service(arith_service())
        .build_and_start()
        .unwrap();
    server.shutdown();
    server.shutdown();
    drop(server);
}

#[test]
fn test_calls_after_shutdown_are_refused() {
    let mut server = Server::builder()
        .register_service(arith_service())
        .build_and_start()
        .unwrap();
    let channel = Channel::new(server.connector());
    server.shutdown();

    let err = channel
        .call::<Arith>(&MathRequest { input: 1 })
        .unwrap_err();
    assert!(matches!(err, ClientError::Unavailable));
}

#[test]
fn test_calls_served_before_shutdown_still_complete() {
    let mut server = Server::builder()
        .register_service(arith_service())
        .build_and_start()
        .unwrap();
    let channel = Channel::new(server.connector());

    let reply = channel.call::<Arith>(&MathRequest { input: 2 }).unwrap();
    assert_eq!(reply.output, 9);
    server.shutdown();
    assert_eq!(server.active_calls(), 0);
}

#[test]
fn test_shutdown_frees_parked_subscribers_and_closes_their_streams() {
    let fan = Arc::new(Fan::new());
    let mut server = Server::builder()
        .register_generic(fan.clone())
        .build_and_start()
        .unwrap();
    let channel = Channel::new(server.connector());

    let sub = channel.subscribe("/stream").unwrap();
    wait_parked(&fan, 1);

    // Server teardown without a fan shutdown: the parked subscriber has
    // no outstanding op to fail, so it is freed with the arena and the
    // client sees its stream close.
    server.shutdown();
    assert_eq!(server.active_calls(), 0);

    assert_eq!(sub.next_frame().unwrap(), None);
    let status = sub.wait_status().unwrap();
    assert!(!status.is_ok());
}

#[test]
fn test_fan_publish_after_server_shutdown_is_harmless() {
    let fan = Arc::new(Fan::new());
    let mut server = Server::builder()
        .register_generic(fan.clone())
        .build_and_start()
        .unwrap();
    let channel = Channel::new(server.connector());

    let _sub = channel.subscribe("/stream").unwrap();
    wait_parked(&fan, 1);
    server.shutdown();

    // The stale subscriber handle posts into a drained queue; nothing
    // explodes and nothing leaks.
    fan.publish("into the void");
    assert_eq!(server.active_calls(), 0);
}
