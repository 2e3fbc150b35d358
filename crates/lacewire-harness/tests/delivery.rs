//! Reliable-delivery behavior under faults: retries, back-off, loss,
//! corruption and a jammed channel.

use std::{cell::RefCell, rc::Rc};

use lacewire_core::{Bus, Code, ErrorKind};
use lacewire_harness::{acking_devices, SimClock, SimEnv, SimMedium, SimStrategy};

type SimBus = Bus<SimStrategy, SimEnv>;

fn attach(medium: &SimMedium, clock: &SimClock, seed: u64, id: u8) -> SimBus {
    Bus::with_id(medium.endpoint(), SimEnv::new(clock.clone(), seed), id)
}

fn capture_errors(bus: &mut SimBus) -> Rc<RefCell<Vec<(ErrorKind, u8)>>> {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    bus.set_error_sink(Box::new(move |kind, context| {
        sink.borrow_mut().push((kind, context));
    }));
    errors
}

#[test]
fn unreachable_recipient_reports_connection_lost_once() {
    let clock = SimClock::new();
    let medium = SimMedium::new(clock.clone());
    let mut a = attach(&medium, &clock, 1, 1);
    let errors = capture_errors(&mut a);

    // Nobody answers on this medium.
    a.send(7, b"HI").expect("free slot");
    for _ in 0..400 {
        a.update();
        clock.advance(10_000);
    }

    assert_eq!(errors.borrow().as_slice(), &[(ErrorKind::ConnectionLost, 7)]);
    assert_eq!(a.count(None), 0, "the slot is freed after giving up");
}

#[test]
fn retry_spacing_never_shrinks() {
    // Retries land on the update tick, not at the exact cubic threshold, so
    // a measured gap can lag its predecessor by one tick.
    const TICK: u32 = 1_000;

    let clock = SimClock::new();
    let medium = SimMedium::new(clock.clone());
    let mut a = attach(&medium, &clock, 1, 1);

    a.send(7, b"HI").expect("free slot");
    for _ in 0..400 {
        a.update();
        clock.advance(TICK);
    }

    let times: Vec<u32> = medium.attempts().iter().map(|attempt| attempt.time).collect();
    assert!(times.len() > 60, "expected a long retry tail, got {}", times.len());
    let deltas: Vec<u32> = times.windows(2).map(|pair| pair[1] - pair[0]).collect();
    for pair in deltas.windows(2) {
        assert!(pair[1] + TICK >= pair[0], "retry spacing shrank: {:?}", pair);
    }
    assert!(
        deltas.last() > deltas.first(),
        "back-off never grew over {} attempts",
        times.len()
    );
}

#[test]
fn corrupted_frame_is_nakked_and_retransmitted() {
    let clock = SimClock::new();
    let medium = SimMedium::new(clock.clone());
    let mut a = attach(&medium, &clock, 1, 1);
    let mut b = attach(&medium, &clock, 2, 2);
    medium.set_responder(acking_devices(&[2]));

    let delivered = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&delivered);
    b.set_receiver(Box::new(move |payload, _info| {
        log.borrow_mut().push(payload.to_vec());
    }));
    let errors = capture_errors(&mut a);

    medium.corrupt_next();
    a.send(2, b"HI").expect("free slot");
    clock.advance(10);

    let mut codes = Vec::new();
    for _ in 0..50 {
        a.update();
        codes.push(b.receive());
        clock.advance(100);
    }

    // Exactly one good copy arrives, after one NAK-triggered retry.
    assert_eq!(delivered.borrow().as_slice(), &[b"HI".to_vec()]);
    assert!(codes.contains(&Code::Nak));
    assert_eq!(medium.attempts().len(), 2);
    assert!(errors.borrow().is_empty());
}

#[test]
fn lost_frame_is_retried_until_delivered() {
    let clock = SimClock::new();
    let medium = SimMedium::new(clock.clone());
    let mut a = attach(&medium, &clock, 1, 1);
    let mut b = attach(&medium, &clock, 2, 2);
    medium.set_responder(acking_devices(&[2]));

    let delivered = Rc::new(RefCell::new(0u32));
    let log = Rc::clone(&delivered);
    b.set_receiver(Box::new(move |_payload, _info| *log.borrow_mut() += 1));

    medium.drop_next(2);
    a.send(2, b"HI").expect("free slot");
    clock.advance(10);
    for _ in 0..50 {
        a.update();
        b.receive();
        clock.advance(100);
    }

    assert_eq!(*delivered.borrow(), 1);
    assert_eq!(medium.attempts().len(), 3, "two lost attempts, one delivered");
    assert_eq!(a.count(None), 0);
}

#[test]
fn jammed_channel_holds_packets_back() {
    let clock = SimClock::new();
    let medium = SimMedium::new(clock.clone());
    let mut a = attach(&medium, &clock, 1, 1);
    medium.set_responder(acking_devices(&[2]));

    medium.jam(true);
    a.send(2, b"HI").expect("free slot");
    clock.advance(10);
    for _ in 0..10 {
        a.update();
        clock.advance(2_000);
    }
    assert!(medium.attempts().is_empty(), "nothing transmitted while jammed");
    assert_eq!(a.count(None), 1);

    medium.jam(false);
    for _ in 0..10 {
        a.update();
        clock.advance(2_000);
    }
    assert_eq!(medium.attempts().len(), 1);
    assert_eq!(a.count(None), 0);
}
