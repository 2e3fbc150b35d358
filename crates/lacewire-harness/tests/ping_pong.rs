//! End-to-end exchange between two buses over the simulated medium.
//!
//! This test validates:
//! - packet composition and validation across two engine instances
//! - synchronous acknowledgement through the medium
//! - sender info enabling a reply without any out-of-band knowledge
//! - broadcast delivery to every listener with no acknowledgement

use std::{cell::RefCell, rc::Rc};

use lacewire_core::{Bus, Code};
use lacewire_harness::{acking_devices, SimClock, SimEnv, SimMedium, SimStrategy};
use lacewire_proto::BROADCAST;

type SimBus = Bus<SimStrategy, SimEnv>;
type Captured = Rc<RefCell<Vec<(Vec<u8>, u8)>>>;

fn attach(medium: &SimMedium, clock: &SimClock, seed: u64, id: u8) -> SimBus {
    Bus::with_id(medium.endpoint(), SimEnv::new(clock.clone(), seed), id)
}

fn capture(bus: &mut SimBus) -> Captured {
    let captured: Captured = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&captured);
    bus.set_receiver(Box::new(move |payload, info| {
        log.borrow_mut().push((payload.to_vec(), info.sender_id));
    }));
    captured
}

#[test]
fn request_and_reply() {
    let clock = SimClock::new();
    let medium = SimMedium::new(clock.clone());
    let mut a = attach(&medium, &clock, 1, 1);
    let mut b = attach(&medium, &clock, 2, 2);
    medium.set_responder(acking_devices(&[1, 2]));

    let at_a = capture(&mut a);
    let at_b = capture(&mut b);

    a.send(2, b"HI").expect("free slot");
    clock.advance(10);
    assert_eq!(a.update(), 0, "acked fire-once packet leaves the queue");
    assert_eq!(b.receive(), Code::Ack);
    assert_eq!(at_b.borrow().as_slice(), &[(b"HI".to_vec(), 1)]);

    // The sender id that rode along lets b answer without configuration.
    b.reply(b"HI!").expect("sender known");
    clock.advance(10);
    assert_eq!(b.update(), 0);
    assert_eq!(a.receive(), Code::Ack);
    assert_eq!(at_a.borrow().as_slice(), &[(b"HI!".to_vec(), 2)]);
}

#[test]
fn broadcast_reaches_every_listener() {
    let clock = SimClock::new();
    let medium = SimMedium::new(clock.clone());
    let mut a = attach(&medium, &clock, 1, 1);
    let mut b = attach(&medium, &clock, 2, 2);
    let mut c = attach(&medium, &clock, 3, 3);

    let at_b = capture(&mut b);
    let at_c = capture(&mut c);

    // No responder installed: a broadcast must complete without one.
    a.send(BROADCAST, b"ALL").expect("free slot");
    clock.advance(10);
    assert_eq!(a.update(), 0);

    assert_eq!(b.receive(), Code::Ack);
    assert_eq!(c.receive(), Code::Ack);
    assert_eq!(at_b.borrow().as_slice(), &[(b"ALL".to_vec(), 1)]);
    assert_eq!(at_c.borrow().as_slice(), &[(b"ALL".to_vec(), 1)]);
    assert_eq!(medium.attempts().len(), 1, "broadcast is never retried");
}

#[test]
fn bystander_never_sees_addressed_traffic() {
    let clock = SimClock::new();
    let medium = SimMedium::new(clock.clone());
    let mut a = attach(&medium, &clock, 1, 1);
    let mut b = attach(&medium, &clock, 2, 2);
    let mut c = attach(&medium, &clock, 3, 3);
    medium.set_responder(acking_devices(&[2]));

    capture(&mut b);
    let at_c = capture(&mut c);

    a.send(2, b"HI").expect("free slot");
    clock.advance(10);
    a.update();

    assert_eq!(c.receive(), Code::Busy, "frame for another device");
    assert_eq!(b.receive(), Code::Ack);
    assert!(at_c.borrow().is_empty());
}
