#![cfg(not(loom))]
// Randomised producer/consumer pacing over every variant. Payloads carry a
// strictly increasing tag; the consumer checks for gaps and repeats.

use rand::{rngs::StdRng, Rng, SeedableRng};
use spscq::lamport::{LamportConsumer, LamportProducer};
use spscq::{ffq, iffq, lamport, Empty, PushError, SpscReceiver, SpscSender};
use std::thread;
use std::time::Duration;

const ITEMS: usize = 50_000;
const SEEDS: [u64; 4] = [1, 0xfeed, 0xc0ffee, 987_654_321];

fn backoff(rng: &mut StdRng) {
    match rng.gen_range(0..100) {
        0..=79 => {}
        80..=94 => {
            for _ in 0..rng.gen_range(1..64) {
                std::hint::spin_loop();
            }
        }
        95..=98 => thread::yield_now(),
        _ => thread::sleep(Duration::from_micros(rng.gen_range(1..20))),
    }
}

fn tag(seq: usize) -> usize {
    // never zero, so the FastForward sentinel can't collide
    (seq << 1) | 1
}

fn run<P, C>(mut tx: P, mut rx: C, seed: u64)
where
    P: SpscSender + 'static,
    C: SpscReceiver + 'static,
{
    let producer = thread::spawn(move || {
        let mut rng = StdRng::seed_from_u64(seed);
        for seq in 0..ITEMS {
            while tx.push(tag(seq)).is_err() {
                backoff(&mut rng);
            }
            backoff(&mut rng);
        }
    });

    let consumer = thread::spawn(move || {
        let mut rng = StdRng::seed_from_u64(seed.rotate_left(17));
        let mut last = None;
        let mut received = 0;
        while received < ITEMS {
            match rx.pop() {
                Ok(v) => {
                    assert_eq!(v & 1, 1, "corrupted payload {v:#x}");
                    let seq = v >> 1;
                    if let Some(prev) = last {
                        assert_eq!(seq, prev + 1, "gap or duplicate after {prev}");
                    } else {
                        assert_eq!(seq, 0);
                    }
                    last = Some(seq);
                    received += 1;
                }
                Err(_) => backoff(&mut rng),
            }
        }
        assert!(rx.pop().is_err());
        last
    });

    producer.join().unwrap();
    assert_eq!(consumer.join().unwrap(), Some(ITEMS - 1));
}

#[test]
fn lamport_randomised_interleavings() {
    for seed in SEEDS {
        let (tx, rx) = lamport::channel(64).unwrap();
        run(tx, rx, seed);
    }
}

#[test]
fn lamport_tiny_ring() {
    for seed in SEEDS {
        let (tx, rx) = lamport::channel(2).unwrap();
        run(tx, rx, seed);
    }
}

// Drives the lazily refreshed shadow cursors through the common interface.
struct Shadowed<T>(T);

impl SpscSender for Shadowed<LamportProducer> {
    fn push(&mut self, value: usize) -> Result<(), PushError> {
        self.0.write_shadowed(value)
    }

    fn available(&self) -> bool {
        self.0.snapshot().wspace > 0
    }
}

impl SpscReceiver for Shadowed<LamportConsumer> {
    fn pop(&mut self) -> Result<usize, Empty> {
        self.0.read_shadowed()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[test]
fn lamport_shadowed_randomised_interleavings() {
    for seed in SEEDS {
        let (tx, rx) = lamport::channel(64).unwrap();
        run(Shadowed(tx), Shadowed(rx), seed);
    }
}

#[test]
fn lamport_shadowed_tiny_ring() {
    for seed in SEEDS {
        let (tx, rx) = lamport::channel(4).unwrap();
        run(Shadowed(tx), Shadowed(rx), seed);
    }
}

#[test]
fn ffq_randomised_interleavings() {
    for seed in SEEDS {
        let (tx, rx) = ffq::channel(64).unwrap();
        run(tx, rx, seed);
    }
}

#[test]
fn iffq_randomised_interleavings() {
    for seed in SEEDS {
        let (tx, rx) = iffq::channel(64).unwrap();
        run(tx, rx, seed);
    }
}
