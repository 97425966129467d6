use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::time::Duration;

use msgframe_frame::{BufferPool, Frame, FrameError, FrameKind};
use msgframe_pool::PoolConfig;

fn pool() -> BufferPool {
    BufferPool::with_config(PoolConfig {
        min_buffer_size: 8,
        max_buffer_size: 64 * 1024,
        ..PoolConfig::default()
    })
    .unwrap()
}

#[test]
fn close_always_uninitializes() {
    let pool = pool();
    let mut frames = vec![
        Frame::empty(),
        Frame::delimiter(),
        Frame::externally_owned(&b"ext"[..], 3).unwrap(),
        Frame::pool_owned(&pool, 8),
    ];

    for frame in &mut frames {
        frame.close().unwrap();
        assert!(!frame.is_initialized());
        assert_eq!(frame.kind(), FrameKind::Uninitialized);
        assert_eq!(frame.size(), 0);
    }
}

#[test]
fn pool_owned_buffer_is_obtainable_after_close() {
    let pool = pool();
    let mut frame = Frame::new();
    frame.init_pool_owned(&pool, 100).unwrap();
    assert_eq!(frame.size(), 100);
    assert_eq!(pool.stats().idle_buffers, 0);

    frame.close().unwrap();
    assert_eq!(pool.stats().idle_buffers, 1);

    let mut again = Frame::pool_owned(&pool, 90);
    assert_eq!(pool.stats().reuses, 1);
    again.close().unwrap();
}

#[test]
fn shared_buffer_returns_after_second_close_in_either_order() {
    for close_source_first in [true, false] {
        let pool = pool();
        let mut a = Frame::new();
        a.init_pool_owned(&pool, 8).unwrap();
        let mut b = Frame::new();
        b.copy_from(&mut a).unwrap();

        let (first, second) = if close_source_first {
            (&mut a, &mut b)
        } else {
            (&mut b, &mut a)
        };

        first.close().unwrap();
        assert_eq!(pool.stats().gives, 0, "returned after the first close");
        assert_eq!(second.reference_count(), Some(1));

        second.close().unwrap();
        assert_eq!(pool.stats().gives, 1);
        assert_eq!(pool.stats().idle_buffers, 1);
    }
}

#[test]
fn move_relocates_external_payload() {
    let mut a = Frame::new();
    a.init_externally_owned(&b"data"[..], 4).unwrap();
    let mut b = Frame::new();
    b.move_from(&mut a).unwrap();

    assert!(a.is_initialized());
    assert_eq!(a.kind(), FrameKind::Empty);
    assert_eq!(a.size(), 0);
    assert!(matches!(a.to_vec(), Err(FrameError::NoPayload { .. })));

    assert_eq!(b.kind(), FrameKind::ExternallyOwned);
    assert_eq!(b.size(), 4);
    assert_eq!(b.to_vec().unwrap(), b"data");
}

#[test]
fn double_close_is_invalid_state() {
    let pool = pool();
    let mut frame = Frame::pool_owned(&pool, 4);
    frame.close().unwrap();
    let err = frame.close().unwrap_err();
    assert!(matches!(
        err,
        FrameError::InvalidState {
            op: "close",
            kind: FrameKind::Uninitialized
        }
    ));
    assert_eq!(pool.stats().gives, 1);
}

#[test]
fn delimiter_has_no_payload() {
    let mut frame = Frame::new();
    frame.init_delimiter().unwrap();
    assert!(frame.is_delimiter());
    assert!(frame.is_initialized());
    assert_eq!(frame.size(), 0);
    assert!(frame.get(0).is_err());
}

#[test]
fn three_owners_from_add_references() {
    let pool = pool();
    let mut first = Frame::from_slice(&pool, b"broadcast");
    first.add_references(2);
    assert!(first.is_shared());
    assert_eq!(first.reference_count(), Some(3));

    let mut second = first.claim_reference().unwrap();
    let mut third = first.claim_reference().unwrap();
    assert_eq!(second.to_vec().unwrap(), b"broadcast");
    assert_eq!(first.reference_count(), Some(3), "claiming must not count");

    first.close().unwrap();
    assert_eq!(pool.stats().gives, 0);
    second.remove_references(1);
    assert!(!second.is_initialized());
    assert_eq!(pool.stats().gives, 0);
    third.close().unwrap();
    assert_eq!(pool.stats().gives, 1);
}

#[test]
fn unused_reservations_dropped_in_one_call() {
    let pool = pool();
    let mut frame = Frame::pool_owned(&pool, 16);
    frame.add_references(4);
    let mut claimed = frame.claim_reference().unwrap();

    // Three of the reserved owners never materialized.
    frame.remove_references(3);
    assert!(frame.is_initialized());
    assert_eq!(frame.reference_count(), Some(2));

    claimed.close().unwrap();
    frame.close().unwrap();
    assert_eq!(pool.stats().gives, 1);
    assert_eq!(pool.stats().outstanding(), 0);
}

#[test]
fn over_release_never_returns_twice() {
    let pool = pool();
    let mut a = Frame::pool_owned(&pool, 16);
    let mut b = Frame::new();
    b.copy_from(&mut a).unwrap();

    a.remove_references(5);
    assert!(!a.is_initialized());
    assert_eq!(pool.stats().gives, 1);

    // b is stale: its buffer is already back in the pool.
    assert!(matches!(b.get(0), Err(FrameError::NoPayload { .. })));
    b.close().unwrap();
    assert_eq!(pool.stats().gives, 1);
}

#[test]
fn fan_out_copies_closed_on_many_threads() {
    const OWNERS: usize = 8;

    for _ in 0..20 {
        let pool = pool();
        let mut source = Frame::from_slice(&pool, &[0x5A; 512]);
        let copies: Vec<Frame> = (0..OWNERS)
            .map(|_| {
                let mut copy = Frame::new();
                copy.copy_from(&mut source).unwrap();
                copy
            })
            .collect();
        assert_eq!(source.reference_count(), Some(OWNERS + 1));

        let barrier = Arc::new(Barrier::new(OWNERS));
        let workers: Vec<_> = copies
            .into_iter()
            .map(|mut frame| {
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    assert!(frame.with_payload(|p| p.iter().all(|b| *b == 0x5A)).unwrap());
                    barrier.wait();
                    frame.close().unwrap();
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(pool.stats().gives, 0);
        assert_eq!(source.reference_count(), Some(1));
        source.close().unwrap();
        assert_eq!(pool.stats().gives, 1);
    }
}

#[test]
fn survivor_of_a_share_is_no_longer_shared() {
    let pool = pool();
    let mut a = Frame::pool_owned(&pool, 8);
    let mut b = Frame::new();
    b.copy_from(&mut a).unwrap();
    assert!(a.is_shared());

    b.close().unwrap();
    assert_eq!(a.reference_count(), Some(1));
    assert!(!a.is_shared());
    assert!(a.flags().is_empty());

    a.close().unwrap();
    assert_eq!(pool.stats().gives, 1);
}

#[test]
fn reading_a_copy_inside_a_payload_closure_does_not_block() {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let pool = pool();
        let mut a = Frame::from_slice(&pool, b"nested");
        let mut b = Frame::new();
        b.copy_from(&mut a).unwrap();

        let read = a.with_payload(|outer| (outer.to_vec(), b.to_vec()));
        let write = a.with_payload(|_| b.put_byte(b'N'));
        let _ = tx.send((read, write));
    });

    let (read, write) = rx
        .recv_timeout(Duration::from_secs(3))
        .expect("nested access must not block");
    let (outer, inner) = read.unwrap();
    assert_eq!(outer, b"nested");
    assert_eq!(inner.unwrap(), b"nested");
    assert_eq!(write.unwrap(), Err(FrameError::PayloadInUse));
}
