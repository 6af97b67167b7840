//! Multi-threaded behaviour of the deque: blocking, cancellation,
//! destruction and composed views.

use fcap_deque::{Deque, Peek, Pop, Status};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn drain_front(q: &Deque<u32>) -> Vec<u32> {
    let mut out = Vec::new();
    while let Pop::Item(i) = q.pop_front_nb() {
        out.push(i);
    }
    out
}

#[test]
fn blocked_pop_receives_later_push() {
    let q = Arc::new(Deque::new());
    let consumer = {
        let q = q.clone();
        thread::spawn(move || q.pop_front())
    };
    thread::sleep(Duration::from_millis(50));
    q.push_back(42u32).unwrap();
    assert_eq!(consumer.join().unwrap(), Pop::Item(42));
}

#[test]
fn unblock_wakes_waiter_and_later_pops_return_at_once() {
    let q: Arc<Deque<u32>> = Arc::new(Deque::new());
    let consumer = {
        let q = q.clone();
        thread::spawn(move || {
            let start = Instant::now();
            (q.pop_front(), start.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(50));
    q.unblock().unwrap();
    let (result, waited) = consumer.join().unwrap();
    assert_eq!(result, Pop::Unblocked);
    assert!(waited < Duration::from_secs(5));

    let start = Instant::now();
    assert_eq!(q.pop_front(), Pop::Unblocked);
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn unblock_is_idempotent_from_any_thread() {
    let q: Arc<Deque<u32>> = Arc::new(Deque::new());
    let helpers: Vec<_> = (0..4)
        .map(|_| {
            let q = q.clone();
            thread::spawn(move || q.unblock().unwrap())
        })
        .collect();
    for h in helpers {
        h.join().unwrap();
    }
    assert_eq!(q.pop_back(), Pop::Unblocked);
}

#[test]
fn destroy_wakes_waiters_with_destroyed() {
    let q: Arc<Deque<u32>> = Arc::new(Deque::new());
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let q = q.clone();
            thread::spawn(move || q.pop_front())
        })
        .collect();
    thread::sleep(Duration::from_millis(50));
    q.destroy().unwrap();
    for w in waiters {
        assert_eq!(w.join().unwrap(), Pop::Destroyed);
    }
    assert_eq!(q.status(), Status::Inconsistent);
}

#[test]
fn timed_pop_returns_item_pushed_in_window() {
    let q = Arc::new(Deque::new());
    let producer = {
        let q = q.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            q.push_front(7u32).unwrap();
        })
    };
    assert_eq!(q.pop_back_timed(Duration::from_secs(10)), Pop::Item(7));
    producer.join().unwrap();
}

#[test]
fn producers_keep_per_producer_order() {
    let q = Arc::new(Deque::new());
    let producers: Vec<_> = (0..4u32)
        .map(|p| {
            let q = q.copy().unwrap();
            thread::spawn(move || {
                for i in 0..500u32 {
                    q.push_back(p * 1000 + i).unwrap();
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }
    let mut last = [None::<u32>; 4];
    let mut count = 0;
    while let Pop::Item(v) = q.pop_front_nb() {
        let producer = (v / 1000) as usize;
        if let Some(prev) = last[producer] {
            assert!(v > prev);
        }
        last[producer] = Some(v);
        count += 1;
    }
    assert_eq!(count, 2000);
}

#[test]
fn merged_waiter_wakes_on_push_to_either_side() {
    let q1: Deque<u32> = Deque::new();
    let q2: Deque<u32> = Deque::new();
    let merged = Arc::new(Deque::create_merged(&q1, &q2).unwrap());
    let consumer = {
        let merged = merged.clone();
        thread::spawn(move || merged.pop_front())
    };
    thread::sleep(Duration::from_millis(50));
    q2.push_back(5).unwrap();
    assert_eq!(consumer.join().unwrap(), Pop::Item(5));
}

#[test]
fn merged_unblock_reaches_waiters() {
    let q1: Deque<u32> = Deque::new();
    let q2: Deque<u32> = Deque::new();
    let merged = Arc::new(Deque::create_merged(&q1, &q2).unwrap());
    let consumer = {
        let merged = merged.clone();
        thread::spawn(move || merged.pop_back())
    };
    thread::sleep(Duration::from_millis(50));
    merged.unblock().unwrap();
    assert_eq!(consumer.join().unwrap(), Pop::Unblocked);
    // The sides were switched as well.
    assert_eq!(q1.pop_front(), Pop::Unblocked);
}

#[test]
fn nested_merged_views_compose() {
    let a = Deque::new();
    let b = Deque::new();
    let c = Deque::new();
    a.push_back(1u32).unwrap();
    b.push_back(2).unwrap();
    c.push_back(3).unwrap();
    let ab = Deque::create_merged(&a, &b).unwrap();
    let abc = Deque::create_merged(&ab, &c).unwrap();
    assert_eq!(abc.size(), 3);
    assert_eq!(abc.front(), Peek::Item(1));
    assert_eq!(drain_front(&abc), vec![1, 2, 3]);
}

#[test]
fn join_simple_head_with_merged_tail() {
    let head = Deque::new();
    head.push_back(1u32).unwrap();
    let t1 = Deque::new();
    let t2 = Deque::new();
    t1.push_back(2).unwrap();
    t2.push_back(3).unwrap();
    t2.push_back(4).unwrap();
    let tail = Deque::create_merged(&t1, &t2).unwrap();
    head.join(tail).unwrap();
    assert_eq!(t1.size() + t2.size(), 0);
    assert_eq!(drain_front(&head), vec![1, 2, 3, 4]);
}

#[test]
fn join_merged_head_appends_to_back_side() {
    let h1 = Deque::new();
    let h2 = Deque::new();
    h1.push_back(1u32).unwrap();
    h2.push_back(2).unwrap();
    let head = Deque::create_merged(&h1, &h2).unwrap();
    let tail = Deque::new();
    tail.push_back(3).unwrap();
    head.join(tail).unwrap();
    assert_eq!(h1.size(), 1);
    assert_eq!(h2.size(), 2);
    assert_eq!(drain_front(&head), vec![1, 2, 3]);
}

#[test]
fn join_wakes_waiter_on_head() {
    let head: Arc<Deque<u32>> = Arc::new(Deque::new());
    let consumer = {
        let head = head.clone();
        thread::spawn(move || head.pop_front())
    };
    thread::sleep(Duration::from_millis(50));
    let tail = Deque::new();
    tail.push_back(11).unwrap();
    head.join(tail).unwrap();
    assert_eq!(consumer.join().unwrap(), Pop::Item(11));
}
