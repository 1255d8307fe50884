//! Unit tests for request/response correlation.

use std::time::Duration;

use spike_repl::repl::correlator::Correlator;
use spike_repl::AppError;

#[tokio::test]
async fn resolve_delivers_exact_payload() {
    let correlator = Correlator::new();
    let reply = correlator.allocate();
    let id = reply.id();

    assert!(correlator.resolve(id, " 2 ".to_owned()));

    let value = reply.wait(None).await.expect("reply delivered");
    assert_eq!(value, " 2 ");
    assert!(!correlator.is_pending(id));
}

#[tokio::test]
async fn resolving_one_id_leaves_others_pending() {
    let correlator = Correlator::new();
    let first = correlator.allocate();
    let second = correlator.allocate();

    assert!(correlator.resolve(second.id(), "b".to_owned()));

    assert!(correlator.is_pending(first.id()));
    assert_eq!(correlator.pending_count(), 1);
    assert_eq!(second.wait(None).await.expect("second resolved"), "b");
}

#[test]
fn allocated_ids_are_unique() {
    let correlator = Correlator::new();
    let replies: Vec<_> = (0..64).map(|_| correlator.allocate()).collect();

    let mut ids: Vec<u32> = replies.iter().map(|r| r.id()).collect();
    ids.sort_unstable();
    ids.dedup();

    assert_eq!(ids.len(), 64);
    assert_eq!(correlator.pending_count(), 64);
}

#[test]
fn allocate_skips_ids_still_pending() {
    let correlator = Correlator::new();
    // The counter starts at 1; occupy 2 by hand.
    let _manual = correlator.register(2).expect("register 2");

    let first = correlator.allocate();
    let second = correlator.allocate();

    assert_eq!(first.id(), 1);
    assert_eq!(second.id(), 3);
}

#[test]
fn duplicate_registration_is_rejected() {
    let correlator = Correlator::new();
    let _first = correlator.register(7).expect("first registration");

    let err = correlator.register(7).expect_err("duplicate must fail");

    assert!(matches!(err, AppError::Protocol(_)));
}

#[test]
fn resolve_of_unknown_id_is_a_no_op() {
    let correlator = Correlator::new();

    assert!(!correlator.resolve(404, "x".to_owned()));
}

#[tokio::test]
async fn timed_out_call_is_removed_and_never_resolved() {
    let correlator = Correlator::new();
    let reply = correlator.allocate();
    let id = reply.id();

    let err = reply
        .wait(Some(Duration::from_millis(20)))
        .await
        .expect_err("no reply must time out");

    assert!(matches!(err, AppError::Timeout(_)));
    assert!(!correlator.is_pending(id));
    assert!(
        !correlator.resolve(id, "late".to_owned()),
        "a late reply must not resolve a timed-out call"
    );
}

#[tokio::test]
async fn reply_that_beats_the_deadline_wins() {
    let correlator = Correlator::new();
    let reply = correlator.allocate();
    assert!(correlator.resolve(reply.id(), "fast".to_owned()));

    let value = reply
        .wait(Some(Duration::ZERO))
        .await
        .expect("already delivered value wins over an expired deadline");

    assert_eq!(value, "fast");
}

#[test]
fn cancel_wins_only_once() {
    let correlator = Correlator::new();
    let reply = correlator.allocate();
    let id = reply.id();

    assert!(correlator.cancel(id));
    assert!(!correlator.cancel(id));
    assert!(!correlator.resolve(id, "x".to_owned()));
}

#[test]
fn dropping_the_reply_unregisters_it() {
    let correlator = Correlator::new();
    let reply = correlator.allocate();
    let id = reply.id();

    drop(reply);

    assert!(!correlator.is_pending(id));
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn cancel_all_fails_waiters_with_transport_error() {
    let correlator = Correlator::new();
    let reply = correlator.allocate();

    assert_eq!(correlator.cancel_all(), 1);

    let err = reply.wait(None).await.expect_err("closed session");
    assert!(matches!(err, AppError::Transport(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deadline_racing_resolve_yields_value_or_timeout() {
    for round in 0..500 {
        let correlator = Correlator::new();
        let reply = correlator.allocate();
        let id = reply.id();

        let resolver = correlator.clone();
        let sender = std::thread::spawn(move || resolver.resolve(id, format!("v{round}")));
        let outcome = reply.wait(Some(Duration::ZERO)).await;
        let delivered = sender.join().expect("resolver thread");

        match outcome {
            Ok(value) => {
                assert!(delivered, "value returned but resolve reported failure");
                assert_eq!(value, format!("v{round}"));
            }
            Err(AppError::Timeout(_)) => {
                assert!(!delivered, "timed out but resolve reported delivery");
            }
            Err(other) => panic!("round {round}: unexpected outcome {other}"),
        }
        assert_eq!(correlator.pending_count(), 0);
    }
}
