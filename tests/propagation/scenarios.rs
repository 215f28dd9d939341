//! Propagation behaviors over the in-memory store

use crate::common::*;
use std::time::Duration;

#[test]
fn requires_new_and_nested_keep_failures_local() {
    let fx = Fixture::new();
    let t = &fx.template;

    let outer = t.execute(&attr(Propagation::Required), || {
        let a = fx.tx();
        fx.store.put(a, "a", "1").unwrap();

        let middle = t.execute(&attr(Propagation::RequiresNew), || {
            let b = fx.tx();
            assert_ne!(a, b);
            fx.store.put(b, "b", "1").unwrap();

            let nested = t.execute(&attr(Propagation::Nested), || {
                assert_eq!(fx.tx(), b);
                fx.store.put(b, "c", "1").unwrap();
                Err::<(), _>(AppError("app::Boom"))
            });
            assert!(matches!(nested, Err(InvocationError::Operation(AppError("app::Boom")))));
            Ok::<_, AppError>(())
        });
        assert!(middle.is_ok());

        // the suspended transaction is back
        assert_eq!(fx.tx(), a);
        Ok::<_, AppError>(())
    });
    assert!(outer.is_ok());

    let sp = SavepointHandle(1);
    assert_eq!(
        fx.store.journal(),
        vec![
            begin(1),
            begin(2),
            ResourceCall::CreateSavepoint(ResourceHandle(2), sp),
            ResourceCall::RollbackToSavepoint(ResourceHandle(2), sp),
            ResourceCall::ReleaseSavepoint(ResourceHandle(2), sp),
            ResourceCall::Commit(ResourceHandle(2)),
            ResourceCall::Commit(ResourceHandle(1)),
        ]
    );
    let committed = fx.store.committed();
    assert_eq!(committed.get("a").map(String::as_str), Some("1"));
    assert_eq!(committed.get("b").map(String::as_str), Some("1"));
    assert!(!committed.contains_key("c"));
    assert_eq!(fx.depth(), 0);
    assert_eq!(fx.store.open_transactions(), 0);
}

#[test]
fn joined_failure_dooms_the_outer_transaction() {
    let fx = Fixture::new();
    let t = &fx.template;

    let outer = t.execute(&attr(Propagation::Required), || {
        fx.store.put(fx.tx(), "k", "v").unwrap();
        let inner = t.execute(&attr(Propagation::Required), || Err::<(), _>(AppError("app::Boom")));
        assert!(inner.is_err());
        // the caller swallows the failure
        Ok::<_, AppError>(())
    });

    // reported as a warning only by default
    assert!(outer.is_ok());
    assert_eq!(fx.count(|c| matches!(c, ResourceCall::Rollback(_))), 1);
    assert_eq!(fx.count(|c| matches!(c, ResourceCall::Commit(_))), 0);
    assert!(fx.store.committed().is_empty());
}

#[test]
fn unexpected_rollback_can_be_reported() {
    let fx = Fixture::with_config(ManagerConfig::new().fail_on_unexpected_rollback(true));
    let t = &fx.template;

    let outer = t.execute(&attr(Propagation::Required), || {
        let _ = t.execute(&attr(Propagation::Supports), || Err::<(), _>(AppError("app::Boom")));
        Ok::<_, AppError>(7)
    });

    match outer {
        Err(InvocationError::Completion { error, operation }) => {
            assert!(matches!(error, TxError::UnexpectedRollback { .. }));
            assert!(operation.is_none());
        }
        other => panic!("expected unexpected rollback, got {other:?}"),
    }
    assert_eq!(fx.store.journal().last(), Some(&ResourceCall::Rollback(ResourceHandle(1))));
}

#[test]
fn explicit_rollback_only_is_not_unexpected() {
    let fx = Fixture::with_config(ManagerConfig::new().fail_on_unexpected_rollback(true));
    let t = &fx.template;

    let outer = t.execute(&attr(Propagation::Required), || {
        t.set_rollback_only(None).unwrap();
        Err::<(), _>(AppError("app::Boom"))
    });
    assert!(matches!(outer, Err(InvocationError::Operation(_))));
    assert_eq!(fx.count(|c| matches!(c, ResourceCall::Rollback(_))), 1);
}

#[test]
fn rollback_only_mark_beats_no_rollback_rules() {
    let fx = Fixture::new();
    let t = &fx.template;
    let tolerant =
        Arc::new(TransactionAttribute::required().no_rollback_for("app::Tolerated"));

    // the owner marks itself and then fails with a tolerated error
    let owner = t.execute(&tolerant, || {
        fx.store.put(fx.tx(), "owner", "v").unwrap();
        t.set_rollback_only(None).unwrap();
        Err::<(), _>(AppError("app::Tolerated"))
    });
    assert!(matches!(owner, Err(InvocationError::Operation(_))));
    assert_eq!(fx.store.journal(), vec![begin(1), ResourceCall::Rollback(ResourceHandle(1))]);

    // a participant doomed from below fails with a tolerated error
    fx.store.clear_journal();
    let outer = t.execute(&attr(Propagation::Required), || {
        fx.store.put(fx.tx(), "outer", "v").unwrap();
        let middle = t.execute(&tolerant, || {
            let _ = t.execute(&attr(Propagation::Required), || {
                Err::<(), _>(AppError("app::Boom"))
            });
            Err::<(), _>(AppError("app::Tolerated"))
        });
        assert!(middle.is_err());
        Ok::<_, AppError>(())
    });
    assert!(outer.is_ok());
    assert_eq!(fx.store.journal(), vec![begin(2), ResourceCall::Rollback(ResourceHandle(2))]);
    assert!(fx.store.committed().is_empty());
}

#[test]
fn mandatory_and_never_refuse_to_run() {
    let fx = Fixture::new();
    let t = &fx.template;
    let mut ran = false;

    let refused = t.execute(&attr(Propagation::Mandatory), || {
        ran = true;
        Ok::<_, AppError>(())
    });
    assert!(!ran);
    assert!(matches!(
        refused,
        Err(InvocationError::Declined(TxError::NoTransaction {
            propagation: Propagation::Mandatory
        }))
    ));

    let outer = t.execute(&attr(Propagation::Required), || {
        let never = t.execute(&attr(Propagation::Never), || Ok::<_, AppError>(()));
        assert!(matches!(
            never,
            Err(InvocationError::Declined(TxError::ExistingTransaction { .. }))
        ));
        let mandatory = t.execute(&attr(Propagation::Mandatory), || Ok::<_, AppError>(fx.tx()));
        assert_eq!(mandatory.unwrap(), fx.tx());
        Ok::<_, AppError>(())
    });
    assert!(outer.is_ok());
    // a refused boundary leaves the outer transaction alone
    assert_eq!(fx.store.journal(), vec![begin(1), ResourceCall::Commit(ResourceHandle(1))]);
}

#[test]
fn not_supported_runs_outside_and_restores() {
    let fx = Fixture::new();
    let t = &fx.template;

    t.execute(&attr(Propagation::Required), || {
        let a = fx.tx();
        t.execute(&attr(Propagation::NotSupported), || {
            assert_eq!(fx.current(), None);
            // a failure here has no transaction to roll back
            Err::<(), _>(AppError("app::Boom"))
        })
        .unwrap_err();
        assert_eq!(fx.tx(), a);
        fx.store.put(a, "kept", "yes").unwrap();
        Ok::<_, AppError>(())
    })
    .unwrap();

    assert_eq!(fx.store.committed()["kept"], "yes");
    assert_eq!(fx.depth(), 0);
}

#[test]
fn supports_without_transaction_touches_nothing() {
    let fx = Fixture::new();
    let value = fx
        .template
        .execute(&attr(Propagation::Supports), || {
            assert_eq!(fx.current(), None);
            assert_eq!(fx.depth(), 1);
            Ok::<_, AppError>(3)
        })
        .unwrap();
    assert_eq!(value, 3);
    assert!(fx.store.journal().is_empty());
    assert_eq!(fx.depth(), 0);
}

#[test]
fn nested_needs_savepoints_unless_fallback() {
    let fx = Fixture::without_savepoints(ManagerConfig::default());
    let t = &fx.template;
    t.execute(&attr(Propagation::Required), || {
        let nested = t.execute(&attr(Propagation::Nested), || Ok::<_, AppError>(()));
        assert!(matches!(
            nested,
            Err(InvocationError::Declined(TxError::NestedNotSupported { .. }))
        ));
        Ok::<_, AppError>(())
    })
    .unwrap();

    let fx = Fixture::without_savepoints(ManagerConfig::new().nested_fallback(true));
    let t = &fx.template;
    t.execute(&attr(Propagation::Required), || {
        let a = fx.tx();
        t.execute(&attr(Propagation::Nested), || {
            assert_ne!(fx.tx(), a);
            Ok::<_, AppError>(())
        })
        .unwrap();
        Ok::<_, AppError>(())
    })
    .unwrap();
    assert_eq!(fx.count(|c| matches!(c, ResourceCall::Commit(_))), 2);
}

#[test]
fn nested_without_transaction_starts_one() {
    let fx = Fixture::new();
    fx.template
        .execute(&attr(Propagation::Nested), || {
            fx.store.put(fx.tx(), "k", "v").unwrap();
            Ok::<_, AppError>(())
        })
        .unwrap();
    assert_eq!(fx.store.journal(), vec![begin(1), ResourceCall::Commit(ResourceHandle(1))]);
}

#[test]
fn begin_failure_resumes_suspended_transaction() {
    let fx = Fixture::new();
    let t = &fx.template;

    t.execute(&attr(Propagation::Required), || {
        let a = fx.tx();
        fx.store.fail_next(FailPoint::Begin);
        let fresh = t.execute(&attr(Propagation::RequiresNew), || Ok::<_, AppError>(()));
        assert!(matches!(
            fresh,
            Err(InvocationError::Declined(TxError::Resource(_)))
        ));
        assert_eq!(fx.tx(), a);
        Ok::<_, AppError>(())
    })
    .unwrap();
    assert_eq!(fx.store.journal().last(), Some(&ResourceCall::Commit(ResourceHandle(1))));
}

#[test]
fn commit_failure_is_reported_after_the_body() {
    let fx = Fixture::new();
    fx.store.fail_next(FailPoint::Commit);
    let result = fx
        .template
        .execute(&attr(Propagation::Required), || Ok::<_, AppError>(()));
    match result {
        Err(InvocationError::Completion { error, operation: None }) => {
            assert!(error.is_resource());
        }
        other => panic!("expected completion failure, got {other:?}"),
    }
    assert_eq!(fx.depth(), 0);
}

#[test]
fn strict_join_rejects_mismatched_attributes() {
    let fx = Fixture::with_config(ManagerConfig::new().strict_join(true));
    let t = &fx.template;
    t.execute(&attr(Propagation::Required), || {
        let serializable = Arc::new(
            TransactionAttribute::new(Propagation::Required)
                .with_isolation(Isolation::Serializable),
        );
        let joined = t.execute(&serializable, || Ok::<_, AppError>(()));
        assert!(matches!(
            joined,
            Err(InvocationError::Declined(TxError::IncompatibleAttributes { .. }))
        ));
        Ok::<_, AppError>(())
    })
    .unwrap();
}

#[test]
fn overrun_deadline_rolls_back() {
    let fx = Fixture::new();
    let timed = Arc::new(TransactionAttribute::required().with_timeout_seconds(0));
    let result = fx.template.execute(&timed, || {
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(
            fx.template.check_deadline(None),
            Err(TxError::TimedOut { .. })
        ));
        Ok::<_, AppError>(())
    });
    assert!(matches!(
        result,
        Err(InvocationError::Completion {
            error: TxError::TimedOut { .. },
            ..
        })
    ));
    assert_eq!(fx.store.journal().last(), Some(&ResourceCall::Rollback(ResourceHandle(1))));
}

#[test]
fn panic_in_body_rolls_back() {
    let fx = Fixture::new();
    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        fx.template.execute(&attr(Propagation::Required), || {
            fx.template
                .execute(&attr(Propagation::Nested), || -> std::result::Result<(), AppError> {
                    panic!("boom")
                })
        })
    }));
    assert!(caught.is_err());
    assert_eq!(fx.depth(), 0);
    assert_eq!(fx.store.open_transactions(), 0);
    assert_eq!(fx.store.journal().last(), Some(&ResourceCall::Rollback(ResourceHandle(1))));
}
