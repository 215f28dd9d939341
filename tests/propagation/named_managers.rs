//! Boundaries on several transaction managers at once

use crate::common::*;

struct TwoStores {
    main: Arc<InMemoryResourceManager>,
    audit: Arc<InMemoryResourceManager>,
    scope: Txscope,
}

fn two_stores() -> TwoStores {
    init_tracing();
    let main = Arc::new(InMemoryResourceManager::new());
    let audit = Arc::new(InMemoryResourceManager::without_savepoints());
    let scope = Txscope::builder()
        .config_str(
            r#"
            [managers.audit]
            nested_fallback = true

            [[components]]
            name = "Ledger"
            propagation = "required"

            [[components.operations]]
            name = "record"
            propagation = "required"
            qualifier = "audit"

            [[components.operations]]
            name = "require_audit"
            propagation = "mandatory"
            qualifier = "audit"
            "#,
        )
        .resource_manager(main.clone())
        .manager("audit", audit.clone(), None)
        .build()
        .unwrap();
    TwoStores { main, audit, scope }
}

#[test]
fn qualified_boundaries_use_their_own_manager() {
    let s = two_stores();
    let t = s.scope.template();

    s.scope
        .invoke(&CallSite::new("Ledger", "post"), || {
            let main_tx = t.current_resource(None).unwrap().unwrap();
            s.main.put(main_tx, "entry", "posted").unwrap();
            assert_eq!(t.current_resource(Some("audit")).unwrap(), None);

            s.scope
                .invoke(&CallSite::new("Ledger", "record"), || {
                    let audit_tx = t.current_resource(Some("audit")).unwrap().unwrap();
                    s.audit.put(audit_tx, "entry", "seen").unwrap();
                    // the main chain is untouched
                    assert_eq!(t.current_resource(None).unwrap(), Some(main_tx));
                    Ok::<_, AppError>(())
                })
                .unwrap();
            Ok::<_, AppError>(())
        })
        .unwrap();

    assert_eq!(s.main.committed()["entry"], "posted");
    assert_eq!(s.audit.committed()["entry"], "seen");
    assert_eq!(chain::depth("default"), 0);
    assert_eq!(chain::depth("audit"), 0);
}

#[test]
fn stacks_are_independent_per_manager() {
    let s = two_stores();

    let result = s.scope.invoke(&CallSite::new("Ledger", "post"), || {
        Ok::<_, AppError>(
            s.scope
                .invoke(&CallSite::new("Ledger", "require_audit"), || Ok::<_, AppError>(())),
        )
    });
    match result {
        Ok(Err(InvocationError::Declined(TxError::NoTransaction { .. }))) => {}
        other => panic!("expected refusal on the audit manager, got {other:?}"),
    }
    assert!(s.audit.journal().is_empty());
}

#[test]
fn unknown_qualifier_is_declined() {
    let s = two_stores();
    let ghost = Arc::new(TransactionAttribute::required().with_qualifier("ghost"));
    let result = s.scope.template().execute(&ghost, || Ok::<_, AppError>(()));
    assert!(matches!(
        result,
        Err(InvocationError::Declined(TxError::UnknownManager { ref name })) if name == "ghost"
    ));
}

#[test]
fn manager_settings_follow_the_named_table() {
    let s = two_stores();
    let t = s.scope.template();
    let nested_audit = Arc::new(TransactionAttribute::new(Propagation::Nested).with_qualifier("audit"));
    let audit_required = Arc::new(TransactionAttribute::required().with_qualifier("audit"));

    t.execute(&audit_required, || {
        let outer = t.current_resource(Some("audit")).unwrap();
        // no savepoints, so the audit manager falls back to a new transaction
        t.execute(&nested_audit, || {
            assert_ne!(t.current_resource(Some("audit")).unwrap(), outer);
            Ok::<_, AppError>(())
        })
        .unwrap();
        Ok::<_, AppError>(())
    })
    .unwrap();
    assert_eq!(
        s.audit
            .journal()
            .iter()
            .filter(|c| matches!(c, ResourceCall::Commit(_)))
            .count(),
        2
    );
}
