//! Runtimes assembled from configuration files

use crate::common::*;
use std::io::Write;
use tempfile::NamedTempFile;

const SHOP: &str = r#"
[manager]
resume_timeout = "exclude_suspension"

[[error_types]]
name = "shop::Error"
class = "checked"

[[error_types]]
name = "shop::OutOfStock"
parent = "shop::Error"

[[error_types]]
name = "shop::PaymentDeclined"
parent = "shop::Error"
class = "unchecked"

[[components]]
name = "Checkout"
propagation = "required"
no_rollback_for = ["shop::PaymentDeclined"]

[[components.operations]]
name = "reserve"
propagation = "nested"
rollback_for = ["shop::Error"]

[[components.operations]]
name = "audit"
propagation = "requires_new"

[[components]]
name = "Reports"

[[components.operations]]
name = "render"
propagation = "not_supported"
"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn shop() -> (NamedTempFile, Arc<InMemoryResourceManager>, Txscope) {
    init_tracing();
    let file = write_config(SHOP);
    let store = Arc::new(InMemoryResourceManager::new());
    let scope = Txscope::builder()
        .config_file(file.path())
        .resource_manager(store.clone())
        .build()
        .unwrap();
    (file, store, scope)
}

fn site(component: &str, operation: &str) -> CallSite {
    CallSite::new(component, operation)
}

fn tx(scope: &Txscope) -> ResourceHandle {
    scope.template().current_resource(None).unwrap().expect("transaction")
}

#[test]
fn class_rules_apply_to_undeclared_operations() {
    let (_file, store, scope) = shop();

    let result = scope.invoke(&site("Checkout", "pay"), || {
        store.put(tx(&scope), "payment", "attempted").unwrap();
        Err::<(), _>(AppError("shop::PaymentDeclined"))
    });
    assert!(matches!(result, Err(InvocationError::Operation(_))));
    // unchecked, but the class rule says commit
    assert_eq!(store.committed()["payment"], "attempted");
}

#[test]
fn method_rules_override_for_their_operation() {
    let (_file, store, scope) = shop();

    scope
        .invoke(&site("Checkout", "place"), || {
            store.put(tx(&scope), "order", "placed").unwrap();
            let reserved = scope.invoke(&site("Checkout", "reserve"), || {
                store.put(tx(&scope), "stock", "reserved").unwrap();
                Err::<(), _>(AppError("shop::OutOfStock"))
            });
            assert!(reserved.is_err());
            Ok::<_, AppError>(())
        })
        .unwrap();

    let committed = store.committed();
    assert_eq!(committed["order"], "placed");
    assert!(!committed.contains_key("stock"));
    assert_eq!(
        store
            .journal()
            .iter()
            .filter(|c| matches!(c, ResourceCall::RollbackToSavepoint(..)))
            .count(),
        1
    );
}

#[test]
fn checked_errors_commit_by_default() {
    let (_file, store, scope) = shop();
    let result = scope.invoke(&site("Checkout", "audit"), || {
        store.put(tx(&scope), "audit", "1").unwrap();
        Err::<(), _>(AppError("shop::OutOfStock"))
    });
    assert!(result.is_err());
    assert_eq!(store.committed()["audit"], "1");
}

#[test]
fn operations_only_components_cover_declared_operations() {
    let (_file, store, scope) = shop();

    scope
        .invoke(&site("Checkout", "place"), || {
            scope
                .invoke(&site("Reports", "render"), || {
                    assert!(scope.template().current_resource(None).unwrap().is_none());
                    assert_eq!(chain::depth("default"), 2);
                    Ok::<_, AppError>(())
                })
                .unwrap();
            scope
                .invoke(&site("Reports", "export"), || {
                    // undeclared: runs inside the caller's boundary untouched
                    assert_eq!(chain::depth("default"), 1);
                    Ok::<_, AppError>(())
                })
                .unwrap();
            Ok::<_, AppError>(())
        })
        .unwrap();

    assert_eq!(store.journal(), vec![begin(1), ResourceCall::Commit(ResourceHandle(1))]);
    assert!(scope.attribute_source().cached() >= 3);
}

#[test]
fn broken_files_are_config_errors() {
    let file = write_config("[[components]]\nname = \"A\"\npropagation = \"sideways\"\n");
    let err = Txscope::builder()
        .config_file(file.path())
        .resource_manager(Arc::new(InMemoryResourceManager::new()))
        .build()
        .unwrap_err();
    assert!(err.is_config());

    // a typo must not silently drop the component's semantics
    let file = write_config("[[components]]\nname = \"A\"\npropagaton = \"never\"\n");
    let err = Txscope::builder()
        .config_file(file.path())
        .resource_manager(Arc::new(InMemoryResourceManager::new()))
        .build()
        .unwrap_err();
    assert!(err.is_config());

    let file = write_config("[[error_types]]\nname = \"a::B\"\nparent = \"a::Missing\"\n");
    let err = Txscope::builder()
        .config_file(file.path())
        .resource_manager(Arc::new(InMemoryResourceManager::new()))
        .build()
        .unwrap_err();
    assert!(err.is_config());
}
