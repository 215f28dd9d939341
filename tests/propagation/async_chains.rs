//! Call chains that follow tokio tasks

use crate::common::*;
use std::time::Duration;

fn shared() -> (Arc<InMemoryResourceManager>, TransactionTemplate) {
    init_tracing();
    let store = Arc::new(InMemoryResourceManager::new());
    let manager = TransactionManager::new(store.clone());
    let template = TransactionTemplate::new(Arc::new(ManagerRegistry::single(manager)));
    (store, template)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_keep_separate_chains() {
    let (store, template) = shared();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let template = template.clone();
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let inner = template.clone();
            template
                .execute_async(&attr(Propagation::Required), || async move {
                    let tx = inner.current_resource(None)?.expect("transaction");
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    // still ours after the task may have moved threads
                    assert_eq!(inner.current_resource(None)?, Some(tx));
                    assert_eq!(chain::depth("default"), 1);
                    store.put(tx, format!("task-{i}"), "done")?;
                    Ok::<_, TxError>(tx)
                })
                .await
        }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }
    handles.sort_by_key(|h| h.0);
    handles.dedup();
    assert_eq!(handles.len(), 8);
    assert_eq!(store.committed().len(), 8);
    assert_eq!(store.open_transactions(), 0);
}

#[tokio::test]
async fn spawned_tasks_start_without_transaction() {
    let (_store, template) = shared();
    let inner = template.clone();

    template
        .execute_async(&attr(Propagation::Required), || async move {
            let spawned = inner.clone();
            let refused = tokio::spawn(async move {
                let depth = chain::depth("default");
                let mandatory = spawned
                    .execute_async(&attr(Propagation::Mandatory), || async {
                        Ok::<_, AppError>(())
                    })
                    .await;
                (depth, mandatory.map_err(|e| e.is_declined()))
            })
            .await
            .unwrap();
            assert_eq!(refused, (0, Err(true)));
            assert!(inner.current_resource(None)?.is_some());
            Ok::<_, TxError>(())
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn sync_code_inside_a_task_joins_its_chain() {
    let (store, template) = shared();
    let inner = template.clone();

    template
        .execute_async(&attr(Propagation::Required), || async move {
            tokio::task::yield_now().await;
            let outer = inner.current_resource(None)?;
            let joined = inner
                .execute(&attr(Propagation::Mandatory), || inner.current_resource(None))
                .unwrap();
            assert_eq!(joined, outer);
            Ok::<_, TxError>(())
        })
        .await
        .unwrap();

    assert_eq!(store.journal(), vec![begin(1), ResourceCall::Commit(ResourceHandle(1))]);
}

#[tokio::test]
async fn nested_async_boundaries_commit_in_order() {
    let (store, template) = shared();
    let inner = template.clone();

    let result = template
        .execute_async(&attr(Propagation::Required), || async move {
            let a = inner.current_resource(None)?.expect("transaction");
            let nested = inner.clone();
            let b = inner
                .execute_async(&attr(Propagation::RequiresNew), || async move {
                    tokio::task::yield_now().await;
                    nested.current_resource(None)
                })
                .await
                .unwrap();
            assert_ne!(b, Some(a));
            assert_eq!(inner.current_resource(None)?, Some(a));
            Ok::<_, TxError>(())
        })
        .await;
    assert!(result.is_ok());
    assert_eq!(
        store.journal(),
        vec![
            begin(1),
            begin(2),
            ResourceCall::Commit(ResourceHandle(2)),
            ResourceCall::Commit(ResourceHandle(1)),
        ]
    );
}

#[tokio::test]
async fn cancelled_future_rolls_back() {
    let (store, template) = shared();
    let inner = template.clone();
    let writer = store.clone();

    let required = attr(Propagation::Required);
    let work = template.execute_async(&required, || async move {
        let tx = inner.current_resource(None)?.expect("transaction");
        writer.put(tx, "lost", "v")?;
        std::future::pending::<()>().await;
        Ok::<_, TxError>(())
    });
    let timed_out = tokio::time::timeout(Duration::from_millis(10), work).await;
    assert!(timed_out.is_err());

    assert_eq!(store.open_transactions(), 0);
    assert_eq!(store.journal().last(), Some(&ResourceCall::Rollback(ResourceHandle(1))));
    assert!(store.committed().is_empty());
    assert!(!chain::is_transaction_active("default"));
}
