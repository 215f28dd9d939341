//! Every boundary leaves the chain as it found it

use crate::common::*;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
struct Step {
    propagation: Propagation,
    fails: bool,
    marks_rollback_only: bool,
}

fn step() -> impl Strategy<Value = Step> {
    (0..Propagation::ALL.len(), any::<bool>(), prop::bool::weighted(0.1)).prop_map(
        |(i, fails, marks_rollback_only)| Step {
            propagation: Propagation::ALL[i],
            fails,
            marks_rollback_only,
        },
    )
}

/// Run the steps as one call chain, each inside the previous
fn run_chain(fx: &Fixture, steps: &[Step]) {
    let Some((first, rest)) = steps.split_first() else {
        return;
    };
    let before = fx.depth();
    let enclosing = fx.current();

    let _ = fx.template.execute(&attr(first.propagation), || {
        assert_eq!(fx.depth(), before + 1);
        if let Some(tx) = fx.current() {
            fx.store.put(tx, format!("depth-{before}"), "v").unwrap();
        }
        if first.marks_rollback_only {
            let _ = fx.template.set_rollback_only(None);
        }
        run_chain(fx, rest);
        if first.fails {
            Err(AppError("app::Boom"))
        } else {
            Ok(())
        }
    });

    assert_eq!(fx.depth(), before);
    assert_eq!(fx.current(), enclosing);
}

proptest! {
    #[test]
    fn depth_and_transaction_restored(steps in prop::collection::vec(step(), 1..8)) {
        let fx = Fixture::new();
        run_chain(&fx, &steps);

        prop_assert_eq!(fx.depth(), 0);
        prop_assert_eq!(fx.store.open_transactions(), 0);

        let journal = fx.store.journal();
        let begun = journal.iter().filter(|c| matches!(c, ResourceCall::Begin { .. })).count();
        let ended = journal
            .iter()
            .filter(|c| matches!(c, ResourceCall::Commit(_) | ResourceCall::Rollback(_)))
            .count();
        prop_assert_eq!(begun, ended);

        let opened = journal.iter().filter(|c| matches!(c, ResourceCall::CreateSavepoint(..))).count();
        let released = journal.iter().filter(|c| matches!(c, ResourceCall::ReleaseSavepoint(..))).count();
        prop_assert_eq!(opened, released);
    }
}
