#![allow(missing_docs)]
//! Property tests: the handle against a reference model, scope nesting, and
//! fork isolation across random seeds.

mod common;

use common::*;
use fiberlocal::{Cx, FiberLocal};
use proptest::collection::vec;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Set(u64),
    Reset,
    UpdateAdd(u64),
    GetAndSet(u64),
    GetAndReset,
    ModifyDouble,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u64>().prop_map(Op::Set),
        Just(Op::Reset),
        (0u64..1000).prop_map(Op::UpdateAdd),
        any::<u64>().prop_map(Op::GetAndSet),
        Just(Op::GetAndReset),
        Just(Op::ModifyDouble),
    ]
}

proptest! {
    #![proptest_config(cases(256))]

    /// Every operation sequence agrees with a trivial `Option<u64>` model
    /// where `None` means "unset, the default shows through".
    #[test]
    fn handle_agrees_with_reference_model(
        default in any::<u64>(),
        ops in vec(op_strategy(), 0..64),
    ) {
        let cx = Cx::detached();
        let local = FiberLocal::new(default);
        let mut model: Option<u64> = None;

        for op in ops {
            let effective = model.unwrap_or(default);
            match op {
                Op::Set(v) => {
                    local.set(&cx, v);
                    model = Some(v);
                }
                Op::Reset => {
                    local.reset(&cx);
                    model = None;
                }
                Op::UpdateAdd(n) => {
                    local.update(&cx, move |v| v.wrapping_add(n));
                    model = Some(effective.wrapping_add(n));
                }
                Op::GetAndSet(v) => {
                    prop_assert_eq!(local.get_and_set(&cx, v), effective);
                    model = Some(v);
                }
                Op::GetAndReset => {
                    prop_assert_eq!(local.get_and_reset(&cx), effective);
                    model = None;
                }
                Op::ModifyDouble => {
                    let aux = local.modify(&cx, |v| (v.wrapping_mul(2), v));
                    prop_assert_eq!(aux, effective);
                    model = Some(effective.wrapping_mul(2));
                }
            }
            prop_assert_eq!(local.get(&cx), model.unwrap_or(default));
        }
    }

    /// Interleaving operations on two independent handles never cross over,
    /// even when the defaults collide.
    #[test]
    fn independent_handles_never_alias(
        default in any::<u64>(),
        writes in vec((any::<bool>(), any::<u64>()), 0..64),
    ) {
        let cx = Cx::detached();
        let first = FiberLocal::new(default);
        let second = FiberLocal::new(default);
        let mut expected = (default, default);

        for (pick_first, value) in writes {
            if pick_first {
                first.set(&cx, value);
                expected.0 = value;
            } else {
                second.set(&cx, value);
                expected.1 = value;
            }
            prop_assert_eq!(first.get(&cx), expected.0);
            prop_assert_eq!(second.get(&cx), expected.1);
        }
    }

    /// A stack of scopes restores exactly one level per guard drop, in LIFO
    /// order, ending at the pre-scope value.
    #[test]
    fn scope_stack_unwinds_level_by_level(
        base in any::<u64>(),
        overrides in vec(any::<u64>(), 1..8),
    ) {
        let cx = Cx::detached();
        let local = FiberLocal::new(0u64);
        local.set(&cx, base);

        let mut guards = Vec::new();
        for value in &overrides {
            guards.push(local.scope(&cx, *value));
            prop_assert_eq!(local.get(&cx), *value);
        }

        while let Some(guard) = guards.pop() {
            drop(guard);
            let expected = match guards.len() {
                0 => base,
                depth => overrides[depth - 1],
            };
            prop_assert_eq!(local.get(&cx), expected);
        }
        prop_assert_eq!(local.get(&cx), base);
    }

    /// Fork isolation is seed-independent: whatever interleaving the
    /// scheduler picks, the parent's value survives sibling writes.
    #[test]
    fn fork_isolation_holds_for_any_seed(
        seed in any::<u64>(),
        parent_value in any::<u32>(),
        child_values in vec(any::<u32>(), 1..4),
    ) {
        let mut runtime = seeded_runtime(seed);
        let local = FiberLocal::new(0u32);

        let l = local.clone();
        let result = runtime
            .run(move |cx| async move {
                l.set(&cx, parent_value);
                let children: Vec<_> = child_values
                    .into_iter()
                    .map(|value| {
                        cx.fork({
                            let l = l.clone();
                            move |cx| async move {
                                l.set(&cx, value);
                                fiberlocal::yield_now().await;
                                (value, l.get(&cx))
                            }
                        })
                        .expect("fork")
                    })
                    .collect();
                let mut views = Vec::new();
                for child in children {
                    views.push(child.join().await);
                }
                (views, l.get(&cx))
            })
            .expect("run");

        let (views, parent_seen) = result;
        prop_assert_eq!(parent_seen, parent_value);
        for view in views {
            let (written, seen) = view.ok().expect("child completed");
            prop_assert_eq!(seen, written);
        }
    }
}
