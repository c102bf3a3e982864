//! Model-based property tests for the bucket container: any sequence of
//! appends and erases over distinct non-zero ids must preserve the stored
//! multiset, independent of where the chain boundaries fall.

use opal_ir::BucketList;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Cmd {
    Append(u32),
    // Index into the live set, reduced modulo its current length.
    EraseAt(usize),
}

fn cmd_strategy() -> impl Strategy<Value = Cmd> {
    prop_oneof![
        (1u32..=512).prop_map(Cmd::Append),
        any::<usize>().prop_map(Cmd::EraseAt),
    ]
}

fn check_against_model<const N: usize>(cmds: &[Cmd]) -> Result<(), TestCaseError> {
    let mut list = BucketList::<N>::new();
    let mut model: Vec<u32> = Vec::new();

    for &cmd in cmds {
        match cmd {
            Cmd::Append(v) => {
                // Keep ids distinct; erase removes a single occurrence, so
                // duplicates would make the model diverge from intent.
                if !model.contains(&v) {
                    list.append(v);
                    model.push(v);
                }
            }
            Cmd::EraseAt(i) => {
                if !model.is_empty() {
                    let v = model.swap_remove(i % model.len());
                    list.erase(v);
                }
            }
        }

        let mut got: Vec<u32> = Vec::new();
        list.iterate(|v| got.push(v));
        got.sort_unstable();
        let mut want = model.clone();
        want.sort_unstable();
        prop_assert_eq!(&got, &want);

        for &v in &model {
            prop_assert!(list.find(|x| x == v));
        }
        prop_assert!(!list.find(|x| x == 0xFFFF));
    }
    Ok(())
}

proptest! {
    #[test]
    fn small_buckets_preserve_the_multiset(cmds in prop::collection::vec(cmd_strategy(), 0..64)) {
        check_against_model::<4>(&cmds)?;
    }

    #[test]
    fn default_sized_buckets_preserve_the_multiset(
        cmds in prop::collection::vec(cmd_strategy(), 0..64),
    ) {
        check_against_model::<6>(&cmds)?;
    }

    #[test]
    fn append_then_drain_in_any_order(n in 1usize..40, seed in any::<u64>()) {
        let mut list = BucketList::<6>::new();
        let ids: Vec<u32> = (1..=n as u32).collect();
        for &v in &ids {
            list.append(v);
        }

        // Deterministic pseudo-shuffle of the erase order.
        let mut to_erase = ids.clone();
        let mut state = seed | 1;
        for i in (1..to_erase.len()).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            to_erase.swap(i, (state as usize) % (i + 1));
        }

        for (k, &v) in to_erase.iter().enumerate() {
            list.erase(v);
            prop_assert!(!list.find(|x| x == v));
            let mut remaining = 0;
            list.iterate(|_| remaining += 1);
            prop_assert_eq!(remaining, ids.len() - k - 1);
        }
        prop_assert!(!list.find(|_| true));
    }
}
