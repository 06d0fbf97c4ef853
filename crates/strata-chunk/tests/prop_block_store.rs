use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;
use strata_blocks::Block;
use strata_chunk::BlockStore;

fn local() -> impl Strategy<Value = (usize, usize, usize)> {
    (0usize..16, 0usize..16, 0usize..16)
}

fn block() -> impl Strategy<Value = Block> {
    (0u16..8, any::<u16>()).prop_map(|(id, data)| Block::new(id, data))
}

proptest! {
    // Reads see the last write at every position and nothing else moves.
    #[test]
    fn get_and_set_is_last_write_wins(writes in prop::collection::vec((local(), block()), 1..64)) {
        let store = BlockStore::uniform(Block::AIR, 10);
        let mut model = std::collections::HashMap::new();
        for ((x, y, z), b) in &writes {
            let old = store.get_and_set(*x, *y, *z, *b);
            let expect = model.insert((*x, *y, *z), *b).unwrap_or(Block::AIR);
            prop_assert_eq!(old, expect);
        }
        for ((x, y, z), b) in &model {
            prop_assert_eq!(store.get(*x, *y, *z), *b);
        }
        prop_assert_eq!(store.get(15, 15, 15), *model.get(&(15, 15, 15)).unwrap_or(&Block::AIR));
    }

    // Field writes touch only the masked bits and return the old field.
    #[test]
    fn set_field_only_touches_mask(p in local(), start in any::<u16>(), shift in 0u32..12, value in 0u16..16) {
        let (x, y, z) = p;
        let store = BlockStore::uniform(Block::new(1, start), 10);
        let mask = 0xFu16 << shift;
        let old = store.set_field(x, y, z, mask, value);
        prop_assert_eq!(old, (start & mask) >> shift);
        let now = store.get(x, y, z);
        prop_assert_eq!(now.id, 1);
        prop_assert_eq!(now.data & !mask, start & !mask);
        prop_assert_eq!((now.data & mask) >> shift, value);
    }

    #[test]
    fn add_field_wraps_inside_field(start in 0u16..16, delta in 0u16..40) {
        let store = BlockStore::uniform(Block::new(2, 0xA000 | (start << 4)), 10);
        let old = store.add_field(0, 0, 0, 0x00F0, delta);
        prop_assert_eq!(old, start);
        let now = store.get(0, 0, 0);
        prop_assert_eq!((now.data & 0x00F0) >> 4, (start + delta) % 16);
        prop_assert_eq!(now.data & 0xFF0F, 0xA000);
    }
}

#[test]
fn rewriting_same_value_is_not_dirty() {
    let store = BlockStore::uniform(Block::new(1, 0), 10);
    store.get_and_set(3, 3, 3, Block::new(1, 0));
    assert!(!store.is_dirty());
    assert!(store.is_uniform());
    store.get_and_set(3, 3, 3, Block::new(2, 0));
    store.get_and_set(3, 3, 3, Block::new(2, 0));
    assert_eq!(store.dirty_len(), 1);
}

#[test]
fn dirty_list_overflow_boundary() {
    let cap = 10;
    let store = BlockStore::uniform(Block::AIR, cap);
    for x in 0..cap {
        store.get_and_set(x, 0, 0, Block::new(1, 0));
    }
    assert!(store.is_dirty());
    assert!(!store.is_dirty_overflow());
    assert_eq!(store.dirty_len(), cap);
    assert_eq!(store.dirty_block_at(cap - 1), Some((cap - 1, 0, 0)));

    store.get_and_set(0, 1, 0, Block::new(1, 0));
    assert!(store.is_dirty_overflow());
    assert_eq!(store.dirty_len(), cap);

    store.reset_dirty();
    assert!(!store.is_dirty());
    assert!(!store.is_dirty_overflow());
    assert_eq!(store.dirty_block_at(0), None);
}

#[test]
fn concurrent_cas_has_one_winner_per_transition() {
    let store = BlockStore::uniform(Block::new(0, 0), 10);
    let wins = AtomicUsize::new(0);
    let rounds = 200u16;
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for r in 0..rounds {
                    let expect = Block::new(0, r);
                    let next = Block::new(0, r + 1);
                    // Wait for the round to open, then race for it.
                    loop {
                        let cur = store.get(1, 2, 3);
                        if cur.data > r {
                            break;
                        }
                        if cur == expect && store.compare_and_set(1, 2, 3, expect, next) {
                            wins.fetch_add(1, Ordering::Relaxed);
                            break;
                        }
                        std::hint::spin_loop();
                    }
                }
            });
        }
    });
    assert_eq!(wins.load(Ordering::Relaxed), rounds as usize);
    assert_eq!(store.get(1, 2, 3), Block::new(0, rounds));
}

#[test]
fn concurrent_field_adds_lose_nothing() {
    let store = BlockStore::uniform(Block::new(5, 0), 10);
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..1000 {
                    store.add_field(0, 0, 0, 0xFFFF, 1);
                }
            });
        }
    });
    assert_eq!(store.get(0, 0, 0), Block::new(5, 4000));
}

#[test]
fn compress_restores_uniform() {
    let store = BlockStore::uniform(Block::new(1, 0), 10);
    store.get_and_set(4, 4, 4, Block::new(2, 0));
    assert!(!store.needs_compression());
    store.get_and_set(4, 4, 4, Block::new(1, 0));
    assert!(store.needs_compression());
    let c = store.compress().expect("uniform again");
    assert!(c.is_uniform());
    assert_eq!(c.get(4, 4, 4), Block::new(1, 0));
}
