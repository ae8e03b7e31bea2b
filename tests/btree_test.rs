use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use strata::buffer::BufferPoolManager;
use strata::common::{PageId, StrataError, INVALID_PAGE_ID};
use strata::index::BPlusTree;
use strata::storage::disk::DiskManager;
use strata::tuple::{DataType, Schema, Tuple, Value};

use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, 2, disk_manager));
    (bpm, temp_file)
}

fn int_schema(name: &str) -> Arc<Schema> {
    Schema::builder().column(name, DataType::Integer).build_arc()
}

fn int_tree(bpm: &Arc<BufferPoolManager>, leaf_max: usize, internal_max: usize) -> BPlusTree {
    BPlusTree::new(
        "int_index",
        Arc::clone(bpm),
        int_schema("key"),
        int_schema("value"),
        leaf_max,
        internal_max,
        INVALID_PAGE_ID,
    )
    .unwrap()
}

fn int_tuple(schema: &Arc<Schema>, v: i32) -> Tuple {
    Tuple::new(Arc::clone(schema), &[Value::Integer(v)]).unwrap()
}

fn insert(tree: &BPlusTree, k: i32) -> bool {
    tree.insert(&int_tuple(tree.key_schema(), k), &int_tuple(tree.value_schema(), k))
        .unwrap()
}

fn remove(tree: &BPlusTree, k: i32) -> bool {
    tree.remove(&int_tuple(tree.key_schema(), k)).unwrap()
}

fn lookup(tree: &BPlusTree, k: i32) -> Option<i32> {
    tree.get_value(&int_tuple(tree.key_schema(), k))
        .unwrap()
        .map(|value| match value.value(0) {
            Some(Value::Integer(v)) => v,
            other => panic!("unexpected value {:?}", other),
        })
}

fn scan_keys(tree: &BPlusTree) -> Vec<i32> {
    tree.begin()
        .unwrap()
        .map(|entry| match entry.unwrap().0.value(0) {
            Some(Value::Integer(k)) => k,
            other => panic!("unexpected key {:?}", other),
        })
        .collect()
}

#[test]
fn test_btree_insert_and_search() {
    let (bpm, _temp) = create_bpm(50);
    let tree = int_tree(&bpm, 4, 4);

    for k in [10, 20, 30] {
        assert!(insert(&tree, k));
    }
    assert_eq!(lookup(&tree, 10), Some(10));
    assert_eq!(lookup(&tree, 20), Some(20));
    assert_eq!(lookup(&tree, 30), Some(30));
    assert_eq!(lookup(&tree, 40), None);
}

#[test]
fn test_btree_random_insert() {
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    let (bpm, _temp) = create_bpm(50);
    let tree = int_tree(&bpm, 3, 4);

    let mut keys: Vec<i32> = (0..500).collect();
    keys.shuffle(&mut thread_rng());
    for &k in &keys {
        assert!(insert(&tree, k));
    }
    for &k in &keys {
        assert_eq!(lookup(&tree, k), Some(k), "Failed at key {}", k);
    }
    assert_eq!(scan_keys(&tree), (0..500).collect::<Vec<_>>());
}

#[test]
fn test_btree_delete_scenarios() {
    let (bpm, _temp) = create_bpm(50);

    let tree = int_tree(&bpm, 2, 3);
    for k in 1..=5 {
        insert(&tree, k);
    }
    for k in [1, 5, 3, 4] {
        assert!(remove(&tree, k));
    }
    assert_eq!(scan_keys(&tree), vec![2]);

    let tree = int_tree(&bpm, 2, 3);
    for k in 1..=10 {
        insert(&tree, k);
    }
    for k in [1, 5, 3, 4, 6, 7] {
        assert!(remove(&tree, k));
    }
    assert_eq!(scan_keys(&tree), vec![2, 8, 9, 10]);
    assert!(!remove(&tree, 6));
}

#[test]
fn test_btree_split_and_merge_boundaries() {
    let (bpm, _temp) = create_bpm(50);
    let tree = int_tree(&bpm, 3, 3);

    // A full root leaf splits on the next insert and collapses back when emptied
    for k in 1..=3 {
        insert(&tree, k);
        tree.check_integrity().unwrap();
    }
    let leaf_root = tree.get_root_page_id();
    insert(&tree, 4);
    tree.check_integrity().unwrap();
    let internal_root = tree.get_root_page_id();
    assert_ne!(internal_root, leaf_root);

    // The right leaf underflows and borrows from its left sibling
    remove(&tree, 4);
    tree.check_integrity().unwrap();
    remove(&tree, 3);
    tree.check_integrity().unwrap();
    assert_eq!(tree.get_root_page_id(), internal_root);
    assert_eq!(scan_keys(&tree), vec![1, 2]);

    // Now neither leaf can lend, so they merge and the root collapses
    remove(&tree, 2);
    tree.check_integrity().unwrap();
    assert_ne!(tree.get_root_page_id(), internal_root);
    assert_eq!(scan_keys(&tree), vec![1]);

    remove(&tree, 1);
    tree.check_integrity().unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.get_root_page_id(), INVALID_PAGE_ID);

    // The tree is usable again after becoming empty
    insert(&tree, 7);
    tree.check_integrity().unwrap();
    assert_eq!(scan_keys(&tree), vec![7]);
}

#[test]
fn test_btree_iterator_range() {
    let (bpm, _temp) = create_bpm(50);
    let tree = int_tree(&bpm, 3, 3);
    for k in (0..100).step_by(3) {
        insert(&tree, k);
    }

    let from_50: Vec<i32> = tree
        .begin_at(&int_tuple(tree.key_schema(), 50))
        .unwrap()
        .take(4)
        .map(|entry| match entry.unwrap().0.value(0) {
            Some(Value::Integer(k)) => k,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(from_50, vec![51, 54, 57, 60]);

    let mut it = tree.begin().unwrap();
    assert!(!it.is_end());
    assert_eq!(it.index(), 0);
    while let Some(entry) = it.next() {
        entry.unwrap();
    }
    assert!(it.is_end());
    assert_eq!(it.page_id(), INVALID_PAGE_ID);
    assert_eq!(it.index(), -1);
    assert!(it == tree.end());
}

#[test]
fn test_btree_char_keys() {
    let (bpm, _temp) = create_bpm(50);
    let key_schema = Schema::builder()
        .column("name", DataType::Char(8))
        .column("id", DataType::Integer)
        .build_arc();
    let value_schema = Schema::builder().column("active", DataType::Boolean).build_arc();
    let tree = BPlusTree::new(
        "name_index",
        Arc::clone(&bpm),
        Arc::clone(&key_schema),
        Arc::clone(&value_schema),
        4,
        4,
        INVALID_PAGE_ID,
    )
    .unwrap();

    let names = ["mallory", "alice", "bob", "al", "carol", "bob"];
    for (i, name) in names.iter().enumerate() {
        let key = Tuple::new(Arc::clone(&key_schema), &[(*name).into(), (i as i32).into()]).unwrap();
        let value = Tuple::new(Arc::clone(&value_schema), &[(i % 2 == 0).into()]).unwrap();
        assert!(tree.insert(&key, &value).unwrap());
    }

    let order: Vec<String> = tree
        .begin()
        .unwrap()
        .map(|entry| entry.unwrap().0.to_string())
        .collect();
    assert_eq!(
        order,
        vec!["('al', 3)", "('alice', 1)", "('bob', 2)", "('bob', 5)", "('carol', 4)", "('mallory', 0)"]
    );
}

#[test]
fn test_btree_buffer_pool_exhaustion() {
    let (bpm, _temp) = create_bpm(4);
    let tree = int_tree(&bpm, 2, 3);

    let mut stored = Vec::new();
    let mut failures = 0;
    for k in 0..200 {
        match tree.insert(&int_tuple(tree.key_schema(), k), &int_tuple(tree.value_schema(), k)) {
            Ok(true) => stored.push(k),
            Ok(false) => panic!("key {} reported as duplicate", k),
            Err(StrataError::BufferPoolFull) => failures += 1,
            Err(e) => panic!("unexpected error {}", e),
        }
    }

    // Failed inserts leave the tree untouched
    assert!(failures > 0);
    assert_eq!(scan_keys(&tree), stored);
    tree.check_integrity().unwrap();

    // So do removes that cannot latch every sibling they need
    let mut remaining: BTreeSet<i32> = stored.iter().copied().collect();
    for &k in stored.iter().step_by(2) {
        match tree.remove(&int_tuple(tree.key_schema(), k)) {
            Ok(true) => {
                remaining.remove(&k);
            }
            Ok(false) => panic!("key {} reported as missing", k),
            Err(StrataError::BufferPoolFull) => assert_eq!(lookup(&tree, k), Some(k)),
            Err(e) => panic!("unexpected error {}", e),
        }
        tree.check_integrity().unwrap();
    }
    assert_eq!(scan_keys(&tree), remaining.into_iter().collect::<Vec<_>>());
    for page_id in 0..bpm.disk_manager().num_pages().unwrap() as i32 {
        assert!(matches!(bpm.get_pin_count(PageId::new(page_id)), None | Some(0)));
    }
}

#[test]
fn test_btree_remove_on_a_small_pool() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    // Leaves [10] [20] [30] [40] [50, 60] under a single root
    let root_page_id = {
        let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(50, 2, disk_manager));
        let tree = int_tree(&bpm, 2, 10);
        for k in (10..=60).step_by(10) {
            insert(&tree, k);
        }
        bpm.flush_all_pages().unwrap();
        tree.get_root_page_id()
    };

    let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(3, 2, disk_manager));
    let tree = BPlusTree::new(
        "int_index",
        Arc::clone(&bpm),
        int_schema("key"),
        int_schema("value"),
        2,
        10,
        root_page_id,
    )
    .unwrap();

    // Root, leaf and left sibling fill the pool before the right sibling is checked
    let result = tree.remove(&int_tuple(tree.key_schema(), 30));
    assert!(matches!(result, Err(StrataError::BufferPoolFull)));
    assert_eq!(lookup(&tree, 30), Some(30));
    assert_eq!(scan_keys(&tree), vec![10, 20, 30, 40, 50, 60]);
    tree.check_integrity().unwrap();

    // Removes whose siblings fit in the pool still go through
    assert!(remove(&tree, 60));
    assert!(remove(&tree, 10));
    assert_eq!(scan_keys(&tree), vec![20, 30, 40, 50]);
    tree.check_integrity().unwrap();

    for page_id in 0..bpm.disk_manager().num_pages().unwrap() as i32 {
        assert!(matches!(bpm.get_pin_count(PageId::new(page_id)), None | Some(0)));
    }
    drop(tree);
    bpm.flush_all_pages().unwrap();
    drop(bpm);

    let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(50, 2, disk_manager));
    let tree = BPlusTree::new(
        "int_index",
        Arc::clone(&bpm),
        int_schema("key"),
        int_schema("value"),
        2,
        10,
        root_page_id,
    )
    .unwrap();
    tree.check_integrity().unwrap();
    assert_eq!(scan_keys(&tree), vec![20, 30, 40, 50]);
}

#[test]
fn test_btree_concurrent_insert() {
    let (bpm, _temp) = create_bpm(50);
    let tree = Arc::new(int_tree(&bpm, 2, 3));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for k in 1..300 {
                    insert(&tree, k);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(scan_keys(&tree), (1..300).collect::<Vec<_>>());
    tree.check_integrity().unwrap();
    for k in 1..300 {
        assert_eq!(lookup(&tree, k), Some(k));
    }
}

#[test]
fn test_btree_concurrent_mixed() {
    let (bpm, _temp) = create_bpm(50);
    let tree = Arc::new(int_tree(&bpm, 3, 4));

    // Odd keys exist up front and are removed while even keys are inserted
    for k in (1..400).step_by(2) {
        insert(&tree, k);
    }

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for k in (0..400).filter(|k| k % 4 == t) {
                    if k % 2 == 0 {
                        assert!(insert(&tree, k));
                    } else {
                        assert!(remove(&tree, k));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(scan_keys(&tree), (0..400).step_by(2).collect::<Vec<_>>());
    tree.check_integrity().unwrap();
}

#[test]
fn test_btree_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    let root_page_id = {
        let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(32, 2, disk_manager));
        let tree = int_tree(&bpm, 4, 4);
        for k in 0..200 {
            insert(&tree, k);
        }
        for k in (0..200).step_by(5) {
            remove(&tree, k);
        }
        bpm.flush_all_pages().unwrap();
        tree.get_root_page_id()
    };

    let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(10, 2, disk_manager));
    let tree = BPlusTree::new(
        "int_index",
        Arc::clone(&bpm),
        int_schema("key"),
        int_schema("value"),
        4,
        4,
        root_page_id,
    )
    .unwrap();

    let expected: Vec<i32> = (0..200).filter(|k| k % 5 != 0).collect();
    assert_eq!(scan_keys(&tree), expected);
    tree.check_integrity().unwrap();
    assert_eq!(lookup(&tree, 7), Some(7));
    assert_eq!(lookup(&tree, 10), None);
}

#[test]
fn test_btree_reopen_with_wrong_schema() {
    let (bpm, _temp) = create_bpm(10);
    let tree = int_tree(&bpm, 4, 4);
    insert(&tree, 1);

    let wide_key = Schema::builder()
        .column("a", DataType::Integer)
        .column("b", DataType::Integer)
        .build_arc();
    let result = BPlusTree::new(
        "wrong",
        Arc::clone(&bpm),
        wide_key,
        int_schema("value"),
        4,
        4,
        tree.get_root_page_id(),
    );
    assert!(matches!(result, Err(StrataError::SchemaMismatch(_))));
}

#[derive(Debug, Clone)]
enum Op {
    Insert(i32),
    Remove(i32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0i32..64).prop_map(Op::Insert),
        2 => (0i32..64).prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn test_btree_matches_ordered_set(
        (leaf_max, internal_max) in proptest::sample::select(vec![(2, 3), (3, 3), (3, 4), (4, 5), (5, 7)]),
        ops in proptest::collection::vec(op_strategy(), 1..200),
    ) {
        let (bpm, _temp) = create_bpm(50);
        let tree = int_tree(&bpm, leaf_max, internal_max);
        let mut model = BTreeSet::new();

        for op in &ops {
            match op {
                Op::Insert(k) => prop_assert_eq!(insert(&tree, *k), model.insert(*k)),
                Op::Remove(k) => prop_assert_eq!(remove(&tree, *k), model.remove(k)),
            }
            prop_assert_eq!(tree.check_integrity().map_err(|e| e.to_string()), Ok(()));
        }

        prop_assert_eq!(scan_keys(&tree), model.iter().copied().collect::<Vec<_>>());
        prop_assert_eq!(tree.is_empty(), model.is_empty());
        for k in 0..64 {
            prop_assert_eq!(lookup(&tree, k).is_some(), model.contains(&k));
        }
    }
}
