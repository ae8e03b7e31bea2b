use std::sync::Arc;

use strata::buffer::BufferPoolManager;
use strata::common::{DEFAULT_BUFFER_POOL_SIZE, DEFAULT_LRUK_K, INVALID_PAGE_ID};
use strata::index::BPlusTree;
use strata::storage::disk::DiskManager;
use strata::tuple::{DataType, Schema, Tuple, Value};

fn main() -> strata::Result<()> {
    println!("Strata - a disk-oriented storage core in Rust");
    println!("==============================================\n");

    let db_path = std::env::args().nth(1).unwrap_or_else(|| "strata.db".to_string());

    let disk_manager = Arc::new(DiskManager::new(&db_path)?);
    println!("Opened database file: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(
        DEFAULT_BUFFER_POOL_SIZE,
        DEFAULT_LRUK_K,
        disk_manager,
    ));
    println!(
        "Created buffer pool manager with {} frames and LRU-{} replacement\n",
        DEFAULT_BUFFER_POOL_SIZE, DEFAULT_LRUK_K
    );

    let key_schema = Schema::builder().column("key", DataType::Integer).build_arc();
    let value_schema = Schema::builder().column("value", DataType::Integer).build_arc();
    let tree = BPlusTree::new(
        "demo_index",
        Arc::clone(&bpm),
        Arc::clone(&key_schema),
        Arc::clone(&value_schema),
        4,
        4,
        INVALID_PAGE_ID,
    )?;

    let int_tuple = |schema: &Arc<Schema>, v: i32| Tuple::new(Arc::clone(schema), &[Value::Integer(v)]);

    for k in [5, 1, 9, 3, 7, 2, 8, 4, 6, 10] {
        let inserted = tree.insert(&int_tuple(&key_schema, k)?, &int_tuple(&value_schema, k * 100)?)?;
        println!("Inserted {} -> {} ({})", k, k * 100, if inserted { "new" } else { "duplicate" });
    }
    println!("Root page is now {}\n", tree.get_root_page_id());

    for k in [3, 11] {
        match tree.get_value(&int_tuple(&key_schema, k)?)? {
            Some(value) => println!("Lookup {} -> {} at {:?}", k, value, value.rid()),
            None => println!("Lookup {} -> not found", k),
        }
    }

    for k in [1, 5, 10] {
        tree.remove(&int_tuple(&key_schema, k)?)?;
        println!("Removed {}", k);
    }

    println!("\nScan:");
    for entry in tree.begin()? {
        let (key, value) = entry?;
        println!("  {} -> {}", key, value);
    }

    bpm.flush_all_pages()?;
    println!(
        "\nFlushed {} pages to {} ({} writes)",
        bpm.disk_manager().num_pages()?,
        db_path,
        bpm.disk_manager().num_writes()
    );
    println!("Reopen the index with root page {}", tree.get_root_page_id());

    Ok(())
}
