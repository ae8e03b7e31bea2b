//! Strata - the storage core of a disk-oriented relational database
//!
//! This crate provides the layers a table or index needs to keep fixed-size
//! pages on disk and work on them concurrently in memory.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): Page-granular file I/O
//!   - `DiskManager`: Reads, writes and allocates pages in a single database file
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Fetches pages from disk and caches them in a fixed set of frames
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `FrameHeader`: Per-frame metadata and data storage
//!   - `BasicPageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII pins and latches
//!
//! - **Tuples** (`tuple`): Fixed-width rows described by a `Schema`
//!
//! - **Index** (`index`): A concurrent B+ tree over tuple keys
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::buffer::BufferPoolManager;
//! use strata::common::INVALID_PAGE_ID;
//! use strata::index::BPlusTree;
//! use strata::storage::disk::DiskManager;
//! use strata::tuple::{DataType, Schema, Tuple, Value};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 5, disk_manager));
//!
//! let key_schema = Schema::builder().column("id", DataType::Integer).build_arc();
//! let value_schema = Schema::builder().column("name", DataType::Char(16)).build_arc();
//! let tree = BPlusTree::new("users_pk", bpm, key_schema.clone(), value_schema.clone(), 32, 32, INVALID_PAGE_ID).unwrap();
//!
//! let key = Tuple::new(key_schema, &[Value::Integer(1)]).unwrap();
//! let value = Tuple::new(value_schema, &[Value::from("ada")]).unwrap();
//! tree.insert(&key, &value).unwrap();
//! assert!(tree.get_value(&key).unwrap().is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SlotId, StrataError};
