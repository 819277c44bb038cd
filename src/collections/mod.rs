//! Priority data structures backing the scheduler, the capacity ledger and
//! the batch dispatch queues.
//!
//! ```text
//! collections/
//! ├── heap.rs          – MinHeap: comparator-keyed binary min-heap
//! ├── keyed_heap.rs    – KeyedMinHeap: min-heap + O(log n) remove-by-key
//! ├── sorted_index.rs  – ValueSortedIndex: sorted array + key lookup
//! └── fifo.rs          – FifoQueue: O(1) push/pop/peek
//! ```
//!
//! All four are plain in-memory containers with no interior mutability; they
//! are only ever touched from inside a scheduler tick (the tick loop is
//! single-threaded, see the crate docs).

pub mod fifo;
pub mod heap;
pub mod keyed_heap;
pub mod sorted_index;

pub use fifo::FifoQueue;
pub use heap::MinHeap;
pub use keyed_heap::{DuplicateKey, KeyedEntry, KeyedMinHeap};
pub use sorted_index::{RankedEntry, ValueSortedIndex};
