//! Account persistence
//!
//! - AccountStore: the async seam earn loops and the CLI talk to
//! - JsonlAccountStore: one JSON record per line under the storage dir
//! - MemoryAccountStore: in-process store for tests and embedding

mod jsonl;
mod memory;
mod traits;

pub use jsonl::JsonlAccountStore;
pub use memory::MemoryAccountStore;
pub use traits::AccountStore;
