//! Storage backend traits.

mod cache;
mod export;

pub use cache::{CacheBackend, ExpenseWrite};
pub use export::ExportBackend;
