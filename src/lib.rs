//! Purpose: Memory-mapped storage for dense, ragged, and string array sequences.
//! Exports: `api` (stable surface), `core` (store layouts and encoding), `materialize`, `parallel`.
//! Role: Library crate; the on-disk layout is shared with other mmap_ninja readers.
//! Invariants: Stores own their mappings; growth remaps in place and invalidates borrowed views.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod materialize;
pub mod parallel;
pub mod store_info_json;
