//! Purpose: Define the public Rust API boundary for ninja-store.
//! Exports: Store types, options, sources, validation, and errors.
//! Role: Single import path for callers; mirrors the modules behind it.
//! Invariants: Everything needed to create, open, grow, and validate stores is re-exported here.

pub use crate::core::dtype::{DType, Element, MemoryOrder};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::fixed::FixedArrayStore;
pub use crate::core::format::{StoreInfo, StoreKeys, StoreKind};
pub use crate::core::open::{AnyElement, AnyStore, detect_kind, open_existing};
pub use crate::core::ragged::{InPlaceTransformed, RaggedArrayStore, Sample, ShapeTable};
pub use crate::core::read::{StoreRead, Transformed};
pub use crate::core::region::AccessMode;
pub use crate::core::strings::StringArrayStore;
pub use crate::core::validate::{
    ValidationIssue, ValidationReport, ValidationStatus, validate_store, validate_store_with_keys,
};
pub use crate::materialize::{BatchMaterializer, Materialize, MaterializeOptions};
pub use crate::parallel::{
    BatchProgress, Batches, CollectorOptions, Fetch, FnSource, IndexedSource,
    ParallelBatchCollector, StoreSource, from_fn,
};
pub use crate::store_info_json::{store_info_json, validation_report_json};
