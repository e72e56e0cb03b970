// Core modules implementing store layouts, encoding, mapping, and error modeling.
pub mod codec;
pub mod dtype;
pub mod error;
pub mod fixed;
pub mod format;
pub mod open;
pub mod ragged;
pub mod read;
pub mod region;
pub mod strings;
pub mod validate;
