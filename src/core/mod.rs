// Core modules: record and metadata models, status codes, the engine boundary.
pub mod datum;
pub mod engine;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod name;
pub mod status;
