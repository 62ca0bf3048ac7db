//! Purpose: Define the stable public Rust API for the channel log client.
//! Exports: Client context, log handles, events, configuration and core value types.
//! Role: Public surface; keeps the registry and dispatch internals private.
//! Invariants: Handles are created only through a `Client` and registered with it.
//! Invariants: Engine events reach callers only through `Client::next_event`.

mod client;
mod config;
mod event;
mod handle;
mod registry;

pub use crate::core::datum::{Datum, Timestamp};
pub use crate::core::engine::{Engine, NativeId, OpenMode, Wait};
pub use crate::core::error::{Error, ErrorKind, error_kind_code};
pub use crate::core::memory::{EngineStats, MemoryEngine};
pub use crate::core::metadata::{
    MD_CID, MD_CTIME, MD_EXPIRE, MD_LOCATION, MD_PUBKEY, MD_SYNTAX, MD_UUID, MD_XID, Metadata,
    MetadataEntry, MetadataId,
};
pub use crate::core::name::LogName;
pub use crate::core::status::{Severity, Status};
pub use client::{ApiResult, Client};
pub use config::{ClientConfig, ENV_DEBUG, ENV_LOG, ENV_ROUTER, ENV_SERVER};
pub use event::{Event, EventKind, NextEvent, StaleEvent, StaleReason};
pub use handle::{HandleRef, LogHandle};
