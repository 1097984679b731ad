//! Client for the hosted backend: auth endpoints, table access and the
//! session-change stream.
//!
//! Everything above this crate talks to the [`Backend`] trait. The HTTP
//! implementation is [`SupabaseBackend`]; [`MemoryBackend`] runs the same
//! contract in-process.

mod backend;
mod error;
mod memory;
mod query;
mod supabase;
mod types;

pub use backend::{insert_row, select_one, select_rows, update_rows, Backend};
pub use error::{BackendError, BackendResult};
pub use memory::{MemoryBackend, Operation};
pub use query::{Filter, Order, Query};
pub use supabase::SupabaseBackend;
pub use types::{AuthChangeEvent, Session, SignUpResponse, User};
