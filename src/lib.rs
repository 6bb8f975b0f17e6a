pub mod api;
pub mod args;
pub mod error;
pub mod fallback;
pub mod format;
pub mod mount;
pub mod runner;
pub mod traversal;

pub use args::Args;
pub use error::{QduError, Result};
pub use format::{SizeMode, sizeof_fmt};
pub use mount::{MountInfo, MountStatus, RemoteMount, resolve, resolve_status};
pub use runner::{Options, Qdu};
pub use traversal::{AggregateResult, Traversal, query};
