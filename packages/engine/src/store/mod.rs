//! Entry store: per-key editors and snapshots over the journal
//!
//! - `layout`: file naming inside the cache directory
//! - `editor`: exclusive writer of a new generation
//! - `snapshot`: reader of a committed generation

pub mod editor;
pub mod layout;
pub mod snapshot;

pub use editor::Editor;
pub use snapshot::Snapshot;
