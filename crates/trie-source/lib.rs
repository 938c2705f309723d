//! Read-only, position-indexed access to the four on-disk node containers
//! that make up a trie directory (`accounts`, `branches`, `extensions`,
//! `values`).
//!
//! A [`NodeSource`] is a side-channel reader: it never mutates a container
//! and never assumes exclusive access to the directory. Many sources can be
//! open against the same directory at once, which is exactly what the
//! parallel visitor relies on — one source per worker thread.

mod container;
mod error;
mod source;

pub use error::SourceError;
pub use source::NodeSource;
