#![deny(missing_docs)]

//! # binstaller
//!
//! binstaller turns a declarative [`InstallSpec`][binstaller_schema::InstallSpec]
//! into a self-contained POSIX shell script that downloads a release asset
//! from GitHub, verifies its checksum and installs (or runs) the binary
//! inside. It can also populate the spec's embedded checksums for a release
//! so the emitted script verifies assets offline.
//!
//! The emitted script is the primary artifact: its runtime behavior
//! (platform detection, filename resolution, verification, extraction) is
//! the authoritative rendition of the spec's semantics, and the in-process
//! code in this crate is held to matching it.

pub mod backend;
pub mod checksum;
pub mod config;
pub mod errors;
pub mod extract;
pub mod net;
pub mod resolver;
pub mod validate;

/// Alias for the BTreeMap we use everywhere: emission must be deterministic,
/// so map iteration order has to be too
pub type SortedMap<K, V> = std::collections::BTreeMap<K, V>;

pub use backend::script::{generate_script, ScriptType};
pub use checksum::{embed_checksums, EmbedMode};
