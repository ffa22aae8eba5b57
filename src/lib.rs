//! respack: resource pack archives and a pluggable archive manager
//!
//! This library provides:
//! - The resource pack format: a fixed header, a fixed-capacity file table
//!   and a payload heap of per-file zlib-compressed data, with soft delete and
//!   table growth by rebuilding the pack
//! - An [`Archive`] abstraction over packs, loose directories and
//!   third-party containers
//! - An [`ArchiveManager`] that mounts archives by type and resolves file
//!   names across them in load order
//!
//! # Example
//!
//! ```no_run
//! use respack::{AccessMode, CompressType, ResourcePack};
//!
//! // Create a pack and add a file
//! let mut pack = ResourcePack::create("assets.pack", 100)?;
//! pack.set_version("1.0")?;
//! pack.add_bytes("config/game.ini", b"[video]\nwidth=1280\n", CompressType::Zlib)?;
//! pack.close_file()?;
//!
//! // Read it back
//! let mut pack = ResourcePack::open("assets.pack", AccessMode::ReadOnly)?;
//! let data = pack.read_file("config/game.ini")?;
//! assert!(data.starts_with(b"[video]"));
//! # Ok::<(), respack::error::PackError>(())
//! ```

// Core modules
pub mod archive;
pub mod config;
pub mod error;
pub mod manager;
pub mod pack;
pub mod stream;

// Re-export commonly used types
pub use archive::{Archive, ArchiveFactory, Capabilities, FileInfo};
pub use config::ManagerConfig;
pub use error::{ArchiveError, ArchiveResult, PackError, Result};
pub use manager::ArchiveManager;
pub use pack::{AccessMode, CompressType, FileNode, ResourcePack, UseFlag};
pub use stream::DataStream;
