//! Typed error taxonomy for every failure mode the reader can surface.
//!
//! Every public operation returns `Result<T, Ext4Error>`. There is no retry and no partial
//! recovery anywhere in the core: a caller that wants leniency asks for it up front via
//! [`crate::volume::Volume::open`]'s `ignore_magic`/`ignore_flags` switches, which downgrade
//! structural checks but never suppress a data-bearing error (block-map, end-of-stream, not-found).

use std::fmt;

/// Identifies which on-disk structure a [`Ext4Error::Magic`] error was raised against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructKind {
    Superblock,
    ExtentHeader,
}

impl fmt::Display for StructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Superblock => write!(f, "superblock"),
            Self::ExtentHeader => write!(f, "extent header"),
        }
    }
}

/// Every way a read against an ext4 image can fail.
#[derive(thiserror::Error, Debug)]
pub enum Ext4Error {
    /// A structure's magic number disagreed with the expected constant and leniency was off.
    #[error("bad magic for {kind} at offset {offset:#x}: expected {expected:#x}, got {observed:#x}")]
    Magic {
        kind: StructKind,
        offset: u64,
        observed: u64,
        expected: u64,
    },

    /// A requested logical block is unmapped, or the mapping's block count disagrees with the
    /// inode's declared size at `BlockReader` construction time.
    #[error("block map error: {0}")]
    BlockMap(String),

    /// The storage source produced fewer bytes than required.
    #[error("end of stream: needed {needed} bytes, got {got} (shortfall {})", needed - got)]
    EndOfStream { needed: usize, got: usize },

    /// A path component was not a directory, or had no matching entry.
    #[error("not found: {component:?} in {path}")]
    NotFound { path: String, component: String },

    /// An operation required an inode to be a directory, but it was not (and `ignore_flags` was
    /// not set).
    #[error("not a directory: inode {0}")]
    NotADirectory(u32),

    /// Negative seek target, or some other malformed caller input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The inode uses neither extents nor inline data (e.g. legacy indirect blocks).
    #[error("unsupported data storage mechanism for inode {0}")]
    UnsupportedStorage(u32),

    /// An inode index was out of the valid `[1, inodes_count]` range, or its block group did not
    /// exist in the group descriptor table.
    #[error("inode {index} out of range ({reason})")]
    InvalidInode { index: u32, reason: &'static str },

    /// A `Source` implementation surfaced a hard I/O failure (not a protocol short-read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
