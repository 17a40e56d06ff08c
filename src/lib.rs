//! Read-only access to ext4 filesystem images.
//!
//! An [`ext4::Volume`](Volume) is built on top of any [`Source`] of bytes (a file, a partition
//! slice embedded in a larger image, or an in-memory buffer) and exposes the inode tree: metadata,
//! directory listings, and file contents via a seekable [`BlockReader`].
//!
//! Mutation, journal replay, checksum verification, and HTree-accelerated lookup are out of scope;
//! directories are always read with a linear scan, which is correct (if not maximally fast) for any
//! on-disk layout HTree can also resolve.

mod block_grp;
mod block_reader;
mod dir;
mod error;
mod extent;
mod inode;
mod sb;
mod source;
mod volume;

pub use block_reader::{BlockReader, Whence};
pub use dir::{lossy_utf8, DirEntry, DirIter, FileType};
pub use error::{Ext4Error, StructKind};
pub use inode::{Inode, InodeType};
pub use source::{MemSource, OffsetSource, Source};
pub use volume::Volume;
