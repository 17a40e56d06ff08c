//! Inodes: the fixed-size records describing one filesystem object each.

use crate::dir::{lossy_utf8, DirEntry, DirIter};
use crate::error::Ext4Error;
use crate::extent;
use crate::volume::Volume;

const MODE_TYPE_MASK: u16 = 0xF000;
const S_IFIFO: u16 = 0x1000;
const S_IFCHR: u16 = 0x2000;
const S_IFDIR: u16 = 0x4000;
const S_IFBLK: u16 = 0x6000;
const S_IFREG: u16 = 0x8000;
const S_IFLNK: u16 = 0xA000;
const S_IFSOCK: u16 = 0xC000;

const FLAG_EXTENTS: u32 = 0x0008_0000;
const FLAG_INLINE_DATA: u32 = 0x1000_0000;

const INLINE_DATA_LEN: usize = 60;

/// The file type encoded in the top nibble of an inode's mode field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InodeType {
    Fifo,
    CharDevice,
    Directory,
    BlockDevice,
    Regular,
    Symlink,
    Socket,
    Unknown,
}

impl InodeType {
    fn from_mode(mode: u16) -> Self {
        match mode & MODE_TYPE_MASK {
            S_IFIFO => Self::Fifo,
            S_IFCHR => Self::CharDevice,
            S_IFDIR => Self::Directory,
            S_IFBLK => Self::BlockDevice,
            S_IFREG => Self::Regular,
            S_IFLNK => Self::Symlink,
            S_IFSOCK => Self::Socket,
            _ => Self::Unknown,
        }
    }
}

/// Which of the three ways an inode's data can live is decided once, from the flag bits, at
/// construction time, and consumed -- never re-tested -- by `open_read`. This replaces branching
/// on flag bits inside the reader with a tagged variant produced up front.
#[derive(Clone, Copy, Debug)]
enum DataSource {
    Extents,
    Inline { len: u64 },
    Unsupported,
}

/// A parsed inode, borrowing the [`Volume`] it was read from so it can open directories and files
/// on demand.
#[derive(Clone, Copy)]
pub struct Inode<'a> {
    pub(crate) vol: &'a Volume,
    index: u32,
    mode: u16,
    size: u64,
    flags: u32,
    i_block: [u8; INLINE_DATA_LEN],
    data_source: DataSource,
}

impl<'a> Inode<'a> {
    pub(crate) fn parse(vol: &'a Volume, index: u32, bytes: &[u8]) -> Result<Self, Ext4Error> {
        if bytes.len() < 0x70 {
            return Err(Ext4Error::InvalidInode {
                index,
                reason: "record shorter than the minimum fields this reader needs",
            });
        }

        let mode = u16::from_le_bytes(bytes[0x00..0x02].try_into().unwrap());
        let size_lo = u32::from_le_bytes(bytes[0x04..0x08].try_into().unwrap());
        let flags = u32::from_le_bytes(bytes[0x20..0x24].try_into().unwrap());
        let mut i_block = [0u8; INLINE_DATA_LEN];
        i_block.copy_from_slice(&bytes[0x28..0x28 + INLINE_DATA_LEN]);
        let size_hi = u32::from_le_bytes(bytes[0x6C..0x70].try_into().unwrap());

        let size = (u64::from(size_hi) << 32) | u64::from(size_lo);

        let data_source = if flags & FLAG_EXTENTS != 0 {
            DataSource::Extents
        } else if flags & FLAG_INLINE_DATA != 0 {
            DataSource::Inline { len: size }
        } else {
            DataSource::Unsupported
        };

        Ok(Self {
            vol,
            index,
            mode,
            size,
            flags,
            i_block,
            data_source,
        })
    }

    /// 1-based index this inode was read from.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Combined `size_lo | (size_hi << 32)`.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn file_type(&self) -> InodeType {
        InodeType::from_mode(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == InodeType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == InodeType::Regular
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == InodeType::Symlink
    }

    /// Raw mode bits (type nibble plus permission bits).
    pub fn mode(&self) -> u16 {
        self.mode
    }

    pub(crate) fn flags(&self) -> u32 {
        self.flags
    }

    /// Whether this inode is marked in-use in its block group's inode bitmap.
    pub fn is_in_use(&self) -> Result<bool, Ext4Error> {
        self.vol.is_inode_in_use(self.index)
    }

    /// Opens this inode's data as a seekable byte stream.
    ///
    /// Dispatches on the tagged storage variant computed at construction: an extent-backed inode
    /// walks its extent tree into a coalesced mapping and returns a [`crate::BlockReader`] over
    /// it; an inline-data inode returns a stream over the bytes already sitting in `i_block`;
    /// anything else (legacy indirect blocks) is an [`Ext4Error::UnsupportedStorage`].
    pub fn open_read(&self) -> Result<crate::block_reader::BlockReader<'a>, Ext4Error> {
        match self.data_source {
            DataSource::Extents => {
                let block_size = self.vol.block_size();
                let mappings = extent::build_mapping(
                    &self.i_block,
                    block_size,
                    self.vol.ignore_magic(),
                    |offset, buf| self.vol.read_exact(offset, buf),
                )?;
                crate::block_reader::BlockReader::from_mappings(self.vol, self.size, mappings)
            }
            DataSource::Inline { len } => {
                let len = usize::try_from(len).unwrap_or(INLINE_DATA_LEN).min(INLINE_DATA_LEN);
                crate::block_reader::BlockReader::from_inline(self.i_block[..len].to_vec())
            }
            DataSource::Unsupported => Err(Ext4Error::UnsupportedStorage(self.index)),
        }
    }

    /// Iterates this directory's entries in on-disk order, decoding names with a caller-supplied
    /// decoder (e.g. to preserve non-UTF-8 bytes exactly instead of lossily rewriting them).
    ///
    /// Fails with [`Ext4Error::NotADirectory`] unless `is_dir()` holds or `ignore_flags` was set
    /// at [`Volume::open`] time.
    pub fn open_dir_with(
        &self,
        decode_name: impl Fn(&[u8]) -> String + 'static,
    ) -> Result<DirIter, Ext4Error> {
        if !self.is_dir() && !self.vol.ignore_flags() {
            return Err(Ext4Error::NotADirectory(self.index));
        }

        DirIter::new(self.open_read()?, decode_name)
    }

    /// Like [`Self::open_dir_with`], decoding names as lossy UTF-8.
    pub fn open_dir(&self) -> Result<DirIter, Ext4Error> {
        self.open_dir_with(lossy_utf8)
    }

    /// Walks `parts` as a sequence of directory entry names, starting from this inode. Name bytes
    /// are decoded as lossy UTF-8 for comparison against `parts`; use [`Self::open_dir_with`]
    /// directly if a path component may not round-trip through that decoder.
    pub fn get_inode(&self, parts: &[&str]) -> Result<Inode<'a>, Ext4Error> {
        let mut current: Inode<'a> = *self;

        for part in parts {
            if !current.is_dir() && !self.vol.ignore_flags() {
                return Err(Ext4Error::NotADirectory(current.index));
            }

            let entry: DirEntry = current
                .open_dir_with(lossy_utf8)?
                .find_map(|entry| match entry {
                    Ok(entry) if entry.name == *part => Some(Ok(entry)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                })
                .transpose()?
                .ok_or_else(|| Ext4Error::NotFound {
                    path: parts.join("/"),
                    component: (*part).to_string(),
                })?;

            current = self.vol.get_inode(entry.inode)?;
        }

        Ok(current)
    }
}
