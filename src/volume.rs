//! The mounted volume: superblock, group descriptor table, and inode lookup.

use std::cell::RefCell;

use log::{debug, warn};

use crate::block_grp::GroupDescriptor;
use crate::error::Ext4Error;
use crate::inode::Inode;
use crate::sb::{Superblock, RAW_SUPERBLOCK_SIZE, SUPERBLOCK_OFFSET};
use crate::source::Source;

/// An open ext4 image: a parsed superblock and group descriptor table sitting on top of a
/// [`Source`].
///
/// `source` is behind a `RefCell` so that `Volume`'s own API can stay `&self` (an `Inode` is a
/// read-only view borrowed from its `Volume`, and giving every read an `&mut Volume` would make
/// that borrow unusable for more than one inode at a time) while the underlying medium still
/// needs `&mut self` to reposition itself.
pub struct Volume {
    source: RefCell<Box<dyn Source>>,
    base_offset: u64,
    sb: Superblock,
    groups: Vec<GroupDescriptor>,
    ignore_magic: bool,
    ignore_flags: bool,
}

impl Volume {
    /// Mounts a volume: reads the superblock and the whole group descriptor table from `source`.
    ///
    /// `base_offset` is added to every absolute offset this `Volume` computes, letting a caller
    /// mount a partition that starts partway through a larger disk image without the `Source`
    /// itself needing to know about the enclosing container.
    ///
    /// `ignore_magic` disables the superblock and extent-header magic checks; `ignore_flags`
    /// disables the `is_dir`/`is_in_use` consistency checks that would otherwise reject malformed
    /// trees. Neither flag suppresses block-map, end-of-stream, or not-found errors: those report
    /// data that is actually missing, not data that merely looks unconventional.
    pub fn open(
        source: Box<dyn Source>,
        base_offset: u64,
        ignore_magic: bool,
        ignore_flags: bool,
    ) -> Result<Self, Ext4Error> {
        let source = RefCell::new(source);

        let mut sb_bytes = [0u8; RAW_SUPERBLOCK_SIZE];
        read_exact_from(&source, base_offset + SUPERBLOCK_OFFSET, &mut sb_bytes)?;
        let sb = Superblock::parse(&sb_bytes, ignore_magic)?;

        debug!(
            "mounted volume: block_size={} inodes_count={} inode_size={} groups={}",
            sb.block_size(),
            sb.inodes_count,
            sb.inode_size,
            sb.group_count()
        );

        let group_count = sb.group_count();
        let mut groups = Vec::with_capacity(group_count as usize);
        let mut desc_bytes = vec![0u8; sb.desc_size as usize];
        for i in 0..group_count {
            let offset =
                base_offset + sb.group_desc_table_offset() + u64::from(i) * u64::from(sb.desc_size);
            read_exact_from(&source, offset, &mut desc_bytes)?;
            groups.push(GroupDescriptor::parse(&desc_bytes, sb.desc_size)?);
        }

        if group_count == 0 {
            warn!("volume reports zero block groups; every inode lookup will fail");
        }

        Ok(Self {
            source,
            base_offset,
            sb,
            groups,
            ignore_magic,
            ignore_flags,
        })
    }

    pub fn block_size(&self) -> u64 {
        self.sb.block_size()
    }

    pub fn group_count(&self) -> u32 {
        self.sb.group_count()
    }

    pub fn uuid(&self) -> String {
        self.sb.uuid_string()
    }

    pub(crate) fn ignore_magic(&self) -> bool {
        self.ignore_magic
    }

    pub(crate) fn ignore_flags(&self) -> bool {
        self.ignore_flags
    }

    /// The filesystem's root directory, inode 2.
    pub fn root(&self) -> Result<Inode<'_>, Ext4Error> {
        self.get_inode(2)
    }

    /// Reads and parses inode `index` (1-based, per the on-disk convention).
    pub fn get_inode(&self, index: u32) -> Result<Inode<'_>, Ext4Error> {
        let (group, local_index) = self.locate(index)?;
        let offset = group.inode_table_block * self.block_size()
            + u64::from(local_index) * u64::from(self.sb.inode_size);

        let mut bytes = vec![0u8; self.sb.inode_size as usize];
        self.read_exact(offset, &mut bytes)?;
        Inode::parse(self, index, &bytes)
    }

    /// Whether `index`'s bit is set in its block group's inode bitmap.
    ///
    /// Bits are packed MSB-first within each byte, matching the on-disk convention used
    /// throughout ext4's block and inode bitmaps.
    pub(crate) fn is_inode_in_use(&self, index: u32) -> Result<bool, Ext4Error> {
        let (group, local_index) = self.locate(index)?;
        let byte_index = u64::from(local_index) / 8;
        let bit_index = 7 - (local_index % 8);

        let mut byte = [0u8; 1];
        self.read_exact(group.inode_bitmap_block * self.block_size() + byte_index, &mut byte)?;
        Ok(byte[0] & (1 << bit_index) != 0)
    }

    fn locate(&self, index: u32) -> Result<(&GroupDescriptor, u32), Ext4Error> {
        if index == 0 {
            return Err(Ext4Error::InvalidInode {
                index,
                reason: "inode 0 does not exist; inodes are numbered from 1",
            });
        }

        let zero_based = index - 1;
        let group_index = zero_based / self.sb.inodes_per_group;
        let local_index = zero_based % self.sb.inodes_per_group;

        let group = self.groups.get(group_index as usize).ok_or(Ext4Error::InvalidInode {
            index,
            reason: "inode's block group is past the end of the group descriptor table",
        })?;

        Ok((group, local_index))
    }

    /// Reads through the underlying [`Source`], requiring the buffer to be filled completely.
    ///
    /// `offset` is relative to the start of this volume (i.e. already excludes `base_offset`,
    /// which is added here); every caller computing offsets from block numbers should use this
    /// method rather than reaching for the `Source` directly.
    pub(crate) fn read_exact(&self, offset: u64, buf: &mut [u8]) -> Result<(), Ext4Error> {
        read_exact_from(&self.source, self.base_offset + offset, buf)
    }
}

fn read_exact_from(
    source: &RefCell<Box<dyn Source>>,
    offset: u64,
    buf: &mut [u8],
) -> Result<(), Ext4Error> {
    let got = source.borrow_mut().read_at(offset, buf)?;
    if got < buf.len() {
        return Err(Ext4Error::EndOfStream {
            needed: buf.len(),
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemSource;

    fn minimal_image(inode_size: u16, desc_size: u16) -> Vec<u8> {
        let block_size = 1024u64;
        let mut image = vec![0u8; (block_size * 6) as usize];

        // superblock at 0x400
        let sb = &mut image[0x400..0x500];
        sb[0..4].copy_from_slice(&16u32.to_le_bytes()); // inodes_count
        sb[0x18..0x1C].copy_from_slice(&0u32.to_le_bytes()); // log_block_size -> 1024
        sb[0x20..0x24].copy_from_slice(&8192u32.to_le_bytes()); // blocks_per_group
        sb[0x28..0x2C].copy_from_slice(&16u32.to_le_bytes()); // inodes_per_group
        sb[0x38..0x3A].copy_from_slice(&0xEF53u16.to_le_bytes());
        sb[0x58..0x5A].copy_from_slice(&inode_size.to_le_bytes());
        sb[0xFE..0x100].copy_from_slice(&desc_size.to_le_bytes());

        // group descriptor table starts at the first block boundary after the superblock: block
        // 2 when block_size == 1024 (block 0 is the boot block, block 1 holds the superblock).
        let gd_offset = (2 * block_size) as usize;
        image[gd_offset + 0x04..gd_offset + 0x08].copy_from_slice(&4u32.to_le_bytes()); // inode bitmap block
        image[gd_offset + 0x08..gd_offset + 0x0C].copy_from_slice(&3u32.to_le_bytes()); // inode table block

        // inode bitmap at block 4: mark inode 2 (local index 1) in use, MSB-first
        let bitmap_offset = (4 * block_size) as usize;
        image[bitmap_offset] = 0b0100_0000;

        // inode table at block 3: inode 2 is a directory with extents flag set
        let inode2_offset = (3 * block_size) as usize + inode_size as usize;
        image[inode2_offset..inode2_offset + 2].copy_from_slice(&0x4000u16.to_le_bytes()); // mode: dir
        image[inode2_offset + 0x20..inode2_offset + 0x24].copy_from_slice(&0x80000u32.to_le_bytes()); // FLAG_EXTENTS

        image
    }

    #[test]
    fn opens_and_reads_root_inode() {
        let image = minimal_image(128, 32);
        let vol = Volume::open(Box::new(MemSource(image)), 0, false, false).unwrap();
        assert_eq!(vol.block_size(), 1024);
        assert_eq!(vol.group_count(), 1);

        let root = vol.root().unwrap();
        assert_eq!(root.index(), 2);
        assert!(root.is_dir());
    }

    #[test]
    fn root_inode_is_marked_in_use() {
        let image = minimal_image(128, 32);
        let vol = Volume::open(Box::new(MemSource(image)), 0, false, false).unwrap();
        let root = vol.root().unwrap();
        assert!(root.is_in_use().unwrap());
    }

    #[test]
    fn inode_zero_is_invalid() {
        let image = minimal_image(128, 32);
        let vol = Volume::open(Box::new(MemSource(image)), 0, false, false).unwrap();
        assert!(matches!(
            vol.get_inode(0),
            Err(Ext4Error::InvalidInode { .. })
        ));
    }

    #[test]
    fn inode_past_group_table_is_invalid() {
        let image = minimal_image(128, 32);
        let vol = Volume::open(Box::new(MemSource(image)), 0, false, false).unwrap();
        assert!(matches!(
            vol.get_inode(1_000_000),
            Err(Ext4Error::InvalidInode { .. })
        ));
    }
}
