//! Group descriptors: one per block group, giving the location of that group's inode table.
//!
//! The on-disk size of a descriptor is `desc_size` from the superblock (32 or 64 bytes), not a
//! fixed constant, so this module reads only the handful of fields it needs directly out of the
//! raw descriptor bytes rather than modeling the whole record with `bytemuck`.

use crate::error::Ext4Error;

/// A parsed group descriptor, reduced to the one thing this reader needs: where the group's
/// inode table starts.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GroupDescriptor {
    pub(crate) inode_table_block: u64,
    pub(crate) inode_bitmap_block: u64,
}

impl GroupDescriptor {
    /// `bytes` must be exactly `desc_size` bytes long, taken verbatim from the group descriptor
    /// table.
    pub(crate) fn parse(bytes: &[u8], desc_size: u16) -> Result<Self, Ext4Error> {
        if bytes.len() < 12 {
            return Err(Ext4Error::InvalidArgument(
                "group descriptor shorter than minimum 32-byte layout".into(),
            ));
        }

        // bg_block_bitmap_lo at 0x00/bg_block_bitmap_hi at 0x20, bg_inode_bitmap_lo at 0x04 /
        // bg_inode_bitmap_hi at 0x24, bg_inode_table_lo at 0x08 / bg_inode_table_hi at 0x28 (high
        // halves only present when desc_size == 64).
        let inode_bitmap_lo = u32::from_le_bytes(bytes[0x04..0x08].try_into().unwrap());
        let inode_table_lo = u32::from_le_bytes(bytes[0x08..0x0C].try_into().unwrap());

        let (inode_bitmap_hi, inode_table_hi) = if desc_size >= 64 && bytes.len() >= 0x2C {
            (
                u32::from_le_bytes(bytes[0x24..0x28].try_into().unwrap()),
                u32::from_le_bytes(bytes[0x28..0x2C].try_into().unwrap()),
            )
        } else {
            (0, 0)
        };

        Ok(Self {
            inode_table_block: (u64::from(inode_table_hi) << 32) | u64::from(inode_table_lo),
            inode_bitmap_block: (u64::from(inode_bitmap_hi) << 32) | u64::from(inode_bitmap_lo),
        })
    }
}
