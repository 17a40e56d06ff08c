//! The ext4 superblock: the root metadata record at offset 0x400.
//!
//! Only the fields this reader actually needs are modeled; everything else (mount options,
//! quotas, snapshots, journal, checksum seed) is out of scope and is skipped over as reserved
//! padding rather than named, the same way the teacher's superblock module treats fields no
//! consumer reads.

use bytemuck::{Pod, Zeroable};

use crate::error::{Ext4Error, StructKind};

/// Byte offset of the superblock from the start of the volume.
pub(crate) const SUPERBLOCK_OFFSET: u64 = 0x400;

/// `RawSuperblock` is read byte-for-byte up through `s_desc_size` (offset 0xFE); nothing past
/// that is consumed by this reader.
pub(crate) const RAW_SUPERBLOCK_SIZE: usize = 0x100;

/// Superblock magic number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
pub(crate) struct SuperblockMagic(u16);

impl SuperblockMagic {
    pub(crate) const VALID: Self = Self(0xEF53);

    pub(crate) fn is_valid(self) -> bool {
        self == Self::VALID
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub(crate) struct RawSuperblock {
    inodes_count: u32,       // 0x00
    blocks_count_lo: u32,    // 0x04
    _reserved_08: [u8; 8],   // r_blocks_count_lo, free_blocks_count_lo
    _reserved_10: [u8; 8],   // free_inodes_count, first_data_block
    log_block_size: u32,     // 0x18
    _reserved_1c: [u8; 4],   // log_cluster_size
    blocks_per_group: u32,   // 0x20
    _reserved_24: [u8; 4],   // clusters_per_group
    inodes_per_group: u32,   // 0x28
    _reserved_2c: [u8; 12],  // mtime, wtime, mnt_count, max_mnt_count
    magic: SuperblockMagic,  // 0x38
    _reserved_3a: [u8; 30],  // state .. first_ino
    inode_size: u16,         // 0x58
    _reserved_5a: [u8; 6],   // block_group_nr, feature_compat
    _reserved_60: [u8; 8],   // feature_incompat, feature_ro_compat
    uuid: [u8; 16],          // 0x68
    _reserved_78: [u8; 134], // volume_name .. s_jnl_backup_type
    desc_size: u16,          // 0xFE
}

/// Parsed superblock, with 64-bit fields already reassembled from their on-disk `_lo`/`_hi`
/// halves.
///
/// The one counter this reader cares about in 64-bit form, `blocks_count`, has no `_hi` field
/// within the 0x100-byte prefix read from disk (`s_blocks_count_hi` lives at offset 0x150); since
/// nothing in this crate's feature set needs the true block count of volumes larger than 2^32
/// blocks, the high half is treated as zero. This is noted here rather than silently assumed.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Superblock {
    pub(crate) inodes_count: u32,
    pub(crate) blocks_count: u64,
    pub(crate) log_block_size: u32,
    pub(crate) blocks_per_group: u32,
    pub(crate) inodes_per_group: u32,
    pub(crate) inode_size: u16,
    pub(crate) desc_size: u16,
    pub(crate) uuid: [u8; 16],
}

impl Superblock {
    pub(crate) fn parse(bytes: &[u8; RAW_SUPERBLOCK_SIZE], ignore_magic: bool) -> Result<Self, Ext4Error> {
        let raw: &RawSuperblock = bytemuck::from_bytes(bytes);

        if !raw.magic.is_valid() && !ignore_magic {
            return Err(Ext4Error::Magic {
                kind: StructKind::Superblock,
                offset: SUPERBLOCK_OFFSET,
                observed: u64::from(raw.magic.0),
                expected: u64::from(SuperblockMagic::VALID.0),
            });
        }

        // `desc_size` of 0 means the "32-bit" group descriptor format; record it as such rather
        // than as a zero-sized descriptor.
        let desc_size = if raw.desc_size == 0 { 32 } else { raw.desc_size };

        Ok(Self {
            inodes_count: raw.inodes_count,
            blocks_count: u64::from(raw.blocks_count_lo),
            log_block_size: raw.log_block_size,
            blocks_per_group: raw.blocks_per_group,
            inodes_per_group: raw.inodes_per_group,
            inode_size: raw.inode_size,
            desc_size,
            uuid: raw.uuid,
        })
    }

    /// The filesystem's block size, in bytes: `1 << (10 + log_block_size)`.
    pub(crate) fn block_size(&self) -> u64 {
        1u64 << (10 + self.log_block_size)
    }

    /// Number of block groups: `ceil(inodes_count / inodes_per_group)`.
    pub(crate) fn group_count(&self) -> u32 {
        self.inodes_count.div_ceil(self.inodes_per_group)
    }

    /// The byte offset of the group descriptor table: the first block boundary strictly after
    /// the superblock.
    pub(crate) fn group_desc_table_offset(&self) -> u64 {
        (SUPERBLOCK_OFFSET / self.block_size() + 1) * self.block_size()
    }

    /// UUID formatted as `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`, uppercase, grouped 4-2-2-2-6.
    pub(crate) fn uuid_string(&self) -> String {
        let u = self.uuid;
        format!(
            "{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            u[0], u[1], u[2], u[3], u[4], u[5], u[6], u[7], u[8], u[9], u[10], u[11], u[12], u[13], u[14], u[15]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_bytes(magic: u16) -> [u8; RAW_SUPERBLOCK_SIZE] {
        let mut bytes = [0u8; RAW_SUPERBLOCK_SIZE];
        bytes[0..4].copy_from_slice(&128u32.to_le_bytes()); // inodes_count
        bytes[0x18..0x1C].copy_from_slice(&2u32.to_le_bytes()); // log_block_size -> 4096
        bytes[0x20..0x24].copy_from_slice(&32768u32.to_le_bytes()); // blocks_per_group
        bytes[0x28..0x2C].copy_from_slice(&32u32.to_le_bytes()); // inodes_per_group
        bytes[0x38..0x3A].copy_from_slice(&magic.to_le_bytes());
        bytes[0x58..0x5A].copy_from_slice(&256u16.to_le_bytes()); // inode_size
        bytes[0x68..0x78].copy_from_slice(&[0xAB; 16]); // uuid
        bytes[0xFE..0x100].copy_from_slice(&32u16.to_le_bytes()); // desc_size
        bytes
    }

    #[test]
    fn parses_fields() {
        let bytes = minimal_bytes(0xEF53);
        let sb = Superblock::parse(&bytes, false).unwrap();
        assert_eq!(sb.inodes_count, 128);
        assert_eq!(sb.block_size(), 4096);
        assert_eq!(sb.inodes_per_group, 32);
        assert_eq!(sb.group_count(), 4);
        assert_eq!(sb.desc_size, 32);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = minimal_bytes(0);
        assert!(matches!(
            Superblock::parse(&bytes, false),
            Err(Ext4Error::Magic { .. })
        ));
    }

    #[test]
    fn ignore_magic_accepts_bad_magic_and_still_decodes_uuid() {
        let bytes = minimal_bytes(0);
        let sb = Superblock::parse(&bytes, true).unwrap();
        assert_eq!(sb.uuid_string(), "ABABABAB-ABAB-ABAB-ABAB-ABABABABABAB");
    }

    #[test]
    fn uuid_formatting() {
        let mut bytes = minimal_bytes(0xEF53);
        bytes[0x68..0x78].copy_from_slice(&[
            0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB,
            0xCD, 0xEF,
        ]);
        let sb = Superblock::parse(&bytes, false).unwrap();
        assert_eq!(sb.uuid_string(), "01234567-89AB-CDEF-0123-456789ABCDEF");
    }

    #[test]
    fn group_desc_table_follows_first_block_boundary() {
        let bytes = minimal_bytes(0xEF53);
        let sb = Superblock::parse(&bytes, false).unwrap();
        // block_size = 4096, superblock at 0x400 (1024) sits in block 0; table starts at block 1.
        assert_eq!(sb.group_desc_table_offset(), 4096);
    }
}
