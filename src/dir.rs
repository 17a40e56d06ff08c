//! Directory entries and the lazy iterator that decodes them from a directory inode's data.

use crate::block_reader::BlockReader;
use crate::error::Ext4Error;

/// File type encoded directly in a directory entry's `file_type` byte, distinct from (but
/// normally agreeing with) the inode's own mode nibble.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Unknown,
    File,
    Dir,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Symlink,
    /// `0xDE`: not a real entry, a per-block checksum trailer some filesystems append. Callers
    /// never see this variant; entries carrying it are skipped by [`DirIter`].
    Checksum,
}

impl FileType {
    fn from_byte(b: u8) -> Self {
        match b {
            1 => Self::File,
            2 => Self::Dir,
            3 => Self::CharDevice,
            4 => Self::BlockDevice,
            5 => Self::Fifo,
            6 => Self::Socket,
            7 => Self::Symlink,
            0xDE => Self::Checksum,
            _ => Self::Unknown,
        }
    }
}

/// One decoded `ext4_dir_entry_2` record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u32,
    pub name: String,
    pub file_type: FileType,
}

const ENTRY_HEADER_LEN: usize = 8;

/// Lazily decodes directory entries out of a directory inode's full byte content.
///
/// The whole directory is read into memory once at construction (directories are small relative
/// to files, and ext4 offers no cheaper way to find entry boundaries than walking `rec_len`
/// links), then entries are parsed from that buffer one at a time as the caller advances the
/// iterator. HTree-indexed lookup is not implemented; every lookup is a linear scan, which always
/// produces a correct answer for any valid on-disk layout.
///
/// Names are turned into `String` by a caller-supplied decoder, since on-disk names have no
/// guaranteed encoding; the default is lossy UTF-8, but a caller that needs the exact on-disk bytes
/// preserved (e.g. to match a path component byte-for-byte) can supply its own.
pub struct DirIter {
    buf: Vec<u8>,
    cursor: usize,
    decode_name: Box<dyn Fn(&[u8]) -> String>,
}

impl DirIter {
    pub(crate) fn new(
        mut reader: BlockReader<'_>,
        decode_name: impl Fn(&[u8]) -> String + 'static,
    ) -> Result<Self, Ext4Error> {
        let buf = reader.read(-1)?;
        Ok(Self {
            buf,
            cursor: 0,
            decode_name: Box::new(decode_name),
        })
    }
}

/// The default name decoder: lossy UTF-8, replacing invalid sequences with U+FFFD.
pub fn lossy_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl Iterator for DirIter {
    type Item = Result<DirEntry, Ext4Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cursor + ENTRY_HEADER_LEN > self.buf.len() {
                return None;
            }

            let header = &self.buf[self.cursor..self.cursor + ENTRY_HEADER_LEN];
            let inode = u32::from_le_bytes(header[0..4].try_into().unwrap());
            let rec_len = u16::from_le_bytes(header[4..6].try_into().unwrap());
            let name_len = header[6] as usize;
            let file_type = FileType::from_byte(header[7]);

            if rec_len < ENTRY_HEADER_LEN as u16 {
                return Some(Err(Ext4Error::BlockMap(format!(
                    "directory entry at offset {} has rec_len {rec_len} shorter than its own header",
                    self.cursor
                ))));
            }

            let name_start = self.cursor + ENTRY_HEADER_LEN;
            let name_end = name_start + name_len;
            if name_end > self.buf.len() {
                return Some(Err(Ext4Error::BlockMap(format!(
                    "directory entry at offset {} has name_len {name_len} past end of buffer",
                    self.cursor
                ))));
            }

            let this_cursor = self.cursor;
            self.cursor += rec_len as usize;

            // Skip the per-block checksum pseudo-entry and any unused (deleted) slot; both have
            // inode == 0 on a well-formed filesystem, but file_type is what actually marks the
            // checksum trailer, so that's what is checked.
            if file_type == FileType::Checksum || inode == 0 {
                continue;
            }

            let name = (self.decode_name)(&self.buf[name_start..name_end]);
            let _ = this_cursor;

            return Some(Ok(DirEntry {
                inode,
                name,
                file_type,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_bytes(inode: u32, rec_len: u16, file_type: u8, name: &str) -> Vec<u8> {
        let mut bytes = vec![0u8; ENTRY_HEADER_LEN];
        bytes[0..4].copy_from_slice(&inode.to_le_bytes());
        bytes[4..6].copy_from_slice(&rec_len.to_le_bytes());
        bytes[6] = name.len() as u8;
        bytes[7] = file_type;
        bytes.extend_from_slice(name.as_bytes());
        bytes.resize(rec_len as usize, 0);
        bytes
    }

    fn iter_over(buf: Vec<u8>) -> DirIter {
        DirIter {
            buf,
            cursor: 0,
            decode_name: Box::new(lossy_utf8),
        }
    }

    #[test]
    fn decodes_entries_in_order() {
        let mut buf = entry_bytes(2, 12, 2, ".");
        buf.extend(entry_bytes(2, 12, 2, ".."));
        buf.extend(entry_bytes(12, 16, 1, "hello.txt"));

        let entries: Vec<DirEntry> = iter_over(buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, ".");
        assert_eq!(entries[2].inode, 12);
        assert_eq!(entries[2].file_type, FileType::File);
    }

    #[test]
    fn skips_checksum_trailer_and_deleted_entries() {
        let mut buf = entry_bytes(2, 12, 2, ".");
        buf.extend(entry_bytes(0, 12, 0, ""));
        buf.extend(entry_bytes(0, 12, 0xDE, ""));

        let entries: Vec<DirEntry> = iter_over(buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, ".");
    }

    #[test]
    fn custom_decoder_overrides_lossy_utf8() {
        let buf = entry_bytes(12, 16, 1, "hello.txt");
        let mut it = DirIter {
            buf,
            cursor: 0,
            decode_name: Box::new(|bytes| format!("<{}>", bytes.len())),
        };
        let entry = it.next().unwrap().unwrap();
        assert_eq!(entry.name, "<9>");
    }

    #[test]
    fn stops_cleanly_at_buffer_end() {
        let buf = entry_bytes(2, 12, 2, ".");
        let entries: Vec<DirEntry> = iter_over(buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn rejects_rec_len_shorter_than_header() {
        let buf = entry_bytes(2, 4, 2, "");
        let mut it = iter_over(buf);
        assert!(matches!(it.next(), Some(Err(Ext4Error::BlockMap(_)))));
    }
}
