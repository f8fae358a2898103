use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

/// Magic bytes at the start of every tile archive
pub const ARCHIVE_MAGIC: [u8; 4] = *b"ptil";
/// Current version of the tile archive format
pub const ARCHIVE_VERSION: u32 = 1;

/// Fixed-size header of a tile archive. The header is followed by the JSON array table and the binary body,
/// both of which start on an 8-byte boundary
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveHeader {
    pub magic: [u8; 4],
    pub version: u32,
    /// Length of the whole archive in bytes, including this header
    pub byte_length: u64,
    pub body_byte_length: u64,
    /// Length of the JSON array table in bytes, including padding
    pub table_json_byte_length: u32,
    pub reserved: u32,
}

impl ArchiveHeader {
    /// Length of an archive header in bytes
    pub const BYTE_LENGTH: usize = 32;

    pub fn new(table_json_byte_length: u32, body_byte_length: u64) -> Self {
        Self {
            magic: ARCHIVE_MAGIC,
            version: ARCHIVE_VERSION,
            byte_length: Self::BYTE_LENGTH as u64 + table_json_byte_length as u64 + body_byte_length,
            body_byte_length,
            table_json_byte_length,
            reserved: 0,
        }
    }

    /// Returns an Err if this is not the header of a tile archive that can be read by this version
    pub fn verify(&self) -> Result<()> {
        if self.magic != ARCHIVE_MAGIC {
            bail!(
                "No valid tile archive, expected first four bytes to be equal to 'ptil', but was '{:?}' instead",
                self.magic
            );
        }
        if self.version != ARCHIVE_VERSION {
            bail!(
                "Unsupported tile archive version {} (expected {})",
                self.version,
                ARCHIVE_VERSION
            );
        }
        if self.byte_length
            != Self::BYTE_LENGTH as u64 + self.table_json_byte_length as u64 + self.body_byte_length
        {
            bail!("Tile archive header has inconsistent section lengths");
        }
        Ok(())
    }
}

const_assert!(ArchiveHeader::BYTE_LENGTH == std::mem::size_of::<ArchiveHeader>());
