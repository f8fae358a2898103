use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{bail, Context, Result};

use super::{deser_array_table, Archive, ArchiveHeader, ArrayData};

/// Reads a whole archive from `reader`
pub fn read_archive<R: Read>(mut reader: R) -> Result<Archive> {
    // Archives are little-endian, which is the default of bincode
    let header: ArchiveHeader = bincode::deserialize_from(&mut reader)
        .context("Could not deserialize archive header")?;
    header.verify()?;

    let table = deser_array_table(&mut reader, header.table_json_byte_length as usize)?;

    let mut body = vec![0; header.body_byte_length as usize];
    reader
        .read_exact(&mut body)
        .context("Archive body is truncated")?;

    let mut archive = Archive::new();
    for (name, reference) in table {
        let end = reference.byte_offset + reference.byte_size();
        if end > body.len() {
            bail!(
                "Array '{}' spans bytes {}..{} but the archive body has only {} bytes",
                name,
                reference.byte_offset,
                end,
                body.len()
            );
        }
        let data = ArrayData::read_le(
            &body[reference.byte_offset..end],
            reference.component_type,
            reference.len(),
        )?;
        archive.insert(name, reference.shape, data)?;
    }
    Ok(archive)
}

pub fn read_archive_file<P: AsRef<Path>>(path: P) -> Result<Archive> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Could not open archive {}", path.display()))?;
    read_archive(BufReader::new(file))
        .with_context(|| format!("Error while reading archive {}", path.display()))
}
