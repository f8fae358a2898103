use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use ptiles_core::math::Alignable;

use super::{
    ser_array_table, Archive, ArchiveHeader, ArrayReference, ArrayTable, ARCHIVE_ALIGNMENT,
};

/// Writes `archive` to `writer`
pub fn write_archive<W: Write>(mut writer: W, archive: &Archive) -> Result<()> {
    let mut table = ArrayTable::new();
    let mut body_byte_length = 0;
    for (name, array) in archive.iter() {
        table.insert(
            name.to_owned(),
            ArrayReference {
                byte_offset: body_byte_length,
                component_type: array.data.component_type(),
                shape: array.shape.clone(),
            },
        );
        body_byte_length += array.data.byte_size().align_to(ARCHIVE_ALIGNMENT);
    }

    let mut table_blob = vec![];
    let table_byte_length = ser_array_table(&mut table_blob, &table)?;

    let header = ArchiveHeader::new(
        u32::try_from(table_byte_length).context("Array table exceeds 4GiB")?,
        body_byte_length as u64,
    );
    bincode::serialize_into(&mut writer, &header)
        .context("Error while serializing archive header")?;
    writer
        .write_all(&table_blob)
        .context("Error while writing array table")?;

    for (_, array) in archive.iter() {
        array.data.write_le(&mut writer)?;
        let byte_size = array.data.byte_size();
        let padding = byte_size.align_to(ARCHIVE_ALIGNMENT) - byte_size;
        if padding > 0 {
            writer.write_all(&vec![0; padding])?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(".tmp");
    path.with_file_name(file_name)
}

/// Writes `archive` to a new file at `path`. The data is written to a temporary file next to `path` first and
/// then moved into place, so `path` either holds a complete archive or does not exist
pub fn write_archive_file<P: AsRef<Path>>(path: P, archive: &Archive) -> Result<()> {
    let path = path.as_ref();
    let tmp_path = temporary_path(path);
    let result = File::create(&tmp_path)
        .with_context(|| format!("Could not create file {}", tmp_path.display()))
        .and_then(|file| write_archive(BufWriter::new(file), archive))
        .and_then(|_| {
            fs::rename(&tmp_path, path)
                .with_context(|| format!("Could not move archive to {}", path.display()))
        });
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result.with_context(|| format!("Error while writing archive {}", path.display()))
}
