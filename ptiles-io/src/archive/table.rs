use std::{
    collections::BTreeMap,
    io::{Read, Write},
};

use anyhow::{anyhow, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ptiles_core::math::Alignable;
use serde::{Deserialize, Serialize};

/// Alignment of the array table and of every array within the body
pub const ARCHIVE_ALIGNMENT: usize = 8;

/// Element type of an array in a tile archive. All values are stored in little-endian byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentType {
    UnsignedByte,
    Int,
    UnsignedLong,
    Float,
    Double,
}

impl ComponentType {
    /// Size of a single value of this type in bytes
    pub fn size(&self) -> usize {
        match self {
            ComponentType::UnsignedByte => 1,
            ComponentType::Int => 4,
            ComponentType::UnsignedLong | ComponentType::Double => 8,
            ComponentType::Float => 4,
        }
    }
}

/// The values of one array in a tile archive
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    U8(Vec<u8>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ArrayData {
    pub fn component_type(&self) -> ComponentType {
        match self {
            ArrayData::U8(_) => ComponentType::UnsignedByte,
            ArrayData::I32(_) => ComponentType::Int,
            ArrayData::U64(_) => ComponentType::UnsignedLong,
            ArrayData::F32(_) => ComponentType::Float,
            ArrayData::F64(_) => ComponentType::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::U8(values) => values.len(),
            ArrayData::I32(values) => values.len(),
            ArrayData::U64(values) => values.len(),
            ArrayData::F32(values) => values.len(),
            ArrayData::F64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_size(&self) -> usize {
        self.len() * self.component_type().size()
    }

    pub(crate) fn write_le<W: Write>(&self, mut writer: W) -> Result<()> {
        match self {
            ArrayData::U8(values) => writer.write_all(values)?,
            ArrayData::I32(values) => {
                for value in values {
                    writer.write_i32::<LittleEndian>(*value)?;
                }
            }
            ArrayData::U64(values) => {
                for value in values {
                    writer.write_u64::<LittleEndian>(*value)?;
                }
            }
            ArrayData::F32(values) => {
                for value in values {
                    writer.write_f32::<LittleEndian>(*value)?;
                }
            }
            ArrayData::F64(values) => {
                for value in values {
                    writer.write_f64::<LittleEndian>(*value)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn read_le<R: Read>(
        mut reader: R,
        component_type: ComponentType,
        len: usize,
    ) -> Result<Self> {
        Ok(match component_type {
            ComponentType::UnsignedByte => {
                let mut values = vec![0; len];
                reader.read_exact(&mut values)?;
                ArrayData::U8(values)
            }
            ComponentType::Int => {
                let mut values = vec![0; len];
                reader.read_i32_into::<LittleEndian>(&mut values)?;
                ArrayData::I32(values)
            }
            ComponentType::UnsignedLong => {
                let mut values = vec![0; len];
                reader.read_u64_into::<LittleEndian>(&mut values)?;
                ArrayData::U64(values)
            }
            ComponentType::Float => {
                let mut values = vec![0.0; len];
                reader.read_f32_into::<LittleEndian>(&mut values)?;
                ArrayData::F32(values)
            }
            ComponentType::Double => {
                let mut values = vec![0.0; len];
                reader.read_f64_into::<LittleEndian>(&mut values)?;
                ArrayData::F64(values)
            }
        })
    }
}

/// Location and type of one array inside the archive body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayReference {
    #[serde(rename = "byteOffset")]
    pub byte_offset: usize,
    #[serde(rename = "componentType")]
    pub component_type: ComponentType,
    pub shape: Vec<usize>,
}

impl ArrayReference {
    /// Number of values in the referenced array
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_size(&self) -> usize {
        self.len() * self.component_type.size()
    }
}

/// The JSON table of a tile archive, mapping array names to their location in the body
pub type ArrayTable = BTreeMap<String, ArrayReference>;

/// Serializes `table` as JSON, padded with spaces to the next 8-byte boundary. Returns the number of bytes
/// written
pub fn ser_array_table<W: Write>(mut writer: W, table: &ArrayTable) -> Result<usize> {
    let json = serde_json::to_vec(table).context("Could not serialize array table")?;
    let padded_len = json.len().align_to(ARCHIVE_ALIGNMENT);
    writer.write_all(&json)?;
    writer.write_all(&vec![b' '; padded_len - json.len()])?;
    Ok(padded_len)
}

/// Deserializes an array table of `byte_length` bytes (including padding) from `reader`
pub fn deser_array_table<R: Read>(mut reader: R, byte_length: usize) -> Result<ArrayTable> {
    let mut buf = vec![0; byte_length];
    reader
        .read_exact(&mut buf)
        .context("Could not read array table")?;
    let json_end = buf
        .iter()
        .rposition(|b| *b != b' ')
        .map(|idx| idx + 1)
        .ok_or_else(|| anyhow!("Array table is empty"))?;
    serde_json::from_slice(&buf[..json_end]).context("Array table is no valid JSON")
}
