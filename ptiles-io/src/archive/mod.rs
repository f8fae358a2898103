//! A small keyed container for typed n-dimensional arrays. An archive file consists of an
//! [ArchiveHeader], a JSON [ArrayTable] naming all arrays and their shapes, and a little-endian binary body.
use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};

mod header;
pub use self::header::*;

mod table;
pub use self::table::*;

mod reader;
pub use self::reader::*;

mod writer;
pub use self::writer::*;

/// One array of an `Archive`
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArray {
    pub shape: Vec<usize>,
    pub data: ArrayData,
}

/// In-memory set of named arrays that is read from or written to a single archive file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Archive {
    arrays: BTreeMap<String, NamedArray>,
}

macro_rules! take_typed {
    ($fn_name:ident, $variant:ident, $type:ty) => {
        /// Removes the array `name` from this archive and returns its shape and values. Fails if the array is
        /// missing or has a different element type
        pub fn $fn_name(&mut self, name: &str) -> Result<(Vec<usize>, Vec<$type>)> {
            match self.take(name)? {
                NamedArray {
                    shape,
                    data: ArrayData::$variant(values),
                } => Ok((shape, values)),
                other => bail!(
                    "Array '{}' has component type {:?}, expected {:?}",
                    name,
                    other.data.component_type(),
                    ArrayData::$variant(vec![]).component_type()
                ),
            }
        }
    };
}

impl Archive {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds an array with the given `shape`. The number of values must match the shape
    pub fn insert<S: Into<String>>(&mut self, name: S, shape: Vec<usize>, data: ArrayData) -> Result<()> {
        let name = name.into();
        let expected_len: usize = shape.iter().product();
        if expected_len != data.len() {
            bail!(
                "Array '{}' of shape {:?} needs {} values, but {} were given",
                name,
                shape,
                expected_len,
                data.len()
            );
        }
        self.arrays.insert(name, NamedArray { shape, data });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&NamedArray> {
        self.arrays.get(name)
    }

    pub fn take(&mut self, name: &str) -> Result<NamedArray> {
        self.arrays
            .remove(name)
            .ok_or_else(|| anyhow!("Archive has no array named '{}'", name))
    }

    take_typed!(take_u8, U8, u8);
    take_typed!(take_i32, I32, i32);
    take_typed!(take_u64, U64, u64);
    take_typed!(take_f32, F32, f32);
    take_typed!(take_f64, F64, f64);

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NamedArray)> {
        self.arrays.iter().map(|(name, array)| (name.as_str(), array))
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}
