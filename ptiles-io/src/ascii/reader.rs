use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    str::FromStr,
};

use anyhow::{anyhow, bail, Context, Result};
use itertools::{EitherOrBoth::*, Itertools};
use log::warn;
use ptiles_core::{
    cloud::{FeatureSchema, PointCloud},
    config::SourceFormat,
    nalgebra::Vector3,
};

use super::{parse_format, Column};

/// Reader for point clouds stored as delimited text, one point per line
pub struct AsciiReader<R: BufRead> {
    reader: R,
    columns: Vec<Column>,
    delimiter: String,
    schema: FeatureSchema,
    /// For every column, the index of the extra feature it feeds (if any)
    feature_slots: Vec<Option<usize>>,
}

impl<R: BufRead> AsciiReader<R> {
    /// Creates a new `AsciiReader` that reads the columns given by `format`. Every feature in `schema` must have
    /// a matching column in `format`
    pub fn from_read(read: R, format: &str, delimiter: &str, schema: FeatureSchema) -> Result<Self> {
        let columns = parse_format(format)?;
        let feature_slots = columns
            .iter()
            .map(|column| match column {
                Column::Feature(name) => schema.index_of(name),
                _ => None,
            })
            .collect::<Vec<_>>();
        for (feature_idx, feature) in schema.iter().enumerate() {
            if !feature_slots.contains(&Some(feature_idx)) {
                bail!(
                    "Extra feature '{}' has no column in format string '{}'",
                    feature.name,
                    format
                );
            }
        }
        if !columns.contains(&Column::Classification) {
            warn!(
                "Format string '{}' has no classification column, all points are read as class 0",
                format
            );
        }
        Ok(Self {
            reader: read,
            columns,
            delimiter: delimiter.to_owned(),
            schema,
            feature_slots,
        })
    }

    /// Reads all remaining points into a new `PointCloud`
    pub fn read_cloud(&mut self) -> Result<PointCloud> {
        let mut cloud = PointCloud::new(self.schema.clone());
        let mut extra = vec![0.0_f32; self.schema.len()];
        let mut line = String::new();
        let mut line_number = 0;
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                break;
            }
            line_number += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let (position, classification) = self
                .parse_line(trimmed, &mut extra)
                .with_context(|| format!("ReadError in line {}.", line_number))?;
            cloud.push(position, classification, &extra)?;
        }
        Ok(cloud)
    }

    fn parse_line(&self, line: &str, extra: &mut [f32]) -> Result<(Vector3<f64>, u8)> {
        let values: Box<dyn Iterator<Item = &str> + '_> = if self.delimiter.trim().is_empty() {
            Box::new(line.split_whitespace())
        } else {
            Box::new(line.split(self.delimiter.as_str()).map(str::trim))
        };
        let mut position = Vector3::zeros();
        let mut classification = 0;
        for (column_idx, pair) in values.zip_longest(self.columns.iter()).enumerate() {
            match pair {
                Both(value, column) => match column {
                    Column::Skip => {}
                    Column::CoordinateX => position.x = parse_value(value, *column)?,
                    Column::CoordinateY => position.y = parse_value(value, *column)?,
                    Column::CoordinateZ => position.z = parse_value(value, *column)?,
                    Column::Classification => classification = parse_value(value, *column)?,
                    Column::Feature(_) => {
                        if let Some(feature_idx) = self.feature_slots[column_idx] {
                            extra[feature_idx] = parse_value(value, *column)?;
                        }
                    }
                },
                Left(_) => break,
                Right(column) => bail!(
                    "Missing value for format literal '{}', line has only {} columns",
                    column.literal(),
                    column_idx
                ),
            }
        }
        Ok((position, classification))
    }
}

impl AsciiReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        format: &str,
        delimiter: &str,
        schema: FeatureSchema,
    ) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Could not open point cloud file {}", path.as_ref().display()))?;
        Self::from_read(BufReader::new(file), format, delimiter, schema)
    }
}

fn parse_value<T: FromStr>(value: &str, column: Column) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        anyhow!(
            "ParseError at parsing '{}' for format literal '{}'.",
            value,
            column.literal()
        )
    })
}

/// Reads the whole point cloud at `path` using the column layout of `source`
pub fn read_cloud<P: AsRef<Path>>(
    path: P,
    source: &SourceFormat,
    schema: &FeatureSchema,
) -> Result<PointCloud> {
    let mut reader = AsciiReader::from_path(path, &source.format, &source.delimiter, schema.clone())?;
    reader.read_cloud()
}
