use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{ensure, Context, Result};
use ptiles_core::cloud::{FeatureSchema, PointCloud};

use super::Column;

/// Returns the format string that `AsciiWriter` uses for clouds with the given `schema`: the position, all
/// extra features in schema order and finally the classification. Features without a format literal are
/// written as `s` columns
/// ```
/// # use ptiles_core::cloud::{ExtraFeature, FeatureSchema};
/// # use ptiles_io::ascii::output_format;
/// let schema = FeatureSchema::new(vec![ExtraFeature::new("intensity", 255.0)]);
/// assert_eq!(output_format(&schema), "xyzic");
/// ```
pub fn output_format(schema: &FeatureSchema) -> String {
    let mut format = String::from("xyz");
    format.extend(
        schema
            .iter()
            .map(|feature| Column::feature(&feature.name).map_or('s', |c| c.literal())),
    );
    format.push('c');
    format
}

/// Writer for point clouds as delimited text, one point per line
pub struct AsciiWriter<W: Write> {
    writer: W,
    delimiter: String,
}

impl<W: Write> AsciiWriter<W> {
    pub fn from_write(write: W, delimiter: &str) -> Self {
        Self {
            writer: write,
            delimiter: delimiter.to_owned(),
        }
    }

    /// Writes all points of `cloud` with the given per-point `classifications`, which replace the
    /// classifications stored in the cloud. The column layout is given by `output_format`
    pub fn write_cloud(&mut self, cloud: &PointCloud, classifications: &[u8]) -> Result<()> {
        ensure!(
            classifications.len() == cloud.len(),
            "Expected {} classifications but got {}",
            cloud.len(),
            classifications.len()
        );
        let num_extra = cloud.schema().len();
        for (index, (position, classification)) in
            cloud.positions().iter().zip(classifications).enumerate()
        {
            write!(
                self.writer,
                "{x}{d}{y}{d}{z}",
                x = position.x,
                y = position.y,
                z = position.z,
                d = self.delimiter
            )?;
            for feature in 0..num_extra {
                write!(self.writer, "{}{}", self.delimiter, cloud.extra(index, feature))?;
            }
            writeln!(self.writer, "{}{}", self.delimiter, classification)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl AsciiWriter<BufWriter<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, delimiter: &str) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Could not create file {}", path.as_ref().display()))?;
        Ok(Self::from_write(BufWriter::new(file), delimiter))
    }
}

/// Writes `cloud` with the given `classifications` to a new file at `path`
pub fn write_cloud<P: AsRef<Path>>(
    path: P,
    cloud: &PointCloud,
    classifications: &[u8],
    delimiter: &str,
) -> Result<()> {
    let mut writer = AsciiWriter::from_path(path, delimiter)?;
    writer.write_cloud(cloud, classifications)?;
    writer.flush()
}
