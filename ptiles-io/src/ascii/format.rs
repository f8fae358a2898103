use anyhow::{bail, Result};

/// A single column of a delimited text point cloud, identified by a format literal. The literals follow the
/// convention of LAStools' `txt2las`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Skip,
    CoordinateX,
    CoordinateY,
    CoordinateZ,
    Classification,
    /// A scalar value that can be used as an extra point feature
    Feature(&'static str),
}

/// Format literals of all scalar columns that can serve as extra point features, with their feature names
const FEATURE_LITERALS: [(char, &str); 11] = [
    ('i', "intensity"),
    ('r', "return_number"),
    ('n', "number_of_returns"),
    ('t', "gps_time"),
    ('u', "user_data"),
    ('p', "point_source_id"),
    ('R', "red"),
    ('G', "green"),
    ('B', "blue"),
    ('I', "nir"),
    ('a', "scan_angle_rank"),
];

impl Column {
    pub fn from_literal(literal: char) -> Option<Column> {
        match literal {
            's' => Some(Column::Skip),
            'x' => Some(Column::CoordinateX),
            'y' => Some(Column::CoordinateY),
            'z' => Some(Column::CoordinateZ),
            'c' => Some(Column::Classification),
            _ => FEATURE_LITERALS
                .iter()
                .find(|(l, _)| *l == literal)
                .map(|(_, name)| Column::Feature(name)),
        }
    }

    pub fn literal(&self) -> char {
        match self {
            Column::Skip => 's',
            Column::CoordinateX => 'x',
            Column::CoordinateY => 'y',
            Column::CoordinateZ => 'z',
            Column::Classification => 'c',
            Column::Feature(name) => FEATURE_LITERALS
                .iter()
                .find(|(_, n)| n == name)
                .map(|(l, _)| *l)
                .unwrap_or('s'),
        }
    }

    /// Returns the feature column with the given feature `name`, if there is a format literal for it
    pub fn feature(name: &str) -> Option<Column> {
        FEATURE_LITERALS
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(_, n)| Column::Feature(n))
    }
}

/// Parses a format string such as `"xyzic"` into its columns
pub fn parse_format(format: &str) -> Result<Vec<Column>> {
    let columns = format
        .chars()
        .map(|literal| match Column::from_literal(literal) {
            Some(column) => Ok(column),
            None => bail!(
                "FormatError can't interpret format literal '{}' in format string '{}'.",
                literal,
                format
            ),
        })
        .collect::<Result<Vec<_>>>()?;
    for required in [Column::CoordinateX, Column::CoordinateY, Column::CoordinateZ] {
        if !columns.contains(&required) {
            bail!(
                "Format string '{}' lacks the mandatory literal '{}'",
                format,
                required.literal()
            );
        }
    }
    Ok(columns)
}

/// Returns all format literals that can be interpreted, together with their meaning
pub fn format_literals() -> Vec<(char, &'static str)> {
    let mut literals = vec![
        ('s', "skip this number"),
        ('x', "x coordinate"),
        ('y', "y coordinate"),
        ('z', "z coordinate"),
        ('c', "classification"),
    ];
    literals.extend(FEATURE_LITERALS.iter().copied());
    literals
}
