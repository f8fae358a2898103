#![warn(clippy::all)]

//! Reading and writing of everything the tiling pipeline persists: source clouds as delimited text
//! ([ascii]), the typed array container ([archive]), tile and prediction files built on top of it ([tiles]),
//! and the layout of an exported dataset directory ([dataset]).

pub mod archive;
pub mod ascii;
pub mod dataset;
pub mod tiles;
