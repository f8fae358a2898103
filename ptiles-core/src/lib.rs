#![warn(clippy::all)]

//! Core data structures for cutting point clouds into fixed-size training tiles and for putting per-tile
//! predictions back together
//!
//! A source cloud is held in a [PointCloud](crate::cloud::PointCloud), whose point indices stay stable for the
//! whole pipeline. Points are grouped into blocks on a [GridSpec](crate::grid::GridSpec), blocks are cut into
//! [Tiles](crate::tile::Tile), and the retained tiles are indexed by [DatasetMetadata](crate::meta::DatasetMetadata).

pub extern crate nalgebra;
pub extern crate ndarray;

pub mod classes;
pub mod cloud;
pub mod config;
pub mod error;
pub mod grid;
/// Useful mathematical tools when working with point cloud data
pub mod math;
pub mod meta;
pub mod tile;
/// Utilities
pub mod util;
