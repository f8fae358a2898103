//! End-to-end pipelines on top of `ptiles-core`, `ptiles-io` and `ptiles-algorithms`: exporting directories of
//! source clouds into tile datasets, running a segmentation model over them and putting the predictions back
//! together into labeled clouds

/// Directory-level export, segregation, inference and fusion
pub mod pipeline;
