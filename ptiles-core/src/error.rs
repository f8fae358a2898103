use std::path::PathBuf;

/// Errors that abort a tiling or re-assembly run before any work is attempted. They are usually
/// passed around wrapped in an `anyhow::Error` and can be recovered with `downcast_ref`
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The output directory already contains exported tiles or metadata
    #[error("Output directory {} already contains exported data", .0.display())]
    OutputNotEmpty(PathBuf),

    /// No source files with the expected extension were found
    #[error("No .{extension} files found in {}", .directory.display())]
    NoInputFiles {
        directory: PathBuf,
        extension: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
