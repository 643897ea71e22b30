//! S3-compatible implementation of the `gitvault-core` storage interface.

mod archive;
mod retry;
mod s3_backend;

pub use archive::{build_tar_gz, BuiltArchive};
pub use s3_backend::S3Storage;
