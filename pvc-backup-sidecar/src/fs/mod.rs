//! File system helpers.

pub mod copy;
pub mod probe;

pub use copy::copy_file;
pub use probe::{file_exists, is_dir};
