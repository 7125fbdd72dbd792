mod marker;
mod remove;
mod tempdir;

pub use marker::*;
pub use remove::*;
pub use tempdir::*;
