pub mod scratch;

pub use scratch::{delete_file_if_exists, ScratchDir, ScratchFile, TempFiles};
