pub mod cipher;
pub mod dat;
pub mod datfile;
pub mod error;
pub mod write;

mod compress;
mod path;
mod read;
mod spec;

pub use datfile::{DatFile, DirEntry, Enumerate, NodeType};
pub use write::DatArchiveCreator;
