//! Content library collaborator.
//!
//! The acquisition coordinator asks the library which titles are missing
//! updates, moves completed payloads into it and asks it to rescan.

mod fs_library;
mod types;

pub use fs_library::FsLibrary;
pub use types::*;
