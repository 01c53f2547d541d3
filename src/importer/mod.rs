//! Bank export import: upload, column mapping, row processing.

pub mod detect;
pub mod mapping;
pub mod parse;
pub mod process;
pub mod reader;
pub mod session;

pub use detect::BankPreset;
pub use mapping::Mapping;
