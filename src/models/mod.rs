pub mod file;

pub use file::DavFile;
