//! Library database initialization

pub mod init;

pub use init::*;
