//! CLI commands implementation

pub mod ask;
pub mod index;
pub mod init;
pub mod inspect;

pub use ask::*;
pub use index::*;
pub use init::*;
pub use inspect::*;
