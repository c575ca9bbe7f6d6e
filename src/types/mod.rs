pub mod dataserver;
pub mod requests;
pub mod user;

pub use dataserver::{DataServerInfo, DataServerSummary, LibraryUpdateForm};
pub use user::{ApplicationUser, SessionUser, UserRole};
