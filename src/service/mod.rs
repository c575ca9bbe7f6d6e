pub mod accounts;
pub mod catalog;
pub mod detection;
pub mod reconciler;
pub mod rm_client;

pub use detection::{EnvironmentDetector, EnvironmentInfo};
pub use reconciler::{Difference, DifferenceType, JsonKind, Reconciliation, reconcile};
pub use rm_client::{RmClient, RmCredentials};
