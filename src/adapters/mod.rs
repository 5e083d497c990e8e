//! Kubernetes Adapters
//!
//! Concrete implementations of the secret store and storage class ports
//! against the cluster API.

pub mod classes;
pub mod secrets;

pub use classes::*;
pub use secrets::*;
