// Custom-domain TLS certificate lifecycle manager
// Validates tenant domains, issues certificates over ACME HTTP-01 and rolls them out to ingress hosts

pub mod acme;
pub mod api;
pub mod bootstrap;
pub mod challenge;
pub mod config;
pub mod distribution;
pub mod error;
pub mod observability;
pub mod policy;
pub mod registry;
pub mod scheduler;
pub mod signals;
pub mod transport;
pub mod validator;

pub use error::{LifecycleError, Result};
