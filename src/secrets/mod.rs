//! Handling of sensitive values read from credential and certificate secrets.
//!
//! Credential fields and private keys are wrapped in [`SecretString`] as soon as
//! they are read from the cluster, so they cannot leak through structured logs
//! or error messages.

pub mod types;

pub use types::SecretString;
