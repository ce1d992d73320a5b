//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): the error taxonomy every public call
//!   resolves with
//! - [`IoResultExt`](context::IoResultExt): IO error context helpers

pub mod context;
pub mod neterror;
