//! Transport layer exposing the job service to remote callers

pub mod http;

pub use http::{routes, serve};
