//! Shared pieces of the `rpc` binary.

pub mod calc;
