//! Stand-in generate backends for exercising the benchmark engine without a real model server.

#[cfg(feature = "mock")]
pub mod mock;
