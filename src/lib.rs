//! soq library exports for testing

pub mod config;
pub mod mcp;
pub mod render;
pub mod session;
pub mod stack;

#[cfg(test)]
pub mod test_support;
