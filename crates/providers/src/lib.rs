//! Model invoker implementations for turnrelay.
//!
//! All invokers implement the `turnrelay_core::ModelInvoker` trait.

pub mod anthropic;

pub use anthropic::AnthropicInvoker;
