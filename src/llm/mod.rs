pub mod analyzer;
pub mod client;
pub mod polling;
pub mod prompts;
pub mod types;

pub use analyzer::*;
pub use client::*;
pub use polling::*;
pub use types::*;
