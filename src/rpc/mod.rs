mod client;
mod retry;
mod types;

pub use client::*;
pub use retry::*;
pub use types::*;
