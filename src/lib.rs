mod config;
mod constants;
mod errors;
mod feed;
mod lease;
mod model;
mod processor;
mod producer;
mod storage;
pub mod metrics;
pub mod utils;

pub use config::*;
pub use errors::*;
pub use feed::*;
pub use lease::*;
pub use model::*;
pub use processor::*;
pub use producer::*;
pub use storage::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
