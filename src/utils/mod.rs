pub mod convert;
pub mod retry;
pub mod time;

#[cfg(test)]
mod retry_test;
