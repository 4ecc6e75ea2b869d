mod client;
mod files;
mod folders;
pub mod types;

pub use client::DriveClient;

#[cfg(test)]
pub(crate) use client::test_support;
