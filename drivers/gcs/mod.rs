//! Google Cloud Storage 驱动

pub mod client;
pub mod config;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod factory;
pub mod memory;
pub mod store;
pub mod writer;

pub use client::{Connector, ObjectClient};
pub use config::GcsConfig;
pub use credentials::ServiceAccount;
pub use driver::GcsDriver;
pub use error::{CredentialError, GcsError};
pub use factory::{GcsDriverFactory, DRIVER_TYPE};
pub use memory::MemoryClient;
pub use store::{GcsClient, GcsConnector};
