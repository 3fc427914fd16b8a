//! Azure Provider for Pyxis
//!
//! Maps declarative resource configuration onto the Azure management plane:
//! HDInsight applications, SQL databases and subscription provisioning.
//! The concrete HTTP client is injected behind the traits in [`api`].

pub mod api;
pub mod azure;
pub mod provider;
pub mod resources;
