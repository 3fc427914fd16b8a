//! Resource handlers
//!
//! One module per managed resource type: schema definition, configuration
//! expansion into API payloads, and flattening of remote state back into
//! attributes.

pub mod hdinsight_application;
pub mod mssql_database;
pub mod subscription;
