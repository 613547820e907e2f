// Library for tests to access modules

pub mod aggregation;
pub mod aggregation_worker;
pub mod condition;
pub mod config;
pub mod error;
pub mod metric_repo;
pub mod models;
pub mod query;
pub mod routes;
pub mod schema;
pub mod version;
