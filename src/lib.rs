// Library for tests to access modules

pub mod accounting_repo;
pub mod config;
pub mod engine;
pub mod models;
pub mod pipeline;
pub mod remote_config;
pub mod routes;
pub mod worker;
