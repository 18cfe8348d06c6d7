//! HTTP surface for the office workflow backend: task routes, audit routes,
//! the actor layer and the audit capture middleware.

pub mod actor;
pub mod audit;
pub mod capture;
pub mod config;
pub mod error;
pub mod server;
pub mod tasks;
