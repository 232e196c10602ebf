pub mod approval;
pub mod calculator;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod money;
pub mod policy;
pub mod resolver;
pub mod seed;
pub mod service;
pub mod store;
pub mod timesheet;
pub mod types;
pub mod utils;
pub mod workflow;
