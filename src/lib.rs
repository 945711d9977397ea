//! Push-publishing queue engine: moves publish bundles from a local queue
//! to remote receiving nodes and reconciles, tick by tick, whether every
//! endpoint group durably applied them.

pub mod audit;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod endpoints;
pub mod engine;
pub mod http;
pub mod model;
pub mod policy;
pub mod queries;
pub mod reconcile;
pub mod transport;
