//! Mezzo - Configuration Store
//!
//! The store is the single source of truth for the bus topology:
//! applications, their channels, routes between channels,
//! transformations, scheduled collectors, integrations and process
//! settings. Workers hold ids only and re-resolve rows against the
//! store on every message, so admin mutations take effect mid-flight.
//!
//! Backed by Turso (async SQLite-compatible). Schema evolution runs at
//! open time and is idempotent across restarts.

mod db;
mod error;
mod migrate;
pub mod models;
pub mod repos;

pub use db::Store;
pub use error::{Result, StoreError};
pub use models::{
    collector_output_source, Application, Channel, ChannelInfo, Collector, Integration, Route,
    RouteInfo, RouteSource, Transformation, COLLECTOR_SOURCE_PREFIX, DIRECTION_INBOUND,
    DIRECTION_OUTBOUND, ROUTE_TYPE_DIRECT, ROUTE_TYPE_TRANSFORM,
};
