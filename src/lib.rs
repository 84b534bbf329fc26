//! MongoDB cluster discovery, monitoring, and connection pooling.
//!
//! This crate keeps a live, eventually consistent view of a server
//! deployment — a standalone server, a replica set, or a group of shard
//! routers — and hands out pooled connections to servers chosen by read
//! preference.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mongodb_cluster::{Cluster, ClusterOptions, ReadPreference};
//! # use mongodb_cluster::{Result, stream::Stream, wire::CommandExecutor};
//! # use bson::Document;
//! # use bufstream::BufStream;
//! # struct Wire;
//! # impl CommandExecutor for Wire {
//! #     fn execute_command(&self, _: &mut BufStream<Stream>, _: &Document) -> Result<Document> {
//! #         unimplemented!()
//! #     }
//! # }
//!
//! # fn main() -> mongodb_cluster::Result<()> {
//! let cluster = Cluster::connect(
//!     &["localhost:27017"],
//!     ClusterOptions::default(),
//!     Arc::new(Wire),
//! )?;
//!
//! let server = cluster.select_server(&ReadPreference::primary())?;
//! server.with_connection(|_conn| {
//!     // hand the connection to the wire-protocol layer
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```
pub mod apm;
pub mod cluster;
pub mod common;
pub mod connstring;
pub mod error;
pub mod pool;
pub mod stream;
pub mod topology;
pub mod wire;

pub use crate::cluster::Cluster;
pub use crate::common::{ClusterOptions, ReadMode, ReadPreference};
pub use crate::error::{Error, Result};
