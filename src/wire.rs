//! Boundary to the wire-protocol layer.
//!
//! The cluster core never encodes or decodes wire messages itself. A
//! [`CommandExecutor`] turns a borrowed server stream and a command document
//! into a reply document; the monitor uses it for its status probes and the
//! operation layer uses it with pooled streams.
use crate::error::Result;
use crate::stream::Stream;

use bson::Document;
use bufstream::BufStream;

pub trait CommandExecutor: Send + Sync {
    /// Performs one request/reply round trip of `command` on `stream`.
    fn execute_command(
        &self,
        stream: &mut BufStream<Stream>,
        command: &Document,
    ) -> Result<Document>;
}
