//! Wire-level plumbing for talking LSP over a byte stream: Content-Length
//! framing, JSON-RPC message types, and builders for the messages this
//! client emits.
pub mod framing;
pub mod message_parser;
pub mod messages;
pub mod types;
