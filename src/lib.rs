//! Chatroom console library.
//!
//! Core components of the chatroom client:
//!
//! - `models` - wire messages and the request/response pairing
//! - `net` - framing, transport, read loop and the `ChatClient`
//! - `state` - session and connectivity state, console actions
//! - `config` - command-line and environment configuration
//! - `app` - the interactive console
//!
//! # Client
//!
//! ```ignore
//! use chatroom_console::net::ChatClient;
//!
//! let client = ChatClient::new("127.0.0.1:9527".parse()?);
//! client.connect().await??;
//! let rooms = client.list_rooms().await??;
//! ```

pub mod app;
pub mod config;
pub mod models;
pub mod net;
pub mod state;
