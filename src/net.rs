//! Network layer: framing, connection generations and reply correlation.
//!
//! # Architecture
//!
//! ```text
//!  command layer                       background
//! ┌──────────────┐   call()   ┌───────────┐   read loop   ┌────────────┐
//! │  ChatClient  │──────────► │ Transport │ ◄──────────── │   server   │
//! │              │            └───────────┘  frames       └────────────┘
//! │   wait(kind) │ ◄───────── ┌───────────┐ ◄── post() ── ReadLoop
//! └──────────────┘  slots     │  Router   │ ──► notification queue
//!                             └───────────┘
//! ```
//!
//! A [`Link`] is one connection generation: a [`Transport`] for writing and a
//! [`Router`] that holds the latest reply of each response type. The read
//! loop is the only reader of the stream.
//!
//! # Protocol
//!
//! Messages use HTTP-style Content-Length framing with a JSON body whose
//! `"type"` field names the message:
//!
//! ```text
//! Content-Length: 38\r\n
//! \r\n
//! {"type":"login_req","auth":"t1"}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use chatroom_console::net::ChatClient;
//!
//! let client = ChatClient::new("127.0.0.1:9527".parse()?);
//! client.connect().await?;
//! let room = client.create_room("general", true).await??;
//! ```

mod client;
mod codec;
pub mod framing;
mod link;
pub mod read_loop;
mod router;
mod transport;

pub use client::{ChatClient, ClientError, DEFAULT_TIMEOUT_SECS};
pub use codec::{decode, encode, read_frame, write_frame};
pub use framing::{read_message, write_message, MAX_MESSAGE_SIZE};
pub use link::Link;
pub use read_loop::ReadLoopExit;
pub use router::{NotificationSink, Posted, Router};
pub use transport::{BoxedStream, Endpoint, FrameReader, Transport};
