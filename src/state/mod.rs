//! State management module.
//!
//! Session facts and connectivity are owned by the `ChatClient`; console
//! commands are parsed into [`Action`]s before they touch either.

pub mod actions;
pub mod connectivity;
pub mod help;
pub mod session;

pub use actions::{parse, Action, ParseError};
pub use connectivity::{Connectivity, ConnectivityMode, LinkStatus};
pub use session::{AuthOutcome, RoomInfo, Session, LOBBY};
