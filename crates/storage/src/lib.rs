//! SQLite-backed event storage for Switchboard sessions.
//!
//! Every chat session appends its full transcript to an event log: session
//! lifecycle markers, user and assistant messages, and every tool dispatch
//! with its result. The log is what powers `switchboard sessions` and
//! `switchboard logs`, and "why did it call that tool?" debugging after
//! the fact.
//!
//! # Core Concepts
//!
//! - [`EventStore`] wraps a SQLite database and supports appending events
//!   and querying session history.
//! - [`Event`] is one thing that happened, stamped with a [`SessionId`] and
//!   a UTC timestamp; its [`EventKind`] carries the payload.
//! - [`SessionId`] is a UUID, displayed/parsed as a string so CLI commands
//!   can reference sessions by prefix.
//!
//! # Example
//!
//! ```no_run
//! use storage::{Event, EventKind, EventStore, Role, SessionId};
//!
//! let store = EventStore::open("events.db")?;
//!
//! let session_id = SessionId::new();
//! store.append(&Event::new(session_id, EventKind::SessionStart))?;
//! store.append(&Event::message(session_id, Role::User, "look up rust"))?;
//!
//! for event in store.load_session(session_id)? {
//!     println!("{}: {:?}", event.timestamp, event.kind);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod store;

pub use error::{Error, Result};
pub use event::{Event, EventKind, Role, SessionId};
pub use store::{EventStore, SessionSummary};
