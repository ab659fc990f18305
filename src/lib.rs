// SPDX-License-Identifier: MPL-2.0

//! Client-side persistence and synchronization for SoftSpot.
//!
//! SoftSpot renders everything on the client and talks to a hosted
//! relational database plus object storage when one is configured. This
//! crate is the data layer underneath that: a local mirror (durable
//! SQLite tier plus a session-scoped in-memory tier), a thin remote
//! store client with retry, and the application-level operations for
//! posts, marketplace listings, messaging, and user records.
//!
//! Every mutation runs the same state machine: remote-if-configured
//! through the retry wrapper, falling back to the local mirror when the
//! remote is unreachable. Reads prefer the mirror and only go to the
//! remote when the mirror is empty. Duplicate records are resolved
//! last-write-wins by timestamp, which is a client-cache policy and not
//! a consistency mechanism.

pub mod config;
pub mod mirror;
pub mod models;
pub mod remote;
pub mod retry;
pub mod runtime;
pub mod store;

pub use config::RemoteConfig;
pub use store::{Backend, MessageStore, PostStore, SaveOutcome, Store, StoreError, UserStore};
