//! # tacplusd
//!
//! An asynchronous TACACS+ ([RFC8907](https://www.rfc-editor.org/rfc/rfc8907)) server.
//!
//! The server multiplexes many logical AAA sessions over each TCP connection
//! (single-connect mode), drives the multi-exchange ASCII login state machine,
//! and delegates policy decisions to pluggable [`Authenticator`](policy::Authenticator),
//! [`Authorizer`](policy::Authorizer) and [`Accounter`](policy::Accounter)
//! implementations looked up through a [`SecretProvider`](secrets::SecretProvider).

#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod policy;
pub mod proxy;
pub mod response;
pub mod secrets;
pub mod server;
pub mod session;

pub use config::{Config, ConfigHandle};
pub use error::{ConnectionError, HandlerError, SequenceError};
pub use server::{Server, ServerSettings};

// reexported for ease of access
pub use tacplus_protocol as protocol;
