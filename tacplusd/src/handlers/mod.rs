//! The AAA dispatch graph.
//!
//! A connection's root handler routes each session-opening packet by header
//! type; the authentication flow may schedule continuation handlers that pick
//! the session back up on its next inbound packet.

use std::sync::Arc;

use crate::config::RuntimeScope;
use crate::context::Request;
use crate::error::HandlerError;
use crate::response::Response;

mod accounting;
mod authentication;
mod authorization;

pub use accounting::AccountingHandler;
pub use authentication::AuthenticateStartHandler;
pub use authorization::AuthorizeHandler;

use tacplus_protocol::PacketType;

/// A packet handler: either a session's entry point or a stored continuation.
pub trait Handler: Send + Sync {
    /// Processes one inbound packet, writing at most one reply and optionally
    /// scheduling the handler for the session's next packet.
    fn handle(&self, response: &mut Response<'_>, request: &Request<'_>)
        -> Result<(), HandlerError>;
}

/// The root handler installed for every new session: routes by packet type.
pub struct StartHandler {
    scope: Arc<RuntimeScope>,
}

impl StartHandler {
    /// Creates the root handler for a connection matched to the given scope.
    pub fn new(scope: Arc<RuntimeScope>) -> Self {
        Self { scope }
    }
}

impl Handler for StartHandler {
    fn handle(
        &self,
        response: &mut Response<'_>,
        request: &Request<'_>,
    ) -> Result<(), HandlerError> {
        match request.packet_type {
            PacketType::Authentication => {
                AuthenticateStartHandler::new(self.scope.clone()).handle(response, request)
            }
            PacketType::Authorization => {
                AuthorizeHandler::new(self.scope.clone()).handle(response, request)
            }
            PacketType::Accounting => {
                AccountingHandler::new(self.scope.clone()).handle(response, request)
            }
        }
    }
}
