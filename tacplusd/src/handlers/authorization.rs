//! Authorization dispatch.

use std::sync::Arc;

use tracing::debug;

use tacplus_protocol::{authorization, Arguments, Deserialize, FieldText, SerializeError};

use crate::config::RuntimeScope;
use crate::context::Request;
use crate::error::HandlerError;
use crate::handlers::Handler;
use crate::response::Response;

/// Decodes an authorization request and delegates to the user's authorizer.
pub struct AuthorizeHandler {
    scope: Arc<RuntimeScope>,
}

impl AuthorizeHandler {
    /// Creates the authorization handler for a scope.
    pub fn new(scope: Arc<RuntimeScope>) -> Self {
        Self { scope }
    }
}

impl Handler for AuthorizeHandler {
    fn handle(
        &self,
        response: &mut Response<'_>,
        request: &Request<'_>,
    ) -> Result<(), HandlerError> {
        let author_request = authorization::Request::deserialize_from_buffer(request.body)?;

        debug!(
            session = request.session_id(),
            fields = ?author_request.field_entries(),
            "authorization request"
        );

        let username = author_request.user_information().user().as_ref();

        let Some(user) = self.scope.user(username) else {
            debug!(user = username, scope = %self.scope.name, "unknown user");
            return reply_fail(response, "user not authorized");
        };

        // a user without an authorizer is denied rather than passed through
        let Some(authorizer) = user.authorizer.clone() else {
            debug!(user = username, scope = %self.scope.name, "user has no authorizer");
            return reply_fail(response, "user not authorized");
        };

        authorizer.authorize(response, request.context, &author_request)
    }
}

fn reply_fail(response: &mut Response<'_>, message: &str) -> Result<(), HandlerError> {
    response.reply(
        authorization::Reply::new(
            authorization::Status::Fail,
            FieldText::try_from(message).unwrap_or_default(),
            b"",
            Arguments::default(),
        )
        .ok_or(SerializeError::LengthOverflow)?,
    )
}
