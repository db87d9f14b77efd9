//! Authentication dispatch: PAP one-shots and the multi-exchange ASCII login.

use std::sync::Arc;

use tracing::debug;

use tacplus_protocol::authentication::{
    Action, Continue, Reply, ReplyFlags, Start, Status,
};
use tacplus_protocol::{
    AuthenticationService, AuthenticationType, Deserialize, FieldText, MinorVersion,
    SerializeError,
};

use crate::config::RuntimeScope;
use crate::context::{Request, RequestContext};
use crate::error::HandlerError;
use crate::handlers::Handler;
use crate::policy::UNKNOWN_USER_OR_PASSWORD;
use crate::response::Response;

const ABORTED_BY_CLIENT: &str = "session aborted per client request";

/// Entry point for authentication sessions: decodes the start packet and
/// selects the flow that matches its (action, type, service, minor version).
pub struct AuthenticateStartHandler {
    scope: Arc<RuntimeScope>,
}

impl AuthenticateStartHandler {
    /// Creates the authentication entry handler for a scope.
    pub fn new(scope: Arc<RuntimeScope>) -> Self {
        Self { scope }
    }
}

impl Handler for AuthenticateStartHandler {
    fn handle(
        &self,
        response: &mut Response<'_>,
        request: &Request<'_>,
    ) -> Result<(), HandlerError> {
        let start = Start::deserialize_from_buffer(request.body)?;

        debug!(session = request.session_id(), fields = ?start.field_entries(), "authentication start");

        let minor_version = request.header.version().minor();
        let authentication_type = start.authentication().authentication_type;
        let service = start.authentication().service;

        match (start.action(), authentication_type, service, minor_version) {
            // enable requests and plain ASCII logins share the interactive flow
            (Action::Login, _, AuthenticationService::Enable, MinorVersion::V1)
            | (Action::Login, AuthenticationType::Ascii, _, MinorVersion::Default) => {
                begin_ascii_login(self.scope.clone(), response, &start)
            }

            (Action::Login, AuthenticationType::Pap, _, MinorVersion::V1) => {
                pap_login(&self.scope, response, request.context, &start)
            }

            (
                Action::Login,
                AuthenticationType::Chap
                | AuthenticationType::MsChap
                | AuthenticationType::MsChapV2,
                _,
                MinorVersion::V1,
            ) => reply_error(response, "authentication type not implemented"),

            _ => reply_error(response, "unsupported authentication flow"),
        }
    }
}

/// One-shot PAP: the start packet must carry both the username and, in its
/// data field, the password.
fn pap_login(
    scope: &RuntimeScope,
    response: &mut Response<'_>,
    context: &RequestContext,
    start: &Start<'_>,
) -> Result<(), HandlerError> {
    let username = start.user_information().user().as_ref();
    if username.is_empty() {
        return reply_error(response, "pap login requires a username");
    }

    let Some(password) = start.data() else {
        return reply_error(response, "pap login requires a password in the data field");
    };

    authenticate_user(scope, response, context, username, password)
}

/// Starts the interactive ASCII exchange, prompting for whichever of the
/// username/password the client has not supplied yet.
fn begin_ascii_login(
    scope: Arc<RuntimeScope>,
    response: &mut Response<'_>,
    start: &Start<'_>,
) -> Result<(), HandlerError> {
    let username = start.user_information().user().as_ref();

    if username.is_empty() {
        response.schedule_next(Box::new(AsciiGetUsername { scope }));
        response.reply_authentication(
            Reply::new(
                Status::GetUser,
                FieldText::assert("username:"),
                b"",
                ReplyFlags::empty(),
            )
            .ok_or(SerializeError::LengthOverflow)?,
        )
    } else {
        response.schedule_next(Box::new(AsciiGetPassword {
            scope,
            username: username.to_string(),
        }));
        prompt_for_password(response)
    }
}

/// Continuation: awaiting the username of an ASCII login.
struct AsciiGetUsername {
    scope: Arc<RuntimeScope>,
}

impl Handler for AsciiGetUsername {
    fn handle(
        &self,
        response: &mut Response<'_>,
        request: &Request<'_>,
    ) -> Result<(), HandlerError> {
        let packet = Continue::deserialize_from_buffer(request.body)?;

        if packet.aborted() {
            return reply_fail(response, ABORTED_BY_CLIENT);
        }

        let Some(username) = packet.user_message() else {
            return reply_error(response, "no username provided");
        };

        let Ok(username) = std::str::from_utf8(username) else {
            return reply_error(response, "username must be valid text");
        };

        response.schedule_next(Box::new(AsciiGetPassword {
            scope: self.scope.clone(),
            username: username.to_string(),
        }));
        prompt_for_password(response)
    }
}

/// Continuation: awaiting the password of an ASCII login.
struct AsciiGetPassword {
    scope: Arc<RuntimeScope>,
    username: String,
}

impl Handler for AsciiGetPassword {
    fn handle(
        &self,
        response: &mut Response<'_>,
        request: &Request<'_>,
    ) -> Result<(), HandlerError> {
        let packet = Continue::deserialize_from_buffer(request.body)?;

        if packet.aborted() {
            return reply_fail(response, ABORTED_BY_CLIENT);
        }

        let Some(password) = packet.user_message() else {
            return reply_fail(response, UNKNOWN_USER_OR_PASSWORD);
        };

        authenticate_user(
            &self.scope,
            response,
            request.context,
            &self.username,
            password,
        )
    }
}

/// Looks the user up in the scope and delegates the verdict to their
/// authenticator; anything missing is a deny.
fn authenticate_user(
    scope: &RuntimeScope,
    response: &mut Response<'_>,
    context: &RequestContext,
    username: &str,
    password: &[u8],
) -> Result<(), HandlerError> {
    let Some(user) = scope.user(username) else {
        debug!(user = username, scope = %scope.name, "unknown user");
        return reply_fail(response, UNKNOWN_USER_OR_PASSWORD);
    };

    let Some(authenticator) = user.authenticator.clone() else {
        debug!(user = username, scope = %scope.name, "user has no authenticator");
        return reply_fail(response, UNKNOWN_USER_OR_PASSWORD);
    };

    authenticator.authenticate(response, context, username, password)
}

fn prompt_for_password(response: &mut Response<'_>) -> Result<(), HandlerError> {
    response.reply_authentication(
        Reply::new(
            Status::GetPassword,
            FieldText::assert("password:"),
            b"",
            ReplyFlags::NO_ECHO,
        )
        .ok_or(SerializeError::LengthOverflow)?,
    )
}

fn reply_fail(response: &mut Response<'_>, message: &str) -> Result<(), HandlerError> {
    response.reply_authentication(
        Reply::new(
            Status::Fail,
            FieldText::try_from(message).unwrap_or_default(),
            b"",
            ReplyFlags::empty(),
        )
        .ok_or(SerializeError::LengthOverflow)?,
    )
}

fn reply_error(response: &mut Response<'_>, message: &str) -> Result<(), HandlerError> {
    response.reply_authentication(
        Reply::new(
            Status::Error,
            FieldText::try_from(message).unwrap_or_default(),
            b"",
            ReplyFlags::empty(),
        )
        .ok_or(SerializeError::LengthOverflow)?,
    )
}
