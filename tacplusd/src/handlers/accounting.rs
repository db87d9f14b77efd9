//! Accounting dispatch.

use std::sync::Arc;

use tracing::debug;

use tacplus_protocol::{accounting, Deserialize, FieldText, SerializeError};

use crate::config::RuntimeScope;
use crate::context::Request;
use crate::error::HandlerError;
use crate::handlers::Handler;
use crate::response::Response;

/// Decodes an accounting request, enforces the watchdog sequence guard, and
/// delegates record handling to the user's accounter.
pub struct AccountingHandler {
    scope: Arc<RuntimeScope>,
}

impl AccountingHandler {
    /// Creates the accounting handler for a scope.
    pub fn new(scope: Arc<RuntimeScope>) -> Self {
        Self { scope }
    }
}

impl Handler for AccountingHandler {
    fn handle(
        &self,
        response: &mut Response<'_>,
        request: &Request<'_>,
    ) -> Result<(), HandlerError> {
        let acct_request = accounting::Request::deserialize_from_buffer(request.body)?;

        debug!(
            session = request.session_id(),
            fields = ?acct_request.field_entries(),
            "accounting request"
        );

        // watchdog records only make sense on the packet that opens a session
        if acct_request.flags().is_watchdog() && request.header.sequence_number() > 1 {
            return reply_error(response, "watchdog record with invalid sequence number");
        }

        let username = acct_request.user_information().user().as_ref();

        let Some(user) = self.scope.user(username) else {
            debug!(user = username, scope = %self.scope.name, "unknown user");
            return reply_error(response, "unknown user");
        };

        let Some(accounter) = user.accounter.clone() else {
            debug!(user = username, scope = %self.scope.name, "user has no accounter");
            return reply_error(response, "accounting not enabled for user");
        };

        accounter.account(response, request.context, &acct_request)
    }
}

fn reply_error(response: &mut Response<'_>, message: &str) -> Result<(), HandlerError> {
    response.reply(
        accounting::Reply::new(
            accounting::Status::Error,
            FieldText::try_from(message).unwrap_or_default(),
            FieldText::assert(""),
        )
        .ok_or(SerializeError::LengthOverflow)?,
    )
}
