//! Policy extension points and the config-backed implementations.
//!
//! The dispatcher consumes these traits; deployments can provide their own
//! credential stores or authorization engines by implementing them.

use tracing::info;

use tacplus_protocol::authentication::{Reply as AuthenReply, ReplyFlags, Status as AuthenStatus};
use tacplus_protocol::{accounting, authorization, Arguments, FieldText, SerializeError};

use crate::context::RequestContext;
use crate::error::HandlerError;
use crate::response::Response;

/// Verifies a username/password pair and writes the authentication verdict.
pub trait Authenticator: Send + Sync {
    /// Replies `Pass`, `Fail` or `Error` on the given response.
    fn authenticate(
        &self,
        response: &mut Response<'_>,
        context: &RequestContext,
        username: &str,
        password: &[u8],
    ) -> Result<(), HandlerError>;
}

/// Decides an authorization request and writes the verdict.
pub trait Authorizer: Send + Sync {
    /// Replies `PassAdd`, `PassReplace`, `Fail` or `Error` on the given response.
    fn authorize(
        &self,
        response: &mut Response<'_>,
        context: &RequestContext,
        request: &authorization::Request<'_>,
    ) -> Result<(), HandlerError>;
}

/// Consumes an accounting record and writes the verdict.
///
/// Record persistence is this trait's concern; the dispatcher only enforces
/// the protocol-level sequence rules before delegating.
pub trait Accounter: Send + Sync {
    /// Replies `Success` or `Error` on the given response.
    fn account(
        &self,
        response: &mut Response<'_>,
        context: &RequestContext,
        request: &accounting::Request<'_>,
    ) -> Result<(), HandlerError>;
}

/// Message sent on any credential mismatch; deliberately identical for an
/// unknown user and a wrong password so the reply does not leak which it was.
pub(crate) const UNKNOWN_USER_OR_PASSWORD: &str = "unknown username or password";

/// Compares a password against a cleartext value held in the configuration.
pub struct CleartextAuthenticator {
    password: String,
}

impl CleartextAuthenticator {
    /// Creates an authenticator accepting exactly the given password.
    pub fn new(password: String) -> Self {
        Self { password }
    }

    /// Constant-time equality over the byte representations.
    fn password_matches(&self, candidate: &[u8]) -> bool {
        let expected = self.password.as_bytes();

        if expected.len() != candidate.len() {
            return false;
        }

        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Authenticator for CleartextAuthenticator {
    fn authenticate(
        &self,
        response: &mut Response<'_>,
        context: &RequestContext,
        username: &str,
        password: &[u8],
    ) -> Result<(), HandlerError> {
        if self.password_matches(password) {
            info!(
                user = username,
                client = %context.effective_remote_address,
                "authentication passed"
            );
            response.reply_authentication(
                AuthenReply::new(
                    AuthenStatus::Pass,
                    FieldText::assert("login success"),
                    b"",
                    ReplyFlags::empty(),
                )
                .ok_or(SerializeError::LengthOverflow)?,
            )
        } else {
            info!(
                user = username,
                client = %context.effective_remote_address,
                "authentication failed"
            );
            response.reply_authentication(
                AuthenReply::new(
                    AuthenStatus::Fail,
                    FieldText::assert(UNKNOWN_USER_OR_PASSWORD),
                    b"",
                    ReplyFlags::empty(),
                )
                .ok_or(SerializeError::LengthOverflow)?,
            )
        }
    }
}

/// Authorizes by matching the `name=value` encodings of request arguments
/// against configured prefixes. Deny rules win; when the permit list is
/// non-empty, every mandatory argument must match one of its prefixes.
pub struct PrefixAuthorizer {
    deny: Vec<String>,
    permit: Vec<String>,
    default_permit: bool,
}

impl PrefixAuthorizer {
    /// Creates an authorizer from rule lists.
    pub fn new(deny: Vec<String>, permit: Vec<String>, default_permit: bool) -> Self {
        Self {
            deny,
            permit,
            default_permit,
        }
    }

    fn verdict(&self, request: &authorization::Request<'_>) -> bool {
        let mut all_permitted = true;

        for argument in request.arguments().iter() {
            let encoded = argument.to_string();

            if self.deny.iter().any(|rule| encoded.starts_with(rule.as_str())) {
                return false;
            }

            // optional arguments are advisory and don't have to be covered
            if argument.mandatory()
                && !self.permit.iter().any(|rule| encoded.starts_with(rule.as_str()))
            {
                all_permitted = false;
            }
        }

        if self.permit.is_empty() {
            self.default_permit
        } else {
            all_permitted
        }
    }
}

impl Authorizer for PrefixAuthorizer {
    fn authorize(
        &self,
        response: &mut Response<'_>,
        context: &RequestContext,
        request: &authorization::Request<'_>,
    ) -> Result<(), HandlerError> {
        let permitted = self.verdict(request);
        let user = request.user_information().user().as_ref();

        info!(
            user,
            client = %context.effective_remote_address,
            permitted,
            "authorization decided"
        );

        let status = if permitted {
            authorization::Status::PassAdd
        } else {
            authorization::Status::Fail
        };

        response.reply(
            authorization::Reply::new(status, FieldText::assert(""), b"", Arguments::default())
                .ok_or(SerializeError::LengthOverflow)?,
        )
    }
}

/// Writes accounting records to the structured log and acknowledges them.
#[derive(Default)]
pub struct LogAccounter;

impl Accounter for LogAccounter {
    fn account(
        &self,
        response: &mut Response<'_>,
        context: &RequestContext,
        request: &accounting::Request<'_>,
    ) -> Result<(), HandlerError> {
        let mut fields = String::new();
        for (key, value) in request.field_entries() {
            if !fields.is_empty() {
                fields.push(' ');
            }
            fields.push_str(key);
            fields.push('=');
            fields.push_str(&value);
        }

        info!(
            target: "tacplusd::accounting",
            client = %context.effective_remote_address,
            record = %fields,
            "accounting record"
        );

        response.reply(
            accounting::Reply::new(
                accounting::Status::Success,
                FieldText::assert(""),
                FieldText::assert(""),
            )
            .ok_or(SerializeError::LengthOverflow)?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tacplus_protocol::{
        Argument, AuthenticationContext, AuthenticationMethod, AuthenticationService,
        AuthenticationType, PrivilegeLevel, UserInformation,
    };

    fn request_with_arguments<'a>(arguments: Arguments<'a>) -> authorization::Request<'a> {
        authorization::Request::new(
            AuthenticationMethod::TacacsPlus,
            AuthenticationContext {
                privilege_level: PrivilegeLevel::new(15).unwrap(),
                authentication_type: AuthenticationType::Ascii,
                service: AuthenticationService::Login,
            },
            UserInformation::new(
                FieldText::assert("cisco"),
                FieldText::assert("tty0"),
                FieldText::assert("127.0.0.1"),
            )
            .unwrap(),
            arguments,
        )
    }

    #[test]
    fn deny_rule_wins_over_permit() {
        let authorizer = PrefixAuthorizer::new(
            vec!["cmd=reload".to_string()],
            vec!["service=shell".to_string(), "cmd=".to_string()],
            false,
        );

        let permitted = [
            Argument::new(FieldText::assert("service"), FieldText::assert("shell"), true).unwrap(),
            Argument::new(FieldText::assert("cmd"), FieldText::assert("show"), true).unwrap(),
        ];
        assert!(authorizer.verdict(&request_with_arguments(Arguments::new(&permitted).unwrap())));

        let denied = [
            Argument::new(FieldText::assert("service"), FieldText::assert("shell"), true).unwrap(),
            Argument::new(FieldText::assert("cmd"), FieldText::assert("reload"), true).unwrap(),
        ];
        assert!(!authorizer.verdict(&request_with_arguments(Arguments::new(&denied).unwrap())));
    }

    #[test]
    fn empty_permit_list_falls_back_to_default() {
        let deny_all_default = PrefixAuthorizer::new(vec![], vec![], false);
        let permit_all_default = PrefixAuthorizer::new(vec![], vec![], true);

        let arguments = [Argument::new(
            FieldText::assert("service"),
            FieldText::assert("shell"),
            true,
        )
        .unwrap()];

        assert!(!deny_all_default
            .verdict(&request_with_arguments(Arguments::new(&arguments).unwrap())));
        assert!(permit_all_default
            .verdict(&request_with_arguments(Arguments::new(&arguments).unwrap())));
    }

    #[test]
    fn optional_arguments_do_not_need_permit_coverage() {
        let authorizer =
            PrefixAuthorizer::new(vec![], vec!["service=shell".to_string()], false);

        let arguments = [
            Argument::new(FieldText::assert("service"), FieldText::assert("shell"), true).unwrap(),
            Argument::new(FieldText::assert("timeout"), FieldText::assert("5"), false).unwrap(),
        ];

        assert!(authorizer.verdict(&request_with_arguments(Arguments::new(&arguments).unwrap())));
    }

    #[test]
    fn cleartext_password_comparison() {
        let authenticator = CleartextAuthenticator::new("hunter2".to_string());
        assert!(authenticator.password_matches(b"hunter2"));
        assert!(!authenticator.password_matches(b"hunter3"));
        assert!(!authenticator.password_matches(b"hunter"));
        assert!(!authenticator.password_matches(b""));
    }
}
