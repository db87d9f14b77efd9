use std::borrow::ToOwned;
use std::string::{String, ToString};
use std::vec::Vec;

use super::{Action, Continue, ContinueFlags, Reply, ReplyFlags, Start, Status};
use crate::owned::FromBorrowedBody;
use crate::AuthenticationContext;

/// An authentication start packet with owned fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOwned {
    /// The action of the authentication session.
    pub action: Action,

    /// The authentication context (privilege level, type, service).
    pub authentication: AuthenticationContext,

    /// The user connected to the client.
    pub user: String,

    /// The port the user is connected on.
    pub port: String,

    /// The remote address the user is connecting from.
    pub remote_address: String,

    /// The authentication data, e.g. a PAP password.
    pub data: Vec<u8>,
}

impl FromBorrowedBody for StartOwned {
    type Borrowed<'b> = Start<'b>;

    fn from_borrowed(borrowed: &Self::Borrowed<'_>) -> Self {
        let user_information = borrowed.user_information();

        StartOwned {
            action: borrowed.action(),
            authentication: *borrowed.authentication(),
            user: user_information.user().to_string(),
            port: user_information.port().to_string(),
            remote_address: user_information.remote_address().to_string(),
            data: borrowed.data().map(<[u8]>::to_owned).unwrap_or_default(),
        }
    }
}

/// An authentication continue packet with owned fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinueOwned {
    /// The user message, e.g. the username or password a user entered.
    pub user_message: Vec<u8>,

    /// The domain-specific data of the continue packet.
    pub data: Vec<u8>,

    /// The flags of the continue packet.
    pub flags: ContinueFlags,
}

impl FromBorrowedBody for ContinueOwned {
    type Borrowed<'b> = Continue<'b>;

    fn from_borrowed(borrowed: &Self::Borrowed<'_>) -> Self {
        ContinueOwned {
            user_message: borrowed
                .user_message()
                .map(<[u8]>::to_owned)
                .unwrap_or_default(),
            data: borrowed.data().map(<[u8]>::to_owned).unwrap_or_default(),
            flags: borrowed.flags(),
        }
    }
}

/// An authentication reply packet with owned fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyOwned {
    /// The status, as returned by the server.
    pub status: Status,

    /// The flags set in the server response.
    pub flags: ReplyFlags,

    /// The message to be displayed to the user.
    pub server_message: String,

    /// The domain-specific data included in the reply.
    pub data: Vec<u8>,
}

impl FromBorrowedBody for ReplyOwned {
    type Borrowed<'b> = Reply<'b>;

    fn from_borrowed(borrowed: &Self::Borrowed<'_>) -> Self {
        ReplyOwned {
            status: borrowed.status(),
            flags: borrowed.flags(),
            server_message: borrowed.server_message().to_string(),
            data: borrowed.data().to_owned(),
        }
    }
}

impl Start<'_> {
    /// Structured-logging view of the non-sensitive fields of this packet.
    ///
    /// The data field may hold a password, so only its length is reported.
    pub fn field_entries(&self) -> Vec<(&'static str, String)> {
        let user_information = self.user_information();

        std::vec![
            ("action", self.action().to_string()),
            ("priv-lvl", self.authentication().privilege_level.to_string()),
            ("authen-type", self.authentication().authentication_type.to_string()),
            ("service", self.authentication().service.to_string()),
            ("user", user_information.user().to_string()),
            ("port", user_information.port().to_string()),
            ("rem-addr", user_information.remote_address().to_string()),
            ("data-len", self.data().map_or(0, <[u8]>::len).to_string()),
        ]
    }
}

impl Continue<'_> {
    /// Structured-logging view of the non-sensitive fields of this packet.
    ///
    /// The user message may hold a password, so only its length is reported.
    pub fn field_entries(&self) -> Vec<(&'static str, String)> {
        std::vec![
            ("flags", self.flags().to_string()),
            (
                "user-msg-len",
                self.user_message().map_or(0, <[u8]>::len).to_string()
            ),
            ("data-len", self.data().map_or(0, <[u8]>::len).to_string()),
        ]
    }
}

impl Reply<'_> {
    /// Structured-logging view of the fields of this packet.
    pub fn field_entries(&self) -> Vec<(&'static str, String)> {
        std::vec![
            ("status", std::format!("{:?}", self.status())),
            ("flags", self.flags().to_string()),
            ("server-msg", self.server_message().to_string()),
            ("data-len", self.data().len().to_string()),
        ]
    }
}
