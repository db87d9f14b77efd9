use std::string::{String, ToString};
use std::vec::Vec;

use super::{Flags, Reply, Request, Status};
use crate::owned::FromBorrowedBody;
use crate::{ArgumentOwned, AuthenticationContext, AuthenticationMethod};

/// An accounting request packet with owned fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOwned {
    /// The kind of accounting record this packet carries.
    pub flags: Flags,

    /// The method used to authenticate to the TACACS+ client.
    pub authentication_method: AuthenticationMethod,

    /// The client authentication context.
    pub authentication: AuthenticationContext,

    /// The user connected to the client.
    pub user: String,

    /// The port the user is connected on.
    pub port: String,

    /// The remote address the user is connecting from.
    pub remote_address: String,

    /// The arguments carried by the accounting record.
    pub arguments: Vec<ArgumentOwned>,
}

impl FromBorrowedBody for RequestOwned {
    type Borrowed<'b> = Request<'b>;

    fn from_borrowed(borrowed: &Self::Borrowed<'_>) -> Self {
        let user_information = borrowed.user_information();

        RequestOwned {
            flags: borrowed.flags(),
            authentication_method: borrowed.authentication_method(),
            authentication: *borrowed.authentication(),
            user: user_information.user().to_string(),
            port: user_information.port().to_string(),
            remote_address: user_information.remote_address().to_string(),
            arguments: borrowed.arguments().to_owned_arguments(),
        }
    }
}

/// An accounting reply packet with owned fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyOwned {
    /// The status returned by the server.
    pub status: Status,

    /// The message to be displayed to the user.
    pub server_message: String,

    /// The administrative/log data returned from the server.
    pub data: String,
}

impl FromBorrowedBody for ReplyOwned {
    type Borrowed<'b> = Reply<'b>;

    fn from_borrowed(borrowed: &Self::Borrowed<'_>) -> Self {
        ReplyOwned {
            status: borrowed.status(),
            server_message: borrowed.server_message().to_string(),
            data: borrowed.data().to_string(),
        }
    }
}

impl Reply<'_> {
    /// Structured-logging view of the fields of this packet.
    pub fn field_entries(&self) -> Vec<(&'static str, String)> {
        std::vec![
            ("status", std::format!("{:?}", self.status())),
            ("server-msg", self.server_message().to_string()),
            ("data", self.data().to_string()),
        ]
    }
}

impl Request<'_> {
    /// Structured-logging view of the fields of this packet.
    pub fn field_entries(&self) -> Vec<(&'static str, String)> {
        let user_information = self.user_information();
        let mut arguments = String::new();

        for argument in self.arguments().iter() {
            if !arguments.is_empty() {
                arguments.push(' ');
            }
            arguments.push_str(&argument.to_string());
        }

        std::vec![
            ("flags", self.flags().to_string()),
            ("method", self.authentication_method().to_string()),
            ("priv-lvl", self.authentication().privilege_level.to_string()),
            ("authen-type", self.authentication().authentication_type.to_string()),
            ("service", self.authentication().service.to_string()),
            ("user", user_information.user().to_string()),
            ("port", user_information.port().to_string()),
            ("rem-addr", user_information.remote_address().to_string()),
            ("args", arguments),
        ]
    }
}
