use super::{Reply, Request, Status};
use crate::{
    Argument, Arguments, AuthenticationContext, AuthenticationMethod, AuthenticationService,
    AuthenticationType, Deserialize, DeserializeError, FieldText, InvalidArgument, PrivilegeLevel,
    Serialize, UserInformation,
};

fn shell_command_arguments() -> [Argument<'static>; 4] {
    [
        Argument::new(FieldText::assert("service"), FieldText::assert("shell"), true).unwrap(),
        Argument::new(FieldText::assert("cmd"), FieldText::assert("configure"), true).unwrap(),
        Argument::new(
            FieldText::assert("cmd-arg"),
            FieldText::assert("terminal"),
            true,
        )
        .unwrap(),
        Argument::new(FieldText::assert("cmd-arg"), FieldText::assert("<cr>"), true).unwrap(),
    ]
}

#[test]
fn request_serialize_known_bytes() {
    let argument_array = shell_command_arguments();
    let arguments = Arguments::new(&argument_array).expect("4 arguments should be valid");

    let request = Request::new(
        AuthenticationMethod::TacacsPlus,
        AuthenticationContext {
            privilege_level: PrivilegeLevel::new(15).unwrap(),
            authentication_type: AuthenticationType::Ascii,
            service: AuthenticationService::Login,
        },
        UserInformation::new(
            FieldText::assert("mr_uses_group"),
            FieldText::assert("tty0"),
            FieldText::assert("127.0.0.1"),
        )
        .unwrap(),
        arguments,
    );

    let mut buffer = [0u8; 150];
    let written = request
        .serialize_into_buffer(&mut buffer)
        .expect("buffer should be large enough");

    // fixed part: method, priv-lvl, authen-type, service, 3 user lengths, argument count
    assert_eq!(buffer[..8], [0x06, 15, 0x01, 0x01, 13, 4, 9, 4]);

    // argument lengths
    assert_eq!(buffer[8..12], [13, 13, 16, 12]);

    // string section: user values then argument values
    assert_eq!(
        &buffer[12..written],
        b"mr_uses_grouptty0127.0.0.1service=shellcmd=configurecmd-arg=terminalcmd-arg=<cr>"
    );
}

#[test]
fn request_round_trip() {
    let argument_array = shell_command_arguments();
    let arguments = Arguments::new(&argument_array).expect("4 arguments should be valid");

    let request = Request::new(
        AuthenticationMethod::TacacsPlus,
        AuthenticationContext {
            privilege_level: PrivilegeLevel::new(15).unwrap(),
            authentication_type: AuthenticationType::Ascii,
            service: AuthenticationService::Login,
        },
        UserInformation::new(
            FieldText::assert("mr_uses_group"),
            FieldText::assert("tty0"),
            FieldText::assert("127.0.0.1"),
        )
        .unwrap(),
        arguments,
    );

    let mut buffer = [0u8; 150];
    let written = request
        .serialize_into_buffer(&mut buffer)
        .expect("buffer should be large enough");

    let parsed = Request::deserialize_from_buffer(&buffer[..written])
        .expect("serialized request should deserialize");
    assert_eq!(parsed, request);
}

#[test]
fn request_deserialize_rejects_length_lie() {
    let argument_array = shell_command_arguments();
    let arguments = Arguments::new(&argument_array).unwrap();

    let request = Request::new(
        AuthenticationMethod::TacacsPlus,
        AuthenticationContext {
            privilege_level: PrivilegeLevel::new(1).unwrap(),
            authentication_type: AuthenticationType::NotSet,
            service: AuthenticationService::Login,
        },
        UserInformation::new(
            FieldText::assert("user"),
            FieldText::assert("tty0"),
            FieldText::assert("127.0.0.1"),
        )
        .unwrap(),
        arguments,
    );

    let mut buffer = [0u8; 150];
    let written = request.serialize_into_buffer(&mut buffer).unwrap();

    // inflate the user length field so the sub-field sum no longer matches
    buffer[4] += 1;

    let error = Request::deserialize_from_buffer(&buffer[..written])
        .expect_err("length mismatch should be detected");
    assert!(matches!(
        error,
        DeserializeError::WrongBodyBufferSize { .. }
    ));
    assert!(error.indicates_bad_secret());
}

#[test]
fn request_deserialize_rejects_short_argument() {
    // fixed fields declare one argument of length 1, which can't hold a name + delimiter
    let body = [
        0x06, 0, 0, 0x01, // method, priv-lvl, authen-type (not set), service
        0, 0, 0, // empty user fields
        1, 1,    // one argument of length 1
        b'=',
    ];

    let error = Request::deserialize_from_buffer(&body).expect_err("1-byte argument is invalid");
    assert_eq!(
        error,
        DeserializeError::InvalidArgument(InvalidArgument::TooShort)
    );
}

#[test]
fn reply_round_trip_with_arguments() {
    let argument_array = [Argument::new(
        FieldText::assert("priv-lvl"),
        FieldText::assert("15"),
        false,
    )
    .unwrap()];
    let arguments = Arguments::new(&argument_array).unwrap();

    let reply = Reply::new(
        Status::PassAdd,
        FieldText::assert("authorized"),
        b"audit-trail",
        arguments,
    )
    .expect("fields are short enough");

    let mut buffer = [0u8; 60];
    let written = reply
        .serialize_into_buffer(&mut buffer)
        .expect("buffer should be large enough");

    // fixed part: status, argument count, server message length, data length, argument length
    assert_eq!(buffer[..7], [0x01, 1, 0, 10, 0, 11, 11]);

    // server message, then data, then argument values
    assert_eq!(&buffer[7..written], b"authorizedaudit-trailpriv-lvl*15");

    let parsed =
        Reply::deserialize_from_buffer(&buffer[..written]).expect("round trip should succeed");
    assert_eq!(parsed, reply);
}

#[test]
fn reply_empty_message_and_data_round_trip() {
    let reply = Reply::new(Status::Fail, FieldText::assert(""), b"", Arguments::default())
        .expect("empty fields are fine");

    let mut buffer = [0u8; 6];
    let written = reply
        .serialize_into_buffer(&mut buffer)
        .expect("reply with no variable fields is 6 bytes");
    assert_eq!(written, 6);
    assert_eq!(buffer, [0x10, 0, 0, 0, 0, 0]);

    let parsed = Reply::deserialize_from_buffer(&buffer).expect("round trip should succeed");
    assert_eq!(parsed.status(), Status::Fail);
    assert_eq!(parsed.arguments().argument_count(), 0);
}
