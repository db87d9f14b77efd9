use super::{Flags, Reply, Request, Status};
use crate::{
    Argument, Arguments, AuthenticationContext, AuthenticationMethod, AuthenticationService,
    AuthenticationType, Deserialize, DeserializeError, FieldText, PrivilegeLevel, Serialize,
    UserInformation,
};

#[test]
fn request_start_record_round_trip() {
    let argument_array = [
        Argument::new(FieldText::assert("task_id"), FieldText::assert("1771"), true).unwrap(),
        Argument::new(
            FieldText::assert("start_time"),
            FieldText::assert("1633189809"),
            true,
        )
        .unwrap(),
    ];
    let arguments = Arguments::new(&argument_array).expect("2 arguments should be valid");

    let request = Request::new(
        Flags::StartRecord,
        AuthenticationMethod::TacacsPlus,
        AuthenticationContext {
            privilege_level: PrivilegeLevel::new(1).unwrap(),
            authentication_type: AuthenticationType::NotSet,
            service: AuthenticationService::Login,
        },
        UserInformation::new(
            FieldText::assert("cisco"),
            FieldText::assert("console"),
            FieldText::assert("10.0.0.2"),
        )
        .unwrap(),
        arguments,
    );

    let mut buffer = [0u8; 120];
    let written = request
        .serialize_into_buffer(&mut buffer)
        .expect("buffer should be large enough");

    // fixed part: flags, method, priv-lvl, authen-type, service, 3 user lengths, argument count
    assert_eq!(buffer[..9], [0x02, 0x06, 1, 0x00, 0x01, 5, 7, 8, 2]);
    assert_eq!(buffer[9..11], [12, 21]);

    let parsed = Request::deserialize_from_buffer(&buffer[..written])
        .expect("serialized request should deserialize");
    assert_eq!(parsed, request);
    assert!(!parsed.flags().is_watchdog());
}

#[test]
fn request_watchdog_flag_combinations() {
    // watchdog alone and watchdog+start are valid; watchdog+stop is not
    let mut body = [
        0x08, 0x06, 0, 0x00, 0x01, // flags, method, priv-lvl, authen-type, service
        0, 0, 0, 0, // empty user fields, no arguments
    ];

    let watchdog =
        Request::deserialize_from_buffer(&body).expect("watchdog alone should deserialize");
    assert_eq!(watchdog.flags(), Flags::WatchdogNoUpdate);
    assert!(watchdog.flags().is_watchdog());

    body[0] = 0x08 | 0x02;
    let watchdog_update =
        Request::deserialize_from_buffer(&body).expect("watchdog+start should deserialize");
    assert_eq!(watchdog_update.flags(), Flags::WatchdogUpdate);

    body[0] = 0x08 | 0x04;
    let error = Request::deserialize_from_buffer(&body)
        .expect_err("watchdog+stop is not a valid combination");
    assert_eq!(error, DeserializeError::InvalidBodyFlags(0x0c));
}

#[test]
fn request_empty_argument_slot_allowed() {
    // one empty argument slot followed by a normal argument
    let body = [
        0x04, 0x06, 0, 0x00, 0x01, // flags (stop), method, priv-lvl, authen-type, service
        0, 0, 0, // empty user fields
        2, 0, 11, // two arguments: lengths 0 and 11
        b's', b'e', b'r', b'v', b'i', b'c', b'e', b'=', b'p', b'p', b'p',
    ];

    let request = Request::deserialize_from_buffer(&body).expect("empty slot should be tolerated");
    let mut arguments = request.arguments().iter();
    assert_eq!(arguments.next(), Some(Argument::default()));
    assert_eq!(
        arguments.next(),
        Some(Argument::new(FieldText::assert("service"), FieldText::assert("ppp"), true).unwrap())
    );
}

#[test]
fn request_length_lie_is_bad_secret_signal() {
    let body = [
        0x02, 0x06, 0, 0x00, 0x01, // flags, method, priv-lvl, authen-type, service
        3, 0, 0, 0, // user length of 3, but no string section at all
    ];

    let error = Request::deserialize_from_buffer(&body).expect_err("length sum should mismatch");
    assert!(error.indicates_bad_secret());
}

#[test]
fn reply_round_trip() {
    let reply = Reply::new(
        Status::Success,
        FieldText::assert("account record logged"),
        FieldText::assert(""),
    )
    .expect("fields are short enough");

    let mut buffer = [0u8; 40];
    let written = reply
        .serialize_into_buffer(&mut buffer)
        .expect("buffer should be large enough");

    // server message length, data length, status, then string section
    assert_eq!(buffer[..5], [0, 21, 0, 0, 0x01]);
    assert_eq!(&buffer[5..written], b"account record logged");

    let parsed =
        Reply::deserialize_from_buffer(&buffer[..written]).expect("round trip should succeed");
    assert_eq!(parsed, reply);
}

#[test]
fn reply_truncated_body_fails() {
    let error = Reply::deserialize_from_buffer(&[0, 0]).expect_err("2 bytes is too short");
    assert_eq!(error, DeserializeError::UnexpectedEnd);
}
