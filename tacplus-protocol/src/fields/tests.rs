use super::*;
use crate::{DeserializeError, FieldText};

#[test]
fn user_information_serialize_both_parts() {
    let information = UserInformation::new(
        FieldText::assert("useruser"),
        FieldText::assert("tty0"),
        FieldText::assert("127.1.2.2"),
    )
    .expect("all fields are short enough");

    let mut lengths_buffer = [0u8; 3];
    information
        .serialize_field_lengths(&mut lengths_buffer)
        .expect("buffer should be large enough");
    assert_eq!(lengths_buffer, [8, 4, 9]);

    let mut values_buffer = [0u8; 30];
    let written = information
        .serialize_field_values(&mut values_buffer)
        .expect("buffer should be large enough");
    assert_eq!(&values_buffer[..written], b"userusertty0127.1.2.2");
}

#[test]
fn user_information_deserialize_values() {
    let body = b"prefixadmintty10192.168.1.1";

    let lengths = UserInformation::extract_field_lengths(&[5, 5, 11]).expect("3 length bytes");
    assert_eq!(lengths.total(), 21);

    let information = UserInformation::deserialize_field_values(body, 6, lengths)
        .expect("values should deserialize");
    assert_eq!(information.user(), &FieldText::assert("admin"));
    assert_eq!(information.port(), &FieldText::assert("tty10"));
    assert_eq!(information.remote_address(), &FieldText::assert("192.168.1.1"));
}

#[test]
fn user_information_rejects_overlong_field() {
    let long_user = "a".repeat(256);
    assert!(UserInformation::new(
        FieldText::try_from(long_user.as_str()).unwrap(),
        FieldText::assert("tty0"),
        FieldText::assert("localhost"),
    )
    .is_none());
}

#[test]
fn user_information_non_ascii_user_fails() {
    let body = [0x80, 0x81];
    let lengths = UserInformation::extract_field_lengths(&[2, 0, 0]).expect("3 length bytes");
    let error = UserInformation::deserialize_field_values(&body, 0, lengths)
        .expect_err("non-UTF8 user should fail");
    assert_eq!(error, DeserializeError::BadText);
}

#[test]
fn authentication_context_round_trip() {
    let context = AuthenticationContext {
        privilege_level: PrivilegeLevel::new(15).unwrap(),
        authentication_type: AuthenticationType::Pap,
        service: AuthenticationService::Login,
    };

    let mut buffer = [0u8; 3];
    context.serialize(&mut buffer);
    assert_eq!(buffer, [15, 2, 1]);

    let parsed = AuthenticationContext::deserialize(&buffer).expect("bytes are valid");
    assert_eq!(parsed, context);
}

#[test]
fn authentication_context_bad_privilege_level() {
    let error = AuthenticationContext::deserialize(&[16, 1, 1])
        .expect_err("privilege level 16 is out of range");
    assert_eq!(error, DeserializeError::InvalidPrivilegeLevel(16));
}

#[test]
fn authentication_context_bad_service() {
    let error =
        AuthenticationContext::deserialize(&[0, 1, 0x42]).expect_err("service 0x42 is invalid");
    assert_eq!(error, DeserializeError::InvalidService(0x42));
}
