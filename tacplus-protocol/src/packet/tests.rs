use super::*;

use byteorder::{ByteOrder, NetworkEndian};

use crate::accounting;
use crate::authentication::{self, Action};
use crate::{
    AuthenticationContext, AuthenticationService, AuthenticationType, DeserializeError, FieldText,
    HeaderInfo, MajorVersion, MinorVersion, PrivilegeLevel, UserInformation, Version,
};

#[test]
fn obfuscated_packet_wrong_unencrypted_flag() {
    // body doesn't matter (error should be returned before getting there) so we can omit it
    let mut raw_packet = [
        0xc << 4, // version (minor v0)
        3,        // accounting packet
        2,        // sequence number
        1,        // unencrypted flag - shouldn't be set!
        // session id
        0,
        0,
        0,
        0,
        // body length (doesn't matter)
        0,
        0,
        0,
        0,
    ];

    let deserialize_error = Packet::<accounting::Reply>::deserialize(b"supersecret", &mut raw_packet)
        .expect_err("packet deserialization should have failed");
    assert_eq!(
        deserialize_error,
        DeserializeError::IncorrectUnencryptedFlag
    );
}

#[test]
fn unobfuscated_packet_wrong_unencrypted_flag() {
    let raw_packet = [
        0xc << 4, // version (minor v0)
        3,        // accounting packet
        4,        // sequence number
        0,        // unencrypted flag - should be set!
        // session id
        1,
        1,
        1,
        1,
        // body length (doesn't matter)
        0,
        0,
        0,
        0,
    ];

    let deserialize_error = Packet::<accounting::Reply>::deserialize_unobfuscated(&raw_packet)
        .expect_err("packet deserialization should have failed");
    assert_eq!(
        deserialize_error,
        DeserializeError::IncorrectUnencryptedFlag
    );
}

#[test]
fn obfuscate_correct_pad_generated() {
    let header = HeaderInfo::new(
        Version::new(MajorVersion::RFC8907, MinorVersion::V1),
        7,
        PacketFlags::empty(),
        487514234,
    );

    // make buffer slightly over 1 MD5 output length, to also test truncation & MD5 iteration
    let mut buffer = [0u8; 20];
    xor_body_with_pad(&header, b"no one will guess this", &mut buffer);

    assert_eq!(
        buffer,
        [
            // known correct pad based on information in header
            0x0d, 0x2e, 0xd1, 0x6f, 0xd6, 0x37, 0xab, 0x81, 0xc1, 0x3a, 0xc8, 0xf9, 0x19, 0xb4,
            0x65, 0x48, 0x06, 0xf6, 0x5b, 0x41
        ]
    );
}

#[test]
fn obfuscation_is_an_involution() {
    let header = HeaderInfo::new(
        Version::default(),
        1,
        PacketFlags::empty(),
        0xdeadbeef,
    );

    let original: [u8; 47] = core::array::from_fn(|i| (i as u8).wrapping_mul(3));
    let mut buffer = original;

    xor_body_with_pad(&header, b"fooman", &mut buffer);
    assert_ne!(buffer, original);

    xor_body_with_pad(&header, b"fooman", &mut buffer);
    assert_eq!(buffer, original);
}

fn example_start_packet() -> Packet<authentication::Start<'static>> {
    Packet::new(
        HeaderInfo::new(
            Version::default(),
            1,
            PacketFlags::empty(),
            12345,
        ),
        authentication::Start::new(
            Action::Login,
            AuthenticationContext {
                privilege_level: PrivilegeLevel::new(1).unwrap(),
                authentication_type: AuthenticationType::Ascii,
                service: AuthenticationService::Login,
            },
            UserInformation::new(
                FieldText::assert("admin"),
                FieldText::assert("command-api"),
                FieldText::assert("2001:4860:4860::8888"),
            )
            .unwrap(),
            None,
        )
        .expect("start body should be valid"),
    )
}

#[test]
fn full_packet_obfuscated_round_trip() {
    let packet = example_start_packet();
    let wire_size = packet.wire_size();

    let mut buffer = [0u8; 100];
    let written = packet
        .serialize(b"fooman", &mut buffer)
        .expect("serialization should succeed");
    assert_eq!(written, wire_size);

    // body length in header: 8 fixed bytes + the three string fields
    assert_eq!(buffer[8..12], [0, 0, 0, 44]);

    let parsed = Packet::<authentication::Start>::deserialize(b"fooman", &mut buffer[..written])
        .expect("deserialization with the right key should succeed");
    assert_eq!(parsed, example_start_packet());
}

#[test]
fn wrong_key_trips_length_redundancy_check() {
    let packet = example_start_packet();

    let mut buffer = [0u8; 100];
    let written = packet
        .serialize(b"fooman", &mut buffer)
        .expect("serialization should succeed");

    let error = Packet::<authentication::Start>::deserialize(b"not-fooman", &mut buffer[..written])
        .expect_err("decoding with the wrong key should fail");
    assert!(error.indicates_bad_secret());
}

#[test]
fn oversized_body_length_rejected_before_slicing() {
    let mut raw_packet = [0u8; 24];
    raw_packet[0] = 0xc << 4; // version
    raw_packet[1] = 1; // authentication
    raw_packet[2] = 2; // sequence number

    // body length of 65537, over the maximum
    NetworkEndian::write_u32(&mut raw_packet[8..12], 65537);

    let error = Packet::<authentication::Reply>::deserialize(b"key", &mut raw_packet)
        .expect_err("oversized body length should be rejected");
    assert_eq!(error, DeserializeError::BodyLengthExceedsMaximum(65537));
}

#[test]
fn short_header_is_an_error_not_a_panic() {
    let mut raw_packet = [0u8; 5];
    let error = Packet::<authentication::Start>::deserialize(b"key", &mut raw_packet)
        .expect_err("5 bytes can't hold a header");
    assert_eq!(error, DeserializeError::UnexpectedEnd);
}

#[test]
fn header_round_trip_and_raw_field_reads() {
    let header = HeaderInfo::new(
        Version::new(MajorVersion::RFC8907, MinorVersion::V1),
        3,
        PacketFlags::SINGLE_CONNECTION,
        0xcafe1234,
    );

    let mut buffer = [0u8; 12];
    header
        .serialize(&mut buffer, PacketType::Accounting, 517)
        .expect("12 bytes is exactly a header");
    assert_eq!(
        buffer,
        [0xc1, 0x03, 3, 0x04, 0xca, 0xfe, 0x12, 0x34, 0, 0, 0x02, 0x05]
    );

    // the raw-field helpers are what a framed reader uses before parsing
    assert_eq!(
        HeaderInfo::declared_packet_type(&buffer),
        Ok(PacketType::Accounting)
    );
    assert_eq!(HeaderInfo::declared_body_length(&buffer), Ok(517));

    let parsed = HeaderInfo::try_from(&buffer[..]).expect("serialized header should parse");
    assert_eq!(parsed, header);
}

#[test]
fn raw_field_reads_reject_short_buffers() {
    assert_eq!(
        HeaderInfo::declared_packet_type(&[0xc0, 0x01]),
        Err(DeserializeError::UnexpectedEnd)
    );
    assert_eq!(
        HeaderInfo::declared_body_length(&[0xc0, 0x01]),
        Err(DeserializeError::UnexpectedEnd)
    );
}

/// A known capture: the ASCII login start for user "admin" on port
/// "command-api" from 2001:4860:4860::8888, session 12345, obfuscated with
/// the key "fooman". Asserting the captured ciphertext prefix pins the MD5
/// pad-chaining formula to an external oracle instead of this crate's own
/// output.
#[test]
fn obfuscation_matches_known_capture() {
    const CAPTURED_PREFIX: [u8; 16] = [
        0xc1, 0x01, 0x01, 0x00, 0x00, 0x00, 0x30, 0x39, 0x00, 0x00, 0x00, 0x2c, 0x9c, 0xed,
        0x73, 0xaa,
    ];

    let start = authentication::Start::new(
        Action::Login,
        AuthenticationContext {
            privilege_level: PrivilegeLevel::new(1).unwrap(),
            authentication_type: AuthenticationType::Ascii,
            service: AuthenticationService::Login,
        },
        UserInformation::new(
            FieldText::assert("admin"),
            FieldText::assert("command-api"),
            FieldText::assert("2001:4860:4860::8888"),
        )
        .unwrap(),
        None,
    )
    .expect("start body should be valid");

    // the capture carries minor version 1 in its header
    let header = HeaderInfo::new(
        Version::new(MajorVersion::RFC8907, MinorVersion::V1),
        1,
        PacketFlags::empty(),
        12345,
    );

    let mut frame = [0u8; 56];
    let body_length = start
        .serialize_into_buffer(&mut frame[12..])
        .expect("body should serialize");
    assert_eq!(body_length, 44);

    header
        .serialize(&mut frame[..12], PacketType::Authentication, 44)
        .expect("header should serialize");
    xor_body_with_pad(&header, b"fooman", &mut frame[12..]);

    assert_eq!(frame[..16], CAPTURED_PREFIX);

    // the capture's own key recovers the original fields
    let mut decode_copy = frame;
    let packet = Packet::<authentication::Start>::deserialize(b"fooman", &mut decode_copy)
        .expect("the capture decodes with its own key");
    assert_eq!(
        packet.body().user_information().user(),
        &FieldText::assert("admin")
    );

    // any other key scrambles the length fields and trips the redundancy check
    let error = Packet::<authentication::Start>::deserialize(b"guessed-wrong", &mut frame)
        .expect_err("a different key cannot decode the capture");
    assert!(error.indicates_bad_secret());
}

#[test]
fn packet_flags_display_names() {
    assert_eq!(std::format!("{}", PacketFlags::empty()), "no flags set");
    assert_eq!(
        std::format!(
            "{}",
            PacketFlags::UNENCRYPTED | PacketFlags::SINGLE_CONNECTION
        ),
        "UNENCRYPTED SINGLE_CONNECTION"
    );
}
