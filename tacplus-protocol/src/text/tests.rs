use super::FieldText;

#[test]
fn rejects_control_characters() {
    assert!(FieldText::try_from("port\r\n").is_err());
    assert!(FieldText::try_from(b"\x07bell".as_slice()).is_err());
}

#[test]
fn accepts_full_printable_range() {
    let text = FieldText::try_from(" !\"#$%&'()*+,-./0123456789:;<=>?@~")
        .expect("printable ASCII should convert");
    assert_eq!(text.len(), 34);
}

#[cfg(feature = "std")]
#[test]
fn owned_and_borrowed_compare_equal() {
    use std::string::ToString;

    let borrowed = FieldText::assert("same text");
    let owned = FieldText::try_from_string("same text".to_string())
        .expect("printable ASCII string should convert");

    assert_eq!(borrowed, owned);
    assert_eq!(borrowed.clone().into_owned(), owned);
}
