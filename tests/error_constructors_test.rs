use helios::error::HeliosError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(HeliosError::config("x"), HeliosError::Config { .. }));
    assert!(matches!(HeliosError::modbus("x"), HeliosError::Modbus { .. }));
    assert!(matches!(HeliosError::mqtt("x"), HeliosError::Mqtt { .. }));
    assert!(matches!(HeliosError::command("x"), HeliosError::Command { .. }));
}

#[test]
fn error_constructors_group_2() {
    assert!(matches!(HeliosError::parse("x"), HeliosError::Parse { .. }));
    assert!(matches!(HeliosError::stale("x"), HeliosError::Stale { .. }));
    assert!(matches!(HeliosError::device("x"), HeliosError::Device { .. }));
    assert!(matches!(HeliosError::io("x"), HeliosError::Io { .. }));
    assert!(matches!(
        HeliosError::validation("f", "m"),
        HeliosError::Validation { .. }
    ));
}

#[test]
fn classification_helpers() {
    assert!(HeliosError::stale("value outdated").is_stale());
    assert!(!HeliosError::parse("bad").is_stale());
    assert!(HeliosError::timeout("deadline").is_timeout());
    assert!(!HeliosError::command("exit status 1").is_timeout());
}

#[test]
fn display_messages() {
    let e = HeliosError::validation("field", "bad");
    assert!(format!("{}", e).contains("Validation error"));

    let e: HeliosError = "x".parse::<i64>().unwrap_err().into();
    assert!(matches!(e, HeliosError::Parse { .. }));
}
