#![no_main]
use helios::api::ChargeStatus;
use helios::wallbe::decode_status;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let status = ChargeStatus::parse(&String::from_utf8_lossy(data));
    assert_eq!(status.is_ready(), status == ChargeStatus::C);

    for pair in data.chunks_exact(2) {
        let _ = decode_status(u16::from_be_bytes([pair[0], pair[1]]));
    }
});
