use helios::ChargeMode;
use helios::config::{ChargerConfig, ChargerKind, Config, LoadPointConfig, MeterConfig, ProviderConfig};
use std::fs;

fn exec(cmd: &str) -> ProviderConfig {
    ProviderConfig::Exec {
        cmd: cmd.to_string(),
    }
}

fn config() -> Config {
    let mut cfg = Config::default();
    cfg.meters.push(MeterConfig {
        name: "grid".to_string(),
        power: exec("read-grid"),
        energy: None,
    });
    cfg.chargers.push(ChargerConfig {
        name: "wallbe".to_string(),
        kind: ChargerKind::Wallbe {
            uri: "192.168.0.8:502".to_string(),
        },
    });
    cfg.loadpoints.push(LoadPointConfig {
        name: "garage".to_string(),
        charger: "wallbe".to_string(),
        grid_meter: Some("grid".to_string()),
        pv_meter: None,
        charge_meter: None,
        mode: ChargeMode::MinPV,
        min_current: 6,
        max_current: 32,
        voltage: 230.0,
        phases: 3.0,
    });
    cfg
}

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("helios.yaml");

    let mut cfg = config();
    cfg.logging.file = Some(path.with_extension("log").to_string_lossy().to_string());

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert!(loaded.validate().is_ok());
    assert_eq!(loaded.logging.file, cfg.logging.file);
    assert_eq!(loaded.loadpoints[0].mode, ChargeMode::MinPV);
    assert_eq!(loaded.loadpoints[0].max_current, 32);
    assert!(matches!(
        &loaded.chargers[0].kind,
        ChargerKind::Wallbe { uri } if uri == "192.168.0.8:502"
    ));
}

#[test]
fn config_validation_errors() {
    let mut cfg = config();
    cfg.update_interval_ms = 0;
    assert!(cfg.validate().is_err());

    cfg = config();
    cfg.call_timeout_ms = 0;
    assert!(cfg.validate().is_err());

    cfg = config();
    cfg.loadpoints[0].min_current = 0;
    assert!(cfg.validate().is_err());

    cfg = config();
    cfg.loadpoints[0].voltage = 0.0;
    assert!(cfg.validate().is_err());

    cfg = config();
    cfg.meters.push(cfg.meters[0].clone());
    assert!(cfg.validate().is_err());

    cfg = config();
    cfg.chargers[0].kind = ChargerKind::Wallbe { uri: " ".to_string() };
    assert!(cfg.validate().is_err());

    cfg = config();
    cfg.meters[0].energy = Some(ProviderConfig::Mqtt {
        topic: "grid/energy".to_string(),
        timeout_ms: Some(30_000),
    });
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"meters: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    assert!(format!("{}", err).contains("Serialization error"));
}

#[test]
fn missing_file_is_io_error() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(tmp_dir.path().join("absent.yaml")).unwrap_err();
    assert!(format!("{}", err).contains("I/O error"));
}
