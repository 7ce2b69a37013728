//! JSON fixture loading: engine configuration and property stores, text and
//! binary forms side by side.

#![allow(clippy::expect_used)]

use panel_engine::{BrightnessMode, EngineConfig, EngineError, Panel};
use panel_platform::mocks::MockBus;
use panel_platform::{DataType, PropertyMap, TransmissionSpeed};

const PROPS: &str = r#"{
    "panel,candela_map_table_revA": { "bytes": [0,0,0,0, 0,0,0,0, 0,0,0,255, 0,0,1,164] },
    "panel,gamma_tx_cmds_revA":     { "bytes": [41,1,0,0,5,0,2, 202,1] },
    "panel,gamma_tx_cmds_revA_state": { "text": "dsi_hs_mode" },
    "panel,hbm_off_tx_cmds_revA":   { "text": "W 53 20" },
    "panel,hbm_off_tx_cmds_revA_lp": { "flag": true }
}"#;

const CONFIG: &str = r#"{ "revision_count": 2, "max_packets": 8, "boost_threshold": 3 }"#;

fn load() -> (Panel<MockBus>, MockBus) {
    let props: PropertyMap = serde_json::from_str(PROPS).expect("props json");
    let config = EngineConfig::from_json(CONFIG).expect("config json");
    let panel = Panel::load(props, config).expect("panel loads");
    let bus = MockBus::new();
    panel.attach_transport(bus.clone());
    (panel, bus)
}

#[test]
fn binary_table_and_command_set_load_from_json() {
    let (panel, bus) = load();
    assert_eq!(panel.config().revision_count, 2);
    assert_eq!(panel.config().key_prefix, "panel,");

    panel
        .compose_and_send_brightness(200, BrightnessMode::Normal)
        .expect("composes");
    assert_eq!(panel.state().candela, 420);

    let sent = bus.transmissions();
    let gamma = sent.first().expect("one transmission");
    assert_eq!(gamma.speed, TransmissionSpeed::HighSpeed);
    let d = gamma.descriptors.first().expect("gamma command");
    assert_eq!(d.data_type, DataType::GenericLongWrite);
    assert_eq!(d.payload, [0xCA, 0x01]);
    assert_eq!(d.wait_ms, 5);
}

#[test]
fn parse_table_reads_binary_rows() {
    let (panel, _bus) = load();
    let table = panel
        .parse_table("panel,candela_map_table_revA")
        .expect("binary table");
    assert_eq!(table.row(0), Some(&[0, 0, 255, 420][..]));
}

#[test]
fn text_flag_selects_low_power() {
    let (panel, _bus) = load();
    let fragment = panel
        .select_fragment(panel_engine::FragmentId::HbmOff)
        .expect("configured");
    assert_eq!(fragment.speed, TransmissionSpeed::LowPower);
}

#[test]
fn config_json_rejects_bad_values() {
    assert!(matches!(
        EngineConfig::from_json(r#"{ "revision_count": 0 }"#),
        Err(EngineError::Config(_))
    ));
    assert!(matches!(
        EngineConfig::from_json(r#"{ "max_packets": "many" }"#),
        Err(EngineError::Config(_))
    ));
}

#[test]
fn misaligned_binary_table_fails_load() {
    let mut props: PropertyMap = serde_json::from_str(PROPS).expect("props json");
    props.set_bytes("panel,candela_map_table_revA", [0u8, 0, 0, 1, 0, 0]);
    let err = Panel::<MockBus>::load(props, EngineConfig::default()).expect_err("misaligned");
    assert!(matches!(
        err,
        EngineError::Table(panel_engine::TableError::Misaligned { row_bytes: 16, .. })
    ));
}
