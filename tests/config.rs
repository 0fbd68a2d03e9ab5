use std::fs;

use pretty_assertions::assert_eq;
use tempfile::tempdir;
use vlan_tools::ToolError;
use vlan_tools::config::{load_store_settings, load_vlan_list};
use vlan_tools::model::ValidationPolicy;
use vlan_tools::store::AuthScheme;

#[test]
fn vlan_list_applies_defaults_and_aliases() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("list_vlans.json");
    let source = serde_json::json!([
        {
            "vlan_id": 601,
            "ip_network": "10.61.0.0/24",
            "sheet_name": "OFFICE",
            "dhcpd_out_file": "vlan601.conf",
            "comment": "offices"
        },
        {
            "vlan_id": 602,
            "cidr_network": "10.62.0.0/24",
            "display_name": "LAB",
            "output_label": "vlan602.conf",
            "radius_policy": "lenient_skip"
        }
    ]);
    fs::write(&path, source.to_string()).expect("list written");

    let descriptors = load_vlan_list(&path).expect("list loaded");

    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[0].comment.as_deref(), Some("offices"));
    assert_eq!(descriptors[0].dhcp_policy, ValidationPolicy::Strict);
    assert_eq!(descriptors[1].sheet_name, "LAB");
    assert_eq!(descriptors[1].dhcpd_out_file, "vlan602.conf");
    assert_eq!(descriptors[1].radius_policy, ValidationPolicy::LenientSkip);

    let office = descriptors[0].identity().expect("valid VLAN");
    assert_eq!(office.vlan_id.value(), 601);
    assert_eq!(office.cidr_network.to_string(), "10.61.0.0/24");
    assert_eq!(office.comment.as_deref(), Some("offices"));
}

#[test]
fn descriptor_without_output_file_is_invalid() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("list_vlans.json");
    let source = serde_json::json!([{
        "vlan_id": 601,
        "ip_network": "10.61.0.0/24",
        "sheet_name": "OFFICE",
        "dhcpd_out_file": " "
    }]);
    fs::write(&path, source.to_string()).expect("list written");

    let descriptors = load_vlan_list(&path).expect("list loaded");

    assert!(matches!(
        descriptors[0].identity(),
        Err(ToolError::InvalidConfig(_))
    ));
}

#[test]
fn missing_files_are_reported() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("absent.json");

    assert!(matches!(
        load_vlan_list(&path),
        Err(ToolError::MissingInput(_))
    ));
    assert!(matches!(
        load_store_settings(&path),
        Err(ToolError::MissingInput(_))
    ));
}

#[test]
fn store_settings_hide_the_password() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("mysql_settings.json");
    let source = serde_json::json!({
        "user": "radius",
        "password": "s3cret",
        "host": "db.example.org",
        "database": "radius"
    });
    fs::write(&path, source.to_string()).expect("settings written");

    let settings = load_store_settings(&path).expect("settings loaded");

    assert_eq!(settings.port, 3306);
    assert_eq!(settings.auth_scheme, AuthScheme::Accept);
    let rendered = format!("{settings:?}");
    assert!(!rendered.contains("s3cret"));
    assert!(rendered.contains("db.example.org"));
}
