use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use vlan_tools::ToolError;
use vlan_tools::model::ValidatedRadiusHost;
use vlan_tools::model::network::{MacAddress, VlanId};
use vlan_tools::reconcile::{SyncEvent, SyncOptions, sync_vlan};
use vlan_tools::store::memory::{MemoryConnector, Tables};
use vlan_tools::store::{
    AUTH_TYPE_ATTRIBUTE, AttributeRow, AuthScheme, CLEARTEXT_PASSWORD_ATTRIBUTE, VLAN_ATTRIBUTE,
};

const MAC_A: &str = "aa:aa:aa:aa:aa:0a";
const MAC_B: &str = "aa:aa:aa:aa:aa:0b";
const MAC_C: &str = "aa:aa:aa:aa:aa:0c";
const MAC_D: &str = "aa:aa:aa:aa:aa:0d";

fn vlan(id: i64) -> VlanId {
    VlanId::new(id).expect("valid VLAN id")
}

fn mac(text: &str) -> MacAddress {
    MacAddress::new(text).expect("valid MAC")
}

fn host(text: &str, ipv4: Option<&str>) -> ValidatedRadiusHost {
    ValidatedRadiusHost {
        mac: mac(text),
        ipv4: ipv4.map(|ip| ip.parse().expect("valid IPv4")),
    }
}

fn username(text: &str) -> String {
    mac(text).bare()
}

fn expected_members(entries: &[(&str, Option<&str>)]) -> BTreeMap<String, Option<String>> {
    entries
        .iter()
        .map(|(m, ip)| (username(m), ip.map(str::to_string)))
        .collect()
}

fn scenario_store() -> MemoryConnector {
    let mut tables = Tables::default();
    tables.add_member(
        &username(MAC_B),
        "601",
        Some("10.61.0.9"),
        AuthScheme::Accept,
    );
    tables.add_member(&username(MAC_C), "601", None, AuthScheme::Accept);
    MemoryConnector::new(tables)
}

#[test]
fn sync_adds_updates_and_removes_members() {
    let connector = scenario_store();
    let desired = vec![host(MAC_A, Some("10.61.0.5")), host(MAC_B, None)];
    let mut events: Vec<SyncEvent> = Vec::new();

    let report = sync_vlan(
        &connector,
        vlan(601),
        &desired,
        &SyncOptions::default(),
        &mut events,
    )
    .expect("sync succeeds");

    assert_eq!(report.added, 1);
    assert_eq!(report.ip_changed, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.unchanged, 0);
    assert_eq!(report.moved_in, 0);
    assert_eq!(
        events,
        vec![
            SyncEvent::Added {
                vlan: vlan(601),
                mac: mac(MAC_A),
                ipv4: Some("10.61.0.5".parse().unwrap()),
            },
            SyncEvent::FixedIpChanged {
                vlan: vlan(601),
                mac: mac(MAC_B),
                previous: Some("10.61.0.9".to_string()),
                current: None,
            },
            SyncEvent::Removed {
                vlan: vlan(601),
                username: username(MAC_C),
            },
        ]
    );

    let tables = connector.tables();
    assert_eq!(
        tables.members(vlan(601)),
        expected_members(&[(MAC_A, Some("10.61.0.5")), (MAC_B, None)])
    );
    let stale = username(MAC_C);
    assert!(tables.check.iter().all(|row| row.username != stale));
    assert!(tables.reply.iter().all(|row| row.username != stale));
}

#[test]
fn second_pass_is_a_no_op() {
    let connector = scenario_store();
    let desired = vec![host(MAC_A, Some("10.61.0.5")), host(MAC_B, None)];
    let options = SyncOptions::default();

    sync_vlan(
        &connector,
        vlan(601),
        &desired,
        &options,
        &mut Vec::<SyncEvent>::new(),
    )
    .expect("first pass");
    let after_first = connector.tables();

    let mut events: Vec<SyncEvent> = Vec::new();
    let report =
        sync_vlan(&connector, vlan(601), &desired, &options, &mut events).expect("second pass");

    assert_eq!(report.mutations, 0);
    assert_eq!(report.unchanged, 2);
    assert!(events.is_empty());
    assert_eq!(connector.tables(), after_first);
}

#[test]
fn host_registered_on_another_vlan_is_moved() {
    let mut tables = Tables::default();
    tables.add_member(&username(MAC_D), "700", Some("10.70.0.4"), AuthScheme::Accept);
    tables.add_member(&username(MAC_C), "700", None, AuthScheme::Accept);
    let connector = MemoryConnector::new(tables);

    let mut events: Vec<SyncEvent> = Vec::new();
    let report = sync_vlan(
        &connector,
        vlan(601),
        &[host(MAC_D, Some("10.61.0.4"))],
        &SyncOptions::default(),
        &mut events,
    )
    .expect("sync succeeds");

    assert_eq!(report.moved_in, 1);
    assert_eq!(report.added, 1);
    assert!(events.contains(&SyncEvent::MovedIn {
        vlan: vlan(601),
        mac: mac(MAC_D),
    }));

    let tables = connector.tables();
    assert_eq!(
        tables.members(vlan(601)),
        expected_members(&[(MAC_D, Some("10.61.0.4"))])
    );
    assert_eq!(
        tables.members(vlan(700)),
        expected_members(&[(MAC_C, None)])
    );

    let moved = username(MAC_D);
    let tag_rows = tables
        .reply
        .iter()
        .filter(|row| row.username == moved && row.attribute == VLAN_ATTRIBUTE)
        .count();
    assert_eq!(tag_rows, 1);
    assert_eq!(
        tables.check.iter().filter(|row| row.username == moved).count(),
        1
    );
}

#[test]
fn store_matches_desired_set_exactly() {
    let mut tables = Tables::default();
    for (index, ip) in [Some("10.61.0.1"), None, Some("10.61.0.3"), Some("10.61.0.99")]
        .into_iter()
        .enumerate()
    {
        let text = format!("02:00:00:00:00:{index:02x}");
        tables.add_member(&username(&text), "601", ip, AuthScheme::Accept);
    }
    let connector = MemoryConnector::new(tables);

    let desired = vec![
        host("02:00:00:00:00:00", Some("10.61.0.1")),
        host("02:00:00:00:00:01", Some("10.61.0.2")),
        host("02:00:00:00:00:02", None),
        host("02:00:00:00:00:10", Some("10.61.0.16")),
        host("02:00:00:00:00:11", None),
    ];
    let report = sync_vlan(
        &connector,
        vlan(601),
        &desired,
        &SyncOptions::default(),
        &mut Vec::<SyncEvent>::new(),
    )
    .expect("sync succeeds");

    assert_eq!(report.unchanged, 1);
    assert_eq!(report.ip_changed, 2);
    assert_eq!(report.added, 2);
    assert_eq!(report.removed, 1);

    let expected: BTreeMap<String, Option<String>> = desired
        .iter()
        .map(|h| (h.mac.bare(), h.ipv4.map(|ip| ip.to_string())))
        .collect();
    assert_eq!(connector.tables().members(vlan(601)), expected);
}

#[test]
fn legacy_password_rows_are_migrated_once() {
    let mut tables = Tables::default();
    tables.add_member(
        &username(MAC_B),
        "601",
        Some("10.61.0.9"),
        AuthScheme::CleartextPassword,
    );
    let connector = MemoryConnector::new(tables);
    let desired = vec![host(MAC_B, Some("10.61.0.9"))];
    let options = SyncOptions::default();

    let mut events: Vec<SyncEvent> = Vec::new();
    let report = sync_vlan(&connector, vlan(601), &desired, &options, &mut events)
        .expect("migration pass");
    assert_eq!(report.auth_migrated, 1);
    assert_eq!(report.ip_changed, 0);
    assert_eq!(
        events,
        vec![SyncEvent::AuthMigrated {
            vlan: vlan(601),
            mac: mac(MAC_B),
            previous: vec![CLEARTEXT_PASSWORD_ATTRIBUTE.to_string()],
        }]
    );

    let tables = connector.tables();
    assert_eq!(tables.check.len(), 1);
    assert_eq!(tables.check[0].attribute, AUTH_TYPE_ATTRIBUTE);
    assert_eq!(tables.check[0].value, "Accept");

    let report = sync_vlan(&connector, vlan(601), &desired, &options, &mut Vec::<SyncEvent>::new())
        .expect("second pass");
    assert_eq!(report.mutations, 0);
}

#[test]
fn migration_can_be_disabled() {
    let mut tables = Tables::default();
    tables.add_member(&username(MAC_B), "601", None, AuthScheme::CleartextPassword);
    let connector = MemoryConnector::new(tables.clone());
    let options = SyncOptions {
        migrate_auth: false,
        ..SyncOptions::default()
    };

    let report = sync_vlan(
        &connector,
        vlan(601),
        &[host(MAC_B, None)],
        &options,
        &mut Vec::<SyncEvent>::new(),
    )
    .expect("sync succeeds");

    assert_eq!(report.mutations, 0);
    assert_eq!(connector.tables(), tables);
}

#[test]
fn cleartext_scheme_writes_password_rows() {
    let connector = MemoryConnector::default();
    let options = SyncOptions {
        auth_scheme: AuthScheme::CleartextPassword,
        ..SyncOptions::default()
    };

    sync_vlan(
        &connector,
        vlan(601),
        &[host(MAC_A, None)],
        &options,
        &mut Vec::<SyncEvent>::new(),
    )
    .expect("sync succeeds");

    let tables = connector.tables();
    assert_eq!(tables.check.len(), 1);
    assert_eq!(tables.check[0].attribute, CLEARTEXT_PASSWORD_ATTRIBUTE);
    assert_eq!(tables.check[0].value, username(MAC_A));
}

#[test]
fn empty_desired_set_is_refused() {
    let connector = scenario_store();
    let before = connector.tables();

    let err = sync_vlan(
        &connector,
        vlan(601),
        &[],
        &SyncOptions::default(),
        &mut Vec::<SyncEvent>::new(),
    )
    .expect_err("empty set refused");

    assert!(matches!(err, ToolError::EmptyRadiusConfig(_)));
    assert_eq!(connector.tables(), before);
}

#[test]
fn duplicated_desired_mac_is_refused() {
    let connector = scenario_store();
    let err = sync_vlan(
        &connector,
        vlan(601),
        &[host(MAC_A, None), host(MAC_A, Some("10.61.0.5"))],
        &SyncOptions::default(),
        &mut Vec::<SyncEvent>::new(),
    )
    .expect_err("duplicate refused");

    assert!(matches!(err, ToolError::DuplicateMac { .. }));
}

#[test]
fn unreachable_store_fails_the_pass() {
    let connector = MemoryConnector::default().offline();
    let err = sync_vlan(
        &connector,
        vlan(601),
        &[host(MAC_A, None)],
        &SyncOptions::default(),
        &mut Vec::<SyncEvent>::new(),
    )
    .expect_err("connection failure");

    assert!(matches!(err, ToolError::Store(_)));
}

#[test]
fn failure_mid_pass_leaves_the_store_untouched() {
    let connector = scenario_store().failing_at(2);
    let before = connector.tables();
    let mut events: Vec<SyncEvent> = Vec::new();

    let err = sync_vlan(
        &connector,
        vlan(601),
        &[host(MAC_A, Some("10.61.0.5")), host(MAC_B, None)],
        &SyncOptions::default(),
        &mut events,
    )
    .expect_err("injected failure");

    assert!(matches!(err, ToolError::Store(_)));
    assert!(events.is_empty());
    assert_eq!(connector.tables(), before);
}

#[test]
fn member_stored_in_another_notation_is_rewritten_once() {
    let mut tables = Tables::default();
    tables.add_member("AABBCCDDEEFF", "601", Some("10.61.0.5"), AuthScheme::Accept);
    let connector = MemoryConnector::new(tables);
    let desired = vec![host("aa:bb:cc:dd:ee:ff", Some("10.61.0.5"))];
    let options = SyncOptions::default();

    let mut events: Vec<SyncEvent> = Vec::new();
    let report =
        sync_vlan(&connector, vlan(601), &desired, &options, &mut events).expect("rewrite pass");

    assert_eq!(report.renamed, 1);
    assert_eq!(report.added, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(
        events,
        vec![SyncEvent::Renamed {
            vlan: vlan(601),
            mac: mac("aa:bb:cc:dd:ee:ff"),
            previous: vec!["AABBCCDDEEFF".to_string()],
        }]
    );
    let tables = connector.tables();
    assert_eq!(
        tables.members(vlan(601)),
        expected_members(&[("aa:bb:cc:dd:ee:ff", Some("10.61.0.5"))])
    );
    assert!(tables.check.iter().all(|row| row.username == "aabbccddeeff"));
    assert!(tables.reply.iter().all(|row| row.username == "aabbccddeeff"));

    let report = sync_vlan(
        &connector,
        vlan(601),
        &desired,
        &options,
        &mut Vec::<SyncEvent>::new(),
    )
    .expect("second pass");
    assert_eq!(report.mutations, 0);
    assert_eq!(report.unchanged, 1);
}

#[test]
fn canonical_and_legacy_rows_of_one_host_collapse() {
    let mut tables = Tables::default();
    tables.add_member(&username(MAC_A), "601", None, AuthScheme::Accept);
    tables.add_member(MAC_A, "601", Some("10.61.0.7"), AuthScheme::Accept);
    let connector = MemoryConnector::new(tables);

    let report = sync_vlan(
        &connector,
        vlan(601),
        &[host(MAC_A, None)],
        &SyncOptions::default(),
        &mut Vec::<SyncEvent>::new(),
    )
    .expect("sync succeeds");

    assert_eq!(report.renamed, 1);
    assert_eq!(report.removed, 0);
    let tables = connector.tables();
    assert_eq!(tables.members(vlan(601)), expected_members(&[(MAC_A, None)]));
    assert_eq!(tables.check.len(), 1);
    assert_eq!(tables.reply.len(), 1);
}

#[test]
fn usernames_that_are_not_macs_are_removed() {
    let mut tables = Tables::default();
    tables.add_member("printer-room-3", "601", None, AuthScheme::Accept);
    let connector = MemoryConnector::new(tables);
    let mut events: Vec<SyncEvent> = Vec::new();

    sync_vlan(
        &connector,
        vlan(601),
        &[host(MAC_A, None)],
        &SyncOptions::default(),
        &mut events,
    )
    .expect("sync succeeds");

    assert!(events.contains(&SyncEvent::Removed {
        vlan: vlan(601),
        username: "printer-room-3".to_string(),
    }));
    assert_eq!(
        connector.tables().members(vlan(601)),
        expected_members(&[(MAC_A, None)])
    );
}

#[test]
fn leftover_password_row_next_to_accept_is_migrated() {
    let mut tables = Tables::default();
    let name = username(MAC_B);
    tables.add_member(&name, "601", None, AuthScheme::Accept);
    tables.check.push(AttributeRow::assign(
        name.as_str(),
        CLEARTEXT_PASSWORD_ATTRIBUTE,
        name.as_str(),
    ));
    let connector = MemoryConnector::new(tables);
    let mut events: Vec<SyncEvent> = Vec::new();

    let report = sync_vlan(
        &connector,
        vlan(601),
        &[host(MAC_B, None)],
        &SyncOptions::default(),
        &mut events,
    )
    .expect("migration pass");

    assert_eq!(report.auth_migrated, 1);
    assert_eq!(
        events,
        vec![SyncEvent::AuthMigrated {
            vlan: vlan(601),
            mac: mac(MAC_B),
            previous: vec![
                AUTH_TYPE_ATTRIBUTE.to_string(),
                CLEARTEXT_PASSWORD_ATTRIBUTE.to_string(),
            ],
        }]
    );
    let tables = connector.tables();
    assert_eq!(tables.check, vec![AuthScheme::Accept.check_row(&name)]);
}
