//! End-to-end dispatch tests
//!
//! Payload in, playbook runs and lease state out, with the lab fakes standing
//! in for the switch and Ansible.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use sonic_macresolver::MacCache;
use sonic_trap_common::TrapError;
use sonic_trap_test::{
    fixtures::*, FakePlaybookExecutor, FakeQueryExecutor, QueryFailure, TestLab,
};
use sonic_trapmgrd::{replay, DispatchOutcome, SavedTrap, TrapmgrdSettings, UNKNOWN};

fn playbook_names() -> (String, String, String) {
    let settings = TrapmgrdSettings::default();
    (
        settings.playbooks.vlan_create,
        settings.playbooks.vlan_assign,
        settings.playbooks.port_cleanup,
    )
}

#[tokio::test]
async fn test_non_physical_port_is_filtered() {
    let lab = TestLab::new();
    let dispatcher = lab.dispatcher();

    let report = dispatcher.dispatch(&link_up(VLAN_IFINDEX)).await.unwrap();
    assert_eq!(report.outcome, DispatchOutcome::Filtered);
    assert_eq!(lab.queries.call_count(), 0);
    assert_eq!(lab.playbooks.run_count(), 0);

    // No interface index at all
    let report = dispatcher
        .dispatch("UDP/IPv6: [2001:db8::1]:161\nSNMPv2-MIB::snmpTrapOID.0 IF-MIB::linkUp")
        .await
        .unwrap();
    assert_eq!(report.outcome, DispatchOutcome::Filtered);
    assert_eq!(lab.queries.call_count(), 0);
}

#[tokio::test]
async fn test_empty_payload_is_rejected() {
    let lab = TestLab::new();
    let result = lab.dispatcher().dispatch("\n\n").await;
    assert!(matches!(result, Err(TrapError::EmptyPayload)));
    assert_eq!(lab.queries.call_count(), 0);
}

#[tokio::test]
async fn test_connect_assigns_vlan() {
    let lab = TestLab::new();
    let dispatcher = lab.dispatcher();

    let report = dispatcher.dispatch(&link_up(KNOWN_PORT)).await.unwrap();
    assert_eq!(report.outcome, DispatchOutcome::Completed { success: true });
    assert_eq!(report.event.device_name, LAB_DEVICE_NAME);
    assert_eq!(report.event.mac, Some(mac(KNOWN_HOST_MAC)));

    let (vlan_create, vlan_assign, _) = playbook_names();
    assert_eq!(lab.playbooks.playbooks(), vec![vlan_create, vlan_assign]);

    let runs = lab.playbooks.runs();
    let params = &runs[1].params;
    assert_eq!(params.device_address, LAB_DEVICE);
    assert_eq!(params.interface_name, KNOWN_PORT_NAME);
    assert_eq!(params.mac_address, Some(mac(KNOWN_HOST_MAC)));
    assert_eq!(params.vlan_id.map(|v| v.as_u16()), Some(KNOWN_HOST_VLAN));
    assert_eq!(
        params.extra_vars(),
        "mac_address=00:11:22:33:44:55 interface_name=FastEthernet0/1 vlan_id=20 device_address=2001:db8::1"
    );

    assert!(lab.leases.is_empty());
}

#[tokio::test]
async fn test_connect_without_vlan_runs_nothing() {
    let lab = TestLab::new();
    let report = lab.dispatcher().dispatch(&link_up(GUEST_PORT)).await.unwrap();

    assert_eq!(report.outcome, DispatchOutcome::Completed { success: true });
    assert_eq!(report.event.mac, Some(mac(GUEST_HOST_MAC)));
    assert_eq!(lab.playbooks.run_count(), 0);
    assert!(lab.leases.is_empty());
}

#[tokio::test]
async fn test_connect_with_unknown_mac_is_logged_only() {
    let lab = TestLab::new();
    let report = lab.dispatcher().dispatch(&link_up(UPLINK_PORT)).await.unwrap();

    assert_eq!(report.outcome, DispatchOutcome::NoAction);
    assert_eq!(report.event.mac, None);
    assert_eq!(report.event.port_name.as_deref(), Some(UPLINK_PORT_NAME));
    // One attempt: two walks
    assert_eq!(lab.queries.call_count(), 2);
    assert_eq!(lab.playbooks.run_count(), 0);
}

#[tokio::test]
async fn test_disconnect_cleans_port() {
    let lab = TestLab::new();
    let report = lab.dispatcher().dispatch(&link_down(GUEST_PORT)).await.unwrap();

    assert_eq!(report.outcome, DispatchOutcome::Completed { success: true });
    let (_, _, port_cleanup) = playbook_names();
    let runs = lab.playbooks.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].playbook, port_cleanup);
    assert_eq!(runs[0].params.interface_name, GUEST_PORT_NAME);
    assert!(lab.leases.is_empty());
}

#[tokio::test]
async fn test_disconnect_without_source_cleans_port() {
    let lab = TestLab::new();
    let dispatcher = lab.dispatcher();
    let payload = format!(
        "SNMPv2-MIB::snmpTrapOID.0 IF-MIB::linkDown\nIF-MIB::ifIndex.{} {}",
        GUEST_PORT, GUEST_PORT
    );

    let report = dispatcher.dispatch(&payload).await.unwrap();
    assert_eq!(report.outcome, DispatchOutcome::Completed { success: true });
    assert_eq!(report.event.port_name.as_deref(), Some(GUEST_PORT_NAME));
    assert_eq!(lab.queries.call_count(), 0);

    let (_, _, port_cleanup) = playbook_names();
    let runs = lab.playbooks.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].playbook, port_cleanup);
    assert_eq!(runs[0].params.device_address, UNKNOWN);
    assert_eq!(runs[0].params.mac_address, None);
    assert!(lab.leases.is_empty());

    // Connect still needs the MAC, which needs the source
    let payload = payload.replace("linkDown", "linkUp");
    let report = dispatcher.dispatch(&payload).await.unwrap();
    assert_eq!(report.outcome, DispatchOutcome::NoAction);
    assert_eq!(lab.playbooks.run_count(), 1);
}

#[tokio::test]
async fn test_ipv4_source() {
    let lab = TestLab::new();
    let payload = trap_payload(LAB_DEVICE_V4, "linkUp", KNOWN_PORT);
    let report = lab.dispatcher().dispatch(&payload).await.unwrap();

    assert_eq!(report.event.source.as_deref(), Some(LAB_DEVICE_V4));
    assert_eq!(report.event.device_name, "SW-ACCESS-2");
    assert_eq!(report.outcome, DispatchOutcome::Completed { success: true });
    assert_eq!(lab.playbooks.runs()[0].params.device_address, LAB_DEVICE_V4);
}

#[tokio::test]
async fn test_event_without_action() {
    let lab = TestLab::new();
    let payload = trap_payload(LAB_DEVICE, "coldStart", KNOWN_PORT);
    let report = lab.dispatcher().dispatch(&payload).await.unwrap();

    assert_eq!(report.event.event, "COLD START");
    assert_eq!(report.outcome, DispatchOutcome::NoAction);
    assert_eq!(lab.playbooks.run_count(), 0);
}

#[tokio::test]
async fn test_leased_port_is_denied() {
    let lab = TestLab::new();
    assert!(lab.leases.try_acquire(KNOWN_PORT_NAME).is_granted());

    let report = lab.dispatcher().dispatch(&link_down(KNOWN_PORT)).await.unwrap();
    assert!(matches!(report.outcome, DispatchOutcome::LeaseDenied { .. }));
    assert_eq!(lab.playbooks.run_count(), 0);
    assert!(lab.leases.is_leased(KNOWN_PORT_NAME));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_traps_for_one_port() {
    let lab = TestLab::with_fakes(
        lab_switch(),
        FakePlaybookExecutor::new().with_delay(Duration::from_secs(10)),
    );
    let dispatcher = lab.dispatcher();

    let first_trap = link_down(KNOWN_PORT);
    let second_trap = link_down(KNOWN_PORT);
    let (first, second) = tokio::join!(
        dispatcher.dispatch(&first_trap),
        dispatcher.dispatch(&second_trap),
    );
    let outcomes = [first.unwrap().outcome, second.unwrap().outcome];

    let completed = outcomes
        .iter()
        .filter(|o| **o == DispatchOutcome::Completed { success: true })
        .count();
    let denied = outcomes
        .iter()
        .filter(|o| matches!(o, DispatchOutcome::LeaseDenied { .. }))
        .count();
    assert_eq!((completed, denied), (1, 1));
    assert_eq!(lab.playbooks.run_count(), 1);
    assert!(lab.leases.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_playbook_timeout_releases_lease() {
    let lab = TestLab::with_fakes(
        lab_switch(),
        FakePlaybookExecutor::new().with_delay(Duration::from_secs(200)),
    )
    .tune(|s| s.dispatch.dispatch_wait_secs = 300);
    let dispatcher = lab.dispatcher();

    let start = Instant::now();
    let report = dispatcher.dispatch(&link_down(KNOWN_PORT)).await.unwrap();

    assert_eq!(report.outcome, DispatchOutcome::Completed { success: false });
    assert!(start.elapsed() >= lab.playbook_timeout());
    assert!(start.elapsed() < Duration::from_secs(200));
    assert_eq!(lab.playbooks.run_count(), 1);
    assert_eq!(lab.playbooks.finished_count(), 0);
    assert!(lab.leases.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_action_continues_after_dispatch_wait() {
    let lab = TestLab::with_fakes(
        lab_switch(),
        FakePlaybookExecutor::new().with_delay(Duration::from_secs(60)),
    );
    let dispatcher = lab.dispatcher();

    let report = dispatcher.dispatch(&link_up(KNOWN_PORT)).await.unwrap();
    assert_eq!(report.outcome, DispatchOutcome::Pending);
    assert!(lab.leases.is_leased(KNOWN_PORT_NAME));

    dispatcher.drain().await;
    assert_eq!(lab.playbooks.finished_count(), 2);
    assert!(lab.leases.is_empty());
}

#[tokio::test]
async fn test_failed_playbook_stops_action() {
    let (vlan_create, _, _) = playbook_names();
    let lab = TestLab::with_fakes(
        lab_switch(),
        FakePlaybookExecutor::new().with_failure(&vlan_create),
    );

    let report = lab.dispatcher().dispatch(&link_up(KNOWN_PORT)).await.unwrap();
    assert_eq!(report.outcome, DispatchOutcome::Completed { success: false });
    assert_eq!(lab.playbooks.playbooks(), vec![vlan_create]);
    assert!(lab.leases.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_saturated_action_pool_rejects() {
    let lab = TestLab::with_fakes(
        lab_switch(),
        FakePlaybookExecutor::new().with_delay(Duration::from_secs(100)),
    )
    .tune(|s| {
        s.dispatch.action_workers = 1;
        s.dispatch.dispatch_wait_secs = 1;
    });
    let dispatcher = lab.dispatcher();

    let first = dispatcher.dispatch(&link_down(KNOWN_PORT)).await.unwrap();
    assert_eq!(first.outcome, DispatchOutcome::Pending);

    let second = dispatcher.dispatch(&link_down(GUEST_PORT)).await.unwrap();
    assert_eq!(second.outcome, DispatchOutcome::Rejected);
    assert!(!lab.leases.is_leased(GUEST_PORT_NAME));
    assert!(lab.leases.is_leased(KNOWN_PORT_NAME));

    dispatcher.drain().await;
    assert_eq!(lab.playbooks.run_count(), 1);
    assert!(lab.leases.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resolution_retries_then_gives_up() {
    let lab = TestLab::with_fakes(
        lab_switch().with_failure(LAB_DEVICE, QueryFailure::Timeout),
        FakePlaybookExecutor::new(),
    )
    .tune(|s| {
        s.snmp.max_retries = 3;
        s.snmp.initial_wait_secs = 5;
    });

    let start = Instant::now();
    let report = lab.dispatcher().dispatch(&link_up(KNOWN_PORT)).await.unwrap();

    assert_eq!(report.event.mac, None);
    assert_eq!(report.outcome, DispatchOutcome::NoAction);
    // A failed first walk ends the attempt
    assert_eq!(lab.queries.calls_for(LAB_DEVICE), 3);
    // (5 + 5) + (5 + 10)
    assert!(start.elapsed() >= Duration::from_secs(25));
}

#[tokio::test(start_paused = true)]
async fn test_resolution_recovers_on_retry() {
    let lab = TestLab::with_fakes(
        lab_switch().with_failure(LAB_DEVICE, QueryFailure::TimeoutTimes(1)),
        FakePlaybookExecutor::new(),
    )
    .tune(|s| s.snmp.max_retries = 2);

    let report = lab.dispatcher().dispatch(&link_up(KNOWN_PORT)).await.unwrap();
    assert_eq!(report.event.mac, Some(mac(KNOWN_HOST_MAC)));
    assert_eq!(report.outcome, DispatchOutcome::Completed { success: true });
    assert_eq!(lab.queries.calls_for(LAB_DEVICE), 3);
}

#[tokio::test]
async fn test_resolutions_are_cached_across_traps() {
    let lab = TestLab::new();
    let dispatcher = lab.dispatcher();

    dispatcher.dispatch(&link_up(KNOWN_PORT)).await.unwrap();
    dispatcher.dispatch(&link_down(KNOWN_PORT)).await.unwrap();

    assert_eq!(lab.queries.call_count(), 2);
    let stats = lab.cache.stats();
    assert_eq!(stats.valid_entries, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_cache_snapshot_shared_between_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("mac_cache.json");

    let first = TestLab::new();
    first.dispatcher().dispatch(&link_up(KNOWN_PORT)).await.unwrap();
    first.cache.save_snapshot(&state_file).unwrap();

    let mut second = TestLab::new();
    second.cache = Arc::new(MacCache::load_snapshot(&state_file, second.settings.cache_ttl()).unwrap());
    let report = second.dispatcher().dispatch(&link_down(KNOWN_PORT)).await.unwrap();

    assert_eq!(report.event.mac, Some(mac(KNOWN_HOST_MAC)));
    assert_eq!(second.queries.call_count(), 0);
}

#[tokio::test]
async fn test_replay_saved_traps() {
    let dir = tempfile::tempdir().unwrap();
    let payloads = [
        ("1-up.trap", link_up(KNOWN_PORT)),
        ("2-down.trap", link_down(GUEST_PORT)),
        ("3-vlan.trap", link_up(VLAN_IFINDEX)),
        ("4-empty.trap", String::new()),
        ("5-cold.trap", trap_payload(LAB_DEVICE, "coldStart", UPLINK_PORT)),
    ];
    let mut traps = Vec::new();
    for (name, payload) in &payloads {
        let path = dir.path().join(name);
        std::fs::write(&path, payload).unwrap();
        traps.push(SavedTrap::load(&path).await.unwrap());
    }

    let lab = TestLab::new();
    let dispatcher = Arc::new(lab.dispatcher());
    let results = replay(Arc::clone(&dispatcher), traps, 3).await;
    dispatcher.drain().await;

    assert_eq!(results.len(), 5);
    assert!(results[0].path.ends_with("1-up.trap"));
    assert!(results[4].path.ends_with("5-cold.trap"));

    let outcomes: Vec<Option<DispatchOutcome>> = results
        .iter()
        .map(|r| r.result.as_ref().ok().map(|report| report.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            Some(DispatchOutcome::Completed { success: true }),
            Some(DispatchOutcome::Completed { success: true }),
            Some(DispatchOutcome::Filtered),
            None,
            Some(DispatchOutcome::NoAction),
        ]
    );
    assert!(matches!(results[3].result, Err(TrapError::EmptyPayload)));
    assert_eq!(lab.playbooks.run_count(), 3);
}

#[tokio::test]
async fn test_unreachable_device_never_configures() {
    let lab = TestLab::with_fakes(FakeQueryExecutor::new(), FakePlaybookExecutor::new());
    let report = lab.dispatcher().dispatch(&link_down(KNOWN_PORT)).await.unwrap();

    // Disconnect needs only the port, the MAC stays unknown
    assert_eq!(report.event.mac, None);
    assert_eq!(report.outcome, DispatchOutcome::Completed { success: true });
    assert_eq!(lab.playbooks.runs()[0].params.mac_address, None);
}
