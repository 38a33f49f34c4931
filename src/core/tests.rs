//! End-to-end reconciliation scenarios against a scripted runner

use crate::core::error::Error;
use crate::core::reconcile::{Outcome, Reconciler};
use crate::core::rule::{Family, RuleParams, RuleSpec};
use crate::core::synth::{Operation, synthesize};
use crate::core::test_helpers::{FailingRunner, FixedResolver, MockRunner, args};
use proptest::prelude::*;

fn run(
    params: &RuleParams,
    results: &[(i32, &str, &str)],
    simulate: bool,
) -> (crate::Result<Outcome>, Vec<Vec<String>>) {
    let spec = RuleSpec::from_params(params).unwrap();
    let mut reconciler =
        Reconciler::new(MockRunner::new(results), FixedResolver).simulate(simulate);
    let outcome = reconciler.reconcile(&spec);
    (outcome, reconciler.runner().calls.clone())
}

fn redirect_params() -> RuleParams {
    RuleParams {
        chain: Some("PREROUTING".to_string()),
        source: Some("1.2.3.4/32".to_string()),
        destination: Some("7.8.9.10/42".to_string()),
        jump: Some("REDIRECT".to_string()),
        table: Some("nat".to_string()),
        to_destination: Some("5.5.5.5/32".to_string()),
        protocol: Some("udp".to_string()),
        destination_port: Some("22".to_string()),
        to_ports: Some("8600".to_string()),
        ..RuleParams::default()
    }
}

fn redirect_body() -> Vec<String> {
    args(&[
        "PREROUTING",
        "-p",
        "udp",
        "-s",
        "1.2.3.4/32",
        "-d",
        "7.8.9.10/42",
        "-j",
        "REDIRECT",
        "--to-destination",
        "5.5.5.5/32",
        "--destination-port",
        "22",
        "--to-ports",
        "8600",
    ])
}

fn snat_params() -> RuleParams {
    RuleParams {
        chain: Some("PREROUTING".to_string()),
        source: Some("1.2.3.4/32".to_string()),
        destination: Some("7.8.9.10/42".to_string()),
        jump: Some("SNAT".to_string()),
        table: Some("nat".to_string()),
        to_source: Some("5.5.5.5/32".to_string()),
        protocol: Some("udp".to_string()),
        source_port: Some("22".to_string()),
        to_ports: Some("8600".to_string()),
        state: Some("absent".to_string()),
        in_interface: Some("eth0".to_string()),
        out_interface: Some("eth1".to_string()),
        comment: Some("this is a comment".to_string()),
        ..RuleParams::default()
    }
}

fn snat_body() -> Vec<String> {
    args(&[
        "PREROUTING",
        "-p",
        "udp",
        "-s",
        "1.2.3.4/32",
        "-d",
        "7.8.9.10/42",
        "-j",
        "SNAT",
        "--to-source",
        "5.5.5.5/32",
        "-i",
        "eth0",
        "-o",
        "eth1",
        "--source-port",
        "22",
        "--to-ports",
        "8600",
        "-m",
        "comment",
        "--comment",
        "this is a comment",
    ])
}

fn with_head(head: &[&str], body: Vec<String>) -> Vec<String> {
    let mut tokens = args(head);
    tokens.extend(body);
    tokens
}

// ═══════════════════════════════════════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_without_required_parameters() {
    let err = RuleSpec::from_params(&RuleParams::default()).unwrap_err();
    assert!(err.is_validation());
}

// ═══════════════════════════════════════════════════════════════════════════
// Flush
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_flush_table_without_chain() {
    let params = RuleParams {
        flush: true,
        ..RuleParams::default()
    };
    let (outcome, calls) = run(&params, &[(0, "", "")], false);
    let outcome = outcome.unwrap();

    assert!(outcome.changed);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], args(&["/sbin/iptables", "-t", "filter", "-F"]));
    assert!(outcome.probe_commands.is_empty());
    assert_eq!(outcome.executed_commands, calls);
}

#[test]
fn test_flush_table_check_mode() {
    let params = RuleParams {
        flush: true,
        ..RuleParams::default()
    };
    let (outcome, calls) = run(&params, &[], true);
    let outcome = outcome.unwrap();

    assert!(outcome.changed);
    assert!(calls.is_empty());
    assert!(outcome.executed_commands.is_empty());
}

#[test]
fn test_flush_named_chain() {
    let params = RuleParams {
        flush: true,
        chain: Some("INPUT".to_string()),
        ..RuleParams::default()
    };
    let (outcome, calls) = run(&params, &[(0, "", "")], false);

    assert!(outcome.unwrap().changed);
    assert_eq!(calls, vec![args(&["/sbin/iptables", "-t", "filter", "-F", "INPUT"])]);
}

#[test]
fn test_flush_nat_table() {
    let params = RuleParams {
        action: Some("flush".to_string()),
        table: Some("nat".to_string()),
        chain: Some("PREROUTING".to_string()),
        wait: Some("5".to_string()),
        ..RuleParams::default()
    };
    let (outcome, calls) = run(&params, &[(0, "", "")], false);

    assert!(outcome.unwrap().changed);
    assert_eq!(
        calls,
        vec![args(&["/sbin/iptables", "-t", "nat", "-F", "PREROUTING", "-w", "5"])]
    );
}

#[test]
fn test_flush_ignores_malformed_rule_options() {
    let params = RuleParams {
        flush: true,
        in_interface: Some("eth0;x".to_string()),
        tcp_flags: Some("A B C".parse().unwrap()),
        syn: Some("bogus".to_string()),
        jump: Some("ACCEPT".to_string()),
        ..RuleParams::default()
    };
    assert_eq!(
        params.rule_option_fields(),
        vec!["tcp_flags", "syn", "jump", "in_interface"]
    );

    let (outcome, calls) = run(&params, &[(0, "", "")], false);

    assert!(outcome.unwrap().changed);
    assert_eq!(calls, vec![args(&["/sbin/iptables", "-t", "filter", "-F"])]);
}

// ═══════════════════════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════════════════════

fn policy_params() -> RuleParams {
    RuleParams {
        policy: Some("ACCEPT".to_string()),
        chain: Some("INPUT".to_string()),
        ..RuleParams::default()
    }
}

#[test]
fn test_policy_table() {
    let (outcome, calls) = run(
        &policy_params(),
        &[(0, "Chain INPUT (policy DROP)\n", ""), (0, "", "")],
        false,
    );
    assert!(outcome.unwrap().changed);
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0],
        args(&["/sbin/iptables", "-t", "filter", "-L", "INPUT"])
    );
    assert_eq!(
        calls[1],
        args(&["/sbin/iptables", "-t", "filter", "-P", "INPUT", "ACCEPT"])
    );
}

#[test]
fn test_policy_table_no_change() {
    let (outcome, calls) = run(
        &policy_params(),
        &[(0, "Chain INPUT (policy ACCEPT)\n", "")],
        false,
    );
    let outcome = outcome.unwrap();
    assert!(!outcome.changed);
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        args(&["/sbin/iptables", "-t", "filter", "-L", "INPUT"])
    );
    assert!(outcome.executed_commands.is_empty());
}

#[test]
fn test_policy_table_check_mode() {
    let (outcome, calls) = run(
        &policy_params(),
        &[(0, "Chain INPUT (policy DROP)\n", "")],
        true,
    );
    let outcome = outcome.unwrap();
    assert!(outcome.changed);
    assert_eq!(calls.len(), 1);
    assert!(outcome.executed_commands.is_empty());
}

#[test]
fn test_policy_unparseable_listing() {
    let (outcome, calls) = run(&policy_params(), &[(0, "garbage\n", "")], false);
    assert!(matches!(outcome.unwrap_err(), Error::Probe { .. }));
    assert_eq!(calls.len(), 1);
}

#[test]
fn test_policy_missing_chain() {
    let (outcome, calls) = run(
        &policy_params(),
        &[(1, "", "iptables: No chain/target/match by that name.\n")],
        false,
    );
    assert!(matches!(outcome.unwrap_err(), Error::Probe { .. }));
    assert_eq!(calls.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Rules
// ═══════════════════════════════════════════════════════════════════════════

fn insert_params() -> RuleParams {
    RuleParams {
        chain: Some("OUTPUT".to_string()),
        source: Some("1.2.3.4/32".to_string()),
        destination: Some("7.8.9.10/42".to_string()),
        jump: Some("ACCEPT".to_string()),
        action: Some("insert".to_string()),
        ..RuleParams::default()
    }
}

#[test]
fn test_insert_rule_check_mode() {
    let (outcome, calls) = run(&insert_params(), &[(1, "", "")], true);
    let outcome = outcome.unwrap();
    assert!(outcome.changed);
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        args(&[
            "/sbin/iptables",
            "-t",
            "filter",
            "-C",
            "OUTPUT",
            "-s",
            "1.2.3.4/32",
            "-d",
            "7.8.9.10/42",
            "-j",
            "ACCEPT",
        ])
    );
}

#[test]
fn test_insert_rule() {
    let (outcome, calls) = run(&insert_params(), &[(1, "", ""), (0, "", "")], false);
    let outcome = outcome.unwrap();
    assert!(outcome.changed);
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[1],
        args(&[
            "/sbin/iptables",
            "-t",
            "filter",
            "-I",
            "OUTPUT",
            "-s",
            "1.2.3.4/32",
            "-d",
            "7.8.9.10/42",
            "-j",
            "ACCEPT",
        ])
    );
    assert_eq!(outcome.probe_commands, vec![calls[0].clone()]);
    assert_eq!(outcome.executed_commands, vec![calls[1].clone()]);
}

#[test]
fn test_append_rule_check_mode() {
    let (outcome, calls) = run(&redirect_params(), &[(1, "", "")], true);
    assert!(outcome.unwrap().changed);
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        with_head(&["/sbin/iptables", "-t", "nat", "-C"], redirect_body())
    );
}

#[test]
fn test_append_rule() {
    let (outcome, calls) = run(&redirect_params(), &[(1, "", ""), (0, "", "")], false);
    assert!(outcome.unwrap().changed);
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0],
        with_head(&["/sbin/iptables", "-t", "nat", "-C"], redirect_body())
    );
    assert_eq!(
        calls[1],
        with_head(&["/sbin/iptables", "-t", "nat", "-A"], redirect_body())
    );
}

#[test]
fn test_append_rule_already_present() {
    let (outcome, calls) = run(&redirect_params(), &[(0, "", "")], false);
    let outcome = outcome.unwrap();
    assert!(!outcome.changed);
    assert_eq!(calls.len(), 1);
    assert!(outcome.executed_commands.is_empty());
}

#[test]
fn test_remove_rule() {
    let (outcome, calls) = run(&snat_params(), &[(0, "", ""), (0, "", "")], false);
    assert!(outcome.unwrap().changed);
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0],
        with_head(&["/sbin/iptables", "-t", "nat", "-C"], snat_body())
    );
    assert_eq!(
        calls[1],
        with_head(&["/sbin/iptables", "-t", "nat", "-D"], snat_body())
    );
}

#[test]
fn test_remove_rule_check_mode() {
    let (outcome, calls) = run(&snat_params(), &[(0, "", "")], true);
    let outcome = outcome.unwrap();
    assert!(outcome.changed);
    assert_eq!(calls.len(), 1);
    assert!(outcome.executed_commands.is_empty());
}

#[test]
fn test_remove_absent_rule_is_noop() {
    let (outcome, calls) = run(&snat_params(), &[(1, "", "")], false);
    assert!(!outcome.unwrap().changed);
    assert_eq!(calls.len(), 1);
}

#[test]
fn test_insert_with_reject() {
    let params = RuleParams {
        chain: Some("INPUT".to_string()),
        protocol: Some("tcp".to_string()),
        reject_with: Some("tcp-reset".to_string()),
        ip_version: Some("ipv4".to_string()),
        ..RuleParams::default()
    };
    let (outcome, calls) = run(&params, &[(0, "", "")], false);
    assert!(!outcome.unwrap().changed);
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        args(&[
            "/sbin/iptables",
            "-t",
            "filter",
            "-C",
            "INPUT",
            "-p",
            "tcp",
            "-j",
            "REJECT",
            "--reject-with",
            "tcp-reset",
        ])
    );
}

#[test]
fn test_insert_jump_reject_with_reject() {
    let params = RuleParams {
        chain: Some("INPUT".to_string()),
        protocol: Some("tcp".to_string()),
        jump: Some("REJECT".to_string()),
        reject_with: Some("tcp-reset".to_string()),
        ip_version: Some("ipv4".to_string()),
        ..RuleParams::default()
    };
    let (outcome, calls) = run(&params, &[(0, "", "")], false);
    assert!(!outcome.unwrap().changed);
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        args(&[
            "/sbin/iptables",
            "-t",
            "filter",
            "-C",
            "INPUT",
            "-p",
            "tcp",
            "-j",
            "REJECT",
            "--reject-with",
            "tcp-reset",
        ])
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// Failures
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_mutation_failure_surfaces_stderr() {
    let stderr = "iptables: Index of insertion too big.\n";
    let (outcome, calls) = run(&insert_params(), &[(1, "", ""), (1, "", stderr)], false);
    match outcome.unwrap_err() {
        Error::Mutation {
            stderr: captured,
            exit_code,
            command,
            ..
        } => {
            assert_eq!(captured, stderr);
            assert_eq!(exit_code, 1);
            assert_eq!(command, calls[1]);
        }
        other => panic!("expected mutation error, got {other:?}"),
    }
}

#[test]
fn test_execution_failure() {
    let spec = RuleSpec::from_params(&insert_params()).unwrap();
    let mut reconciler = Reconciler::new(FailingRunner, FixedResolver);
    let err = reconciler.reconcile(&spec).unwrap_err();
    assert!(matches!(err, Error::Execution { ref program, .. } if program == "/sbin/iptables"));
}

// ═══════════════════════════════════════════════════════════════════════════
// Both families
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_both_families_run_v4_then_v6() {
    let params = RuleParams {
        chain: Some("INPUT".to_string()),
        ip_version: Some("both".to_string()),
        protocol: Some("icmp".to_string()),
        icmp_type: Some("echo-request".to_string()),
        jump: Some("ACCEPT".to_string()),
        ..RuleParams::default()
    };
    // v4 already present, v6 missing
    let (outcome, calls) = run(&params, &[(0, "", ""), (1, "", ""), (0, "", "")], false);
    let outcome = outcome.unwrap();

    assert!(outcome.changed);
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0][0], "/sbin/iptables");
    assert!(calls[0].contains(&"--icmp-type".to_string()));
    assert_eq!(calls[1][0], "/sbin/ip6tables");
    assert!(calls[1].contains(&"--icmpv6-type".to_string()));
    assert_eq!(calls[2][3], "-A");
    assert_eq!(outcome.probe_commands.len(), 2);
    assert_eq!(outcome.executed_commands, vec![calls[2].clone()]);
}

#[test]
fn test_both_families_stop_at_first_failure() {
    let params = RuleParams {
        chain: Some("INPUT".to_string()),
        ip_version: Some("both".to_string()),
        jump: Some("DROP".to_string()),
        ..RuleParams::default()
    };
    let (outcome, calls) = run(&params, &[(1, "", ""), (4, "", "boom")], false);
    assert!(matches!(outcome.unwrap_err(), Error::Mutation { exit_code: 4, .. }));
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c[0] == "/sbin/iptables"));
}

#[test]
fn test_wait_flag_on_every_command() {
    let mut params = insert_params();
    params.wait = Some("10".to_string());
    let (_, calls) = run(&params, &[(1, "", ""), (0, "", "")], false);
    for call in &calls {
        assert_eq!(&call[call.len() - 2..], &args(&["-w", "10"])[..]);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Property: check and mutate share the rule body
// ═══════════════════════════════════════════════════════════════════════════

fn opt(values: &'static [&'static str]) -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(values).prop_map(str::to_string))
}

prop_compose! {
    fn arb_params()(
        protocol in opt(&["tcp", "udp", "! icmp"]),
        source in opt(&["10.0.0.0/8", "!192.168.1.1"]),
        destination in opt(&["7.8.9.10/42", "2001:db8::/32"]),
        matches in prop::collection::vec(prop::sample::select(&["tcp", "limit", "state", "conntrack"][..]), 0..3),
        ctstate in prop::collection::vec(prop::sample::select(&["NEW", "ESTABLISHED"][..]), 0..2),
        limit in opt(&["5/minute"]),
        uid_owner in opt(&["1000", "! 0"]),
        jump in opt(&["ACCEPT", "DROP", "REJECT", "LOG"]),
        log_prefix in opt(&["IPT: "]),
        goto in opt(&["LOGGING"]),
        in_interface in opt(&["eth0", "! wlan+"]),
        ports in (opt(&["22", "1000:2000"]), opt(&["80"])),
        misc in (opt(&["tcp-reset", "icmp-port-unreachable"]), opt(&["a comment with spaces"]), opt(&["match", "negate", "ignore"]), opt(&["5"])),
        intent in prop::sample::select(&[("append", "present"), ("insert", "present"), ("append", "absent")][..]),
    ) -> RuleParams {
        let (source_port, destination_port) = ports;
        let (reject_with, comment, syn, wait) = misc;
        let reject_with = if matches!(jump.as_deref(), None | Some("REJECT")) { reject_with } else { None };
        let goto = if jump.is_none() && reject_with.is_none() { goto } else { None };
        RuleParams {
            chain: Some("INPUT".to_string()),
            action: Some(intent.0.to_string()),
            state: Some(intent.1.to_string()),
            protocol,
            source,
            destination,
            matches: matches.into_iter().map(str::to_string).collect(),
            ctstate: ctstate.into_iter().map(str::to_string).collect(),
            limit,
            uid_owner,
            jump,
            log_prefix,
            goto,
            in_interface,
            source_port,
            destination_port,
            reject_with,
            comment,
            syn,
            wait,
            ..RuleParams::default()
        }
    }
}

proptest! {
    #[test]
    fn prop_check_and_mutation_share_body(params in arb_params()) {
        let spec = RuleSpec::from_params(&params).unwrap();
        for family in [Family::V4, Family::V6] {
            let check = synthesize(&spec, family, "iptables", Operation::Check).unwrap();
            for operation in [Operation::Append, Operation::Insert, Operation::Delete] {
                let mutate = synthesize(&spec, family, "iptables", operation).unwrap();
                prop_assert_eq!(mutate.len(), check.len());
                prop_assert_eq!(&mutate[..3], &check[..3]);
                prop_assert_eq!(mutate[3].as_str(), operation.flag());
                prop_assert_eq!(&mutate[4..], &check[4..]);
            }
        }
    }

    #[test]
    fn prop_at_most_one_jump(params in arb_params()) {
        let spec = RuleSpec::from_params(&params).unwrap();
        let check = synthesize(&spec, Family::V4, "iptables", Operation::Check).unwrap();
        prop_assert!(check.iter().filter(|t| *t == "-j").count() <= 1);
        prop_assert!(!(check.contains(&"-j".to_string()) && check.contains(&"-g".to_string())));
    }

    #[test]
    fn prop_simulation_never_mutates(params in arb_params(), present in any::<bool>()) {
        let spec = RuleSpec::from_params(&params).unwrap();
        let code = if present { 0 } else { 1 };
        let mut reconciler = Reconciler::new(MockRunner::new(&[(code, "", "")]), FixedResolver).simulate(true);
        let outcome = reconciler.reconcile(&spec).unwrap();
        prop_assert_eq!(reconciler.runner().call_count(), 1);
        prop_assert!(outcome.executed_commands.is_empty());
        let wants_present = params.state.as_deref() != Some("absent");
        prop_assert_eq!(outcome.changed, present != wants_present);
    }
}
