use chrono::Duration;
use position_analytics::replay::{parse_csv, ReplayError, StateKey};
use position_analytics::{
    AnalyticsError, Config, Decimal, MemoryStateStore, OversellPolicy, Replayer, StateStore,
    SubjectId, TimeSecs,
};
use std::io::Write;

const HEADER: &str = "subject,kind,timestamp,value,price,tvl\n";

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn config(policy: OversellPolicy) -> Config {
    Config {
        replay_input: String::new(),
        apr_window: Duration::days(1),
        daily_avg_entries: 3,
        oversell_policy: policy,
        as_of: None,
    }
}

fn replay(csv: &str, policy: OversellPolicy) -> Replayer<MemoryStateStore> {
    let observations = parse_csv(format!("{}{}", HEADER, csv).as_bytes()).unwrap();
    let mut replayer = Replayer::new(MemoryStateStore::new(), config(policy));
    replayer.run(&observations);
    replayer
}

#[test]
fn test_replay_reports_all_calculators() {
    let csv = "\
pos-1,trade,100,2,10,
pos-1,trade,200,2,15,
pos-1,trade,300,-3,20,
vault-1,collect,0,10,,1000
vault-1,collect,86400,10,,1000
vault-1,daily_close,86400,10,,
vault-1,daily_close,172800,30,,
";
    let mut replayer = replay(csv, OversellPolicy::Reject);
    let report = replayer.report();

    assert_eq!(report.processed, 7);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.subjects.len(), 2);

    let pos = &report.subjects[0];
    assert_eq!(pos.subject.as_str(), "pos-1");
    assert_eq!(pos.as_of, TimeSecs::new(300));
    assert_eq!(pos.apr, None);
    assert_eq!(pos.daily_average, None);
    assert!(pos.errors.is_empty());
    let pnl = pos.pnl.as_ref().unwrap();
    assert_eq!(pnl.realized_pnl, d("25"));
    assert_eq!(pnl.unrealized_pnl, d("5"));
    assert_eq!(pnl.remaining_shares, d("1"));
    assert_eq!(pnl.avg_entry_price, d("15"));
    assert_eq!(pnl.open_lots, 1);

    let vault = &report.subjects[1];
    assert_eq!(vault.subject.as_str(), "vault-1");
    assert_eq!(vault.as_of, TimeSecs::new(172_800));
    // both collects predate the window; the newest stays as anchor, reported raw
    assert_eq!(vault.apr, Some(d("0.01")));
    assert_eq!(vault.daily_average, Some(d("20")));
    assert_eq!(vault.pnl, None);
}

#[test]
fn test_replay_persists_flat_states() {
    let replayer = replay("pos-1,trade,100,2,10,\n", OversellPolicy::Reject);
    let key = StateKey::new(SubjectId::new("pos-1".to_string()), "pnl");
    assert_eq!(
        replayer.store().load(&key),
        Some(vec![d("0"), d("2"), d("2"), d("10")])
    );
}

#[test]
fn test_rejected_observations_are_skipped() {
    let csv = "\
pos-1,trade,100,1,10,
pos-1,trade,200,-2,12,
vault-1,collect,500,1,,100
vault-1,collect,400,1,,100
";
    let mut replayer = replay(csv, OversellPolicy::Reject);
    let report = replayer.report();
    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 2);

    let pos = &report.subjects[0];
    let pnl = pos.pnl.as_ref().unwrap();
    assert_eq!(pnl.remaining_shares, d("1"));
    assert_eq!(pnl.realized_pnl, Decimal::zero());
    assert_eq!(pos.as_of, TimeSecs::new(100));

    // one observation left: raw ratio
    assert_eq!(report.subjects[1].apr, Some(d("0.01")));
}

#[test]
fn test_truncate_policy_reports_shortfall() {
    let csv = "\
pos-1,trade,100,1,10,
pos-1,trade,200,-2,12,
";
    let mut replayer = replay(csv, OversellPolicy::Truncate);
    let report = replayer.report();
    let pnl = report.subjects[0].pnl.as_ref().unwrap();
    assert_eq!(report.skipped, 0);
    assert_eq!(pnl.shortfall, d("1"));
    assert_eq!(pnl.realized_pnl, d("2"));
    assert!(pnl.remaining_shares.is_zero());
}

#[test]
fn test_apply_surfaces_engine_errors() {
    let observations = parse_csv(format!("{}pos-1,trade,1,-1,10,\n", HEADER).as_bytes()).unwrap();
    let mut replayer = Replayer::new(MemoryStateStore::new(), config(OversellPolicy::Reject));
    let err = replayer.apply(&observations[0]).unwrap_err();
    assert!(matches!(
        err,
        ReplayError::Engine(AnalyticsError::Oversell { .. })
    ));
    assert!(replayer.store().is_empty());
}

#[test]
fn test_report_serializes_camel_case() {
    let mut replayer = replay("pos-1,daily_pending,3600,7,,\n", OversellPolicy::Reject);
    let report = replayer.report();
    let json = serde_json::to_value(&report).unwrap();
    let subject = &json["subjects"][0];
    assert_eq!(subject["subject"], "pos-1");
    assert_eq!(subject["dailyAverage"], "7");
    assert_eq!(subject["asOf"], 3600);
    assert!(subject["apr"].is_null());
    assert!(subject["pnl"].is_null());
    assert!(subject.get("errors").is_none());
}

#[test]
fn test_failing_metric_does_not_abort_report() {
    let csv = "\
pos-1,trade,100,2,10,
pos-1,trade,200,-1,12,
vault-1,collect,1000,1,,100
vault-1,collect,2000,1,,100
";
    let observations = parse_csv(format!("{}{}", HEADER, csv).as_bytes()).unwrap();
    let mut cfg = config(OversellPolicy::Reject);
    // before the first collect: nothing has elapsed to annualize over
    cfg.as_of = Some(TimeSecs::new(500));
    let mut replayer = Replayer::new(MemoryStateStore::new(), cfg);
    replayer.run(&observations);
    let report = replayer.report();

    assert_eq!(report.subjects.len(), 2);
    let pos = &report.subjects[0];
    assert_eq!(pos.pnl.as_ref().unwrap().realized_pnl, d("2"));
    assert!(pos.errors.is_empty());

    let vault = &report.subjects[1];
    assert_eq!(vault.apr, None);
    assert_eq!(vault.errors.len(), 1);
    assert!(vault.errors[0].starts_with("apr: "));

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["subjects"][1]["errors"].is_array());
}

#[test]
fn test_replay_from_csv_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", HEADER).unwrap();
    writeln!(file, "vault-9,collect,100,100,,1000").unwrap();

    let observations = parse_csv(std::fs::File::open(file.path()).unwrap()).unwrap();
    let mut cfg = config(OversellPolicy::Reject);
    cfg.as_of = Some(TimeSecs::new(100));
    let mut replayer = Replayer::new(MemoryStateStore::new(), cfg);
    replayer.run(&observations);
    let report = replayer.report();
    assert_eq!(report.subjects[0].apr, Some(d("0.1")));
}
