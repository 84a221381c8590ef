//! End-to-end runs through the public API

use behavior_mapper::encoder::{write_csv, ReportEncoder};
use behavior_mapper::error::{ErrorKind, Stage};
use behavior_mapper::{
    ActivityLoader, ActivityTable, BehaviorMapper, ColumnNames, InputFormat, MapperConfig,
    MapperError, NOISE,
};
use pretty_assertions::assert_eq;

const SERVICING: &[&str] = &["login", "view_balance", "transfer", "logout"];
const SHOPPING: &[&str] = &["login", "browse", "add_to_cart", "checkout", "logout"];

/// Twenty sessions alternating two journeys, plus one session that asks for help
fn activity_csv() -> String {
    let mut csv = String::from("ID,activity,timestamp\n");
    for session in 0..20 {
        let journey = if session % 2 == 0 { SERVICING } else { SHOPPING };
        for (step, activity) in journey.iter().enumerate() {
            csv.push_str(&format!(
                "S{:02},{},2024-03-01 {:02}:{:02}:00\n",
                session,
                activity,
                9 + session / 6,
                (session % 6) * 10 + step
            ));
        }
    }
    csv.push_str("S99,login,2024-03-02 08:00:00\n");
    csv.push_str("S99,help,2024-03-02 08:01:00\n");
    csv.push_str("S99,logout,2024-03-02 08:02:00\n");
    csv
}

fn load() -> ActivityTable {
    ActivityLoader::read(
        activity_csv().as_bytes(),
        InputFormat::Csv,
        &ColumnNames::default(),
    )
    .unwrap()
}

/// Small model settings; `embedding` extends the embedding table, `rest` adds tables
fn config(embedding: &str, rest: &str) -> MapperConfig {
    let toml = format!(
        "[embedding]\nfeature_size = 8\nepochs = 10\n{}\n[projection]\niterations = 300\n\n{}",
        embedding, rest
    );
    MapperConfig::from_toml_str(&toml).unwrap()
}

#[test]
fn test_csv_to_clusters() {
    let table = load();
    assert_eq!(table.len(), 93);
    assert_eq!(table.session_count(), 21);

    let mapper = BehaviorMapper::with_config(config("", "")).unwrap();
    let clustered = mapper.run(&table).unwrap();

    assert_eq!(clustered.len(), table.distinct_activities().len());
    assert_eq!(clustered.feature_size(), 8);
    let labels = clustered.labels().unwrap();
    assert!(labels.iter().all(|l| *l >= NOISE));

    let help = clustered.row("help").unwrap().volume_pctl.unwrap();
    let login = clustered.row("login").unwrap().volume_pctl.unwrap();
    assert!(help < login);
}

#[test]
fn test_runs_are_reproducible() {
    let table = load();
    let first = BehaviorMapper::with_config(config("", "")).unwrap().run(&table).unwrap();
    let second = BehaviorMapper::with_config(config("", "")).unwrap().run(&table).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_drop_pattern_removes_activities() {
    let mapper =
        BehaviorMapper::with_config(config("", "[corpus]\ndrop_activities = [\"logout\"]\n"))
            .unwrap();
    let clustered = mapper.run(&load()).unwrap();

    assert!(clustered.row("logout").is_none());
    assert_eq!(clustered.len(), 7);
}

#[test]
fn test_rare_activity_strict_alignment_fails() {
    let mapper = BehaviorMapper::with_config(config("min_activity_count = 2", "")).unwrap();
    let err = mapper.run(&load()).unwrap_err();

    assert!(matches!(
        err,
        MapperError::Stage {
            stage: Stage::Embedding,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
}

#[test]
fn test_activity_only_in_short_sessions_names_min_length() {
    let mut csv = activity_csv();
    csv.push_str("R1,refund,2024-03-02 09:00:00\n");
    let table =
        ActivityLoader::read(csv.as_bytes(), InputFormat::Csv, &ColumnNames::default()).unwrap();

    let mapper = BehaviorMapper::with_config(config("", "")).unwrap();
    let err = mapper.run(&table).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    let message = err.to_string();
    assert!(message.contains("refund"));
    assert!(message.contains("min_length"));
    assert!(!message.contains("min_activity_count"));
}

#[test]
fn test_rare_activity_strict_alignment_names_min_count() {
    let mapper = BehaviorMapper::with_config(config("min_activity_count = 2", "")).unwrap();
    let message = mapper.run(&load()).unwrap_err().to_string();

    assert!(message.contains("help"));
    assert!(message.contains("min_activity_count"));
}

#[test]
fn test_rare_activity_intersect_alignment_drops_it() {
    let mapper = BehaviorMapper::with_config(config(
        "min_activity_count = 2\nalignment = \"intersect\"",
        "",
    ))
    .unwrap();
    let clustered = mapper.run(&load()).unwrap();

    assert!(clustered.row("help").is_none());
    assert_eq!(clustered.len(), 7);
}

#[test]
fn test_optics_without_radius_is_one_cluster() {
    let mapper =
        BehaviorMapper::with_config(config("", "[clustering]\nalgorithm = \"optics\"\n"))
            .unwrap();
    let clustered = mapper.run(&load()).unwrap();

    assert_eq!(clustered.labels().unwrap(), vec![0; clustered.len()]);
}

#[test]
fn test_min_samples_above_row_count_is_all_noise() {
    let mapper =
        BehaviorMapper::with_config(config("", "[clustering]\nmin_samples = 20\n")).unwrap();
    let clustered = mapper.run(&load()).unwrap();

    assert_eq!(clustered.labels().unwrap(), vec![NOISE; clustered.len()]);
}

#[test]
fn test_report_and_csv_output() {
    let table = load();
    let mapper = BehaviorMapper::with_config(config("", "")).unwrap();
    let clustered = mapper.run(&table).unwrap();

    let report = ReportEncoder::with_instance_id("it".to_string())
        .encode(&clustered)
        .unwrap();
    assert_eq!(report.activity_count, clustered.len());
    let members: usize = report.clusters.iter().map(|c| c.size).sum();
    assert_eq!(members + report.noise_count, report.activity_count);

    let mut buffer = Vec::new();
    write_csv(&clustered, &mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    assert_eq!(text.lines().count(), clustered.len() + 1);
    assert!(text.starts_with("activity,x,y,volume_pctl,cluster,f0,"));
}

#[test]
fn test_ndjson_and_csv_agree() {
    let ndjson: String = load()
        .records()
        .iter()
        .map(|r| {
            format!(
                "{{\"session_id\": \"{}\", \"activity\": \"{}\", \"occurrence\": \"{}\"}}\n",
                r.session_id,
                r.activity,
                r.occurrence.to_rfc3339()
            )
        })
        .collect();
    let from_ndjson = ActivityLoader::parse_ndjson(&ndjson).unwrap();

    let mapper = BehaviorMapper::with_config(config("", "")).unwrap();
    assert_eq!(
        mapper.corpus(&from_ndjson).unwrap(),
        mapper.corpus(&load()).unwrap()
    );
}
