use std::fs;
use std::path::Path;

use levelnet_core::{
    run_simulation, Discipline, LevelNetError, ModelDefaults, ModelTable, OutputMode, Registry,
    SimulationConfig,
};

fn model(headers: &[&str], rows: &[&[&str]]) -> Registry {
    let mut table = ModelTable::new(headers.iter().map(|s| s.to_string()).collect());
    for row in rows {
        table.push_row(row.iter().copied());
    }
    Registry::build(&table, &ModelDefaults::default()).unwrap()
}

fn config(discipline: Discipline, output: &Path) -> SimulationConfig {
    SimulationConfig {
        discipline,
        runs: 3,
        steps: 12,
        output: output.to_path_buf(),
        output_mode: OutputMode::Full,
        seed: Some(17),
        ..SimulationConfig::default()
    }
}

/// Per-element value lines of run `run` in a full-mode trace.
fn run_lines(text: &str, run: usize) -> Vec<String> {
    text.split(&format!("Run #{run}\n"))
        .nth(1)
        .unwrap()
        .lines()
        .take_while(|l| !l.starts_with("Run #") && !l.starts_with("Frequency"))
        .map(str::to_string)
        .collect()
}

const HEADERS: [&str; 5] = ["Variable", "Positive", "Negative", "Initial", "Noise"];

#[test]
fn test_sync_is_independent_of_element_order() {
    let forward = model(
        &HEADERS,
        &[
            &["A", "C", "B", "0", "0"],
            &["B", "A", "!C", "1", "0"],
            &["C", "!A", "", "2", "0"],
        ],
    );
    let reversed = model(
        &HEADERS,
        &[
            &["C", "!A", "", "2", "0"],
            &["B", "A", "!C", "1", "0"],
            &["A", "C", "B", "0", "0"],
        ],
    );

    let dir = tempfile::tempdir().unwrap();
    let out_a = dir.path().join("a.txt");
    let out_b = dir.path().join("b.txt");
    run_simulation(&forward, &config(Discipline::Sync, &out_a)).unwrap();
    run_simulation(&reversed, &config(Discipline::Sync, &out_b)).unwrap();

    assert_eq!(
        fs::read_to_string(out_a).unwrap(),
        fs::read_to_string(out_b).unwrap()
    );
}

#[test]
fn test_activator_moves_at_first_commit_after_score() {
    // A switches on after step 3; X follows at step 4 under sync
    let registry = model(
        &["Variable", "Positive", "Negative", "Levels", "Initial", "Noise"],
        &[
            &["A", "", "", "2", "0,1[3]", "0"],
            &["X", "A", "", "2", "0", "0"],
        ],
    );
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("t.txt");
    let mut cfg = config(Discipline::Sync, &out);
    cfg.runs = 1;
    cfg.steps = 6;
    run_simulation(&registry, &cfg).unwrap();

    let text = fs::read_to_string(&out).unwrap();
    let lines = run_lines(&text, 0);
    assert_eq!(lines, vec!["A|2| 0 0 0 1 1 1 1", "X|2| 0 0 0 0 1 1 1"]);
}

#[test]
fn test_summary_mode_aggregates() {
    let registry = model(&HEADERS, &[&["A", "", "", "1,2[1]", ""]]);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("summary.txt");
    let mut cfg = config(Discipline::Round, &out);
    cfg.runs = 2;
    cfg.steps = 2;
    cfg.output_mode = OutputMode::Summary;
    let summary = run_simulation(&registry, &cfg).unwrap();

    let text = fs::read_to_string(&out).unwrap();
    assert_eq!(
        text,
        "Run #1\nFrequency Summary:\nA|3| 2 4 4\n\nSquares Summary:\nA|3| 2 8 8\n"
    );
    let stats = summary.element("A").unwrap();
    assert_eq!(stats.mean, vec![1.0, 2.0, 2.0]);
    assert_eq!(stats.std_dev, vec![0.0, 0.0, 0.0]);
}

#[test]
fn test_fixed_updates_truncates_to_schedule() {
    let registry = model(
        &HEADERS,
        &[&["A", "B", "", "0", ""], &["B", "!A", "", "0", ""]],
    );
    let dir = tempfile::tempdir().unwrap();
    let events = dir.path().join("events.txt");
    fs::write(&events, "Run #0\nA B A\nRun #1\nB B A\n").unwrap();

    let out = dir.path().join("out.txt");
    let mut cfg = config(Discipline::FixedUpdates, &out);
    cfg.steps = 5;
    cfg.event_traces = Some(events);
    let summary = run_simulation(&registry, &cfg).unwrap();

    assert_eq!(summary.steps, 3);
    assert_eq!(summary.runs, 2);
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("Run #1\n"));
    assert!(!text.contains("Run #2\n"));
}

#[test]
fn test_ra_event_trace_replays_exactly() {
    let registry = model(
        &HEADERS,
        &[
            &["A", "C", "B", "0", ""],
            &["B", "A", "!C", "h", ""],
            &["C", "!A", "", "m", ""],
        ],
    );
    let dir = tempfile::tempdir().unwrap();

    let events = dir.path().join("events.txt");
    let mut record = config(Discipline::Ra, &events);
    record.output_mode = OutputMode::EventTrace;
    run_simulation(&registry, &record).unwrap();

    let recorded = dir.path().join("recorded.txt");
    run_simulation(&registry, &config(Discipline::Ra, &recorded)).unwrap();

    let replayed = dir.path().join("replayed.txt");
    let mut replay = config(Discipline::FixedUpdates, &replayed);
    replay.event_traces = Some(events);
    replay.seed = Some(99);
    run_simulation(&registry, &replay).unwrap();

    assert_eq!(
        fs::read_to_string(recorded).unwrap(),
        fs::read_to_string(replayed).unwrap()
    );
}

#[test]
fn test_failed_run_leaves_no_trace() {
    let registry = model(&HEADERS, &[&["A", "", "", "0", ""]]);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    let mut cfg = config(Discipline::FixedUpdates, &out);
    cfg.event_traces = Some(dir.path().join("missing.txt"));

    let err = run_simulation(&registry, &cfg).unwrap_err();
    assert!(matches!(err, LevelNetError::Io(_)));
    assert!(!out.exists());
    assert!(!dir.path().join("out.txt.partial").exists());
}

#[test]
fn test_normalized_transpose() {
    let registry = model(
        &["Variable", "Positive", "Negative", "Levels", "Initial"],
        &[&["A", "", "", "5", "2"], &["B", "", "", "2", "1"]],
    );
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("t.txt");
    let mut cfg = config(Discipline::Sync, &out);
    cfg.runs = 1;
    cfg.steps = 2;
    cfg.normalize = true;
    cfg.output_mode = OutputMode::Transpose;
    let summary = run_simulation(&registry, &cfg).unwrap();

    assert_eq!(
        fs::read_to_string(&out).unwrap(),
        "# time A B step\n0  0.5 1.0 0\n1  0.5 1.0 1\n"
    );
    assert!(summary.normalized);
    assert_eq!(summary.element("A").unwrap().mean[2], 0.5);
}
