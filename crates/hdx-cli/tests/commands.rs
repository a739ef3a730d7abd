use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use hdx_cli::commands::{
    global::{self, GlobalArgs},
    guess::{self, GuessArgs},
    load_deltag, load_measurements,
    pipeline::{self, PipelineArgs},
};
use hdx_cli::HdxConfig;
use hdx_kinetics::k_obs;
use tempfile::tempdir;

const TEMPERATURE: f64 = 300.0;
const PEPTIDES: [(i64, i64); 5] = [(1, 5), (3, 8), (5, 6), (6, 12), (8, 12)];
const TIMES: [f64; 6] = [0.0, 0.5, 1.0, 10.0, 60.0, 300.0];

fn deltag(r: i64, shift: f64) -> f64 {
    15_000.0 + 4_000.0 * ((r - 1) as f64 * 0.7).sin() + shift
}

fn write_inputs(dir: &Path) {
    let mut table = String::from("state,exposure,start,end,sequence,uptake,uptake_sd\n");
    for (state, shift) in [("apo", 0.0), ("bound", 2_000.0)] {
        for (start, end) in PEPTIDES {
            for t in TIMES {
                let uptake: f64 = ((start + 1)..=end)
                    .map(|r| 1.0 - (-k_obs(deltag(r, shift), 10.0, TEMPERATURE) * t).exp())
                    .sum();
                writeln!(table, "{state},{t},{start},{end},,{uptake},").unwrap();
            }
        }
    }
    fs::write(dir.join("peptides.csv"), table).unwrap();

    let mut rates = String::from("r_number,k_int\n");
    for r in 1..=12 {
        writeln!(rates, "{r},10.0").unwrap();
    }
    fs::write(dir.join("k_int.csv"), rates).unwrap();

    let config = "temperature: 300.0\n\
                  guess:\n  method: single-exponential\n  parallel: false\n\
                  global:\n  epochs: 40\n  r1: 0.5\n  r2: 0.1\n  log_interval: 0\n  covariance: false\n";
    fs::write(dir.join("config.yaml"), config).unwrap();
}

#[test]
fn pipeline_writes_guesses_and_fit() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());
    let out = dir.path().join("out");
    pipeline::run(&PipelineArgs {
        data: dir.path().join("peptides.csv"),
        k_int: dir.path().join("k_int.csv"),
        config: Some(dir.path().join("config.yaml")),
        out: out.clone(),
        epochs: None,
    })
    .unwrap();

    for name in ["guess_apo.csv", "guess_bound.csv", "fit.csv", "losses.csv", "result.json"] {
        assert!(out.join(name).exists(), "missing {name}");
    }
    let written = HdxConfig::load(Some(out.join("config.yaml").as_path())).unwrap();
    assert_eq!(written.global.epochs, 40);
    assert_eq!(written.temperature, 300.0);
    let fit = fs::read_to_string(out.join("fit.csv")).unwrap();
    assert!(fit.starts_with("# states: apo;bound\n"));
    assert!(fit.contains("# r2: 0.1\n"));
    assert_eq!(fit.lines().filter(|l| l.starts_with("bound,")).count(), 12);
    let losses = fs::read_to_string(out.join("losses.csv")).unwrap();
    assert_eq!(losses.lines().count(), 41);
}

#[test]
fn guess_respects_state_filter() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());
    let out = dir.path().join("guess");
    guess::run(&GuessArgs {
        data: dir.path().join("peptides.csv"),
        config: Some(dir.path().join("config.yaml")),
        out: out.clone(),
        states: vec!["bound".to_string()],
    })
    .unwrap();
    assert!(out.join("guess_bound.csv").exists());
    assert!(!out.join("guess_apo.csv").exists());
    let text = fs::read_to_string(out.join("guess_bound.csv")).unwrap();
    assert!(text.starts_with("# state: bound\n"));

    let missing = guess::run(&GuessArgs {
        data: dir.path().join("peptides.csv"),
        config: None,
        out,
        states: vec!["holo".to_string()],
    });
    assert!(missing.is_err());
}

#[test]
fn global_reads_initial_table_with_gaps() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());
    fs::write(
        dir.path().join("initial.csv"),
        "r_number,dG\n1,14000\n2,14000\n4,16000\n12,\n",
    )
    .unwrap();
    let initial = load_deltag(&dir.path().join("initial.csv")).unwrap();
    assert_eq!(initial.n_residues(), 12);
    assert_eq!(initial.get(0, 3), Some(15_000.0));
    assert!(initial.values().iter().all(|g| g.is_finite()));

    let out = dir.path().join("global");
    global::run(&GlobalArgs {
        data: dir.path().join("peptides.csv"),
        k_int: dir.path().join("k_int.csv"),
        initial: dir.path().join("initial.csv"),
        config: Some(dir.path().join("config.yaml")),
        out: out.clone(),
        epochs: Some(5),
    })
    .unwrap();
    let losses = fs::read_to_string(out.join("losses.csv")).unwrap();
    assert_eq!(losses.lines().count(), 6);
}

#[test]
fn accelerator_config_fails_before_reading_data() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.yaml"), "global:\n  device: accelerator\n").unwrap();
    let err = global::run(&GlobalArgs {
        data: dir.path().join("does_not_exist.csv"),
        k_int: dir.path().join("does_not_exist.csv"),
        initial: dir.path().join("does_not_exist.csv"),
        config: Some(dir.path().join("config.yaml")),
        out: dir.path().join("out"),
        epochs: None,
    })
    .unwrap_err();
    assert!(err.to_string().contains("accelerator"));
}

#[test]
fn defaults_apply_without_config_file() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());
    let config = HdxConfig::load(None).unwrap();
    assert_eq!(config, HdxConfig::default());
    let set = load_measurements(&dir.path().join("peptides.csv"), &config).unwrap();
    assert_eq!(set.names(), vec!["apo".to_string(), "bound".to_string()]);
    assert_eq!(set.r_start(), 1);
    assert_eq!(set.r_end(), 12);
}
