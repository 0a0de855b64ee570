//! End-to-end completion runs over tensor files on disk

use std::fs;
use std::path::{Path, PathBuf};
use tenrso_completion::driver::{run, CompletionConfig};
use tenrso_completion::{Algorithm, CompletionError, TcOptions};
use tenrso_sparse::{read_tensor_file, SparseError};

/// Rank-one tensor values on a 8x6x5 grid, split into train and validation
fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let mut train = String::from("# train\n");
    let mut validate = String::from("# validation\n");
    for i in 0..8 {
        for j in 0..6 {
            for k in 0..5 {
                let v = (1.0 + 0.1 * i as f64) * (0.5 + 0.2 * j as f64) * (1.0 + 0.05 * k as f64);
                let line = format!("{} {} {} {v}\n", i + 1, j + 1, k + 1);
                if (i + 2 * j + 3 * k) % 4 == 0 {
                    validate.push_str(&line);
                } else {
                    train.push_str(&line);
                }
            }
        }
    }

    let train_path = dir.join("train.tns");
    let validate_path = dir.join("validate.tns");
    fs::write(&train_path, train).unwrap();
    fs::write(&validate_path, validate).unwrap();
    (train_path, validate_path)
}

fn config(dir: &Path, options: TcOptions) -> CompletionConfig {
    let (train, validate) = write_inputs(dir);
    CompletionConfig {
        options,
        output_dir: dir.to_path_buf(),
        ..CompletionConfig::new(train, validate)
    }
}

fn run_to_string(config: &CompletionConfig) -> (tenrso_completion::RunSummary, String) {
    let mut out = Vec::new();
    let summary = run(config, &mut out).unwrap();
    (summary, String::from_utf8(out).unwrap())
}

#[test]
fn test_als_fixed_seed_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let options = TcOptions {
        algorithm: Algorithm::Als,
        rank: 3,
        max_its: 10,
        seed: Some(7),
        rand_per_iteration: false,
        ..TcOptions::default()
    };
    let config = config(dir.path(), options);

    let (first, _) = run_to_string(&config);
    let (second, _) = run_to_string(&config);

    assert_eq!(first.best_rmse, second.best_rmse);
    assert_eq!(first.best_epoch, second.best_epoch);
    assert_eq!(first.factors, second.factors);
    assert_eq!(first.seed, 7);
}

#[test]
fn test_report_lines() {
    let dir = tempfile::tempdir().unwrap();
    let options = TcOptions {
        algorithm: Algorithm::Ccd,
        rank: 2,
        max_its: 5,
        seed: Some(1),
        ..TcOptions::default()
    };
    let (summary, text) = run_to_string(&config(dir.path(), options));

    assert!(text.contains("Tensor information"));
    assert!(text.contains("DIMS=8x6x5"));
    assert!(text.contains("Factoring"));
    assert!(text.contains("NFACTORS=2 MAXITS=5"));
    assert!(text.contains("ALG=CCD"));
    assert!(text.contains(&format!("validation nnz: {}", summary.validate_nnz)));
    assert!(text.contains("BEST VALIDATION RMSE:"));
    assert!(!text.contains("TEST RMSE"));

    // the printed best figures are those of the best model
    let printed = format!(
        "BEST VALIDATION RMSE: {:0.5} MAE: {:0.5} (epoch {})",
        summary.best_rmse, summary.best_mae, summary.best_epoch
    );
    assert!(text.contains(&printed));
}

#[test]
fn test_best_rmse_non_increasing() {
    let dir = tempfile::tempdir().unwrap();
    let options = TcOptions {
        algorithm: Algorithm::Sgd,
        rank: 2,
        max_its: 20,
        folds: 3,
        learn_rate: Some(0.02),
        seed: Some(3),
        ..TcOptions::default()
    };
    let (summary, _) = run_to_string(&config(dir.path(), options));

    assert_eq!(summary.history.len(), summary.epochs);
    assert!(summary.epochs >= 3);
    for pair in summary.history.windows(2) {
        assert!(pair[1].best_rmse <= pair[0].best_rmse);
    }
    let best = summary
        .history
        .iter()
        .map(|rec| rec.val_rmse)
        .fold(f64::INFINITY, f64::min);
    assert!((summary.best_rmse - best).abs() < 1e-9);
}

#[test]
fn test_time_limit_stops_training() {
    let dir = tempfile::tempdir().unwrap();
    let options = TcOptions {
        algorithm: Algorithm::Gd,
        rank: 2,
        max_its: 500,
        max_seconds: Some(1e-9),
        seed: Some(5),
        ..TcOptions::default()
    };
    let (summary, _) = run_to_string(&config(dir.path(), options));
    assert_eq!(summary.epochs, 1);
}

#[test]
fn test_time_override_printing() {
    let dir = tempfile::tempdir().unwrap();
    for (time, expected) in [(0.0, "MAXTIME=NONE"), (-5.0, "MAXTIME=NONE"), (30.0, "MAXTIME=30.0s")] {
        let options = TcOptions {
            algorithm: Algorithm::Als,
            rank: 2,
            max_its: 2,
            max_seconds: Some(time),
            seed: Some(1),
            ..TcOptions::default()
        };
        let (_, text) = run_to_string(&config(dir.path(), options));
        assert!(text.contains(expected), "--time {time}: {text}");
    }
}

#[test]
fn test_distributed_counts_match_single_process() {
    let dir = tempfile::tempdir().unwrap();
    let options = TcOptions {
        algorithm: Algorithm::Sgd,
        rank: 2,
        max_its: 5,
        seed: Some(11),
        ..TcOptions::default()
    };
    let mut config = config(dir.path(), options);
    let train_nnz = read_tensor_file(&config.train_path).unwrap().nnz();
    let validate_nnz = read_tensor_file(&config.validate_path).unwrap().nnz();

    for participants in [1, 2, 3, 5] {
        config.participants = participants;
        let (summary, text) = run_to_string(&config);
        assert_eq!(summary.participants, participants);
        assert_eq!(summary.train_nnz, train_nnz);
        assert_eq!(summary.validate_nnz, validate_nnz);
        assert_eq!(summary.factors[0].nrows(), 8);
        assert!(text.contains(&format!("validation nnz: {validate_nnz}")));
    }
}

#[test]
fn test_distributed_requires_sgd_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = CompletionConfig::new(dir.path().join("absent.tns"), dir.path().join("absent2.tns"));
    config.options.algorithm = Algorithm::Als;
    config.participants = 2;

    let err = run(&config, &mut Vec::<u8>::new()).unwrap_err();
    assert!(matches!(err, CompletionError::Unsupported(_)), "{err}");
}

#[test]
fn test_missing_train_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = CompletionConfig::new(dir.path().join("absent.tns"), dir.path().join("v.tns"));
    let err = run(&config, &mut Vec::<u8>::new()).unwrap_err();
    assert!(matches!(err, CompletionError::Sparse(SparseError::Io { .. })));
}

#[test]
fn test_write_and_test_tensor() {
    let dir = tempfile::tempdir().unwrap();
    let options = TcOptions {
        algorithm: Algorithm::Als,
        rank: 2,
        max_its: 3,
        seed: Some(2),
        write: true,
        ..TcOptions::default()
    };
    let mut config = config(dir.path(), options);

    // one entry past the trained extent of mode 0
    let test_path = dir.path().join("test.tns");
    fs::write(&test_path, "1 1 1 0.5\n2 3 4 0.9\n12 1 1 1.0\n").unwrap();
    config.test_path = Some(test_path);

    let (summary, text) = run_to_string(&config);
    let test = summary.test.unwrap();
    assert_eq!(test.nnz, 3);
    assert_eq!(test.uncovered, 1);
    assert!(text.contains("test nnz: 3"));
    assert!(text.contains("TEST RMSE:"));

    assert_eq!(summary.written.len(), 3);
    assert!(summary.write_failures.is_empty());
    let mode1 = fs::read_to_string(dir.path().join("mode1.mat")).unwrap();
    assert!(mode1.starts_with("# 8 2\n"));
    assert_eq!(mode1.lines().count(), 9);
    assert!(dir.path().join("mode3.mat").exists());
}

#[test]
fn test_mode_count_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), TcOptions::default());
    let validate = dir.path().join("two-mode.tns");
    fs::write(&validate, "1 1 2.0\n").unwrap();
    config.validate_path = validate;

    let err = run(&config, &mut Vec::<u8>::new()).unwrap_err();
    assert!(matches!(err, CompletionError::ShapeMismatch(_)));
}
