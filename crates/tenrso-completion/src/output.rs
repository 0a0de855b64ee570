//! Factor matrix output
//!
//! Mode `m` of the model is written to `mode{m+1}.mat`:
//!
//! ```text
//! # I J
//! +1.00000000e0 -2.50000000e-1 ...
//! ```
//!
//! one line per row, `J` (the rank) values per line. In a distributed run
//! the mode-0 rows are gathered on the root in rank order first; only the
//! root writes.

use crate::error::{CompletionError, CompletionResult};
use crate::model::TcModel;
use crate::topology::Communicator;
use scirs2_core::ndarray_ext::Array2;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Files written and failures met while emitting a model
#[derive(Debug, Default)]
pub struct EmitReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<CompletionError>,
}

/// File name of mode `mode` (0-based)
pub fn mode_file_name(mode: usize) -> String {
    format!("mode{}.mat", mode + 1)
}

/// Write one dense matrix in the text matrix format
pub fn write_matrix(path: &Path, matrix: &Array2<f64>) -> CompletionResult<()> {
    let to_err = |source| CompletionError::Output {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(to_err)?;
    let mut out = BufWriter::new(file);
    let (rows, cols) = matrix.dim();
    writeln!(out, "# {rows} {cols}").map_err(to_err)?;
    for row in matrix.rows() {
        let line: Vec<String> = row.iter().map(|v| format!("{v:+.8e}")).collect();
        writeln!(out, "{}", line.join(" ")).map_err(to_err)?;
    }
    out.flush().map_err(to_err)
}

/// Assemble the full mode-0 factor on the root
///
/// Every participant must call this. Returns `None` off the root.
pub fn gather_mode0(model: &TcModel, comm: &dyn Communicator) -> Option<Array2<f64>> {
    let local: Vec<f64> = model.factor(0).iter().copied().collect();
    let parts = comm.gather(local)?;

    let rank = model.rank();
    let flat: Vec<f64> = parts.into_iter().flatten().collect();
    let rows = flat.len() / rank;
    Array2::from_shape_vec((rows, rank), flat).ok()
}

/// Write every factor of `model` into `dir`
///
/// Every participant must call this; the root does the writing. Failures are
/// logged and reported, not returned.
pub fn write_factors(model: &TcModel, comm: &dyn Communicator, dir: &Path) -> EmitReport {
    let mut report = EmitReport::default();
    let Some(mode0) = gather_mode0(model, comm) else {
        return report;
    };

    let matrices = std::iter::once(&mode0).chain(model.factors()[1..].iter());
    for (m, matrix) in matrices.enumerate() {
        let path = dir.join(mode_file_name(m));
        match write_matrix(&path, matrix) {
            Ok(()) => {
                info!(path = %path.display(), rows = matrix.nrows(), "wrote factor");
                report.written.push(path);
            }
            Err(err) => {
                warn!("{err}");
                report.failed.push(err);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{LocalCommunicator, SoloCommunicator};

    #[test]
    fn test_matrix_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.mat");
        let matrix = Array2::from_shape_vec((2, 2), vec![1.0, -0.25, 0.0, 12345.678]).unwrap();
        write_matrix(&path, &matrix).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# 2 2");
        assert_eq!(lines[1], "+1.00000000e0 -2.50000000e-1");
        assert_eq!(lines.len(), 3);
        let parsed: Vec<f64> = lines[2].split(' ').map(|t| t.parse().unwrap()).collect();
        assert_eq!(parsed, vec![0.0, 12345.678]);
    }

    #[test]
    fn test_write_factors_names() {
        let dir = tempfile::tempdir().unwrap();
        let model = TcModel::random(&[3, 4, 5], 2, 1, 0).unwrap();
        let report = write_factors(&model, &SoloCommunicator, dir.path());
        assert!(report.failed.is_empty());
        assert_eq!(report.written.len(), 3);
        let text = std::fs::read_to_string(dir.path().join("mode3.mat")).unwrap();
        assert!(text.starts_with("# 5 2\n"));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir");
        let model = TcModel::random(&[2, 2], 1, 1, 0).unwrap();
        let report = write_factors(&model, &SoloCommunicator, &missing);
        assert!(report.written.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(matches!(report.failed[0], CompletionError::Output { .. }));
    }

    #[test]
    fn test_gather_mode0_rank_order() {
        let comms = LocalCommunicator::group(2);
        let gathered: Vec<Option<Array2<f64>>> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let rows = comm.rank() + 1;
                        let mut model = TcModel::zeros(&[rows, 3], 2).unwrap();
                        model.factor_mut(0).fill(comm.rank() as f64);
                        gather_mode0(&model, comm)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let full = gathered[0].as_ref().unwrap();
        assert_eq!(full.dim(), (3, 2));
        assert_eq!(full.row(0).to_vec(), vec![0.0, 0.0]);
        assert_eq!(full.row(2).to_vec(), vec![1.0, 1.0]);
        assert!(gathered[1].is_none());
    }
}
