//! Text tensor format reader
//!
//! Tensors are stored one observation per line:
//!
//! ```text
//! # comment lines start with '#', blank lines are ignored
//! 1 1 1 4.0
//! 1 2 1 2.0
//! 2 1 2 3.0
//! ```
//!
//! Each data line holds `nmodes` 1-based integer indices followed by one
//! floating-point value, separated by spaces or tabs. The mode count is taken
//! from the first data line and fixed for the rest of the file.
//!
//! Reading is two-pass and streaming. The shape pass ([`scan_shape`]) infers
//! the mode count, the global extent of every mode and the number of
//! observations owned by an optional [`Layer`] of mode-0 slices, without
//! storing any observation. The fill pass ([`read_with_scan`]) reopens the
//! source and materializes only the owned observations, with mode-0 indices
//! stored relative to the layer start.
//!
//! # Examples
//!
//! ```
//! use tenrso_sparse::io::{read_tensor, MemorySource};
//! use tenrso_sparse::partition::Layer;
//!
//! let text = "1 1 1 4.0\n1 2 1 2.0\n2 1 2 3.0\n3 3 3 1.5\n2 2 2 5.0\n";
//! let source = MemorySource::new("example", text);
//!
//! let whole = read_tensor(&source, None).unwrap();
//! assert_eq!(whole.dims(), &[3, 3, 3]);
//! assert_eq!(whole.nnz(), 5);
//!
//! let layer = Layer::new(2, 3).unwrap();
//! let local = read_tensor(&source, Some(&layer)).unwrap();
//! assert_eq!(local.dims(), &[1, 3, 3]);
//! assert_eq!(local.nnz(), 1);
//! ```

use crate::coo::{SparseTensor, MAX_NMODES};
use crate::error::{SparseError, SparseResult};
use crate::partition::Layer;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// A restartable source of text lines
///
/// Every call to [`LineSource::open`] starts again from the first line.
pub trait LineSource {
    /// Open a fresh reader positioned at the start of the source
    fn open(&self) -> SparseResult<Box<dyn BufRead + '_>>;

    /// Label used in error messages and statistics
    fn name(&self) -> String;
}

/// Tensor file on disk, reopened for every pass
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LineSource for FileSource {
    fn open(&self) -> SparseResult<Box<dyn BufRead + '_>> {
        let file = File::open(&self.path).map_err(|source| SparseError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory tensor text
#[derive(Debug, Clone, Copy)]
pub struct MemorySource<'a> {
    name: &'a str,
    text: &'a str,
}

impl<'a> MemorySource<'a> {
    pub fn new(name: &'a str, text: &'a str) -> Self {
        Self { name, text }
    }
}

impl LineSource for MemorySource<'_> {
    fn open(&self) -> SparseResult<Box<dyn BufRead + '_>> {
        Ok(Box::new(self.text.as_bytes()))
    }

    fn name(&self) -> String {
        self.name.to_string()
    }
}

/// One parsed data line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// 1-based line number in the source
    pub line: usize,
    nmodes: usize,
    inds: [usize; MAX_NMODES],
    /// Observed value
    pub val: f64,
}

impl Record {
    /// 0-based indices, one per mode
    pub fn inds(&self) -> &[usize] {
        &self.inds[..self.nmodes]
    }
}

/// Lazy sequence of [`Record`]s read from a [`LineSource`]
///
/// Comment lines (first character `#`) and blank lines are skipped. After the
/// first error the iterator is exhausted.
pub struct Records<'a> {
    reader: Box<dyn BufRead + 'a>,
    source_name: String,
    buf: String,
    lineno: usize,
    nmodes: Option<usize>,
    failed: bool,
}

impl<'a> Records<'a> {
    /// Start reading `source` from its first line
    pub fn open<S: LineSource + ?Sized>(source: &'a S) -> SparseResult<Self> {
        Ok(Self {
            reader: source.open()?,
            source_name: source.name(),
            buf: String::new(),
            lineno: 0,
            nmodes: None,
            failed: false,
        })
    }

    /// Mode count, known once the first data line has been read
    pub fn nmodes(&self) -> Option<usize> {
        self.nmodes
    }

    fn infer_nmodes(&mut self, text: &str) -> SparseResult<usize> {
        let columns = text.split_whitespace().count();
        if columns < 2 {
            return Err(SparseError::Malformed {
                source_name: self.source_name.clone(),
                reason: format!(
                    "first data line (line {}) has {columns} column(s); \
                     need at least one index and a value",
                    self.lineno
                ),
            });
        }
        let nmodes = columns - 1;
        if nmodes > MAX_NMODES {
            return Err(SparseError::TooManyModes {
                found: nmodes,
                max: MAX_NMODES,
            });
        }
        self.nmodes = Some(nmodes);
        Ok(nmodes)
    }

    fn parse_line(&mut self) -> SparseResult<Record> {
        let text = std::mem::take(&mut self.buf);
        let result = self.parse_text(&text);
        self.buf = text;
        result
    }

    fn parse_text(&mut self, text: &str) -> SparseResult<Record> {
        let nmodes = match self.nmodes {
            Some(n) => n,
            None => self.infer_nmodes(text)?,
        };
        let line = self.lineno;
        let name = &self.source_name;

        let mut tokens = text.split_whitespace();
        let mut inds = [0usize; MAX_NMODES];
        for (m, slot) in inds.iter_mut().enumerate().take(nmodes) {
            let token = tokens.next().ok_or_else(|| {
                SparseError::parse(
                    name,
                    line,
                    format!("expected {} columns, found {m}", nmodes + 1),
                )
            })?;
            let one_based: usize = token.parse().map_err(|_| {
                SparseError::parse(name, line, format!("invalid index '{token}' in mode {}", m + 1))
            })?;
            *slot = one_based.checked_sub(1).ok_or_else(|| {
                SparseError::parse(name, line, format!("index 0 in mode {} (indices are 1-based)", m + 1))
            })?;
        }

        let token = tokens.next().ok_or_else(|| {
            SparseError::parse(
                name,
                line,
                format!("expected {} columns, found {nmodes}", nmodes + 1),
            )
        })?;
        let val: f64 = token
            .parse()
            .map_err(|_| SparseError::parse(name, line, format!("invalid value '{token}'")))?;

        if tokens.next().is_some() {
            return Err(SparseError::parse(
                name,
                line,
                format!("expected {} columns, found more", nmodes + 1),
            ));
        }

        Ok(Record {
            line,
            nmodes,
            inds,
            val,
        })
    }
}

impl Iterator for Records<'_> {
    type Item = SparseResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => self.lineno += 1,
                Err(source) => {
                    self.failed = true;
                    return Some(Err(SparseError::Io {
                        path: PathBuf::from(&self.source_name),
                        source,
                    }));
                }
            }

            if self.buf.starts_with('#') || self.buf.trim().is_empty() {
                continue;
            }

            let record = self.parse_line();
            self.failed = record.is_err();
            return Some(record);
        }
    }
}

/// Result of the shape pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeScan {
    /// Mode count inferred from the first data line
    pub nmodes: usize,
    /// Global extent of every mode (largest index seen, 1-based)
    pub dims: Vec<usize>,
    /// Observations owned by the scanned layer (all of them without one)
    pub nnz: usize,
    /// Observations in the whole source
    pub total_nnz: usize,
    /// Observations per mode-0 slice, over the whole source
    pub slice_nnz: Vec<usize>,
}

impl ShapeScan {
    /// Narrow a whole-source scan to the observations owned by `layer`
    pub fn restrict(&self, layer: &Layer) -> ShapeScan {
        let end = layer.end().min(self.slice_nnz.len());
        let start = layer.start().min(end);
        ShapeScan {
            nnz: self.slice_nnz[start..end].iter().sum(),
            ..self.clone()
        }
    }
}

/// Shape pass: infer mode count, global extents and the owned observation count
///
/// Extents are tracked over every data line, owned or not.
pub fn scan_shape<S: LineSource + ?Sized>(
    source: &S,
    layer: Option<&Layer>,
) -> SparseResult<ShapeScan> {
    let mut records = Records::open(source)?;
    let mut dims: Vec<usize> = Vec::new();
    let mut slice_nnz: Vec<usize> = Vec::new();
    let mut nnz = 0usize;
    let mut total_nnz = 0usize;

    for record in records.by_ref() {
        let record = record?;
        let inds = record.inds();
        if dims.is_empty() {
            dims = vec![0; inds.len()];
        }
        for (d, &i) in dims.iter_mut().zip(inds) {
            *d = (*d).max(i + 1);
        }

        let slice = inds[0];
        if slice >= slice_nnz.len() {
            slice_nnz.resize(slice + 1, 0);
        }
        slice_nnz[slice] += 1;

        total_nnz += 1;
        if layer.map_or(true, |l| l.contains(slice)) {
            nnz += 1;
        }
    }

    let nmodes = records.nmodes().ok_or_else(|| SparseError::Malformed {
        source_name: source.name(),
        reason: "no data lines".to_string(),
    })?;

    Ok(ShapeScan {
        nmodes,
        dims,
        nnz,
        total_nnz,
        slice_nnz,
    })
}

/// Fill pass: materialize the observations owned by `layer`
///
/// `scan` must come from a shape pass over the same source with the same
/// layer (or from [`ShapeScan::restrict`]). With a layer, mode 0 of the
/// result has the layer's width and its indices are relative to the layer
/// start; other modes keep the global extents from `scan`.
pub fn read_with_scan<S: LineSource + ?Sized>(
    source: &S,
    layer: Option<&Layer>,
    scan: &ShapeScan,
) -> SparseResult<SparseTensor> {
    let mut dims = scan.dims.clone();
    if let Some(layer) = layer {
        dims[0] = layer.width();
    }
    let offset = layer.map_or(0, Layer::start);

    let mut tt = SparseTensor::with_capacity(dims, scan.nnz)?;
    let mut local = [0usize; MAX_NMODES];
    let mut filled = 0usize;

    for record in Records::open(source)? {
        let record = record?;
        let inds = record.inds();
        if inds.len() != scan.nmodes {
            return Err(SparseError::parse(
                &source.name(),
                record.line,
                format!("expected {} modes, found {}", scan.nmodes, inds.len()),
            ));
        }
        if !layer.map_or(true, |l| l.contains(inds[0])) {
            continue;
        }

        filled += 1;
        if filled > scan.nnz {
            continue;
        }
        local[..inds.len()].copy_from_slice(inds);
        local[0] -= offset;
        tt.push(&local[..inds.len()], record.val)?;
    }

    if filled != scan.nnz {
        return Err(SparseError::Inconsistent {
            source_name: source.name(),
            expected: scan.nnz,
            got: filled,
        });
    }

    Ok(tt)
}

/// Read the observations of `source` owned by `layer` (all of them without one)
pub fn read_tensor<S: LineSource + ?Sized>(
    source: &S,
    layer: Option<&Layer>,
) -> SparseResult<SparseTensor> {
    let scan = scan_shape(source, layer)?;
    read_with_scan(source, layer, &scan)
}

/// Read a whole tensor file
pub fn read_tensor_file(path: impl AsRef<Path>) -> SparseResult<SparseTensor> {
    read_tensor(&FileSource::new(path.as_ref()), None)
}
