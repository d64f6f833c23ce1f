//! Module `part` implement [Partition], a contiguous independently
//! stored slab of rows: the unit of append and of query fan-out.
//!
//! A partition is a directory of column files plus a `part.meta` CBOR
//! document recording the schema (column names, element types, value
//! bounds, sorted flags) and the row count. All columns of a partition
//! have exactly the same number of rows.

use cbordata::Cborize;
use log::{info, warn};

use std::{convert::TryFrom, ffi, fs, path, sync::Arc};

use crate::{
    bitvector::Bitvector,
    colvec::Values,
    config::Params,
    index::BuildSpec,
    query::{DiscreteSet, Range},
    types::ElementType,
    util, Column, Error, Result,
};

const META_FILE: &str = "part.meta";
const PART_META_VER: u32 = 0x00010001;

#[derive(Clone, Default, Cborize)]
struct ColMeta {
    name: String,
    typ_code: u8,
    description: String,
    lower: f64,
    upper: f64,
    sorted: bool,
}

impl ColMeta {
    const ID: u32 = PART_META_VER;
}

#[derive(Clone, Default, Cborize)]
struct PartMeta {
    name: String,
    nrows: u64,
    /// Seconds from UNIX epoch, UTC, when the partition was built or
    /// last appended to.
    epoch: u64,
    columns: Vec<ColMeta>,
}

impl PartMeta {
    const ID: u32 = PART_META_VER;

    fn location(dir: &ffi::OsStr) -> ffi::OsString {
        let loc: path::PathBuf = [dir, ffi::OsStr::new(META_FILE)].iter().collect();
        loc.into_os_string()
    }

    fn read(dir: &ffi::OsStr) -> Result<PartMeta> {
        let loc = PartMeta::location(dir);
        let data = err_at!(IOError, fs::read(&loc), "{:?}", loc)?;
        Ok(util::from_cbor_bytes(&data)?.0)
    }

    fn write(&self, dir: &ffi::OsStr) -> Result<()> {
        let data = util::into_cbor_bytes(self.clone())?;
        crate::column::write_whole(&PartMeta::location(dir), &data)
    }
}

/// One partition of a table: a directory of column files and the
/// columns opened over them.
pub struct Partition {
    name: String,
    dir: ffi::OsString,
    nrows: u32,
    params: Params,
    cols: Vec<Arc<Column>>,
}

impl Partition {
    /// Create a partition under `dir` from in-memory buffers, one
    /// `(name, type, values, mask)` per column; a `None` mask means
    /// all-valid. Writes data files, null masks and metadata.
    pub fn create(
        dir: &ffi::OsStr,
        name: &str,
        columns: Vec<(String, ElementType, Values, Option<Bitvector>)>,
        params: Params,
    ) -> Result<Partition> {
        err_at!(IOError, fs::create_dir_all(dir))?;
        let nrows = match columns.first() {
            Some((_, _, values, _)) => util::to_u32(values.len())?,
            None => 0,
        };

        let mut metas = vec![];
        for (cname, typ, values, mask) in columns.iter() {
            if values.len() != nrows as usize {
                return err_at!(
                    InvalidInput, msg: "column {} has {} rows, partition {}",
                    cname, values.len(), nrows
                );
            }
            let col = Column::new(cname, *typ, name, dir, nrows, params.clone());
            let mask = match mask {
                Some(mask) => mask.clone(),
                None => Bitvector::filled(true, nrows as usize),
            };
            col.write_values(values, &mask)?;

            let (lower, upper) = if typ.is_numeric() {
                col.actual_min_max(&mask)?
            } else {
                (1.0, -1.0)
            };
            metas.push(ColMeta {
                name: cname.clone(),
                typ_code: typ.to_code(),
                description: String::default(),
                lower,
                upper,
                sorted: false,
            });
        }

        let meta = PartMeta {
            name: name.to_string(),
            nrows: nrows as u64,
            epoch: epoch_secs(),
            columns: metas,
        };
        meta.write(dir)?;
        info!(
            target: "part   ",
            "{:?}, created partition {} with {} columns, {} rows",
            dir, name, meta.columns.len(), nrows
        );
        Partition::open(dir, params)
    }

    /// Open the partition stored under `dir`.
    pub fn open(dir: &ffi::OsStr, params: Params) -> Result<Partition> {
        let meta = PartMeta::read(dir)?;
        let nrows = err_at!(FailConvert, u32::try_from(meta.nrows))?;

        let mut cols = vec![];
        for cm in meta.columns.iter() {
            let typ = ElementType::from_code(cm.typ_code)?;
            let mut col = Column::new(&cm.name, typ, &meta.name, dir, nrows, params.clone());
            col.set_description(&cm.description);
            col.set_bounds(cm.lower, cm.upper);
            col.set_sorted(cm.sorted);
            cols.push(Arc::new(col));
        }

        Ok(Partition {
            name: meta.name,
            dir: dir.to_os_string(),
            nrows,
            params,
            cols,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nrows(&self) -> u32 {
        self.nrows
    }

    pub fn current_data_dir(&self) -> &ffi::OsStr {
        &self.dir
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.cols
    }

    pub fn get_column(&self, name: &str) -> Option<Arc<Column>> {
        self.cols.iter().find(|c| c.name() == name).map(Arc::clone)
    }

    /// Partition-level active-row mask; every row of a healthy
    /// partition is active.
    pub fn null_mask(&self) -> Bitvector {
        Bitvector::filled(true, self.nrows as usize)
    }

    /// Exact hits for a continuous range over the whole partition.
    pub fn query_range(&self, range: &Range) -> Result<Bitvector> {
        match self.get_column(&range.column) {
            Some(col) => col.evaluate_range(range, &self.null_mask()),
            None => err_at!(KeyNotFound, msg: "column {} in {}", range.column, self.name),
        }
    }

    /// Exact hits for a discrete membership predicate.
    pub fn query_discrete(&self, set: &DiscreteSet) -> Result<Bitvector> {
        match self.get_column(&set.column) {
            Some(col) => col.evaluate_discrete(set, &self.null_mask()),
            None => err_at!(KeyNotFound, msg: "column {} in {}", set.column, self.name),
        }
    }

    /// Scan `range` under a candidate mask; the refinement callback of
    /// the predicate pipeline.
    pub fn do_scan(&self, range: &Range, candidates: &Bitvector) -> Result<Bitvector> {
        match self.get_column(&range.column) {
            Some(col) => col.scan_range(range, candidates),
            None => err_at!(KeyNotFound, msg: "column {} in {}", range.column, self.name),
        }
    }

    /// `(guaranteed, possible)` hit counts from the index alone.
    pub fn estimate(&self, range: &Range) -> (u64, u64) {
        match self.get_column(&range.column) {
            Some(col) => col.estimate_range(range),
            None => (0, 0),
        }
    }

    /// Build and persist a bitmap index for the named column.
    pub fn build_index(&self, colname: &str, spec: &BuildSpec) -> Result<()> {
        match self.get_column(colname) {
            Some(col) => col.build_index(spec),
            None => err_at!(KeyNotFound, msg: "column {} in {}", colname, self.name),
        }
    }

    /// `(lo, hi, count)` buckets describing the value distribution of
    /// a column, from its index when one is usable, else from a scan.
    pub fn distribution(&self, colname: &str) -> Result<Vec<(f64, f64, u32)>> {
        let col = match self.get_column(colname) {
            Some(col) => col,
            None => return err_at!(KeyNotFound, msg: "column {} in {}", colname, self.name),
        };
        match col.index_distribution() {
            Ok(dist) => Ok(dist),
            Err(err) => {
                warn!(
                    target: "part   ",
                    "{}.{}, distribution from scan: {}", self.name, colname, err
                );
                scan_distribution(&col)
            }
        }
    }

    /// Append the same-named columns found under `df`. Columns this
    /// partition carries that the source lacks are padded with
    /// sentinels and cleared mask bits; columns only the source has
    /// are ignored. Metadata is rewritten last.
    pub fn append(&mut self, df: &ffi::OsStr) -> Result<u32> {
        let nnew = match PartMeta::read(df) {
            Ok(meta) => err_at!(FailConvert, u32::try_from(meta.nrows))?,
            Err(_) => {
                // a bare directory of column files; infer from the
                // first column present
                let mut nnew = 0;
                for col in self.cols.iter() {
                    let loc = util::to_column_location(df, col.name(), "");
                    let esz = col.element_type().element_size();
                    if esz > 0 && util::file_size(&loc) > 0 {
                        nnew = (util::file_size(&loc) as usize / esz) as u32;
                        break;
                    }
                }
                nnew
            }
        };
        if nnew == 0 {
            return err_at!(InvalidInput, msg: "nothing to append from {:?}", df);
        }

        for col in self.cols.iter() {
            col.append(&self.dir, df, self.nrows, nnew)?;
        }

        let mut meta = PartMeta::read(&self.dir)?;
        meta.nrows += nnew as u64;
        meta.epoch = epoch_secs();
        for cm in meta.columns.iter_mut() {
            // bounds are stale until the next min/max scan
            cm.lower = 1.0;
            cm.upper = -1.0;
            cm.sorted = false;
        }
        meta.write(&self.dir)?;
        info!(
            target: "part   ",
            "{}, appended {} rows from {:?}", self.name, nnew, df
        );

        *self = Partition::open(&self.dir, self.params.clone())?;
        Ok(nnew)
    }
}

fn epoch_secs() -> u64 {
    use chrono::Utc;

    Utc::now().timestamp() as u64
}

// equi-width histogram from a scan, for columns without an index.
fn scan_distribution(col: &Column) -> Result<Vec<(f64, f64, u32)>> {
    let nbins = crate::index::NBINS;
    let mask = col.null_mask()?;
    let (vals, _) = col.to_f64_values(&mask)?;

    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in vals.iter().filter(|v| !v.is_nan()) {
        lo = lo.min(*v);
        hi = hi.max(*v);
    }
    if lo > hi {
        return Ok(vec![]);
    }
    let width = if hi > lo { (hi - lo) / (nbins as f64) } else { 1.0 };
    let mut counts = vec![0u32; nbins];
    for v in vals.into_iter().filter(|v| !v.is_nan()) {
        let bin = (((v - lo) / width) as usize).min(nbins - 1);
        counts[bin] += 1;
    }
    Ok(counts
        .into_iter()
        .enumerate()
        .filter(|(_, n)| *n > 0)
        .map(|(i, n)| (lo + width * (i as f64), lo + width * ((i + 1) as f64), n))
        .collect())
}

#[cfg(test)]
#[path = "part_test.rs"]
mod part_test;
