//! Package implement [Table], the multi-partition front door. A table
//! is a list of partitions plus the aggregated schema; every query
//! fans out per partition (in parallel, bounded by the configured
//! thread count) and the results concatenate into one [MemTable].

use log::warn;
use rayon::prelude::*;

use std::{cmp, collections::BTreeMap, ffi};

use crate::{
    config::Params,
    query::{DiscreteSet, Range, SelectClause},
    types::{Element, ElementType},
    Bitvector, Error, Partition, Result,
};

mod cursor;
pub(crate) mod mem;

pub use cursor::Cursor;
pub use mem::MemTable;

/// A logical table over one or more partitions.
pub struct Table {
    name: String,
    params: Params,
    parts: Vec<Partition>,
}

impl Table {
    pub fn new(name: &str, params: Params) -> Table {
        Table {
            name: name.to_string(),
            params,
            parts: vec![],
        }
    }

    /// Open every sub-directory of `dir` that holds partition
    /// metadata, in name order for deterministic iteration.
    pub fn open(name: &str, dir: &ffi::OsStr, params: Params) -> Result<Table> {
        let mut table = Table::new(name, params.clone());
        let mut dirs: Vec<std::path::PathBuf> = vec![];
        let entries = err_at!(IOError, std::fs::read_dir(dir), "{:?}", dir)?;
        for entry in entries {
            let entry = err_at!(IOError, entry)?;
            if err_at!(IOError, entry.file_type())?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        for pdir in dirs.into_iter() {
            match Partition::open(pdir.as_os_str(), params.clone()) {
                Ok(part) => table.add_partition(part),
                Err(err) => warn!(
                    target: "table  ",
                    "{}, skipping {:?}: {}", name, pdir, err
                ),
            }
        }
        Ok(table)
    }

    pub fn add_partition(&mut self, part: Partition) {
        self.parts.push(part);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parts(&self) -> &[Partition] {
        &self.parts
    }

    pub fn nrows(&self) -> u64 {
        self.parts.iter().map(|p| p.nrows() as u64).sum()
    }

    /// Union of the partition schemas, first-seen order. A column
    /// reappearing with a different type keeps the first-seen type
    /// with a warning.
    pub fn column_names(&self) -> Vec<String> {
        self.schema().into_iter().map(|(name, _)| name).collect()
    }

    pub fn column_types(&self) -> Vec<ElementType> {
        self.schema().into_iter().map(|(_, typ)| typ).collect()
    }

    fn schema(&self) -> Vec<(String, ElementType)> {
        let mut out: Vec<(String, ElementType)> = vec![];
        for part in self.parts.iter() {
            for col in part.columns().iter() {
                match out.iter().find(|(name, _)| name == col.name()) {
                    Some((name, typ)) if *typ != col.element_type() => {
                        warn!(
                            target: "table  ",
                            "{}, column {} is {:?} here, {:?} in partition {}; keeping {:?}",
                            self.name, name, typ, col.element_type(), part.name(), typ
                        );
                    }
                    Some(_) => (),
                    None => out.push((col.name().to_string(), col.element_type())),
                }
            }
        }
        out
    }

    /// Sum of the per-partition index estimates; partitions without a
    /// usable index contribute `(0, nrows)`.
    pub fn estimate(&self, cond: &Range) -> (u64, u64) {
        let mut nmin = 0;
        let mut nmax = 0;
        for part in self.parts.iter() {
            let (lo, hi) = part.estimate(cond);
            nmin += lo;
            nmax += hi;
        }
        (nmin, nmax)
    }

    /// Evaluate `cond` on every partition in parallel, materialize the
    /// projected columns under each hit bitmap, and append everything
    /// into one in-memory table. A failing partition degrades to a
    /// warning; a table where every partition failed is empty, not an
    /// error.
    pub fn select(&self, sel: &SelectClause, cond: &Range) -> Result<MemTable> {
        self.select_with(sel, |part| part.query_range(cond))
    }

    /// As [Table::select] for a discrete membership predicate.
    pub fn select_in(&self, sel: &SelectClause, cond: &DiscreteSet) -> Result<MemTable> {
        self.select_with(sel, |part| part.query_discrete(cond))
    }

    fn select_with<F>(&self, sel: &SelectClause, query: F) -> Result<MemTable>
    where
        F: Fn(&Partition) -> Result<Bitvector> + Send + Sync,
    {
        let pool = err_at!(
            ThreadFail,
            rayon::ThreadPoolBuilder::new()
                .num_threads(cmp::max(1, self.params.threads))
                .build()
        )?;
        let hits: Vec<Result<Bitvector>> =
            pool.install(|| self.parts.par_iter().map(|part| query(part)).collect());

        let mut out = MemTable::new(&self.name);
        for (part, hit) in self.parts.iter().zip(hits.into_iter()) {
            match hit {
                Ok(hits) => out.append(sel, part, &hits)?,
                Err(err) => warn!(
                    target: "table  ",
                    "{}, partition {} failed, dropped from result: {}",
                    self.name, part.name(), err
                ),
            }
        }
        Ok(out)
    }

    /// Concatenate one column across every partition with safe
    /// widening into `T`. The running offset is checked so oversized
    /// tables abort early instead of wrapping.
    pub fn column_as<T>(&self, name: &str) -> Result<Vec<T>>
    where
        T: Element,
    {
        let mut out: Vec<T> = vec![];
        let mut offset: i64 = 0;
        for part in self.parts.iter() {
            let col = match part.get_column(name) {
                Some(col) => col,
                None => continue, // schema union; absent here
            };
            offset = match offset.checked_add(col.nrows() as i64) {
                Some(offset) => offset,
                None => {
                    return err_at!(
                        ResourceExhausted, msg: "row offset overflow at partition {}",
                        part.name()
                    )
                }
            };
            let mask = part.null_mask();
            out.extend(col.select_as::<T>(&mask)?);
        }
        Ok(out)
    }

    pub fn column_as_ints(&self, name: &str) -> Result<Vec<i32>> {
        self.column_as(name)
    }

    pub fn column_as_longs(&self, name: &str) -> Result<Vec<i64>> {
        self.column_as(name)
    }

    pub fn column_as_doubles(&self, name: &str) -> Result<Vec<f64>> {
        self.column_as(name)
    }

    /// Concatenated strings of a text or category column.
    pub fn column_as_strings(&self, name: &str) -> Result<Vec<String>> {
        let mut out = vec![];
        for part in self.parts.iter() {
            if let Some(col) = part.get_column(name) {
                out.extend(col.select_strings(&part.null_mask())?);
            }
        }
        Ok(out)
    }

    /// One-dimensional histogram of a column: per-partition
    /// distributions with bucket counts summed across partitions.
    pub fn histogram(&self, name: &str) -> Result<Vec<(f64, f64, u64)>> {
        let mut acc: BTreeMap<(u64, u64), u64> = BTreeMap::new();
        for part in self.parts.iter() {
            for (lo, hi, n) in part.distribution(name)? {
                *acc.entry((lo.to_bits(), hi.to_bits())).or_insert(0) += n as u64;
            }
        }
        Ok(acc
            .into_iter()
            .map(|((lo, hi), n)| (f64::from_bits(lo), f64::from_bits(hi), n))
            .collect())
    }

    /// Two-dimensional histogram over equi-width bins of two columns.
    pub fn histogram2d(
        &self,
        name1: &str,
        nbins1: usize,
        name2: &str,
        nbins2: usize,
    ) -> Result<Vec<((f64, f64), (f64, f64), u64)>> {
        let grid = self.histogram_nd(&[(name1, nbins1), (name2, nbins2)])?;
        Ok(grid
            .into_iter()
            .map(|(edges, n)| (edges[0], edges[1], n))
            .collect())
    }

    /// Three-dimensional histogram over equi-width bins.
    pub fn histogram3d(
        &self,
        name1: &str,
        nbins1: usize,
        name2: &str,
        nbins2: usize,
        name3: &str,
        nbins3: usize,
    ) -> Result<Vec<((f64, f64), (f64, f64), (f64, f64), u64)>> {
        let grid = self.histogram_nd(&[(name1, nbins1), (name2, nbins2), (name3, nbins3)])?;
        Ok(grid
            .into_iter()
            .map(|(edges, n)| (edges[0], edges[1], edges[2], n))
            .collect())
    }

    // joint equi-width bucketing over up to three columns; rows where
    // any dimension is null are skipped.
    fn histogram_nd(
        &self,
        dims: &[(&str, usize)],
    ) -> Result<Vec<(Vec<(f64, f64)>, u64)>> {
        // global value bounds per dimension
        let mut bounds = vec![(f64::INFINITY, f64::NEG_INFINITY); dims.len()];
        let mut per_part: Vec<Vec<Vec<f64>>> = vec![];
        for part in self.parts.iter() {
            let mut cols = vec![];
            let mut mask = part.null_mask();
            for (name, _) in dims.iter() {
                match part.get_column(name) {
                    Some(col) => {
                        mask &= &col.null_mask()?;
                        cols.push(col);
                    }
                    None => {
                        return err_at!(
                            KeyNotFound, msg: "column {} in partition {}", name, part.name()
                        )
                    }
                }
            }
            let mut arrays = vec![];
            for (d, col) in cols.iter().enumerate() {
                let (vals, _) = col.to_f64_values(&mask)?;
                for v in vals.iter().filter(|v| !v.is_nan()) {
                    bounds[d].0 = bounds[d].0.min(*v);
                    bounds[d].1 = bounds[d].1.max(*v);
                }
                arrays.push(vals);
            }
            per_part.push(arrays);
        }

        let widths: Vec<f64> = bounds
            .iter()
            .zip(dims.iter())
            .map(|((lo, hi), (_, nbins))| {
                if hi > lo {
                    (hi - lo) / (*nbins as f64)
                } else {
                    1.0
                }
            })
            .collect();

        let mut acc: BTreeMap<Vec<usize>, u64> = BTreeMap::new();
        for arrays in per_part.iter() {
            let n = arrays.first().map(|a| a.len()).unwrap_or(0);
            'row: for row in 0..n {
                let mut cell = vec![];
                for (d, arr) in arrays.iter().enumerate() {
                    let v = arr[row];
                    if v.is_nan() {
                        continue 'row;
                    }
                    let bin =
                        (((v - bounds[d].0) / widths[d]) as usize).min(dims[d].1 - 1);
                    cell.push(bin);
                }
                *acc.entry(cell).or_insert(0) += 1;
            }
        }

        Ok(acc
            .into_iter()
            .map(|(cell, n)| {
                let edges = cell
                    .into_iter()
                    .enumerate()
                    .map(|(d, bin)| {
                        let lo = bounds[d].0 + widths[d] * (bin as f64);
                        (lo, lo + widths[d])
                    })
                    .collect();
                (edges, n)
            })
            .collect())
    }

    /// Project `sel`, group by its key items and reduce; the composed
    /// group-by query over every partition.
    pub fn groupby(&self, sel: &SelectClause, cond: &Range) -> Result<MemTable> {
        let mut out = self.select(sel, cond)?;
        out.groupby(sel)?;
        Ok(out)
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
