//! Module `equality` implement the exact bitmap index: one bit vector
//! per distinct value of the column.

use log::{debug, info};

use std::{ffi, fs, ops::Bound, sync::Arc};

use crate::{
    bitvector::Bitvector,
    index::{self, BitmapStore, Estimate, Flavor, Header, Index},
    query::{DiscreteSet, Range},
    util, Column, Error, Result,
};

/// Equality-bucket bitmap index. Buckets are pairwise disjoint and
/// their union equals the column's null mask, so every continuous or
/// discrete predicate over the keys is answered exactly.
pub struct EqualityIndex {
    name: String,
    nrows: u32,
    keys: Vec<f64>,
    store: BitmapStore,
}

impl EqualityIndex {
    /// Build from the column's non-null rows.
    pub fn build(col: &Column) -> Result<EqualityIndex> {
        let mask = col.null_mask()?;
        let nrows = col.nrows();
        let (vals, rids) = col.to_f64_values(&mask)?;

        let mut pairs: Vec<(f64, u32)> = vals
            .into_iter()
            .zip(rids.into_iter())
            .filter(|(v, _)| !v.is_nan())
            .collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));

        let mut keys = vec![];
        let mut bitmaps: Vec<Bitvector> = vec![];
        for (val, rid) in pairs.into_iter() {
            match keys.last() {
                Some(last) if *last == val => {
                    let bv = bitmaps.last_mut().unwrap();
                    bv.set_bit(rid as usize, true);
                }
                _ => {
                    keys.push(val);
                    bitmaps.push(Bitvector::from_indices(&[rid]));
                }
            }
        }
        for bv in bitmaps.iter_mut() {
            bv.adjust_size(0, nrows as usize);
        }

        info!(
            target: "bitidx ",
            "{:?}, built equality index {} keys over {} rows", col.name(), keys.len(), nrows
        );
        let val = EqualityIndex {
            name: col.name().to_string(),
            nrows,
            keys,
            store: BitmapStore::from_bitmaps(bitmaps),
        };
        Ok(val)
    }

    pub(crate) fn open(
        mut fd: fs::File,
        header: Header,
        offsets: Vec<u64>,
    ) -> Result<EqualityIndex> {
        let nobs = header.nobs as usize;
        let trailer = index::read_trailer(&mut fd, &offsets)?;
        let (keys, _) = index::f64s_from_bytes(&trailer, nobs)?;

        let val = EqualityIndex {
            name: String::default(),
            nrows: header.nrows,
            keys,
            store: BitmapStore::from_disk(fd, offsets),
        };
        Ok(val)
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn keys(&self) -> &[f64] {
        &self.keys
    }

    // bucket positions answering `range`, as a half-open span.
    fn key_span(&self, range: &Range) -> (usize, usize) {
        let lo = self.keys.partition_point(|k| match range.lo {
            Bound::Included(b) => *k < b,
            Bound::Excluded(b) => *k <= b,
            Bound::Unbounded => false,
        });
        let hi = self.keys.partition_point(|k| match range.hi {
            Bound::Included(b) => *k <= b,
            Bound::Excluded(b) => *k < b,
            Bound::Unbounded => true,
        });
        (lo, hi.max(lo))
    }

    fn or_span(&self, lo: usize, hi: usize) -> Result<Bitvector> {
        let mut out = Bitvector::filled(false, self.nrows as usize);
        for i in lo..hi {
            out |= &*self.store.get(i)?;
        }
        Ok(out)
    }
}

impl Index for EqualityIndex {
    fn flavor(&self) -> Flavor {
        Flavor::Equality
    }

    fn nrows(&self) -> u32 {
        self.nrows
    }

    fn nobs(&self) -> usize {
        self.keys.len()
    }

    fn estimate(&self, range: &Range) -> Result<Estimate> {
        let (lo, hi) = self.key_span(range);
        debug!(
            target: "bitidx ",
            "{:?}, equality estimate {} buckets [{},{})", self.name, range, lo, hi
        );
        Ok(Estimate::exact(self.or_span(lo, hi)?))
    }

    fn evaluate(&self, set: &DiscreteSet) -> Result<Bitvector> {
        let mut out = Bitvector::filled(false, self.nrows as usize);
        let (mut i, values) = (0, set.values());
        for (pos, key) in self.keys.iter().enumerate() {
            while i < values.len() && values[i] < *key {
                i += 1;
            }
            if i == values.len() {
                break;
            }
            if values[i] == *key {
                out |= &*self.store.get(pos)?;
            }
        }
        Ok(out)
    }

    fn estimate_cost(&self, range: &Range) -> f64 {
        let (lo, hi) = self.key_span(range);
        self.store.span_bytes(lo, hi) as f64
    }

    fn undecidable(&self, _range: &Range) -> Result<Bitvector> {
        // buckets are exact, nothing is left undecided
        Ok(Bitvector::filled(false, self.nrows as usize))
    }

    fn append(&mut self, _dt: &ffi::OsStr, df: &ffi::OsStr, nnew: u32) -> Result<u32> {
        let loc = util::to_column_location(df, &self.name, "idx");
        let mut fd = util::open_file_r(&loc)?;
        let (header, offsets) = index::read_envelope(&mut fd)?;
        if Flavor::from_code(header.flavor)? != Flavor::Equality {
            return err_at!(Unsupported, msg: "append across flavors {:?}", loc);
        }
        if header.nrows != nnew {
            return err_at!(Stale, msg: "append rows {} != {}", header.nrows, nnew);
        }
        let other = EqualityIndex::open(fd, header, offsets)?;

        let nold = self.nrows as usize;
        let empty_old = Bitvector::filled(false, nold);
        let empty_new = Bitvector::filled(false, nnew as usize);

        let mut keys = vec![];
        let mut bitmaps = vec![];
        let (mut i, mut j) = (0, 0);
        while i < self.keys.len() || j < other.keys.len() {
            let (key, take_self, take_other) =
                match (self.keys.get(i).copied(), other.keys.get(j).copied()) {
                    (Some(a), Some(b)) if a < b => (a, true, false),
                    (Some(a), Some(b)) if b < a => (b, false, true),
                    (Some(a), Some(_)) => (a, true, true),
                    (Some(a), None) => (a, true, false),
                    (None, Some(b)) => (b, false, true),
                    (None, None) => unreachable!(),
                };
            let mut bv = if take_self {
                let bv = self.store.get(i)?.as_ref().clone();
                i += 1;
                bv
            } else {
                empty_old.clone()
            };
            if take_other {
                bv.extend_from(&*other.store.get(j)?);
                j += 1;
            } else {
                bv.extend_from(&empty_new);
            }
            keys.push(key);
            bitmaps.push(bv);
        }

        self.keys = keys;
        self.store = BitmapStore::from_bitmaps(bitmaps);
        self.nrows += nnew;
        info!(
            target: "bitidx ",
            "{:?}, appended {} rows, {} keys", self.name, nnew, self.keys.len()
        );
        Ok(nnew)
    }

    fn write(&self, loc: &ffi::OsStr) -> Result<()> {
        let bitmaps: Vec<Arc<Bitvector>> = self.store.all()?;
        let mut trailer = vec![];
        index::f64s_to_bytes(&self.keys, &mut trailer);
        index::write_envelope(loc, Flavor::Equality, self.nrows, &bitmaps, &trailer)
    }

    fn bin_boundaries(&self) -> Result<Vec<f64>> {
        Ok(self.keys.clone())
    }

    fn bin_weights(&self) -> Result<Vec<u32>> {
        let mut out = Vec::with_capacity(self.keys.len());
        for i in 0..self.keys.len() {
            out.push(util::to_u32(self.store.get(i)?.cnt())?);
        }
        Ok(out)
    }

    fn distribution(&self) -> Result<Vec<(f64, f64, u32)>> {
        let weights = self.bin_weights()?;
        Ok(self
            .keys
            .iter()
            .zip(weights.into_iter())
            .map(|(k, w)| (*k, *k, w))
            .collect())
    }

    fn to_min(&self) -> Result<f64> {
        Ok(self.keys.first().copied().unwrap_or(f64::INFINITY))
    }

    fn to_max(&self) -> Result<f64> {
        Ok(self.keys.last().copied().unwrap_or(f64::NEG_INFINITY))
    }

    fn to_sum(&self) -> Result<f64> {
        let mut sum = 0.0;
        for (i, key) in self.keys.iter().enumerate() {
            sum += key * (self.store.get(i)?.cnt() as f64);
        }
        Ok(sum)
    }
}

#[cfg(test)]
#[path = "equality_test.rs"]
mod equality_test;
