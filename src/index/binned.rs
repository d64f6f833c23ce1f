//! Module `binned` implement the bucketed bitmap index: equi-width
//! value bins, one bit vector per bin, with per-bin min/max kept to
//! tighten range estimates. Rows in bins straddling a range edge are
//! candidates the caller refines with a scan.

use log::{debug, info};

use std::{ffi, fs, ops::Bound, sync::Arc};

use crate::{
    bitvector::Bitvector,
    index::{self, BitmapStore, Estimate, Flavor, Header, Index},
    query::{DiscreteSet, Range},
    util, Column, Error, Result,
};

/// Default bin count used when the caller does not pick one.
pub const NBINS: usize = 128;

pub struct BinnedIndex {
    name: String,
    nrows: u32,
    /// Inclusive upper edge of each bin; bin 0 starts at the column
    /// minimum.
    bounds: Vec<f64>,
    /// Actual smallest value per bin, +inf for an empty bin.
    minval: Vec<f64>,
    /// Actual largest value per bin, -inf for an empty bin.
    maxval: Vec<f64>,
    store: BitmapStore,
}

// how a bin relates to a range predicate.
#[derive(PartialEq)]
enum Overlap {
    None,
    Partial,
    Full,
}

impl BinnedIndex {
    pub fn build(col: &Column, nbins: usize) -> Result<BinnedIndex> {
        let nbins = if nbins == 0 { NBINS } else { nbins };
        let mask = col.null_mask()?;
        let nrows = col.nrows();
        let (vals, rids) = col.to_f64_values(&mask)?;

        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for v in vals.iter().filter(|v| !v.is_nan()) {
            lo = lo.min(*v);
            hi = hi.max(*v);
        }
        if lo > hi {
            // no indexable values; empty bins keep the envelope
            // well-formed
            lo = 0.0;
            hi = 0.0;
        }
        let width = if hi > lo { (hi - lo) / (nbins as f64) } else { 1.0 };

        let bounds: Vec<f64> = (0..nbins)
            .map(|i| if i + 1 == nbins { hi } else { lo + width * ((i + 1) as f64) })
            .collect();
        let mut minval = vec![f64::INFINITY; nbins];
        let mut maxval = vec![f64::NEG_INFINITY; nbins];
        let mut bitmaps = vec![Bitvector::new(); nbins];

        for (v, rid) in vals.into_iter().zip(rids.into_iter()) {
            if v.is_nan() {
                continue;
            }
            let bin = (((v - lo) / width) as usize).min(nbins - 1);
            bitmaps[bin].set_bit(rid as usize, true);
            minval[bin] = minval[bin].min(v);
            maxval[bin] = maxval[bin].max(v);
        }
        for bv in bitmaps.iter_mut() {
            bv.adjust_size(0, nrows as usize);
            bv.compress();
        }

        info!(
            target: "bitidx ",
            "{:?}, built binned index {} bins over {} rows", col.name(), nbins, nrows
        );
        let val = BinnedIndex {
            name: col.name().to_string(),
            nrows,
            bounds,
            minval,
            maxval,
            store: BitmapStore::from_bitmaps(bitmaps),
        };
        Ok(val)
    }

    pub(crate) fn open(
        mut fd: fs::File,
        header: Header,
        offsets: Vec<u64>,
    ) -> Result<BinnedIndex> {
        let nobs = header.nobs as usize;
        let trailer = index::read_trailer(&mut fd, &offsets)?;
        let (bounds, n1) = index::f64s_from_bytes(&trailer, nobs)?;
        let (minval, n2) = index::f64s_from_bytes(&trailer[n1..], nobs)?;
        let (maxval, _) = index::f64s_from_bytes(&trailer[n1 + n2..], nobs)?;

        let val = BinnedIndex {
            name: String::default(),
            nrows: header.nrows,
            bounds,
            minval,
            maxval,
            store: BitmapStore::from_disk(fd, offsets),
        };
        Ok(val)
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn overlap(&self, i: usize, range: &Range) -> Overlap {
        let (lo, hi) = (self.minval[i], self.maxval[i]);
        if lo > hi {
            return Overlap::None; // empty bin
        }
        let below = match range.lo {
            Bound::Included(b) => hi < b,
            Bound::Excluded(b) => hi <= b,
            Bound::Unbounded => false,
        };
        let above = match range.hi {
            Bound::Included(b) => lo > b,
            Bound::Excluded(b) => lo >= b,
            Bound::Unbounded => false,
        };
        if below || above {
            Overlap::None
        } else if range.contains(lo) && range.contains(hi) {
            Overlap::Full
        } else {
            Overlap::Partial
        }
    }
}

impl Index for BinnedIndex {
    fn flavor(&self) -> Flavor {
        Flavor::Binned
    }

    fn nrows(&self) -> u32 {
        self.nrows
    }

    fn nobs(&self) -> usize {
        self.bounds.len()
    }

    fn estimate(&self, range: &Range) -> Result<Estimate> {
        let mut low = Bitvector::filled(false, self.nrows as usize);
        let mut cand = Bitvector::filled(false, self.nrows as usize);
        let (mut nfull, mut npart) = (0, 0);
        for i in 0..self.nobs() {
            match self.overlap(i, range) {
                Overlap::Full => {
                    low |= &*self.store.get(i)?;
                    nfull += 1;
                }
                Overlap::Partial => {
                    cand |= &*self.store.get(i)?;
                    npart += 1;
                }
                Overlap::None => (),
            }
        }
        debug!(
            target: "bitidx ",
            "{:?}, binned estimate {} bins full:{} partial:{}", self.name, range, nfull, npart
        );
        let high = &low | &cand;
        Ok(Estimate { low, high: Some(high) })
    }

    fn evaluate(&self, set: &DiscreteSet) -> Result<Bitvector> {
        err_at!(Unsupported, msg: "binned index cannot answer {} exactly", set)
    }

    fn estimate_cost(&self, range: &Range) -> f64 {
        let touched: Vec<usize> = (0..self.nobs())
            .filter(|i| self.overlap(*i, range) != Overlap::None)
            .collect();
        match (touched.first(), touched.last()) {
            (Some(first), Some(last)) => self.store.span_bytes(*first, *last + 1) as f64,
            _ => 0.0,
        }
    }

    fn undecidable(&self, range: &Range) -> Result<Bitvector> {
        let mut iffy = Bitvector::filled(false, self.nrows as usize);
        for i in 0..self.nobs() {
            if self.overlap(i, range) == Overlap::Partial {
                iffy |= &*self.store.get(i)?;
            }
        }
        Ok(iffy)
    }

    fn append(&mut self, _dt: &ffi::OsStr, df: &ffi::OsStr, nnew: u32) -> Result<u32> {
        let loc = util::to_column_location(df, &self.name, "idx");
        let mut fd = util::open_file_r(&loc)?;
        let (header, offsets) = index::read_envelope(&mut fd)?;
        if Flavor::from_code(header.flavor)? != Flavor::Binned {
            return err_at!(Unsupported, msg: "append across flavors {:?}", loc);
        }
        if header.nrows != nnew {
            return err_at!(Stale, msg: "append rows {} != {}", header.nrows, nnew);
        }
        let other = BinnedIndex::open(fd, header, offsets)?;
        if other.bounds != self.bounds {
            // bin layouts diverged; the caller deletes and rebuilds
            return err_at!(Unsupported, msg: "bin boundaries differ {:?}", loc);
        }

        let mut bitmaps = vec![];
        for i in 0..self.nobs() {
            let mut bv = self.store.get(i)?.as_ref().clone();
            bv.adjust_size(0, self.nrows as usize);
            bv.extend_from(&*other.store.get(i)?);
            bitmaps.push(bv);
            self.minval[i] = self.minval[i].min(other.minval[i]);
            self.maxval[i] = self.maxval[i].max(other.maxval[i]);
        }
        self.store = BitmapStore::from_bitmaps(bitmaps);
        self.nrows += nnew;
        info!(target: "bitidx ", "{:?}, appended {} rows to binned index", self.name, nnew);
        Ok(nnew)
    }

    fn write(&self, loc: &ffi::OsStr) -> Result<()> {
        let bitmaps: Vec<Arc<Bitvector>> = self.store.all()?;
        let mut trailer = vec![];
        index::f64s_to_bytes(&self.bounds, &mut trailer);
        index::f64s_to_bytes(&self.minval, &mut trailer);
        index::f64s_to_bytes(&self.maxval, &mut trailer);
        index::write_envelope(loc, Flavor::Binned, self.nrows, &bitmaps, &trailer)
    }

    fn bin_boundaries(&self) -> Result<Vec<f64>> {
        Ok(self.bounds.clone())
    }

    fn bin_weights(&self) -> Result<Vec<u32>> {
        let mut out = Vec::with_capacity(self.nobs());
        for i in 0..self.nobs() {
            out.push(util::to_u32(self.store.get(i)?.cnt())?);
        }
        Ok(out)
    }

    fn distribution(&self) -> Result<Vec<(f64, f64, u32)>> {
        let weights = self.bin_weights()?;
        let mut out = vec![];
        for (i, w) in weights.into_iter().enumerate() {
            if w > 0 {
                out.push((self.minval[i], self.maxval[i], w));
            }
        }
        Ok(out)
    }

    fn to_min(&self) -> Result<f64> {
        Ok(self
            .minval
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min))
    }

    fn to_max(&self) -> Result<f64> {
        Ok(self
            .maxval
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max))
    }

    fn to_sum(&self) -> Result<f64> {
        let mut sum = 0.0;
        for (i, w) in self.bin_weights()?.into_iter().enumerate() {
            if w > 0 {
                sum += (self.minval[i] + self.maxval[i]) / 2.0 * (w as f64);
            }
        }
        Ok(sum)
    }
}

#[cfg(test)]
#[path = "binned_test.rs"]
mod binned_test;
