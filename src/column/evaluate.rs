//! The predicate driver: cooperation between the bitmap index, the
//! scan callback and candidate refinement that turns range and
//! discrete predicates into exact hit bitmaps.
//!
//! The driver never propagates an index failure. Anything the index
//! throws that [scan_recoverable][crate::Error::scan_recoverable]
//! admits gets the index unloaded and the query retried as a pure
//! scan; only type mismatches and resource exhaustion surface.

use log::{debug, warn};

use crate::{
    bitvector::Bitvector,
    column::IndexSlot,
    query::{DiscreteSet, Range},
    roster::Roster,
    Column, Error, Result,
};

impl Column {
    /// Exact hits for a continuous range under `mask`. The result is a
    /// subset of `mask` intersected with the null mask and matches a
    /// brute-force scan of the same predicate.
    pub fn evaluate_range(&self, range: &Range, mask: &Bitvector) -> Result<Bitvector> {
        if !self.element_type().is_numeric() {
            return err_at!(
                TypeMismatch, msg: "range {} over {:?} column {}",
                range, self.element_type(), self.name()
            );
        }

        let mymask = {
            let mut mymask = self.null_mask()?;
            mymask &= mask;
            mymask
        };
        if mymask.cnt() == 0 {
            return Ok(Bitvector::filled(false, mask.size()));
        }

        match self.try_index_range(range, &mymask) {
            Ok(hits) => Ok(hits),
            Err(err) if err.scan_recoverable() => {
                warn!(
                    target: "column ",
                    "{}.{}, index failed for {}, falling back to scan: {}",
                    self.part_name(), self.name(), range, err
                );
                self.unload_index();
                self.scan_range(range, &mymask)
            }
            Err(err) => Err(err),
        }
    }

    // index estimate, then scan-refine the candidates it left behind.
    fn try_index_range(&self, range: &Range, mymask: &Bitvector) -> Result<Bitvector> {
        let (mut low, mut high) = {
            let slot = self.acquire_index();
            match &*slot {
                IndexSlot::Loaded(idx)
                    if idx.estimate_cost(range) < (self.nrows() as f64) =>
                {
                    let est = idx.estimate(range)?;
                    (est.low, est.high)
                }
                IndexSlot::Loaded(_) | IndexSlot::NoIndex | IndexSlot::Unloaded => {
                    (Bitvector::new(), Some(Bitvector::new()))
                }
            }
        };

        // a short index decides only a prefix; pad low with zeros and
        // the candidate superset with ones
        if low.size() != mymask.size() {
            low.adjust_size(0, mymask.size());
        }
        low &= mymask;

        match high.as_mut() {
            None => Ok(low), // the estimate was exact
            Some(high) => {
                if high.size() != mymask.size() {
                    high.adjust_size(mymask.size(), mymask.size());
                }
                *high &= mymask;
                let candidates = &*high - &low;
                if candidates.cnt() > 0 {
                    let refined = self.scan_range(range, &candidates)?;
                    low |= &refined;
                }
                Ok(low)
            }
        }
    }

    /// Exact hits for a discrete membership predicate under `mask`.
    pub fn evaluate_discrete(&self, set: &DiscreteSet, mask: &Bitvector) -> Result<Bitvector> {
        if set.len() == 0 {
            return Ok(Bitvector::filled(false, mask.size()));
        }
        if !self.element_type().is_numeric() {
            return err_at!(
                TypeMismatch, msg: "discrete {} over {:?} column {}",
                set, self.element_type(), self.name()
            );
        }

        // a dense integer interval is really a continuous range
        if self.element_type().is_integer() {
            if let Some(range) = set.as_continuous() {
                debug!(
                    target: "column ",
                    "{}.{}, rewriting {} as {}", self.part_name(), self.name(), set, range
                );
                return self.evaluate_range(&range, mask);
            }
        }

        let mymask = {
            let mut mymask = self.null_mask()?;
            mymask &= mask;
            mymask
        };
        if mymask.cnt() == 0 {
            return Ok(Bitvector::filled(false, mask.size()));
        }

        match self.try_index_discrete(set, &mymask) {
            Ok(hits) => Ok(hits),
            Err(err) if err.scan_recoverable() => {
                warn!(
                    target: "column ",
                    "{}.{}, index failed for {}, falling back to scan: {}",
                    self.part_name(), self.name(), set, err
                );
                self.unload_index();
                self.scan_discrete(set, &mymask)
            }
            Err(err) => Err(err),
        }
    }

    fn try_index_discrete(&self, set: &DiscreteSet, mymask: &Bitvector) -> Result<Bitvector> {
        let nrows = self.nrows();
        let use_roster = {
            let slot = self.acquire_index();
            match &*slot {
                IndexSlot::Loaded(idx) => {
                    // when the index would sift through more bytes than
                    // a sorted-list lookup, prefer the roster
                    let span = Range::between(
                        &set.column,
                        set.values().first().copied().unwrap_or(0.0),
                        set.values().last().copied().unwrap_or(0.0),
                    );
                    let cost = idx.estimate_cost(&span);
                    let elem = self.element_type().element_size() as f64;
                    cost * (set.len() as f64).ln() > (elem + 4.0) * (nrows as f64)
                }
                _ => true, // no index; a roster lookup beats a scan
            }
        };

        if use_roster {
            match self.try_roster(set, mymask) {
                Ok(Some(hits)) => return Ok(hits),
                Ok(None) => (),
                Err(err) => {
                    debug!(
                        target: "column ",
                        "{}.{}, roster path failed: {}", self.part_name(), self.name(), err
                    );
                }
            }
        }

        let slot = self.acquire_index();
        match &*slot {
            IndexSlot::Loaded(idx) => {
                let mut hits = idx.evaluate(set)?;
                if hits.size() < mymask.size() {
                    // short index; scan the uncovered tail
                    let tail = {
                        let mut tail = Bitvector::filled(false, hits.size());
                        tail.append_fill(true, mymask.size() - hits.size());
                        tail &= mymask;
                        tail
                    };
                    let refined = self.scan_discrete(set, &tail)?;
                    hits.adjust_size(0, mymask.size());
                    hits |= &refined;
                }
                hits &= mymask;
                Ok(hits)
            }
            _ => self.scan_discrete(set, mymask),
        }
    }

    // answer through the sorted-values roster when one exists or can
    // be built cheaply. Ok(None) means the roster is unusable.
    fn try_roster(&self, set: &DiscreteSet, mymask: &Bitvector) -> Result<Option<Bitvector>> {
        let ros = Roster::open_or_build(self)?;
        if ros.len() != self.nrows() as usize {
            return Ok(None);
        }
        let mut hits = ros.locate(set.values())?;
        hits &= mymask;
        Ok(Some(hits))
    }

    /// Bounds on the number of hits for `range`, without scanning:
    /// `(guaranteed, possible)`. Columns without a usable index answer
    /// `(0, nrows)`.
    pub fn estimate_range(&self, range: &Range) -> (u64, u64) {
        let slot = self.acquire_index();
        match &*slot {
            IndexSlot::Loaded(idx) => match idx.estimate(range) {
                Ok(est) => {
                    let nmin = est.low.cnt() as u64;
                    let nmax = match est.high.as_ref() {
                        Some(high) => high.cnt() as u64,
                        None => nmin,
                    };
                    (nmin, nmax)
                }
                Err(_) => (0, self.nrows() as u64),
            },
            _ => (0, self.nrows() as u64),
        }
    }
}
