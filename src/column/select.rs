//! Value extraction: the `select_*` family materializing column values
//! under a hit bitmap, and the scan callbacks refining index
//! candidates into exact answers.

use log::{debug, warn};

use std::cmp;

use crate::{
    array::{self, Array},
    bitvector::{Bitvector, IndexSet},
    colvec::Values,
    dict::Dictionary,
    query::{DiscreteSet, Range},
    types::{Element, ElementType},
    util, Column, Error, Result,
};

/// Page size assumed by the gather-vs-seek cost estimate.
const PAGE_SIZE: usize = 4096;

impl Column {
    /// Materialize the values of rows set in `mask`, which must be the
    /// size of the partition. The element type `T` must match the
    /// column's element width. Rows past the end of a short data file
    /// are silently absent from the result.
    pub fn select_values<T>(&self, mask: &Bitvector) -> Result<Vec<T>>
    where
        T: Element,
    {
        Ok(self.gather::<T>(mask)?.0)
    }

    /// Like [Column::select_values], also returning the row id of each
    /// extracted value.
    pub fn select_values_rids<T>(&self, mask: &Bitvector) -> Result<(Vec<T>, Vec<u32>)>
    where
        T: Element,
    {
        self.gather::<T>(mask)
    }

    fn gather<T>(&self, mask: &Bitvector) -> Result<(Vec<T>, Vec<u32>)>
    where
        T: Element,
    {
        if self.element_type().element_size() != T::SIZE {
            return err_at!(
                TypeMismatch, msg: "column {} is {:?}, not {}-byte",
                self.name(), self.element_type(), T::SIZE
            );
        }
        let tot = mask.cnt();
        let mut vals = Vec::with_capacity(tot);
        let mut rids = Vec::with_capacity(tot);
        if tot == 0 {
            // empty mask, no I/O against the data file
            return Ok((vals, rids));
        }
        let loc = self.data_location();

        if tot == mask.size() {
            // bulk-read the whole file
            let arr: Array<T> = Array::from_file(&loc)?;
            let nr = cmp::min(arr.len(), mask.size());
            for i in 0..nr {
                vals.push(arr.get(i).unwrap());
                rids.push(i as u32);
            }
            return Ok((vals, rids));
        }

        // a seek per mask word touches roughly a page each; reading the
        // whole file costs its size. Pick the cheaper plan.
        let seek_bytes = 2 * (mask.bytes() / 4) * PAGE_SIZE;
        let full_bytes = mask.size() * T::SIZE;
        if seek_bytes > full_bytes {
            let arr: Array<T> = Array::from_file(&loc)?;
            let nr = cmp::min(arr.len(), mask.size());
            for ix in mask.index_sets() {
                match ix {
                    IndexSet::Range { begin, end } => {
                        for i in begin..cmp::min(end, nr) {
                            vals.push(arr.get(i).unwrap());
                            rids.push(i as u32);
                        }
                    }
                    IndexSet::Sparse(pos) => {
                        for i in pos.into_iter().take_while(|i| *i < nr) {
                            vals.push(arr.get(i).unwrap());
                            rids.push(i as u32);
                        }
                    }
                }
            }
        } else {
            let mut fd = util::open_file_r(&loc)?;
            let nr = {
                let nelem = (util::file_size(&loc) as usize) / T::SIZE;
                cmp::min(nelem, mask.size())
            };
            for ix in mask.index_sets() {
                match ix {
                    IndexSet::Range { begin, end } if begin < nr => {
                        // one contiguous I/O for the whole run
                        let end = cmp::min(end, nr);
                        let arr: Array<T> = Array::read_range(&mut fd, begin, end)?;
                        for (j, i) in (begin..end).enumerate() {
                            vals.push(arr.get(j).unwrap());
                            rids.push(i as u32);
                        }
                    }
                    IndexSet::Range { .. } => (),
                    IndexSet::Sparse(pos) => {
                        for i in pos.into_iter().take_while(|i| *i < nr) {
                            vals.push(array::read_element::<T>(&mut fd, i)?);
                            rids.push(i as u32);
                        }
                    }
                }
            }
        }

        if vals.len() != tot {
            debug!(
                target: "column ",
                "{}.{}, got {}/{} values from {:?}",
                self.part_name(), self.name(), vals.len(), tot, loc
            );
        }
        Ok((vals, rids))
    }

    /// Values under `mask` as f64 plus their row ids, for index builds
    /// and min/max scans. Category columns yield their codes.
    pub(crate) fn to_f64_values(&self, mask: &Bitvector) -> Result<(Vec<f64>, Vec<u32>)> {
        with_numeric_type!(self, self.element_type(), T, {
            let (vals, rids) = self.gather::<T>(mask)?;
            Ok((vals.into_iter().map(|v| v.to_f64()).collect(), rids))
        })
    }

    /// Materialize under `mask` with a safe widening conversion into
    /// `T`. Narrowing requests fail with
    /// [TypeMismatch][crate::Error::TypeMismatch] and leave no output.
    pub fn select_as<T>(&self, mask: &Bitvector) -> Result<Vec<T>>
    where
        T: Element,
    {
        if !self.element_type().widens_to(&T::TYPE) {
            return err_at!(
                TypeMismatch, msg: "no safe conversion {:?} -> {:?} for column {}",
                self.element_type(), T::TYPE, self.name()
            );
        }
        with_numeric_type!(self, self.element_type(), S, {
            let (vals, _) = self.gather::<S>(mask)?;
            Ok(vals.into_iter().map(|v| T::from_f64(v.to_f64())).collect())
        })
    }

    pub fn select_bytes(&self, mask: &Bitvector) -> Result<Vec<i8>> {
        self.select_as(mask)
    }

    pub fn select_ubytes(&self, mask: &Bitvector) -> Result<Vec<u8>> {
        self.select_as(mask)
    }

    pub fn select_shorts(&self, mask: &Bitvector) -> Result<Vec<i16>> {
        self.select_as(mask)
    }

    pub fn select_ushorts(&self, mask: &Bitvector) -> Result<Vec<u16>> {
        self.select_as(mask)
    }

    pub fn select_ints(&self, mask: &Bitvector) -> Result<Vec<i32>> {
        self.select_as(mask)
    }

    pub fn select_uints(&self, mask: &Bitvector) -> Result<Vec<u32>> {
        // category codes surface through the uint selector
        match self.element_type() {
            ElementType::Category => Ok(self.gather::<u32>(mask)?.0),
            _ => self.select_as(mask),
        }
    }

    pub fn select_longs(&self, mask: &Bitvector) -> Result<Vec<i64>> {
        self.select_as(mask)
    }

    pub fn select_ulongs(&self, mask: &Bitvector) -> Result<Vec<u64>> {
        self.select_as(mask)
    }

    pub fn select_floats(&self, mask: &Bitvector) -> Result<Vec<f32>> {
        self.select_as(mask)
    }

    pub fn select_doubles(&self, mask: &Bitvector) -> Result<Vec<f64>> {
        self.select_as(mask)
    }

    /// Strings under `mask`: text columns read through their `.sp`
    /// offsets, category columns map codes through the dictionary.
    pub fn select_strings(&self, mask: &Bitvector) -> Result<Vec<String>> {
        match self.element_type() {
            ElementType::Text => self.gather_strings(mask),
            ElementType::Category => {
                let dict = Dictionary::read(&self.dict_location())?;
                let codes = self.gather::<u32>(mask)?.0;
                let mut out = Vec::with_capacity(codes.len());
                for code in codes.into_iter() {
                    match dict.term(code) {
                        Some(term) => out.push(term.to_string()),
                        None => out.push(String::default()),
                    }
                }
                Ok(out)
            }
            typ => {
                err_at!(TypeMismatch, msg: "column {} is {:?}, not string", self.name(), typ)
            }
        }
    }

    fn gather_strings(&self, mask: &Bitvector) -> Result<Vec<String>> {
        use std::io::{Read, Seek};

        let mut out = vec![];
        if mask.cnt() == 0 {
            return Ok(out);
        }
        let mut dfd = util::open_file_r(&self.data_location())?;
        let mut sfd = util::open_file_r(&self.spill_location())?;
        let nr = {
            let nsp = (util::file_size(&self.spill_location()) as usize) / 8;
            cmp::min(nsp.saturating_sub(1), mask.size())
        };

        for row in mask.iter().take_while(|row| *row < nr) {
            let off = (row as u64) * 8;
            let buf = read_file!(sfd, std::io::SeekFrom::Start(off), 16_u64, "sp range")?;
            let begin = u64::from_le_bytes(std::convert::TryFrom::try_from(&buf[..8]).unwrap());
            let end = u64::from_le_bytes(std::convert::TryFrom::try_from(&buf[8..]).unwrap());
            if begin + 1 >= end {
                out.push(String::default());
                continue;
            }
            let raw = {
                let n = end - begin - 1; // the NUL stays on disk
                read_file!(dfd, std::io::SeekFrom::Start(begin), n, "text value")?
            };
            out.push(String::from_utf8_lossy(&raw).to_string());
        }
        Ok(out)
    }

    /// Materialize under `mask` into the typed tagged buffer matching
    /// this column's element type.
    pub fn select_buffer(&self, mask: &Bitvector) -> Result<Values> {
        Values::create(self, mask)
    }

    /// Exact test of `range` over the rows in `candidates`; the scan
    /// half of the predicate pipeline.
    pub(crate) fn scan_range(&self, range: &Range, candidates: &Bitvector) -> Result<Bitvector> {
        let (vals, rids) = self.to_f64_values(candidates)?;
        let hits: Vec<u32> = vals
            .into_iter()
            .zip(rids.into_iter())
            .filter_map(|(v, rid)| range.contains(v).then(|| rid))
            .collect();
        let mut out = Bitvector::from_indices(&hits);
        out.adjust_size(0, candidates.size());
        debug!(
            target: "column ",
            "{}.{}, scanned {} candidates for {} -> {} hits",
            self.part_name(), self.name(), candidates.cnt(), range, out.cnt()
        );
        Ok(out)
    }

    /// Exact membership test of `set` over the rows in `candidates`.
    pub(crate) fn scan_discrete(
        &self,
        set: &DiscreteSet,
        candidates: &Bitvector,
    ) -> Result<Bitvector> {
        let (vals, rids) = self.to_f64_values(candidates)?;
        let hits: Vec<u32> = vals
            .into_iter()
            .zip(rids.into_iter())
            .filter_map(|(v, rid)| set.contains(v).then(|| rid))
            .collect();
        let mut out = Bitvector::from_indices(&hits);
        out.adjust_size(0, candidates.size());
        Ok(out)
    }

    /// Write `values` (and the matching null mask) as this column's
    /// data files; the builder path used by partitions and tests.
    pub fn write_values(&self, values: &Values, mask: &Bitvector) -> Result<()> {
        if values.len() != self.nrows() as usize {
            return err_at!(
                InvalidInput, msg: "column {} expects {} rows, got {}",
                self.name(), self.nrows(), values.len()
            );
        }
        match (values, self.element_type()) {
            (Values::Text(strs), ElementType::Category) => {
                // intern the strings; code 0 marks the empty value
                let mut dict = Dictionary::new();
                let mut data = vec![];
                for s in strs.iter() {
                    let code = if s.is_empty() { 0u32 } else { dict.insert(s) };
                    data.extend_from_slice(&code.to_le_bytes());
                }
                dict.write(&self.dict_location())?;
                write_whole(&self.data_location(), &data)?;
            }
            (Values::Text(strs), ElementType::Text) => {
                let mut data = vec![];
                let mut offsets: Vec<u64> = vec![0];
                for s in strs.iter() {
                    data.extend_from_slice(s.as_bytes());
                    data.push(0);
                    offsets.push(data.len() as u64);
                }
                let mut spbuf = vec![];
                for off in offsets.iter() {
                    spbuf.extend_from_slice(&off.to_le_bytes());
                }
                write_whole(&self.data_location(), &data)?;
                write_whole(&self.spill_location(), &spbuf)?;
            }
            (values, typ) => {
                if values.element_type() != typ {
                    return err_at!(
                        TypeMismatch, msg: "column {} is {:?}, buffer is {:?}",
                        self.name(), typ, values.element_type()
                    );
                }
                let mut data = vec![];
                values.write_le_bytes(&mut data);
                write_whole(&self.data_location(), &data)?;
            }
        }
        if mask.cnt() == mask.size() {
            // all-valid masks stay implicit
            util::remove_file(&self.mask_location()).ok();
            *self.mask.write() = Some(mask.clone());
            Ok(())
        } else {
            self.write_null_mask(mask)
        }
    }
}

pub(crate) fn write_whole(loc: &std::ffi::OsStr, data: &[u8]) -> Result<()> {
    let shadow = {
        let mut shadow = loc.to_os_string();
        shadow.push(".shadow");
        shadow
    };
    let res = || -> Result<()> {
        let mut fd = util::create_file_a(&shadow)?;
        write_file!(fd, data, &shadow, "column data")?;
        err_at!(IOError, fd.sync_all())?;
        Ok(())
    }();
    match res {
        Ok(_) => util::rename_file(&shadow, loc),
        Err(err) => {
            util::remove_file(&shadow).ok();
            warn!(target: "column ", "failed writing {:?}: {}", loc, err);
            Err(err)
        }
    }
}
