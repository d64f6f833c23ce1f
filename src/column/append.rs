//! Column append: copy another directory's data and null mask onto
//! this column, padding missing rows with the type's sentinel and
//! clearing their mask bits. Data and mask are written shadow-first
//! and renamed, so concurrent readers see pre- or post-append state,
//! never a torn one.

use log::{info, warn};

use std::{convert::TryFrom, ffi, fs};

use crate::{
    bitvector::Bitvector,
    column::{select::write_whole, IndexSlot},
    types::{Element, ElementType},
    util, Column, Error, Result,
};

impl Column {
    /// Append `nnew` rows found under `df` onto the first `nold` rows
    /// of this column's files under `dt`. A missing or short source
    /// pads with the element type's sentinel and clears the new mask
    /// bits. The attached index is extended when it accepts the
    /// append, otherwise its file is removed and the rebuild deferred.
    pub fn append(
        &self,
        dt: &ffi::OsStr,
        df: &ffi::OsStr,
        nold: u32,
        nnew: u32,
    ) -> Result<u32> {
        match self.element_type() {
            ElementType::Text => self.append_text(dt, df, nold, nnew)?,
            typ => with_numeric_type!(self, typ, T, {
                self.append_fixed::<T>(dt, df, nold, nnew)
            })?,
        };
        self.append_index(dt, df, nnew);
        info!(
            target: "column ",
            "{}.{}, appended {} rows onto {}", self.part_name(), self.name(), nnew, nold
        );
        Ok(nnew)
    }

    fn append_fixed<T>(&self, dt: &ffi::OsStr, df: &ffi::OsStr, nold: u32, nnew: u32) -> Result<()>
    where
        T: Element,
    {
        let (nold, nnew) = (nold as usize, nnew as usize);
        let dt_loc = util::to_column_location(dt, self.name(), "");
        let df_loc = util::to_column_location(df, self.name(), "");

        let mut data = fs::read(&dt_loc).unwrap_or_default();
        data.truncate((data.len() / T::SIZE) * T::SIZE);
        data.truncate(nold * T::SIZE);
        while data.len() < nold * T::SIZE {
            T::SENTINEL.write_le_bytes(&mut data);
        }

        let src = fs::read(&df_loc).unwrap_or_default();
        let src_rows = std::cmp::min(src.len() / T::SIZE, nnew);
        data.extend_from_slice(&src[..src_rows * T::SIZE]);
        while data.len() < (nold + nnew) * T::SIZE {
            T::SENTINEL.write_le_bytes(&mut data);
        }
        write_whole(&dt_loc, &data)?;

        let mask = self.merged_mask(dt, df, nold, nnew, src_rows)?;
        self.append_mask(dt, &mask)
    }

    fn append_text(&self, dt: &ffi::OsStr, df: &ffi::OsStr, nold: u32, nnew: u32) -> Result<()> {
        let (nold, nnew) = (nold as usize, nnew as usize);
        let dt_loc = util::to_column_location(dt, self.name(), "");
        let dt_sp = util::to_column_location(dt, self.name(), "sp");

        let mut data = fs::read(&dt_loc).unwrap_or_default();
        let mut offsets = read_sp(&dt_sp, nold, data.len() as u64)?;
        data.truncate(*offsets.last().unwrap() as usize);
        // pad target to nold rows with empty strings
        while offsets.len() < nold + 1 {
            data.push(0);
            offsets.push(data.len() as u64);
        }

        let src_strings = read_all_strings(df, self.name(), nnew)?;
        let src_rows = src_strings.len();
        for s in src_strings.into_iter() {
            data.extend_from_slice(s.as_bytes());
            data.push(0);
            offsets.push(data.len() as u64);
        }
        while offsets.len() < nold + nnew + 1 {
            data.push(0);
            offsets.push(data.len() as u64);
        }

        let mut spbuf = vec![];
        for off in offsets.iter() {
            spbuf.extend_from_slice(&off.to_le_bytes());
        }
        write_whole(&dt_loc, &data)?;
        write_whole(&dt_sp, &spbuf)?;

        let mask = self.merged_mask(dt, df, nold, nnew, src_rows)?;
        self.append_mask(dt, &mask)
    }

    // target mask for the first nold rows, source mask for the next
    // nnew; rows the source never had read as null.
    fn merged_mask(
        &self,
        dt: &ffi::OsStr,
        df: &ffi::OsStr,
        nold: usize,
        nnew: usize,
        src_rows: usize,
    ) -> Result<Bitvector> {
        let mut mask = read_mask(dt, self.name(), nold)?;
        mask.adjust_size(nold, nold);

        let mut src_mask = if src_rows == 0 {
            Bitvector::filled(false, nnew)
        } else {
            let mut src_mask = read_mask(df, self.name(), src_rows)?;
            src_mask.adjust_size(src_rows, nnew);
            src_mask
        };
        src_mask.adjust_size(0, nnew);

        mask.extend_from(&src_mask);
        Ok(mask)
    }

    fn append_mask(&self, dt: &ffi::OsStr, mask: &Bitvector) -> Result<()> {
        let loc = util::to_column_location(dt, self.name(), "msk");
        let mut buf = vec![];
        mask.to_bytes(&mut buf)?;
        write_whole(&loc, &buf)?;
        if dt == self.current_data_dir() {
            *self.mask.write() = Some(mask.clone());
        }
        Ok(())
    }

    // keep the index when it accepts the new rows, else delete the
    // stale file and defer the rebuild.
    fn append_index(&self, dt: &ffi::OsStr, df: &ffi::OsStr, nnew: u32) {
        let loc = util::to_column_location(dt, self.name(), "idx");
        let mut slot = self.index.write().expect("index lock poisoned");
        let keep = match &mut *slot {
            IndexSlot::Loaded(idx) => match idx.append(dt, df, nnew) {
                Ok(_) => match idx.write(&loc) {
                    Ok(_) => true,
                    Err(err) => {
                        warn!(
                            target: "column ",
                            "{}.{}, failed rewriting appended index: {}",
                            self.part_name(), self.name(), err
                        );
                        false
                    }
                },
                Err(err) => {
                    warn!(
                        target: "column ",
                        "{}.{}, index append refused, deferring rebuild: {}",
                        self.part_name(), self.name(), err
                    );
                    false
                }
            },
            _ => false,
        };
        if !keep {
            *slot = IndexSlot::Unloaded;
            util::remove_file(&loc).ok();
        }
    }
}

// null mask under `dir` for `name`, defaulting to all-valid of `n`.
fn read_mask(dir: &ffi::OsStr, name: &str, n: usize) -> Result<Bitvector> {
    let loc = util::to_column_location(dir, name, "msk");
    if util::file_size(&loc) == 0 {
        return Ok(Bitvector::filled(true, n));
    }
    let bytes = err_at!(IOError, fs::read(&loc), "{:?}", loc)?;
    let (bv, _) = Bitvector::from_bytes(&bytes)?;
    Ok(bv)
}

// `.sp` offsets clipped to `rows`, tolerating a missing file.
fn read_sp(loc: &ffi::OsStr, rows: usize, data_len: u64) -> Result<Vec<u64>> {
    if util::file_size(loc) == 0 {
        return Ok(if data_len == 0 { vec![0] } else { vec![0, data_len] });
    }
    let bytes = err_at!(IOError, fs::read(loc), "{:?}", loc)?;
    let mut offsets = vec![];
    for chunk in bytes.chunks_exact(8).take(rows + 1) {
        offsets.push(u64::from_le_bytes(TryFrom::try_from(chunk).unwrap()));
    }
    if offsets.is_empty() {
        offsets.push(0);
    }
    Ok(offsets)
}

// every string of the source column, up to `rows`.
fn read_all_strings(dir: &ffi::OsStr, name: &str, rows: usize) -> Result<Vec<String>> {
    let data_loc = util::to_column_location(dir, name, "");
    let sp_loc = util::to_column_location(dir, name, "sp");
    if util::file_size(&data_loc) == 0 || util::file_size(&sp_loc) == 0 {
        return Ok(vec![]);
    }
    let data = err_at!(IOError, fs::read(&data_loc), "{:?}", data_loc)?;
    let offsets = read_sp(&sp_loc, rows, data.len() as u64)?;

    let mut out = vec![];
    for w in offsets.windows(2) {
        let (begin, end) = (w[0] as usize, w[1] as usize);
        if begin + 1 >= end || end > data.len() {
            out.push(String::default());
        } else {
            out.push(String::from_utf8_lossy(&data[begin..end - 1]).to_string());
        }
    }
    Ok(out)
}
