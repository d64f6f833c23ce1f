//! Module `roster` implement the sorted-projection of a column: a
//! `.ind` file holding a permutation `ind[0..N)` such that
//! `value[ind[i]]` is non-decreasing, and a `.srt` file holding the
//! values in that order.
//!
//! Columns that fit the working-memory budget sort in core. Larger
//! columns go through a balanced two-way external merge: fixed-size
//! runs are sorted and spilled, then merged with doubling stride,
//! alternating between the final file pair and a scratch pair (placed
//! in the configured cache directory when one is set). A failed pass
//! removes only the pair it was writing; the previous pass stays
//! intact and partial results are never visible.

use log::{debug, info, warn};

use std::{
    cmp,
    convert::TryFrom,
    ffi, fs,
    io::{Read, Seek, Write},
    sync::Mutex,
};

use crate::{
    array::Array,
    bitvector::Bitvector,
    types::{Element, ElementType},
    util, Column, Error, Result,
};

/// Working-memory budget in elements for run formation and merge
/// pages.
pub const BLOCK: usize = 1 << 18;

// dispatch over the element types a roster can sort.
macro_rules! dispatch_element {
    ($typ:expr, $T:ident, $body:block) => {
        match $typ {
            ElementType::Byte => {
                type $T = i8;
                $body
            }
            ElementType::UByte => {
                type $T = u8;
                $body
            }
            ElementType::Short => {
                type $T = i16;
                $body
            }
            ElementType::UShort => {
                type $T = u16;
                $body
            }
            ElementType::Int => {
                type $T = i32;
                $body
            }
            ElementType::UInt | ElementType::Category => {
                type $T = u32;
                $body
            }
            ElementType::Long => {
                type $T = i64;
                $body
            }
            ElementType::ULong => {
                type $T = u64;
                $body
            }
            ElementType::Float => {
                type $T = f32;
                $body
            }
            ElementType::Double => {
                type $T = f64;
                $body
            }
            typ => err_at!(TypeMismatch, msg: "roster over {:?}", typ),
        }
    };
}

/// The sorted-projection of one column.
pub struct Roster {
    typ: ElementType,
    srt_loc: ffi::OsString,
    nrows: usize,
    /// Resident permutation, empty when the column is too large; then
    /// lookups go through the open `.ind` descriptor.
    ind: Vec<u32>,
    ind_fd: Option<Mutex<fs::File>>,
}

impl Roster {
    /// Open the roster files when they are current, build them
    /// otherwise.
    pub fn open_or_build(col: &Column) -> Result<Roster> {
        Roster::with_block(col, BLOCK)
    }

    /// As [Roster::open_or_build] with an explicit element budget.
    pub fn with_block(col: &Column, block: usize) -> Result<Roster> {
        let nrows = col.nrows() as usize;
        let ind_loc = util::to_column_location(col.current_data_dir(), col.name(), "ind");
        let srt_loc = util::to_column_location(col.current_data_dir(), col.name(), "srt");

        if nrows == 0 {
            let val = Roster {
                typ: col.element_type(),
                srt_loc,
                nrows,
                ind: vec![],
                ind_fd: None,
            };
            return Ok(val);
        }

        let have = util::file_size(&ind_loc) == (nrows as u64) * 4
            && util::file_size(&srt_loc)
                == (nrows as u64) * (col.element_type().element_size() as u64);
        if !have {
            build(col, block, &ind_loc, &srt_loc)?;
        }

        let (ind, ind_fd) = if nrows <= block {
            let arr: Array<u32> = Array::from_file(&ind_loc)?;
            (arr.to_vec(), None)
        } else {
            (vec![], Some(Mutex::new(util::open_file_r(&ind_loc)?)))
        };

        Ok(Roster {
            typ: col.element_type(),
            srt_loc,
            nrows,
            ind,
            ind_fd,
        })
    }

    pub fn len(&self) -> usize {
        self.nrows
    }

    /// The row holding the `i`-th smallest value. Reads 4 bytes at
    /// `4*i` when the permutation is not resident.
    pub fn get(&self, i: usize) -> Result<u32> {
        if let Some(p) = self.ind.get(i) {
            return Ok(*p);
        }
        match &self.ind_fd {
            Some(fd) if i < self.nrows => {
                let mut fd = err_at!(ThreadFail, fd.lock())?;
                let seek = std::io::SeekFrom::Start((i as u64) * 4);
                let buf = read_file!(fd, seek, 4_u64, "roster ind")?;
                Ok(u32::from_le_bytes(TryFrom::try_from(&buf[..4]).unwrap()))
            }
            _ => err_at!(InvalidInput, msg: "roster index {}/{}", i, self.nrows),
        }
    }

    /// Positions of the rows whose value occurs in `vals` (sorted
    /// ascending), as a bitmap of partition size. Walks the sorted
    /// file and the query list with two cursors.
    pub fn locate(&self, vals: &[f64]) -> Result<Bitvector> {
        let mut out = Bitvector::new();
        if !vals.is_empty() {
            dispatch_element!(self.typ, T, { self.locate_t::<T>(vals, &mut out) })?;
        }
        out.adjust_size(0, self.nrows);
        out.compress();
        Ok(out)
    }

    fn locate_t<T>(&self, vals: &[f64], out: &mut Bitvector) -> Result<()>
    where
        T: Element,
    {
        let mut fd = util::open_file_r(&self.srt_loc)?;
        let mut k = 0; // cursor over vals
        let mut j = 0; // cursor over the sorted file
        while j < self.nrows && k < vals.len() {
            let page = cmp::min(BLOCK, self.nrows - j);
            let arr: Array<T> = Array::read_range(&mut fd, j, j + page)?;
            for p in 0..page {
                let v = arr.get(p).unwrap().to_f64();
                while k < vals.len() && vals[k] < v {
                    k += 1;
                }
                if k == vals.len() {
                    break;
                }
                if vals[k] == v {
                    out.set_bit(self.get(j + p)? as usize, true);
                }
            }
            j += page;
        }
        Ok(())
    }
}

fn build(col: &Column, block: usize, ind_loc: &ffi::OsStr, srt_loc: &ffi::OsStr) -> Result<()> {
    let nrows = col.nrows() as usize;
    dispatch_element!(col.element_type(), T, {
        if nrows <= block {
            ic_sort::<T>(col, ind_loc, srt_loc)
        } else {
            ooc_sort::<T>(col, block, ind_loc, srt_loc)
        }
    })
}

// in-core path: load, stable-sort a permutation, spill both files.
fn ic_sort<T>(col: &Column, ind_loc: &ffi::OsStr, srt_loc: &ffi::OsStr) -> Result<()>
where
    T: Element,
{
    let nrows = col.nrows() as usize;
    let arr: Array<T> = Array::from_file(&col.data_location())?;
    if arr.len() < nrows {
        return err_at!(
            IOError, msg: "roster build: {} of {} rows in {:?}",
            arr.len(), nrows, col.data_location()
        );
    }

    let mut perm = vec![];
    arr.sort_permutation(&mut perm);
    perm.truncate(nrows);

    let mut ind_buf = Vec::with_capacity(nrows * 4);
    let mut srt_buf = Vec::with_capacity(nrows * T::SIZE);
    for p in perm.iter() {
        ind_buf.extend_from_slice(&p.to_le_bytes());
        arr.get(*p as usize).unwrap().write_le_bytes(&mut srt_buf);
    }
    crate::column::write_whole(ind_loc, &ind_buf)?;
    crate::column::write_whole(srt_loc, &srt_buf)?;
    info!(
        target: "roster ",
        "{}.{}, in-core sorted {} rows", col.part_name(), col.name(), nrows
    );
    Ok(())
}

// out-of-core path: sorted runs then balanced two-way merges with
// doubling stride, alternating between the final and scratch pairs.
fn ooc_sort<T>(
    col: &Column,
    block: usize,
    nind: &ffi::OsStr,
    nsrt: &ffi::OsStr,
) -> Result<()>
where
    T: Element,
{
    let nrows = col.nrows() as usize;
    let data_loc = col.data_location();

    let (msrt, mind) = scratch_pair(col);
    let nblock = util::ceil_div(nrows, block);
    let passes = {
        let mut passes = 0;
        let mut i = nblock;
        while i > 1 {
            passes += 1;
            i = util::ceil_div(i, 2);
        }
        passes
    };

    let res = || -> Result<()> {
        let mut stride = block;
        if passes % 2 == 0 {
            // runs land in the final pair and merges bounce in pairs
            ooc_sort_blocks::<T>(&data_loc, nsrt, nind, block, nrows)?;
        } else {
            ooc_sort_blocks::<T>(&data_loc, &msrt, &mind, block, nrows)?;
            ooc_merge_blocks::<T>(&msrt, nsrt, &mind, nind, block, stride, nrows)?;
            stride += stride;
        }
        while stride < nrows {
            ooc_merge_blocks::<T>(nsrt, &msrt, nind, &mind, block, stride, nrows)?;
            stride += stride;
            ooc_merge_blocks::<T>(&msrt, nsrt, &mind, nind, block, stride, nrows)?;
            stride += stride;
        }
        Ok(())
    }();

    util::remove_file(&msrt).ok();
    util::remove_file(&mind).ok();
    match res {
        Ok(_) => {
            info!(
                target: "roster ",
                "{}.{}, out-of-core sorted {} rows in {} merge passes",
                col.part_name(), col.name(), nrows, passes
            );
            Ok(())
        }
        Err(err) => {
            // no partial results: the final pair goes too
            util::remove_file(nsrt).ok();
            util::remove_file(nind).ok();
            warn!(
                target: "roster ",
                "{}.{}, out-of-core sort failed, outputs removed: {}",
                col.part_name(), col.name(), err
            );
            Err(err)
        }
    }
}

fn scratch_pair(col: &Column) -> (ffi::OsString, ffi::OsString) {
    match col.params().to_cache_dir() {
        Some(dir) if fs::create_dir_all(&dir).is_ok() => {
            let stem = format!("{}.{}", col.part_name(), col.name());
            let dir = dir.into_os_string();
            (
                util::to_column_location(&dir, &stem, "srt"),
                util::to_column_location(&dir, &stem, "ind"),
            )
        }
        _ => {
            let mut msrt = util::to_column_location(col.current_data_dir(), col.name(), "srt");
            let mut mind = util::to_column_location(col.current_data_dir(), col.name(), "ind");
            msrt.push("-tmp");
            mind.push("-tmp");
            (msrt, mind)
        }
    }
}

// read `block` values at a time, sort each, write the sorted run and
// its (globally shifted) indices.
fn ooc_sort_blocks<T>(
    src: &ffi::OsStr,
    dest: &ffi::OsStr,
    ind: &ffi::OsStr,
    block: usize,
    nrows: usize,
) -> Result<()>
where
    T: Element,
{
    let mut sfd = util::open_file_r(src)?;
    let res = || -> Result<()> {
        let mut dfd = util::create_file_a(dest)?;
        let mut ifd = util::create_file_a(ind)?;

        let mut i = 0;
        while i < nrows {
            let n = cmp::min(block, nrows - i);
            let arr: Array<T> = Array::read_range(&mut sfd, i, i + n)?;
            let mut perm = vec![];
            arr.sort_permutation(&mut perm);

            let mut dbuf = Vec::with_capacity(n * T::SIZE);
            let mut ibuf = Vec::with_capacity(n * 4);
            for p in perm.iter() {
                arr.get(*p as usize).unwrap().write_le_bytes(&mut dbuf);
                ibuf.extend_from_slice(&(*p + i as u32).to_le_bytes());
            }
            write_file!(dfd, &dbuf, dest, "roster run values")?;
            write_file!(ifd, &ibuf, ind, "roster run indices")?;
            i += n;
        }
        err_at!(IOError, dfd.sync_all())?;
        err_at!(IOError, ifd.sync_all())?;
        Ok(())
    }();

    if res.is_err() {
        util::remove_file(dest).ok();
        util::remove_file(ind).ok();
    }
    res
}

// one value/index cursor over a run `[begin, end)`, paged by `block`.
struct RunCursor<T>
where
    T: Element,
{
    begin: usize,
    end: usize,
    page_vals: Vec<T>,
    page_idx: Vec<u32>,
    off: usize, // position within the page
}

impl<T> RunCursor<T>
where
    T: Element,
{
    fn new(
        dfd: &mut fs::File,
        ifd: &mut fs::File,
        begin: usize,
        end: usize,
        block: usize,
    ) -> Result<RunCursor<T>> {
        let mut cur = RunCursor {
            begin,
            end,
            page_vals: vec![],
            page_idx: vec![],
            off: 0,
        };
        cur.refill(dfd, ifd, block)?;
        Ok(cur)
    }

    fn refill(&mut self, dfd: &mut fs::File, ifd: &mut fs::File, block: usize) -> Result<()> {
        let n = cmp::min(block, self.end - self.begin);
        if n == 0 {
            self.page_vals.clear();
            self.page_idx.clear();
            self.off = 0;
            return Ok(());
        }
        let vals: Array<T> = Array::read_range(dfd, self.begin, self.begin + n)?;
        let idxs: Array<u32> = Array::read_range(ifd, self.begin, self.begin + n)?;
        self.page_vals = vals.to_vec();
        self.page_idx = idxs.to_vec();
        self.off = 0;
        Ok(())
    }

    fn current(&self) -> Option<(T, u32)> {
        match (self.page_vals.get(self.off), self.page_idx.get(self.off)) {
            (Some(v), Some(i)) => Some((*v, *i)),
            _ => None,
        }
    }

    fn advance(&mut self, dfd: &mut fs::File, ifd: &mut fs::File, block: usize) -> Result<()> {
        self.off += 1;
        if self.off >= self.page_vals.len() {
            self.begin += self.page_vals.len();
            self.refill(dfd, ifd, block)?;
        }
        Ok(())
    }
}

// buffered output pair, flushed page by page.
struct RunWriter {
    dbuf: Vec<u8>,
    ibuf: Vec<u8>,
    cap: usize,
}

impl RunWriter {
    fn push<T>(
        &mut self,
        dfd: &mut fs::File,
        ifd: &mut fs::File,
        val: T,
        idx: u32,
    ) -> Result<()>
    where
        T: Element,
    {
        val.write_le_bytes(&mut self.dbuf);
        self.ibuf.extend_from_slice(&idx.to_le_bytes());
        if self.dbuf.len() >= self.cap {
            self.flush(dfd, ifd)?;
        }
        Ok(())
    }

    fn flush(&mut self, dfd: &mut fs::File, ifd: &mut fs::File) -> Result<()> {
        if !self.dbuf.is_empty() {
            err_at!(IOError, dfd.write_all(&self.dbuf))?;
            err_at!(IOError, ifd.write_all(&self.ibuf))?;
            self.dbuf.clear();
            self.ibuf.clear();
        }
        Ok(())
    }
}

// merge consecutive `stride`-sized sorted blocks pairwise from the
// source pair into the output pair. Ties keep the earlier run's order.
fn ooc_merge_blocks<T>(
    dsrc: &ffi::OsStr,
    dout: &ffi::OsStr,
    isrc: &ffi::OsStr,
    iout: &ffi::OsStr,
    block: usize,
    stride: usize,
    nrows: usize,
) -> Result<()>
where
    T: Element,
{
    let mut dfd_src = util::open_file_r(dsrc)?;
    let mut ifd_src = util::open_file_r(isrc)?;
    // second descriptors so the two run cursors seek independently
    let mut dfd_two = util::open_file_r(dsrc)?;
    let mut ifd_two = util::open_file_r(isrc)?;

    let res = || -> Result<()> {
        let mut dfd_out = util::create_file_a(dout)?;
        let mut ifd_out = util::create_file_a(iout)?;
        let mut w = RunWriter {
            dbuf: vec![],
            ibuf: vec![],
            cap: block * T::SIZE,
        };

        let mut i0 = 0;
        while i0 < nrows {
            let i1 = cmp::min(i0 + stride, nrows);
            let i2 = cmp::min(i1 + stride, nrows);

            let mut a = RunCursor::<T>::new(&mut dfd_src, &mut ifd_src, i0, i1, block)?;
            let mut b = RunCursor::<T>::new(&mut dfd_two, &mut ifd_two, i1, i2, block)?;
            loop {
                match (a.current(), b.current()) {
                    (Some((va, ia)), Some((vb, _)))
                        if va.total_cmp(&vb) != cmp::Ordering::Greater =>
                    {
                        w.push(&mut dfd_out, &mut ifd_out, va, ia)?;
                        a.advance(&mut dfd_src, &mut ifd_src, block)?;
                    }
                    (Some(_), Some((vb, ib))) => {
                        w.push(&mut dfd_out, &mut ifd_out, vb, ib)?;
                        b.advance(&mut dfd_two, &mut ifd_two, block)?;
                    }
                    (Some((va, ia)), None) => {
                        w.push(&mut dfd_out, &mut ifd_out, va, ia)?;
                        a.advance(&mut dfd_src, &mut ifd_src, block)?;
                    }
                    (None, Some((vb, ib))) => {
                        w.push(&mut dfd_out, &mut ifd_out, vb, ib)?;
                        b.advance(&mut dfd_two, &mut ifd_two, block)?;
                    }
                    (None, None) => break,
                }
            }
            i0 = i2;
        }
        w.flush(&mut dfd_out, &mut ifd_out)?;
        err_at!(IOError, dfd_out.sync_all())?;
        err_at!(IOError, ifd_out.sync_all())?;
        Ok(())
    }();

    if res.is_err() {
        // this pass's outputs go; the inputs stay usable
        util::remove_file(dout).ok();
        util::remove_file(iout).ok();
    } else {
        debug!(target: "roster ", "merged stride {} into {:?}", stride, dout);
    }
    res
}

#[cfg(test)]
#[path = "roster_test.rs"]
mod roster_test;
