//! Package implement the bitmap index family.
//!
//! An index is an ordered sequence of compressed bit vectors plus
//! flavor-specific metadata: one bitmap per distinct value
//! ([equality][EqualityIndex]), per value bucket
//! ([binned][BinnedIndex]), or per dictionary term
//! ([keyword][KeywordIndex]). All flavors persist through one envelope:
//!
//! ```text
//! +--------------------------------------------------------+
//! | '#IBIS' 0x07 | flavor u8 | offset-width u8 (4 or 8)    |
//! +--------------------------------------------------------+
//! | nrows u32    | nobs u32                                |
//! +--------------------------------------------------------+
//! | offset[0..nobs] .. offset[nobs]  (4- or 8-byte each)   |
//! +--------------------------------------------------------+
//! | bitmap 0 | bitmap 1 | ... | bitmap nobs-1              |
//! +--------------------------------------------------------+
//! | flavor trailer (keys, bounds, ...)                     |
//! +--------------------------------------------------------+
//! ```
//!
//! `offset[i]` locates bitmap `i` in the file and `offset[nobs]` marks
//! the start of the trailer, so a reader can activate one bitmap with
//! a single ranged read. Offsets are 64-bit internally and written as
//! 32-bit only when the whole file provably fits.
//!
//! Readers never trust an index blindly: a mismatched row count is
//! [Stale][crate::Error::Stale], a bad header or non-monotone offset
//! table is [Corrupt][crate::Error::Corrupt], and both make the caller
//! drop the index and fall back to scanning.

use binread::BinRead;
use fs2::FileExt;
use log::debug;

use std::{
    cmp,
    convert::TryFrom,
    ffi, fs,
    io::{Read, Seek},
    path,
    sync::{Arc, Mutex},
};

use crate::{
    bitvector::Bitvector,
    query::{DiscreteSet, Range},
    util::{self, Spinlock},
    Error, Result,
};

mod binned;
mod equality;
mod keyword;

pub use binned::{BinnedIndex, NBINS};
pub use equality::EqualityIndex;
pub use keyword::{DelimTokenizer, KeywordIndex, Tokenizer, WordTokenizer};

/// Limit beyond which the offset table switches to 8-byte entries.
const OFFSET32_LIMIT: u64 = 0x8000_0000;

/// Index flavor discriminator, persisted as one byte in the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flavor {
    Binned,
    Equality,
    Keyword,
}

impl Flavor {
    pub fn to_code(&self) -> u8 {
        match self {
            Flavor::Binned => 1,
            Flavor::Equality => 2,
            Flavor::Keyword => 3,
        }
    }

    pub fn from_code(code: u8) -> Result<Flavor> {
        match code {
            1 => Ok(Flavor::Binned),
            2 => Ok(Flavor::Equality),
            3 => Ok(Flavor::Keyword),
            _ => err_at!(Corrupt, msg: "unknown index flavor {}", code),
        }
    }
}

/// Outcome of [Index::estimate]: `low` is a subset of the exact hits.
/// `high`, when present, is a superset; `None` means the answer is
/// exact and `low` is it.
pub struct Estimate {
    pub low: Bitvector,
    pub high: Option<Bitvector>,
}

impl Estimate {
    pub fn exact(low: Bitvector) -> Estimate {
        Estimate { low, high: None }
    }
}

/// Contract shared by every bitmap-index flavor.
///
/// `estimate`/`evaluate` answer predicates, `estimate_cost` prices the
/// answer in units comparable to scanned bytes, and `undecidable`
/// names the rows the index alone cannot decide. Bit vectors may be
/// shorter than the partition when the index was built on a prefix;
/// callers align sizes by padding.
pub trait Index: Send + Sync {
    fn flavor(&self) -> Flavor;

    /// Number of rows covered when the index was built.
    fn nrows(&self) -> u32;

    /// Number of bit vectors.
    fn nobs(&self) -> usize;

    /// Bound the rows matching a continuous range from both sides.
    fn estimate(&self, range: &Range) -> Result<Estimate>;

    /// Exact answer for a discrete membership predicate, or
    /// [Error::Unsupported] when the flavor cannot answer it.
    fn evaluate(&self, set: &DiscreteSet) -> Result<Bitvector>;

    /// Price of answering `range`, in bytes the answer would touch.
    fn estimate_cost(&self, range: &Range) -> f64;

    /// Rows for which the index alone cannot decide `range`.
    fn undecidable(&self, range: &Range) -> Result<Bitvector>;

    /// Extend the index with `nnew` rows appended from the column's
    /// files under `df`, merging that directory's index. Returns the
    /// number of rows appended.
    fn append(&mut self, dt: &ffi::OsStr, df: &ffi::OsStr, nnew: u32) -> Result<u32>;

    /// Persist at `loc` with the envelope layout described in the
    /// package documentation.
    fn write(&self, loc: &ffi::OsStr) -> Result<()>;

    /// Upper edges of the value buckets.
    fn bin_boundaries(&self) -> Result<Vec<f64>>;

    /// Row count per bucket.
    fn bin_weights(&self) -> Result<Vec<u32>>;

    /// `(lo, hi, count)` triples describing the value distribution.
    fn distribution(&self) -> Result<Vec<(f64, f64, u32)>>;

    /// `(upper-edge, running-count)` pairs.
    fn cumulative_distribution(&self) -> Result<Vec<(f64, u32)>> {
        let mut acc = 0;
        let mut out = vec![];
        for (_, hi, w) in self.distribution()? {
            acc += w;
            out.push((hi, acc));
        }
        Ok(out)
    }

    /// Smallest indexed value.
    fn to_min(&self) -> Result<f64>;

    /// Largest indexed value.
    fn to_max(&self) -> Result<f64>;

    /// Sum of indexed values, possibly approximate for binned flavors.
    fn to_sum(&self) -> Result<f64>;

    /// Rows containing keyword `kw`; only the keyword flavor answers.
    fn search_keyword(&self, kw: &str) -> Result<Bitvector> {
        err_at!(Unsupported, msg: "flavor {:?} cannot search {:?}", self.flavor(), kw)
    }
}

/// Build an index over `col`'s non-null rows, per `spec`. The value is
/// in memory; call [Index::write] to persist it.
pub fn create(col: &crate::Column, spec: &BuildSpec) -> Result<Box<dyn Index>> {
    match spec {
        BuildSpec::Equality => Ok(Box::new(EqualityIndex::build(col)?)),
        BuildSpec::Binned { nbins } => Ok(Box::new(BinnedIndex::build(col, *nbins)?)),
    }
}

/// Open a persisted index, dispatching on the flavor byte. `nrows` is
/// the partition's current row count; a larger stored count is
/// [Error::Stale], a smaller one is tolerated only when `tolerant`.
pub fn open(loc: &ffi::OsStr, nrows: u32, tolerant: bool) -> Result<Box<dyn Index>> {
    let mut fd = util::open_file_r(loc)?;
    // held for the life of the reader; dropped with the descriptor
    err_at!(IOError, fd.lock_shared(), "lock {:?}", loc)?;
    let (header, offsets) = read_envelope(&mut fd)?;

    match header.nrows.cmp(&nrows) {
        cmp::Ordering::Equal => (),
        cmp::Ordering::Less if tolerant => (),
        _ => {
            return err_at!(
                Stale, msg: "index rows {} partition rows {} {:?}", header.nrows, nrows, loc
            )
        }
    }

    debug!(
        target: "bitidx ",
        "open {:?} flavor:{} nobs:{}", loc, header.flavor, header.nobs
    );
    let name = path::Path::new(loc)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string();
    match Flavor::from_code(header.flavor)? {
        Flavor::Equality => {
            let mut val = EqualityIndex::open(fd, header, offsets)?;
            val.set_name(&name);
            Ok(Box::new(val))
        }
        Flavor::Binned => {
            let mut val = BinnedIndex::open(fd, header, offsets)?;
            val.set_name(&name);
            Ok(Box::new(val))
        }
        Flavor::Keyword => {
            let terms_loc = sibling_location(loc, "terms")?;
            let mut val = KeywordIndex::open(fd, header, offsets, &terms_loc)?;
            val.set_name(&name);
            Ok(Box::new(val))
        }
    }
}

/// Build specification handed to [create].
#[derive(Clone, Debug)]
pub enum BuildSpec {
    /// One bitmap per distinct value; exact answers for every range.
    Equality,
    /// Equi-width bins; candidate rows at the range edges need a scan.
    Binned { nbins: usize },
}

// replace the `idx` extension of an index location.
fn sibling_location(loc: &ffi::OsStr, ext: &str) -> Result<ffi::OsString> {
    let p = path::Path::new(loc);
    match p.extension() {
        Some(_) => Ok(p.with_extension(ext).into_os_string()),
        None => err_at!(InvalidFile, msg: "index location {:?}", loc),
    }
}

#[derive(BinRead, Debug)]
#[br(little, magic = b"#IBIS\x07")]
pub(crate) struct Header {
    pub flavor: u8,
    pub width: u8,
    pub nrows: u32,
    pub nobs: u32,
}

// read and validate header plus offset table, leaving `fd` positioned
// at the first bitmap.
pub(crate) fn read_envelope(fd: &mut fs::File) -> Result<(Header, Vec<u64>)> {
    err_at!(IOError, fd.seek(std::io::SeekFrom::Start(0)))?;
    let header = match Header::read(fd) {
        Ok(header) => header,
        Err(err) => return err_at!(Corrupt, msg: "bad index header {}", err),
    };
    if header.width != 4 && header.width != 8 {
        return err_at!(Corrupt, msg: "bad offset width {}", header.width);
    }

    let nobs = header.nobs as usize;
    let table = {
        let n = (header.width as usize) * (nobs + 1);
        read_file!(fd, std::io::SeekFrom::Start(16), n, "index offset table")?
    };
    let mut offsets = Vec::with_capacity(nobs + 1);
    for i in 0..=nobs {
        let off = match header.width {
            4 => {
                let j = i * 4;
                u32::from_le_bytes(TryFrom::try_from(&table[j..j + 4]).unwrap()) as u64
            }
            _ => {
                let j = i * 8;
                u64::from_le_bytes(TryFrom::try_from(&table[j..j + 8]).unwrap())
            }
        };
        offsets.push(off);
    }

    let first = 16 + (header.width as u64) * (nobs as u64 + 1);
    if offsets[0] != first {
        return err_at!(Corrupt, msg: "offset[0] {} expected {}", offsets[0], first);
    }
    if offsets.windows(2).any(|w| w[0] > w[1]) {
        return err_at!(Corrupt, msg: "offset table not monotone");
    }

    Ok((header, offsets))
}

// serialize bitmaps and trailer under the shared envelope. Writes a
// shadow file first and renames over `loc` only on success.
pub(crate) fn write_envelope(
    loc: &ffi::OsStr,
    flavor: Flavor,
    nrows: u32,
    bitmaps: &[Arc<Bitvector>],
    trailer: &[u8],
) -> Result<()> {
    let nobs = bitmaps.len();
    let body: usize = bitmaps.iter().map(|bv| bv.serial_size()).sum();

    let total32 = 16 + 4 * (nobs as u64 + 1) + (body as u64) + (trailer.len() as u64);
    let width: u8 = if total32 < OFFSET32_LIMIT { 4 } else { 8 };

    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(b"#IBIS\x07");
    buf.push(flavor.to_code());
    buf.push(width);
    buf.extend_from_slice(&nrows.to_le_bytes());
    buf.extend_from_slice(&util::to_u32(nobs)?.to_le_bytes());

    let mut off = 16 + (width as u64) * (nobs as u64 + 1);
    for bv in bitmaps.iter() {
        match width {
            4 => buf.extend_from_slice(&(off as u32).to_le_bytes()),
            _ => buf.extend_from_slice(&off.to_le_bytes()),
        }
        off += bv.serial_size() as u64;
    }
    match width {
        4 => buf.extend_from_slice(&(off as u32).to_le_bytes()),
        _ => buf.extend_from_slice(&off.to_le_bytes()),
    }
    for bv in bitmaps.iter() {
        bv.to_bytes(&mut buf)?;
    }
    buf.extend_from_slice(trailer);

    let shadow = {
        let mut shadow = loc.to_os_string();
        shadow.push(".shadow");
        shadow
    };
    let res = || -> Result<()> {
        let mut fd = util::create_file_a(&shadow)?;
        err_at!(IOError, fd.lock_exclusive())?;
        write_file!(fd, &buf, &shadow, "index envelope")?;
        err_at!(IOError, fd.sync_all())?;
        err_at!(IOError, fd.unlock())?;
        Ok(())
    }();
    match res {
        Ok(_) => util::rename_file(&shadow, loc),
        Err(err) => {
            util::remove_file(&shadow).ok();
            Err(err)
        }
    }
}

/// Lazily activated bitmap sequence behind an index.
///
/// A slot moves UNLOADED -> LOADING -> LOADED on first touch: loading
/// is serialized by the descriptor mutex, the slot table by a
/// read-write spinlock, and a loaded bitmap is shared out as
/// `Arc<Bitvector>` so unloading can never tear a reader.
pub(crate) struct BitmapStore {
    offsets: Vec<u64>,
    slots: Spinlock<Vec<Option<Arc<Bitvector>>>>,
    fd: Option<Mutex<fs::File>>,
}

impl BitmapStore {
    /// All bitmaps resident, fresh from a build.
    pub fn from_bitmaps(bitmaps: Vec<Bitvector>) -> BitmapStore {
        BitmapStore {
            offsets: vec![],
            slots: Spinlock::new(bitmaps.into_iter().map(|bv| Some(Arc::new(bv))).collect()),
            fd: None,
        }
    }

    /// Disk-backed store; every slot starts unloaded.
    pub fn from_disk(fd: fs::File, offsets: Vec<u64>) -> BitmapStore {
        let nobs = offsets.len().saturating_sub(1);
        BitmapStore {
            offsets,
            slots: Spinlock::new(vec![None; nobs]),
            fd: Some(Mutex::new(fd)),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Activate bitmap `i`, reading `offset[i+1] - offset[i]` bytes on
    /// first touch.
    pub fn get(&self, i: usize) -> Result<Arc<Bitvector>> {
        if let Some(Some(bv)) = self.slots.read().get(i) {
            return Ok(Arc::clone(bv));
        }

        let fd = match &self.fd {
            Some(fd) => fd,
            None => return err_at!(Fatal, msg: "bitmap {} missing in-memory", i),
        };
        if i + 1 >= self.offsets.len() {
            return err_at!(InvalidInput, msg: "bitmap {}/{}", i, self.len());
        }

        let (begin, end) = (self.offsets[i], self.offsets[i + 1]);
        let buf = {
            let mut fd = err_at!(ThreadFail, fd.lock())?;
            let seek = std::io::SeekFrom::Start(begin);
            read_file!(fd, seek, end - begin, "index bitmap")?
        };
        let (bv, _) = Bitvector::from_bytes(&buf)?;
        let bv = Arc::new(bv);

        let mut slots = self.slots.write();
        if slots[i].is_none() {
            slots[i] = Some(Arc::clone(&bv));
        }
        Ok(bv)
    }

    /// Activate every bitmap, for persistence and append paths.
    pub fn all(&self) -> Result<Vec<Arc<Bitvector>>> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    /// Bytes the bitmaps `[lo, hi)` occupy, from the offset table when
    /// disk-backed, else from the resident representations.
    pub fn span_bytes(&self, lo: usize, hi: usize) -> usize {
        if hi <= lo {
            0
        } else if self.offsets.len() > hi {
            (self.offsets[hi] - self.offsets[lo]) as usize
        } else {
            let slots = self.slots.read();
            slots[lo..hi]
                .iter()
                .map(|s| s.as_ref().map(|bv| bv.serial_size()).unwrap_or(0))
                .sum()
        }
    }
}

// read the flavor trailer, everything past `offsets[nobs]`.
pub(crate) fn read_trailer(fd: &mut fs::File, offsets: &[u64]) -> Result<Vec<u8>> {
    let begin = *offsets.last().unwrap();
    let end = err_at!(IOError, fd.seek(std::io::SeekFrom::End(0)))?;
    if end < begin {
        return err_at!(Corrupt, msg: "trailer truncated {} < {}", end, begin);
    }
    read_file!(fd, std::io::SeekFrom::Start(begin), end - begin, "index trailer")
}

// f64 array codec used by flavor trailers.
pub(crate) fn f64s_to_bytes(vals: &[f64], buf: &mut Vec<u8>) {
    for v in vals.iter() {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

pub(crate) fn f64s_from_bytes(buf: &[u8], n: usize) -> Result<(Vec<f64>, usize)> {
    if buf.len() < n * 8 {
        return err_at!(Corrupt, msg: "f64 trailer {}/{}", buf.len(), n * 8);
    }
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let j = i * 8;
        out.push(f64::from_le_bytes(TryFrom::try_from(&buf[j..j + 8]).unwrap()));
    }
    Ok((out, n * 8))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
