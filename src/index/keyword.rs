//! Module `keyword` implement the term-document bitmap index over text
//! columns: a [Dictionary] mapping terms to 1-based ids and one bit
//! vector per term marking the rows containing it.
//!
//! Two build paths exist. A term-document file of `term: id1, id2, ...`
//! lines can be ingested directly, or a text column is tokenized row by
//! row through its `.sp` start-offset file. Persistence uses two files:
//! `.terms` for the dictionary and `.idx` with the shared index
//! envelope, where bitmap 0 holds the complement of all terms' union
//! (the rows carrying no term at all).

use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;

use std::{
    convert::TryFrom,
    ffi, fs,
    io::{BufRead, BufReader, Read, Seek},
    sync::Arc,
};

use crate::{
    bitvector::Bitvector,
    dict::Dictionary,
    index::{self, BitmapStore, Estimate, Flavor, Header, Index},
    query::{DiscreteSet, Range},
    util, Column, Error, Result,
};

lazy_static! {
    static ref WORDS: Regex = Regex::new(r"[[:alnum:]]+").unwrap();
}

/// Turn one row's byte buffer into the list of terms to intern.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &[u8]) -> Vec<String>;
}

/// Default tokenizer, splitting at every non-alphanumeric byte.
#[derive(Clone, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(text);
        WORDS.find_iter(&text).map(|m| m.as_str().to_string()).collect()
    }
}

/// Tokenizer splitting at any byte of a caller-chosen delimiter set.
#[derive(Clone)]
pub struct DelimTokenizer {
    delims: Vec<u8>,
}

impl DelimTokenizer {
    pub fn new(delims: &str) -> DelimTokenizer {
        DelimTokenizer { delims: delims.as_bytes().to_vec() }
    }
}

impl Tokenizer for DelimTokenizer {
    fn tokenize(&self, text: &[u8]) -> Vec<String> {
        text.split(|b| self.delims.contains(b))
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).to_string())
            .collect()
    }
}

pub struct KeywordIndex {
    name: String,
    nrows: u32,
    terms: Dictionary,
    /// `bits[0]` is the complement of the terms' union; `bits[id]` the
    /// rows containing term `id`.
    store: BitmapStore,
}

impl KeywordIndex {
    /// Ingest a term-document file of `term: id1, id2, ...` lines.
    /// Repeated terms (case-insensitive) accumulate into one bitmap.
    pub fn from_term_doc(name: &str, loc: &ffi::OsStr, nrows: u32) -> Result<KeywordIndex> {
        let fd = util::open_file_r(loc)?;
        let mut terms = Dictionary::new();
        let mut bitmaps: Vec<Bitvector> = vec![];

        for (lno, line) in BufReader::new(fd).lines().enumerate() {
            let line = err_at!(IOError, line, "term-doc {:?}", loc)?;
            if line.trim().is_empty() {
                continue;
            }
            let (term, ids) = match parse_term_doc_line(&line) {
                Some(parsed) => parsed,
                None => {
                    warn!(
                        target: "keyword",
                        "{:?}, skipping malformed line {} in {:?}", name, lno + 1, loc
                    );
                    continue;
                }
            };
            let mut bv = {
                let mut ids = ids;
                ids.sort_unstable();
                Bitvector::from_indices(&ids)
            };
            bv.adjust_size(0, nrows as usize);
            if bv.cnt() == 0 {
                continue;
            }

            let id = terms.insert(&term) as usize;
            if id > bitmaps.len() {
                bitmaps.push(bv);
            } else {
                bitmaps[id - 1] |= &bv;
            }
        }

        info!(
            target: "keyword",
            "{:?}, read {} terms from term-doc file {:?}", name, terms.len(), loc
        );
        Ok(KeywordIndex::assemble(name, nrows, terms, bitmaps))
    }

    /// Tokenize a text column row by row, using the `.sp` start
    /// positions to delimit each row's bytes.
    pub fn from_text_column(col: &Column, tkn: &dyn Tokenizer) -> Result<KeywordIndex> {
        let data_loc = col.data_location();
        let sp_loc = col.spill_location();
        let mut dfd = util::open_file_r(&data_loc)?;
        let mut sfd = util::open_file_r(&sp_loc)?;

        let nrows = col.nrows();
        let mut terms = Dictionary::new();
        let mut bitmaps: Vec<Bitvector> = vec![];

        let mut start = read_u64_at(&mut sfd, 0)?;
        for row in 0..nrows {
            let end = read_u64_at(&mut sfd, (row as u64 + 1) * 8)?;
            if start + 1 >= end {
                // null or empty string
                start = end;
                continue;
            }
            let buf = {
                let n = end - start - 1; // drop the NUL terminator
                read_file!(dfd, std::io::SeekFrom::Start(start), n, "text row")?
            };
            for token in tkn.tokenize(&buf).into_iter() {
                let id = terms.insert(&token) as usize;
                if id > bitmaps.len() {
                    bitmaps.push(Bitvector::new());
                }
                bitmaps[id - 1].set_bit(row as usize, true);
            }
            start = end;
        }
        for bv in bitmaps.iter_mut() {
            bv.adjust_size(0, nrows as usize);
            bv.compress();
        }

        info!(
            target: "keyword",
            "{:?}, tokenized {} rows into {} terms", col.name(), nrows, terms.len()
        );
        Ok(KeywordIndex::assemble(col.name(), nrows, terms, bitmaps))
    }

    // prepend bitmap 0, the complement of the union of all terms.
    fn assemble(
        name: &str,
        nrows: u32,
        terms: Dictionary,
        bitmaps: Vec<Bitvector>,
    ) -> KeywordIndex {
        let mut none = Bitvector::filled(false, nrows as usize);
        for bv in bitmaps.iter() {
            none |= bv;
        }
        none.flip();

        let mut bits = Vec::with_capacity(bitmaps.len() + 1);
        bits.push(none);
        bits.extend(bitmaps);

        KeywordIndex {
            name: name.to_string(),
            nrows,
            terms,
            store: BitmapStore::from_bitmaps(bits),
        }
    }

    pub(crate) fn open(
        fd: fs::File,
        header: Header,
        offsets: Vec<u64>,
        terms_loc: &ffi::OsStr,
    ) -> Result<KeywordIndex> {
        let terms = Dictionary::read(terms_loc)?;
        if terms.len() + 1 != header.nobs as usize {
            return err_at!(
                Corrupt, msg: "terms {} bitmaps {} {:?}", terms.len(), header.nobs, terms_loc
            );
        }
        let val = KeywordIndex {
            name: String::default(),
            nrows: header.nrows,
            terms,
            store: BitmapStore::from_disk(fd, offsets),
        };
        Ok(val)
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn terms(&self) -> &Dictionary {
        &self.terms
    }

    /// Bitmap of rows containing `kw`, an empty bitmap of partition
    /// size for an unknown term.
    pub fn search(&self, kw: &str) -> Result<Bitvector> {
        match self.terms.lookup(kw) {
            Some(id) => Ok(self.store.get(id as usize)?.as_ref().clone()),
            None => Ok(Bitvector::filled(false, self.nrows as usize)),
        }
    }

    /// Number of rows containing `kw`.
    pub fn search_count(&self, kw: &str) -> Result<usize> {
        Ok(self.search(kw)?.cnt())
    }
}

fn parse_term_doc_line(line: &str) -> Option<(String, Vec<u32>)> {
    let mut split = line.splitn(2, ':');
    let term = split.next()?.trim();
    let rest = split.next()?;
    if term.is_empty() {
        return None;
    }
    let mut ids = vec![];
    for tok in rest.split(|c: char| c == ',' || c.is_whitespace()) {
        if tok.is_empty() {
            continue;
        }
        ids.push(tok.parse::<u32>().ok()?);
    }
    Some((term.to_string(), ids))
}

fn read_u64_at(fd: &mut fs::File, off: u64) -> Result<u64> {
    let buf = read_file!(fd, std::io::SeekFrom::Start(off), 8_u64, "sp offset")?;
    Ok(u64::from_le_bytes(TryFrom::try_from(&buf[..8]).unwrap()))
}

impl Index for KeywordIndex {
    fn flavor(&self) -> Flavor {
        Flavor::Keyword
    }

    fn nrows(&self) -> u32 {
        self.nrows
    }

    fn nobs(&self) -> usize {
        self.store.len()
    }

    /// Ranges over a keyword column address term ids.
    fn estimate(&self, range: &Range) -> Result<Estimate> {
        let mut out = Bitvector::filled(false, self.nrows as usize);
        for id in 1..self.nobs() {
            if range.contains(id as f64) {
                out |= &*self.store.get(id)?;
            }
        }
        Ok(Estimate::exact(out))
    }

    fn evaluate(&self, set: &DiscreteSet) -> Result<Bitvector> {
        let mut out = Bitvector::filled(false, self.nrows as usize);
        for v in set.values().iter() {
            let id = *v as usize;
            if v.fract() == 0.0 && id >= 1 && id < self.nobs() {
                out |= &*self.store.get(id)?;
            }
        }
        Ok(out)
    }

    /// Size of the bitmap at the implied term id, as a proxy for the
    /// work of answering the predicate.
    fn estimate_cost(&self, range: &Range) -> f64 {
        let id = match (range.lo_value(), range.hi_value()) {
            (Some(lo), _) => lo as usize,
            (None, Some(hi)) => hi as usize,
            (None, None) => return self.store.span_bytes(0, self.nobs()) as f64,
        };
        if id >= 1 && id < self.nobs() {
            self.store.span_bytes(id, id + 1) as f64
        } else {
            0.0
        }
    }

    fn undecidable(&self, _range: &Range) -> Result<Bitvector> {
        Ok(Bitvector::filled(false, self.nrows as usize))
    }

    fn append(&mut self, _dt: &ffi::OsStr, df: &ffi::OsStr, nnew: u32) -> Result<u32> {
        let loc = util::to_column_location(df, &self.name, "idx");
        let terms_loc = util::to_column_location(df, &self.name, "terms");
        let mut fd = util::open_file_r(&loc)?;
        let (header, offsets) = index::read_envelope(&mut fd)?;
        if Flavor::from_code(header.flavor)? != Flavor::Keyword {
            return err_at!(Unsupported, msg: "append across flavors {:?}", loc);
        }
        if header.nrows != nnew {
            return err_at!(Stale, msg: "append rows {} != {}", header.nrows, nnew);
        }
        let other = KeywordIndex::open(fd, header, offsets, &terms_loc)?;

        let nold = self.nrows as usize;
        let mut terms = self.terms.clone();
        let mut bitmaps: Vec<Bitvector> = vec![];
        for id in 1..self.nobs() {
            let mut bv = self.store.get(id)?.as_ref().clone();
            bv.adjust_size(0, nold);
            let term = self.terms.term(id as u32).unwrap();
            match other.terms.lookup(term) {
                Some(oid) => bv.extend_from(&*other.store.get(oid as usize)?),
                None => bv.append_fill(false, nnew as usize),
            }
            bitmaps.push(bv);
        }
        for term in other.terms.iter() {
            if terms.lookup(term).is_none() {
                let oid = other.terms.lookup(term).unwrap();
                terms.insert(term);
                let mut bv = Bitvector::filled(false, nold);
                bv.extend_from(&*other.store.get(oid as usize)?);
                bitmaps.push(bv);
            }
        }

        self.nrows += nnew;
        let merged = KeywordIndex::assemble(&self.name, self.nrows, terms, bitmaps);
        self.terms = merged.terms;
        self.store = merged.store;
        info!(
            target: "keyword",
            "{:?}, appended {} rows, {} terms", self.name, nnew, self.terms.len()
        );
        Ok(nnew)
    }

    /// Persist as `.idx` (envelope) plus the sibling `.terms` file.
    fn write(&self, loc: &ffi::OsStr) -> Result<()> {
        let terms_loc = {
            let p = std::path::Path::new(loc);
            p.with_extension("terms").into_os_string()
        };
        self.terms.write(&terms_loc)?;
        let bitmaps: Vec<Arc<Bitvector>> = self.store.all()?;
        index::write_envelope(loc, Flavor::Keyword, self.nrows, &bitmaps, &[])
    }

    fn bin_boundaries(&self) -> Result<Vec<f64>> {
        Ok((1..self.nobs()).map(|id| id as f64).collect())
    }

    fn bin_weights(&self) -> Result<Vec<u32>> {
        let mut out = vec![];
        for id in 1..self.nobs() {
            out.push(util::to_u32(self.store.get(id)?.cnt())?);
        }
        Ok(out)
    }

    fn distribution(&self) -> Result<Vec<(f64, f64, u32)>> {
        let weights = self.bin_weights()?;
        Ok(weights
            .into_iter()
            .enumerate()
            .map(|(i, w)| ((i + 1) as f64, (i + 1) as f64, w))
            .collect())
    }

    fn to_min(&self) -> Result<f64> {
        err_at!(Unsupported, msg: "keyword index has no numeric min")
    }

    fn to_max(&self) -> Result<f64> {
        err_at!(Unsupported, msg: "keyword index has no numeric max")
    }

    fn to_sum(&self) -> Result<f64> {
        err_at!(Unsupported, msg: "keyword index has no numeric sum")
    }

    fn search_keyword(&self, kw: &str) -> Result<Bitvector> {
        self.search(kw)
    }
}

#[cfg(test)]
#[path = "keyword_test.rs"]
mod keyword_test;
