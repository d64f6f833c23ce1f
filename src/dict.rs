//! Module `dict` implement the insertion-ordered string dictionary
//! backing keyword indexes (`.terms`) and category columns (`.dic`).
//!
//! On disk the dictionary is a sequence of `<length:u32><bytes>`
//! records in insertion order; the id of a term is its 1-based
//! position, so ids stay stable across re-reads.

use std::{collections::HashMap, convert::TryFrom, ffi, io::Read};

use crate::{util, Error, Result};

#[derive(Clone, Default)]
pub struct Dictionary {
    terms: Vec<String>,
    ids: HashMap<String, u32>, // keyed by lower-cased spelling
}

impl Dictionary {
    pub fn new() -> Dictionary {
        Dictionary::default()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Intern `term` case-insensitively and return its 1-based id. The
    /// spelling of the first sighting is preserved.
    pub fn insert(&mut self, term: &str) -> u32 {
        let key = term.to_lowercase();
        match self.ids.get(&key) {
            Some(id) => *id,
            None => {
                self.terms.push(term.to_string());
                let id = self.terms.len() as u32;
                self.ids.insert(key, id);
                id
            }
        }
    }

    /// 1-based id of `term`, case-insensitive.
    pub fn lookup(&self, term: &str) -> Option<u32> {
        self.ids.get(&term.to_lowercase()).copied()
    }

    /// Spelling for a 1-based id.
    pub fn term(&self, id: u32) -> Option<&str> {
        match id {
            0 => None,
            id => self.terms.get((id - 1) as usize).map(|s| s.as_str()),
        }
    }

    /// Terms in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|s| s.as_str())
    }

    pub fn write(&self, loc: &ffi::OsStr) -> Result<()> {
        let mut buf = vec![];
        for term in self.terms.iter() {
            buf.extend_from_slice(&util::to_u32(term.len())?.to_le_bytes());
            buf.extend_from_slice(term.as_bytes());
        }
        let mut fd = util::create_file_a(loc)?;
        write_file!(fd, &buf, loc, "dictionary")?;
        err_at!(IOError, fd.sync_all())?;
        Ok(())
    }

    pub fn read(loc: &ffi::OsStr) -> Result<Dictionary> {
        let mut buf = vec![];
        let mut fd = util::open_file_r(loc)?;
        err_at!(IOError, fd.read_to_end(&mut buf))?;

        let mut dict = Dictionary::new();
        let mut off = 0;
        while off < buf.len() {
            if off + 4 > buf.len() {
                return err_at!(Corrupt, msg: "dictionary record at {} {:?}", off, loc);
            }
            let n =
                u32::from_le_bytes(TryFrom::try_from(&buf[off..off + 4]).unwrap()) as usize;
            off += 4;
            if off + n > buf.len() {
                return err_at!(Corrupt, msg: "dictionary record at {} {:?}", off, loc);
            }
            let term = err_at!(FailConvert, std::str::from_utf8(&buf[off..off + n]))?;
            dict.insert(term);
            off += n;
        }
        Ok(dict)
    }
}

#[cfg(test)]
#[path = "dict_test.rs"]
mod dict_test;
