//! Module `bitvector` implement the compressed bit vector used across
//! the crate for null masks, index bitmaps and query results.
//!
//! The encoding is a word-aligned hybrid of run-length and literal
//! words. Bits are grouped 31 to a `u32` word. A **literal** word has
//! its MSB clear and carries one group verbatim in the low 31 bits,
//! most significant bit first. A **fill** word has its MSB set, bit 30
//! holds the fill bit and the low 30 bits count the number of
//! consecutive identical groups. Bits beyond the last full group live
//! in an *active* word of up to 30 bits.
//!
//! All bitwise operations work directly on the compressed form and
//! cost O(compressed-words). Positional updates ([Bitvector::set_bit])
//! split at most one fill word.

use std::{cmp, fmt, ops, result};

use crate::{util, Error, Result};

/// Number of payload bits in one word.
const MAXBITS: usize = 31;
/// A literal word with every payload bit set.
const ALLONES: u32 = 0x7FFF_FFFF;
/// MSB marker distinguishing fill words from literal words.
const FILLMARK: u32 = 0x8000_0000;
/// Bit 30 of a fill word holds the fill bit.
const FILLBIT: u32 = 0x4000_0000;
/// Maximum group count representable in one fill word.
const MAXCNT: usize = 0x3FFF_FFFF;

#[inline]
fn is_fill(w: u32) -> bool {
    w & FILLMARK != 0
}

#[inline]
fn fill_bit(w: u32) -> u32 {
    if w & FILLBIT != 0 {
        1
    } else {
        0
    }
}

#[inline]
fn fill_count(w: u32) -> usize {
    (w & (MAXCNT as u32)) as usize
}

#[inline]
fn fill_word(bit: u32, n: usize) -> u32 {
    debug_assert!(n <= MAXCNT);
    FILLMARK | (if bit != 0 { FILLBIT } else { 0 }) | (n as u32)
}

/// Compressed bit vector over `[0, size)`.
///
/// Constructed empty, by [Bitvector::filled], or from sorted positions
/// with [Bitvector::from_indices]; grown by [Bitvector::append_fill]
/// and [Bitvector::set_bit]. Combined with `&= |= ^= -=` operators
/// taking `&Bitvector` on the right.
#[derive(Clone, Default)]
pub struct Bitvector {
    vec: Vec<u32>,
    active_val: u32,
    active_nbits: u8,
    nbits: usize,
}

impl Bitvector {
    pub fn new() -> Bitvector {
        Bitvector::default()
    }

    /// A bit vector of `n` bits all set to `bit`.
    pub fn filled(bit: bool, n: usize) -> Bitvector {
        let mut bv = Bitvector::new();
        bv.append_fill(bit, n);
        bv
    }

    /// Build from bit positions sorted in ascending order; duplicate
    /// positions are tolerated.
    pub fn from_indices(positions: &[u32]) -> Bitvector {
        let mut bv = Bitvector::new();
        for pos in positions.iter() {
            let pos = *pos as usize;
            if pos >= bv.nbits {
                bv.append_fill(false, pos - bv.nbits);
                bv.append_fill(true, 1);
            }
        }
        bv
    }

    /// Number of bits in the vector.
    #[inline]
    pub fn size(&self) -> usize {
        self.nbits
    }

    /// Number of set bits.
    pub fn cnt(&self) -> usize {
        let mut n = 0;
        for w in self.vec.iter() {
            if is_fill(*w) {
                if fill_bit(*w) != 0 {
                    n += MAXBITS * fill_count(*w);
                }
            } else {
                n += w.count_ones() as usize;
            }
        }
        n + self.active_val.count_ones() as usize
    }

    /// In-memory footprint of the compressed representation in bytes,
    /// used for I/O cost estimates.
    pub fn bytes(&self) -> usize {
        (self.vec.len() + 2) * 4
    }

    // append one whole group, merging runs where possible.
    fn push_literal(&mut self, w: u32) {
        debug_assert!(w <= ALLONES);
        match self.vec.last_mut() {
            Some(last) if w == 0 && is_fill(*last) && fill_bit(*last) == 0 => {
                if fill_count(*last) < MAXCNT {
                    *last += 1;
                } else {
                    self.vec.push(fill_word(0, 1));
                }
            }
            Some(last) if w == ALLONES && is_fill(*last) && fill_bit(*last) == 1 => {
                if fill_count(*last) < MAXCNT {
                    *last += 1;
                } else {
                    self.vec.push(fill_word(1, 1));
                }
            }
            _ => self.vec.push(w),
        }
    }

    // append `n` identical groups, merging with a trailing run.
    fn push_fill(&mut self, bit: u32, mut n: usize) {
        if n == 0 {
            return;
        }
        if n == 1 {
            self.push_literal(if bit != 0 { ALLONES } else { 0 });
            return;
        }
        if let Some(last) = self.vec.last_mut() {
            if is_fill(*last) && fill_bit(*last) == bit {
                let room = MAXCNT - fill_count(*last);
                let take = cmp::min(room, n);
                *last += take as u32;
                n -= take;
            } else if !is_fill(*last)
                && ((bit != 0 && *last == ALLONES) || (bit == 0 && *last == 0))
            {
                // trailing literal of the same pattern joins the run
                *last = fill_word(bit, 1);
                let take = cmp::min(MAXCNT - 1, n);
                *last += take as u32;
                n -= take;
            }
        }
        while n > 0 {
            let take = cmp::min(MAXCNT, n);
            self.vec.push(fill_word(bit, take));
            n -= take;
        }
    }

    #[inline]
    fn flush_active(&mut self) {
        debug_assert_eq!(self.active_nbits as usize, MAXBITS);
        let w = self.active_val;
        self.active_val = 0;
        self.active_nbits = 0;
        self.push_literal(w);
    }

    /// Append `n` bits of value `bit` at the end.
    pub fn append_fill(&mut self, bit: bool, mut n: usize) {
        let b = bit as u32;
        self.nbits += n;

        // top up the active word first
        while self.active_nbits > 0 && n > 0 {
            self.active_val = (self.active_val << 1) | b;
            self.active_nbits += 1;
            n -= 1;
            if self.active_nbits as usize == MAXBITS {
                self.flush_active();
            }
        }

        let groups = n / MAXBITS;
        self.push_fill(b, groups);
        n -= groups * MAXBITS;

        for _ in 0..n {
            self.active_val = (self.active_val << 1) | b;
            self.active_nbits += 1;
        }
    }

    /// Set bit `i` to `bit`. Positions past the end extend the vector
    /// with zero fill.
    pub fn set_bit(&mut self, i: usize, bit: bool) {
        if i >= self.nbits {
            if bit {
                self.append_fill(false, i - self.nbits);
                self.append_fill(true, 1);
            } else {
                self.append_fill(false, i + 1 - self.nbits);
            }
            return;
        }

        let group = i / MAXBITS;
        let off = i % MAXBITS; // most significant payload bit first
        let mask = 1u32 << (MAXBITS - 1 - off);

        let mut cg = 0; // groups before the current word
        for k in 0..self.vec.len() {
            let w = self.vec[k];
            let ng = if is_fill(w) { fill_count(w) } else { 1 };
            if group < cg + ng {
                if !is_fill(w) {
                    if bit {
                        self.vec[k] |= mask;
                    } else {
                        self.vec[k] &= !mask;
                    }
                } else if fill_bit(w) != bit as u32 {
                    // split the fill into prefix, literal, suffix
                    let base = if fill_bit(w) != 0 { ALLONES } else { 0 };
                    let lit = if bit { base | mask } else { base & !mask };
                    let before = group - cg;
                    let after = ng - before - 1;
                    let mut repl = Vec::with_capacity(3);
                    if before > 0 {
                        repl.push(fill_word(fill_bit(w), before));
                    }
                    repl.push(lit);
                    if after > 0 {
                        repl.push(fill_word(fill_bit(w), after));
                    }
                    self.vec.splice(k..k + 1, repl);
                }
                return;
            }
            cg += ng;
        }

        // the bit lives in the active word
        let idx = i - cg * MAXBITS;
        let mask = 1u32 << (self.active_nbits as usize - 1 - idx);
        if bit {
            self.active_val |= mask;
        } else {
            self.active_val &= !mask;
        }
    }

    /// Whether bit `i` is set; positions past the end read as clear.
    pub fn is_set(&self, i: usize) -> bool {
        if i >= self.nbits {
            return false;
        }
        let group = i / MAXBITS;
        let off = i % MAXBITS;

        let mut cg = 0;
        for w in self.vec.iter() {
            let ng = if is_fill(*w) { fill_count(*w) } else { 1 };
            if group < cg + ng {
                return if is_fill(*w) {
                    fill_bit(*w) != 0
                } else {
                    w & (1 << (MAXBITS - 1 - off)) != 0
                };
            }
            cg += ng;
        }
        let idx = i - cg * MAXBITS;
        self.active_val & (1 << (self.active_nbits as usize - 1 - idx)) != 0
    }

    /// Re-run the run-length merge over the word array. Useful after a
    /// series of [Bitvector::set_bit] calls left adjacent mergeable
    /// words behind.
    pub fn compress(&mut self) {
        let words = std::mem::take(&mut self.vec);
        for w in words {
            if is_fill(w) {
                self.push_fill(fill_bit(w), fill_count(w));
            } else {
                self.push_literal(w);
            }
        }
    }

    /// Expand every fill word into literal words.
    pub fn decompress(&mut self) {
        let words = std::mem::take(&mut self.vec);
        for w in words {
            if is_fill(w) {
                let lit = if fill_bit(w) != 0 { ALLONES } else { 0 };
                self.vec.resize(self.vec.len() + fill_count(w), lit);
            } else {
                self.vec.push(w);
            }
        }
    }

    /// Complement every bit in place.
    pub fn flip(&mut self) {
        for w in self.vec.iter_mut() {
            if is_fill(*w) {
                *w ^= FILLBIT;
            } else {
                *w ^= ALLONES;
            }
        }
        if self.active_nbits > 0 {
            self.active_val ^= (1u32 << self.active_nbits) - 1;
        }
    }

    /// Pad with set bits up to `nv` bits, with clear bits up to `nt`
    /// bits, truncating when the vector is already longer than `nt`.
    pub fn adjust_size(&mut self, nv: usize, nt: usize) {
        if self.nbits < nv {
            let n = nv - self.nbits;
            self.append_fill(true, n);
        }
        if self.nbits < nt {
            let n = nt - self.nbits;
            self.append_fill(false, n);
        } else if self.nbits > nt {
            let mut out = Bitvector::new();
            let mut rem = nt;
            for w in self.vec.iter() {
                if rem == 0 {
                    break;
                }
                let ng = if is_fill(*w) { fill_count(*w) } else { 1 };
                let gbits = ng * MAXBITS;
                if rem >= gbits {
                    if is_fill(*w) {
                        out.append_fill(fill_bit(*w) != 0, gbits);
                    } else {
                        for j in 0..MAXBITS {
                            out.append_fill(*w & (1 << (MAXBITS - 1 - j)) != 0, 1);
                        }
                    }
                    rem -= gbits;
                } else {
                    if is_fill(*w) {
                        out.append_fill(fill_bit(*w) != 0, rem);
                    } else {
                        for j in 0..rem {
                            out.append_fill(*w & (1 << (MAXBITS - 1 - j)) != 0, 1);
                        }
                    }
                    rem = 0;
                }
            }
            for j in 0..rem {
                let mask = 1u32 << (self.active_nbits as usize - 1 - j);
                out.append_fill(self.active_val & mask != 0, 1);
            }
            *self = out;
        }
    }

    /// Append every bit of `other` after the bits of `self`.
    pub fn extend_from(&mut self, other: &Bitvector) {
        for w in other.vec.iter() {
            if is_fill(*w) {
                self.append_fill(fill_bit(*w) != 0, fill_count(*w) * MAXBITS);
            } else {
                for j in 0..MAXBITS {
                    self.append_fill(*w & (1 << (MAXBITS - 1 - j)) != 0, 1);
                }
            }
        }
        let nb = other.active_nbits as usize;
        for j in 0..nb {
            self.append_fill(other.active_val & (1 << (nb - 1 - j)) != 0, 1);
        }
    }

    fn binary_op<F>(&self, other: &Bitvector, op: F) -> Bitvector
    where
        F: Fn(u32, u32) -> u32,
    {
        // operate over equal sizes, missing tail reads as zero fill
        let a;
        let b;
        let (x, y) = match self.nbits.cmp(&other.nbits) {
            cmp::Ordering::Equal => (self, other),
            cmp::Ordering::Less => {
                a = {
                    let mut a = self.clone();
                    a.append_fill(false, other.nbits - self.nbits);
                    a
                };
                (&a, other)
            }
            cmp::Ordering::Greater => {
                b = {
                    let mut b = other.clone();
                    b.append_fill(false, self.nbits - other.nbits);
                    b
                };
                (self, &b)
            }
        };

        let mut out = Bitvector::new();
        let mut da = Decoder::new(&x.vec);
        let mut db = Decoder::new(&y.vec);
        loop {
            match (da.current(), db.current()) {
                (Some((na, pa)), Some((nb, pb))) => {
                    let m = cmp::min(na, nb);
                    let w = op(pa, pb) & ALLONES;
                    if m == 1 {
                        out.push_literal(w);
                    } else {
                        // m > 1 only when both sides are fills
                        out.push_fill(if w != 0 { 1 } else { 0 }, m);
                    }
                    out.nbits += m * MAXBITS;
                    da.advance(m);
                    db.advance(m);
                }
                (None, None) => break,
                _ => unreachable!("operands have equal group counts"),
            }
        }

        out.active_nbits = x.active_nbits;
        if out.active_nbits > 0 {
            let mask = (1u32 << out.active_nbits) - 1;
            out.active_val = op(x.active_val, y.active_val) & mask;
            out.nbits += out.active_nbits as usize;
        }
        out
    }

    /// Iterate over maximal runs and literal batches of set bits.
    pub fn index_sets(&self) -> IndexSetIter {
        IndexSetIter {
            bv: self,
            word: 0,
            base: 0,
            done_active: false,
        }
    }

    /// Iterate over the positions of all set bits.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.index_sets().flat_map(|ix| match ix {
            IndexSet::Range { begin, end } => (begin..end).collect::<Vec<usize>>(),
            IndexSet::Sparse(pos) => pos,
        })
    }

    /// Serialize into `buf`, returning the number of bytes appended.
    pub fn to_bytes(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let nwords = util::to_u32(self.vec.len())?;
        buf.extend_from_slice(&nwords.to_le_bytes());
        for w in self.vec.iter() {
            buf.extend_from_slice(&w.to_le_bytes());
        }
        buf.extend_from_slice(&self.active_val.to_le_bytes());
        buf.extend_from_slice(&(self.active_nbits as u32).to_le_bytes());
        Ok((self.vec.len() + 3) * 4)
    }

    /// Deserialize a bit vector from `buf`, returning the value and the
    /// number of bytes consumed.
    pub fn from_bytes(buf: &[u8]) -> Result<(Bitvector, usize)> {
        use std::convert::TryInto;

        if buf.len() < 4 {
            return err_at!(Corrupt, msg: "bitvector header {}", buf.len());
        }
        let nwords = u32::from_le_bytes(buf[..4].try_into().unwrap()) as usize;
        let want = (nwords + 3) * 4;
        if buf.len() < want {
            return err_at!(Corrupt, msg: "bitvector body {}/{}", buf.len(), want);
        }

        let mut bv = Bitvector::new();
        let mut ngroups = 0;
        for i in 0..nwords {
            let off = 4 + i * 4;
            let w = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            ngroups += if is_fill(w) { fill_count(w) } else { 1 };
            bv.vec.push(w);
        }
        let off = 4 + nwords * 4;
        bv.active_val = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let nb = u32::from_le_bytes(buf[off + 4..off + 8].try_into().unwrap());
        if nb as usize >= MAXBITS {
            return err_at!(Corrupt, msg: "bitvector active bits {}", nb);
        }
        bv.active_nbits = nb as u8;
        bv.nbits = ngroups * MAXBITS + nb as usize;
        Ok((bv, want))
    }

    /// Number of bytes [Bitvector::to_bytes] will produce.
    pub fn serial_size(&self) -> usize {
        (self.vec.len() + 3) * 4
    }
}

// word-stream decoder handing out (remaining-groups, payload) pairs.
struct Decoder<'a> {
    words: &'a [u32],
    pos: usize,
    rem: usize,
}

impl<'a> Decoder<'a> {
    fn new(words: &'a [u32]) -> Decoder<'a> {
        let rem = match words.first() {
            Some(w) if is_fill(*w) => fill_count(*w),
            Some(_) => 1,
            None => 0,
        };
        Decoder { words, pos: 0, rem }
    }

    fn current(&self) -> Option<(usize, u32)> {
        let w = *self.words.get(self.pos)?;
        let payload = if is_fill(w) {
            if fill_bit(w) != 0 {
                ALLONES
            } else {
                0
            }
        } else {
            w
        };
        Some((self.rem, payload))
    }

    fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.rem);
        self.rem -= n;
        if self.rem == 0 {
            self.pos += 1;
            self.rem = match self.words.get(self.pos) {
                Some(w) if is_fill(*w) => fill_count(*w),
                Some(_) => 1,
                None => 0,
            };
        }
    }
}

/// One batch of set bits: either a dense run `[begin, end)` or a list
/// of positions decoded from a single literal word.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexSet {
    Range { begin: usize, end: usize },
    Sparse(Vec<usize>),
}

pub struct IndexSetIter<'a> {
    bv: &'a Bitvector,
    word: usize,
    base: usize, // absolute bit position of the current word
    done_active: bool,
}

impl<'a> Iterator for IndexSetIter<'a> {
    type Item = IndexSet;

    fn next(&mut self) -> Option<IndexSet> {
        while self.word < self.bv.vec.len() {
            let w = self.bv.vec[self.word];
            self.word += 1;
            if is_fill(w) {
                let n = fill_count(w) * MAXBITS;
                let begin = self.base;
                self.base += n;
                if fill_bit(w) != 0 {
                    return Some(IndexSet::Range { begin, end: begin + n });
                }
            } else {
                let begin = self.base;
                self.base += MAXBITS;
                if w == ALLONES {
                    return Some(IndexSet::Range { begin, end: begin + MAXBITS });
                } else if w != 0 {
                    let mut pos = Vec::with_capacity(w.count_ones() as usize);
                    for j in 0..MAXBITS {
                        if w & (1 << (MAXBITS - 1 - j)) != 0 {
                            pos.push(begin + j);
                        }
                    }
                    return Some(IndexSet::Sparse(pos));
                }
            }
        }

        if !self.done_active {
            self.done_active = true;
            let nb = self.bv.active_nbits as usize;
            if nb > 0 && self.bv.active_val != 0 {
                let mut pos = vec![];
                for j in 0..nb {
                    if self.bv.active_val & (1 << (nb - 1 - j)) != 0 {
                        pos.push(self.base + j);
                    }
                }
                return Some(IndexSet::Sparse(pos));
            }
        }
        None
    }
}

impl PartialEq for Bitvector {
    fn eq(&self, other: &Bitvector) -> bool {
        self.nbits == other.nbits && (self ^ other).cnt() == 0
    }
}

macro_rules! impl_bitop {
    ($trait:ident, $method:ident, $trait_assign:ident, $method_assign:ident, $op:expr) => {
        impl ops::$trait<&Bitvector> for &Bitvector {
            type Output = Bitvector;

            fn $method(self, rhs: &Bitvector) -> Bitvector {
                self.binary_op(rhs, $op)
            }
        }

        impl ops::$trait_assign<&Bitvector> for Bitvector {
            fn $method_assign(&mut self, rhs: &Bitvector) {
                *self = self.binary_op(rhs, $op);
            }
        }
    };
}

impl_bitop!(BitAnd, bitand, BitAndAssign, bitand_assign, |x, y| x & y);
impl_bitop!(BitOr, bitor, BitOrAssign, bitor_assign, |x, y| x | y);
impl_bitop!(BitXor, bitxor, BitXorAssign, bitxor_assign, |x, y| x ^ y);
impl_bitop!(Sub, sub, SubAssign, sub_assign, |x, y| x & !y);

impl fmt::Debug for Bitvector {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(
            f,
            "Bitvector<size={} cnt={} words={}>",
            self.nbits,
            self.cnt(),
            self.vec.len()
        )
    }
}

#[cfg(test)]
#[path = "bitvector_test.rs"]
mod bitvector_test;
