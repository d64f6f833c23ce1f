//! Module `array` implement the typed view over reference-counted byte
//! storage. Every typed read from a column data file goes through this
//! module.

use std::{
    cmp,
    convert::TryFrom,
    ffi, fs,
    io::{Read, Seek},
    marker,
    sync::Arc,
};

use crate::{types::Element, util, Error, Result};

/// Reference-counted, immutable byte storage. Clones share the same
/// allocation; dropping a view never closes the file it was read from.
#[derive(Clone, Default)]
pub struct Bytes {
    data: Arc<Vec<u8>>,
}

impl From<Vec<u8>> for Bytes {
    fn from(data: Vec<u8>) -> Bytes {
        Bytes { data: Arc::new(data) }
    }
}

impl Bytes {
    /// Read the whole file at `loc` into storage.
    pub fn from_file(loc: &ffi::OsStr) -> Result<Bytes> {
        let data = err_at!(IOError, fs::read(loc), "reading {:?}", loc)?;
        Ok(Bytes { data: Arc::new(data) })
    }

    /// Read bytes `[begin, end)` from an open descriptor.
    pub fn read_range(fd: &mut fs::File, begin: u64, end: u64) -> Result<Bytes> {
        let seek = std::io::SeekFrom::Start(begin);
        let data = read_file!(fd, seek, end - begin, "array read_range")?;
        Ok(Bytes { data: Arc::new(data) })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

enum Repr<T> {
    /// Zero-copy view over shared bytes; decoded on access.
    Shared(Bytes),
    /// Privately owned, mutable values.
    Owned(Vec<T>),
}

/// A typed array over [Bytes] storage, or over privately owned values
/// once a mutating operation forced a copy (see [Array::nosharing]).
pub struct Array<T>
where
    T: Element,
{
    repr: Repr<T>,
    _t: marker::PhantomData<T>,
}

impl<T> Default for Array<T>
where
    T: Element,
{
    fn default() -> Array<T> {
        Array::from_vec(vec![])
    }
}

impl<T> Clone for Array<T>
where
    T: Element,
{
    fn clone(&self) -> Array<T> {
        match &self.repr {
            Repr::Shared(bytes) => Array {
                repr: Repr::Shared(bytes.clone()),
                _t: marker::PhantomData,
            },
            Repr::Owned(values) => Array::from_vec(values.clone()),
        }
    }
}

impl<T> Array<T>
where
    T: Element,
{
    pub fn from_vec(values: Vec<T>) -> Array<T> {
        Array {
            repr: Repr::Owned(values),
            _t: marker::PhantomData,
        }
    }

    /// Typed view over shared storage; trailing bytes short of one
    /// element are ignored.
    pub fn from_bytes(bytes: Bytes) -> Array<T> {
        Array {
            repr: Repr::Shared(bytes),
            _t: marker::PhantomData,
        }
    }

    /// Read the whole file at `loc` as a typed array.
    pub fn from_file(loc: &ffi::OsStr) -> Result<Array<T>> {
        Ok(Array::from_bytes(Bytes::from_file(loc)?))
    }

    /// Read elements `[begin, end)` (element offsets, not bytes) from an
    /// open descriptor.
    pub fn read_range(fd: &mut fs::File, begin: usize, end: usize) -> Result<Array<T>> {
        let b = err_at!(FailConvert, u64::try_from(begin * T::SIZE))?;
        let e = err_at!(FailConvert, u64::try_from(end * T::SIZE))?;
        Ok(Array::from_bytes(Bytes::read_range(fd, b, e)?))
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Shared(bytes) => bytes.len() / T::SIZE,
            Repr::Owned(values) => values.len(),
        }
    }

    pub fn get(&self, i: usize) -> Option<T> {
        match &self.repr {
            Repr::Shared(bytes) => {
                let off = i * T::SIZE;
                if off + T::SIZE <= bytes.len() {
                    Some(T::from_le_bytes(&bytes.as_slice()[off..off + T::SIZE]))
                } else {
                    None
                }
            }
            Repr::Owned(values) => values.get(i).copied(),
        }
    }

    /// Force an owned copy of the values before mutation. A no-op when
    /// the array already owns its values.
    pub fn nosharing(&mut self) -> &mut Vec<T> {
        if let Repr::Shared(bytes) = &self.repr {
            let n = bytes.len() / T::SIZE;
            let mut values = Vec::with_capacity(n);
            for i in 0..n {
                let off = i * T::SIZE;
                values.push(T::from_le_bytes(&bytes.as_slice()[off..off + T::SIZE]));
            }
            self.repr = Repr::Owned(values);
        }
        match &mut self.repr {
            Repr::Owned(values) => values,
            Repr::Shared(_) => unreachable!(),
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        match &self.repr {
            Repr::Shared(_) => (0..self.len()).map(|i| self.get(i).unwrap()).collect(),
            Repr::Owned(values) => values.clone(),
        }
    }

    pub fn push(&mut self, value: T) {
        self.nosharing().push(value)
    }

    /// Keep `keep` elements starting from `start`, dropping the rest.
    pub fn truncate(&mut self, keep: usize, start: usize) {
        let values = self.nosharing();
        if start > 0 {
            values.drain(..cmp::min(start, values.len()));
        }
        values.truncate(keep);
    }

    pub fn swap(&mut self, i: usize, j: usize) {
        self.nosharing().swap(i, j)
    }

    /// Fill `perm` with `0..len` reordered so that values visited
    /// through it are non-decreasing; equal values keep their original
    /// relative order.
    pub fn sort_permutation(&self, perm: &mut Vec<u32>) {
        perm.clear();
        perm.extend(0..self.len() as u32);
        let values = self.to_vec();
        perm.sort_by(|a, b| values[*a as usize].total_cmp(&values[*b as usize]));
    }

    /// First position `p` in permuted order with `value[perm[p]] >=
    /// key`; `perm.len()` when every value is smaller.
    pub fn lower_bound(&self, perm: &[u32], key: T) -> usize {
        let mut lo = 0;
        let mut hi = perm.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let v = self.get(perm[mid] as usize).unwrap();
            if v.total_cmp(&key) == cmp::Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Serialize all elements little-endian into `buf`.
    pub fn write_le_bytes(&self, buf: &mut Vec<u8>) {
        for i in 0..self.len() {
            self.get(i).unwrap().write_le_bytes(buf);
        }
    }
}

/// Read element `i` of a typed file through an open descriptor without
/// materializing the rest of the file.
pub fn read_element<T>(fd: &mut fs::File, i: usize) -> Result<T>
where
    T: Element,
{
    let seek = std::io::SeekFrom::Start((i * T::SIZE) as u64);
    let buf = read_file!(fd, seek, T::SIZE, "array read_element")?;
    Ok(T::from_le_bytes(&buf))
}

/// Number of elements in the typed file at `loc`.
pub fn element_count<T>(loc: &ffi::OsStr) -> usize
where
    T: Element,
{
    (util::file_size(loc) as usize) / T::SIZE
}

#[cfg(test)]
#[path = "array_test.rs"]
mod array_test;
