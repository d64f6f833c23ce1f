//! Package implement [Values], the typed in-memory column buffers
//! behind query results and group-by aggregation.
//!
//! `Values` is a tagged sum with one variant per fixed-width element
//! type and one for strings; every operation dispatches on the tag
//! into a single generic routine, so the sort/segment/reduce machinery
//! exists once. Sorting is a hybrid: selection sort for slices of at
//! most 32 elements, median-of-three quicksort above that, with every
//! swap echoed to a [Permuter] so sibling arrays (row ids, the other
//! columns of a table) stay aligned.

use log::warn;

use std::cmp;

use crate::{
    bitvector::Bitvector,
    dict::Dictionary,
    query::Aggregator,
    types::{Element, ElementType, Scalar},
    Column, Error, Result,
};

mod sorting;

use sorting::{hybrid_sort, segment_starts, stable_argsort};

/// Cutoff below which the hybrid sort switches to selection sort.
pub(crate) const SORT_CUTOFF: usize = 32;

/// Companion of a sort: receives every swap so parallel arrays stay in
/// lockstep with the keys.
pub trait Permuter {
    fn swap_rows(&mut self, i: usize, j: usize);
}

/// Permuter that drops the swaps.
pub struct NoPermuter;

impl Permuter for NoPermuter {
    fn swap_rows(&mut self, _i: usize, _j: usize) {}
}

impl Permuter for Vec<u32> {
    fn swap_rows(&mut self, i: usize, j: usize) {
        self.swap(i, j)
    }
}

/// Lockstep permuter over sibling columns.
pub struct Companions<'a>(pub &'a mut [Values]);

impl<'a> Permuter for Companions<'a> {
    fn swap_rows(&mut self, i: usize, j: usize) {
        for v in self.0.iter_mut() {
            v.swap(i, j)
        }
    }
}

/// A typed in-memory column of values.
#[derive(Clone, Debug, PartialEq)]
pub enum Values {
    Byte(Vec<i8>),
    UByte(Vec<u8>),
    Short(Vec<i16>),
    UShort(Vec<u16>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
    Long(Vec<i64>),
    ULong(Vec<u64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Text(Vec<String>),
}

// dispatch into one generic block for the numeric variants and one for
// strings.
macro_rules! dispatch {
    ($values:expr, $arr:ident, $nbody:block, $strs:ident, $sbody:block) => {
        match $values {
            Values::Byte($arr) => $nbody,
            Values::UByte($arr) => $nbody,
            Values::Short($arr) => $nbody,
            Values::UShort($arr) => $nbody,
            Values::Int($arr) => $nbody,
            Values::UInt($arr) => $nbody,
            Values::Long($arr) => $nbody,
            Values::ULong($arr) => $nbody,
            Values::Float($arr) => $nbody,
            Values::Double($arr) => $nbody,
            Values::Text($strs) => $sbody,
        }
    };
}

impl Values {
    /// An empty buffer of the given element type. `Category` buffers
    /// are string-valued, their codes resolved at creation.
    pub fn new(typ: ElementType) -> Result<Values> {
        use ElementType::*;

        match typ {
            Byte => Ok(Values::Byte(vec![])),
            UByte => Ok(Values::UByte(vec![])),
            Short => Ok(Values::Short(vec![])),
            UShort => Ok(Values::UShort(vec![])),
            Int => Ok(Values::Int(vec![])),
            UInt => Ok(Values::UInt(vec![])),
            Long => Ok(Values::Long(vec![])),
            ULong => Ok(Values::ULong(vec![])),
            Float => Ok(Values::Float(vec![])),
            Double => Ok(Values::Double(vec![])),
            Category | Text => Ok(Values::Text(vec![])),
            typ => err_at!(TypeMismatch, msg: "no value buffer for {:?}", typ),
        }
    }

    /// Materialize `col` under the `hits` bitmap. Category columns
    /// load their codes through the u32 selector and resolve them
    /// through the dictionary; text columns read through `.sp`.
    pub fn create(col: &Column, hits: &Bitvector) -> Result<Values> {
        use ElementType::*;

        match col.element_type() {
            Byte => Ok(Values::Byte(col.select_values(hits)?)),
            UByte => Ok(Values::UByte(col.select_values(hits)?)),
            Short => Ok(Values::Short(col.select_values(hits)?)),
            UShort => Ok(Values::UShort(col.select_values(hits)?)),
            Int => Ok(Values::Int(col.select_values(hits)?)),
            UInt => Ok(Values::UInt(col.select_values(hits)?)),
            Long => Ok(Values::Long(col.select_values(hits)?)),
            ULong => Ok(Values::ULong(col.select_values(hits)?)),
            Float => Ok(Values::Float(col.select_values(hits)?)),
            Double => Ok(Values::Double(col.select_values(hits)?)),
            Category => {
                let codes: Vec<u32> = col.select_values(hits)?;
                let dict = Dictionary::read(&col.dict_location())?;
                let strs = codes
                    .into_iter()
                    .map(|c| dict.term(c).unwrap_or_default().to_string())
                    .collect();
                Ok(Values::Text(strs))
            }
            Text => Ok(Values::Text(col.select_strings(hits)?)),
            typ => err_at!(TypeMismatch, msg: "no value buffer for {:?}", typ),
        }
    }

    pub fn len(&self) -> usize {
        dispatch!(self, arr, { arr.len() }, strs, { strs.len() })
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Values::Byte(_) => ElementType::Byte,
            Values::UByte(_) => ElementType::UByte,
            Values::Short(_) => ElementType::Short,
            Values::UShort(_) => ElementType::UShort,
            Values::Int(_) => ElementType::Int,
            Values::UInt(_) => ElementType::UInt,
            Values::Long(_) => ElementType::Long,
            Values::ULong(_) => ElementType::ULong,
            Values::Float(_) => ElementType::Float,
            Values::Double(_) => ElementType::Double,
            Values::Text(_) => ElementType::Text,
        }
    }

    pub fn get_scalar(&self, i: usize) -> Option<Scalar> {
        match self {
            Values::Byte(arr) => arr.get(i).map(|v| Scalar::Byte(*v)),
            Values::UByte(arr) => arr.get(i).map(|v| Scalar::UByte(*v)),
            Values::Short(arr) => arr.get(i).map(|v| Scalar::Short(*v)),
            Values::UShort(arr) => arr.get(i).map(|v| Scalar::UShort(*v)),
            Values::Int(arr) => arr.get(i).map(|v| Scalar::Int(*v)),
            Values::UInt(arr) => arr.get(i).map(|v| Scalar::UInt(*v)),
            Values::Long(arr) => arr.get(i).map(|v| Scalar::Long(*v)),
            Values::ULong(arr) => arr.get(i).map(|v| Scalar::ULong(*v)),
            Values::Float(arr) => arr.get(i).map(|v| Scalar::Float(*v)),
            Values::Double(arr) => arr.get(i).map(|v| Scalar::Double(*v)),
            Values::Text(strs) => strs.get(i).map(|v| Scalar::Text(v.clone())),
        }
    }

    /// Numeric view of element `i`; `None` for strings or out of
    /// range.
    pub fn to_f64(&self, i: usize) -> Option<f64> {
        dispatch!(self, arr, { arr.get(i).map(|v| v.to_f64()) }, _strs, { None })
    }

    /// Compare two rows under the buffer's natural order.
    pub fn cmp_rows(&self, i: usize, j: usize) -> cmp::Ordering {
        dispatch!(
            self,
            arr,
            { arr[i].total_cmp(&arr[j]) },
            strs,
            { strs[i].cmp(&strs[j]) }
        )
    }

    pub fn swap(&mut self, i: usize, j: usize) {
        dispatch!(self, arr, { arr.swap(i, j) }, strs, { strs.swap(i, j) })
    }

    /// Append `n` sentinel elements (empty strings for text); used to
    /// pad columns a source partition does not carry.
    pub fn push_sentinels(&mut self, n: usize) {
        dispatch!(
            self,
            arr,
            {
                arr.resize(arr.len() + n, Element::SENTINEL);
            },
            strs,
            {
                strs.resize(strs.len() + n, String::default());
            }
        )
    }

    /// Concatenate a same-typed buffer.
    pub fn extend_values(&mut self, other: &Values) -> Result<()> {
        match (self, other) {
            (Values::Byte(a), Values::Byte(b)) => Ok(a.extend_from_slice(b)),
            (Values::UByte(a), Values::UByte(b)) => Ok(a.extend_from_slice(b)),
            (Values::Short(a), Values::Short(b)) => Ok(a.extend_from_slice(b)),
            (Values::UShort(a), Values::UShort(b)) => Ok(a.extend_from_slice(b)),
            (Values::Int(a), Values::Int(b)) => Ok(a.extend_from_slice(b)),
            (Values::UInt(a), Values::UInt(b)) => Ok(a.extend_from_slice(b)),
            (Values::Long(a), Values::Long(b)) => Ok(a.extend_from_slice(b)),
            (Values::ULong(a), Values::ULong(b)) => Ok(a.extend_from_slice(b)),
            (Values::Float(a), Values::Float(b)) => Ok(a.extend_from_slice(b)),
            (Values::Double(a), Values::Double(b)) => Ok(a.extend_from_slice(b)),
            (Values::Text(a), Values::Text(b)) => Ok(a.extend_from_slice(b)),
            (a, b) => err_at!(
                TypeMismatch, msg: "extend {:?} with {:?}", a.element_type(), b.element_type()
            ),
        }
    }

    /// Hybrid in-place sort of `[begin, end)`, echoing every swap to
    /// `bdl` so sibling arrays stay aligned.
    pub fn sort_range(&mut self, begin: usize, end: usize, bdl: &mut dyn Permuter) {
        let end = cmp::min(end, self.len());
        if begin >= end {
            return;
        }
        dispatch!(
            self,
            arr,
            { hybrid_sort(arr, begin, end, &|a, b| a.total_cmp(b), bdl) },
            strs,
            { hybrid_sort(strs, begin, end, &|a, b| a.cmp(b), bdl) }
        )
    }

    /// Stable permutation of `[begin, end)` (absolute indices) sorting
    /// the slice, without disturbing the buffer.
    pub fn sort_indices(&self, begin: usize, end: usize) -> Vec<u32> {
        let end = cmp::min(end, self.len());
        if begin >= end {
            return vec![];
        }
        dispatch!(
            self,
            arr,
            { stable_argsort(arr, begin, end, &|a, b| a.total_cmp(b)) },
            strs,
            { stable_argsort(strs, begin, end, &|a, b| a.cmp(b)) }
        )
    }

    /// Boundary offsets where the sorted value changes. With `old`
    /// from a previous key column, refine within each existing
    /// segment. The result starts at 0 and ends at `len()`.
    pub fn segment(&self, old: Option<&[u32]>) -> Vec<u32> {
        dispatch!(
            self,
            arr,
            { segment_starts(arr, old, &|a, b| a.total_cmp(b)) },
            strs,
            { segment_starts(strs, old, &|a, b| a.cmp(b)) }
        )
    }

    /// Collapse every segment to its first element.
    pub fn reduce(&mut self, starts: &[u32]) {
        let nseg = starts.len().saturating_sub(1);
        dispatch!(
            self,
            arr,
            {
                for i in 0..nseg {
                    arr[i] = arr[starts[i] as usize];
                }
                arr.truncate(nseg);
                arr.shrink_to_fit();
            },
            strs,
            {
                for i in 0..nseg {
                    strs[i] = strs[starts[i] as usize].clone();
                }
                strs.truncate(nseg);
                strs.shrink_to_fit();
            }
        )
    }

    /// Collapse every segment `[starts[i], starts[i+1])` with the
    /// aggregation operator. String buffers support NIL, CNT, MIN,
    /// MAX, DISTINCT and MEDIAN; arithmetic operators log a warning
    /// and degrade to NIL.
    pub fn reduce_op(&mut self, starts: &[u32], op: Aggregator) {
        let nseg = starts.len().saturating_sub(1);
        match self {
            values if op == Aggregator::Cnt => {
                // counts have a fixed output domain, re-tag as uint
                let mut out = Vec::with_capacity(nseg);
                for i in 0..nseg {
                    out.push(starts[i + 1] - starts[i]);
                }
                *values = Values::UInt(out);
            }
            Values::Text(strs) => {
                let op = if op.is_arithmetic() {
                    warn!(
                        target: "memtab ",
                        "{} over strings is undefined, keeping first values", op
                    );
                    Aggregator::Nil
                } else {
                    op
                };
                reduce_strings(strs, starts, op);
            }
            values => dispatch!(
                values,
                arr,
                { reduce_numeric(arr, starts, op) },
                _strs,
                { unreachable!() }
            ),
        }
    }

    /// Gather through a permutation: element `i` of the result is
    /// element `perm[i]` of the buffer.
    pub fn reorder(&mut self, perm: &[u32]) -> Result<()> {
        if perm.len() > self.len() {
            return err_at!(InvalidInput, msg: "perm {} over {}", perm.len(), self.len());
        }
        dispatch!(
            self,
            arr,
            {
                let out: Vec<_> = perm.iter().map(|p| arr[*p as usize]).collect();
                *arr = out;
                Ok(())
            },
            strs,
            {
                let out: Vec<_> = perm.iter().map(|p| strs[*p as usize].clone()).collect();
                *strs = out;
                Ok(())
            }
        )
    }

    /// The `k` largest values in ascending order, including every tie
    /// of the boundary value.
    pub fn topk(&self, k: usize) -> Values {
        self.extreme(k, true)
    }

    /// The `k` smallest values in ascending order, including boundary
    /// ties.
    pub fn bottomk(&self, k: usize) -> Values {
        self.extreme(k, false)
    }

    fn extreme(&self, k: usize, top: bool) -> Values {
        dispatch!(
            self,
            arr,
            {
                let mut work = arr.clone();
                let n = work.len();
                if k == 0 || n == 0 {
                    work.clear();
                    return Values::from_vec(work);
                }
                if k >= n {
                    work.sort_by(|a, b| a.total_cmp(b));
                    return Values::from_vec(work);
                }
                let nth = if top { n - k } else { k - 1 };
                work.select_nth_unstable_by(nth, |a, b| a.total_cmp(b));
                let pivot = work[nth];
                let mut out: Vec<_> = if top {
                    work.into_iter()
                        .filter(|v| v.total_cmp(&pivot) != cmp::Ordering::Less)
                        .collect()
                } else {
                    work.into_iter()
                        .filter(|v| v.total_cmp(&pivot) != cmp::Ordering::Greater)
                        .collect()
                };
                out.sort_by(|a, b| a.total_cmp(b));
                Values::from_vec(out)
            },
            strs,
            {
                let mut work = strs.clone();
                let n = work.len();
                if k == 0 || n == 0 {
                    return Values::Text(vec![]);
                }
                if k >= n {
                    work.sort();
                    return Values::Text(work);
                }
                let nth = if top { n - k } else { k - 1 };
                work.select_nth_unstable(nth);
                let pivot = work[nth].clone();
                let mut out: Vec<String> = if top {
                    work.into_iter().filter(|v| *v >= pivot).collect()
                } else {
                    work.into_iter().filter(|v| *v <= pivot).collect()
                };
                out.sort();
                Values::Text(out)
            }
        )
    }

    /// Retain `keep` elements starting at `start`.
    pub fn truncate(&mut self, keep: usize, start: usize) {
        dispatch!(
            self,
            arr,
            {
                if start > 0 {
                    arr.drain(..cmp::min(start, arr.len()));
                }
                arr.truncate(keep);
            },
            strs,
            {
                if start > 0 {
                    strs.drain(..cmp::min(start, strs.len()));
                }
                strs.truncate(keep);
            }
        )
    }

    /// Serialize elements little-endian; strings as NUL-terminated
    /// bytes.
    pub fn write_le_bytes(&self, buf: &mut Vec<u8>) {
        dispatch!(
            self,
            arr,
            {
                for v in arr.iter() {
                    v.write_le_bytes(buf);
                }
            },
            strs,
            {
                for s in strs.iter() {
                    buf.extend_from_slice(s.as_bytes());
                    buf.push(0);
                }
            }
        )
    }
}

// conversion glue letting the generic blocks rebuild a Values from a
// typed vector.
trait FromVec<T> {
    fn from_vec(vals: Vec<T>) -> Values;
}

macro_rules! impl_from_vec {
    ($($type:ty, $tag:ident,)*) => {
        $(
            impl FromVec<$type> for Values {
                fn from_vec(vals: Vec<$type>) -> Values {
                    Values::$tag(vals)
                }
            }
        )*
    };
}

impl_from_vec! {
    i8, Byte,
    u8, UByte,
    i16, Short,
    u16, UShort,
    i32, Int,
    u32, UInt,
    i64, Long,
    u64, ULong,
    f32, Float,
    f64, Double,
}

impl Values {
    fn from_vec<T>(vals: Vec<T>) -> Values
    where
        Values: FromVec<T>,
    {
        <Values as FromVec<T>>::from_vec(vals)
    }
}

// per-segment numeric reduction; accumulation in f64, cast back to T.
fn reduce_numeric<T>(arr: &mut Vec<T>, starts: &[u32], op: Aggregator)
where
    T: Element,
{
    use Aggregator::*;

    let nseg = starts.len().saturating_sub(1);
    for i in 0..nseg {
        let (s, e) = (starts[i] as usize, starts[i + 1] as usize);
        let n = e - s;
        debug_assert!(n > 0);
        arr[i] = match op {
            Nil | Cnt => arr[s],
            Avg => {
                let sum: f64 = arr[s..e].iter().map(|v| v.to_f64()).sum();
                T::from_f64(sum / (n as f64))
            }
            Sum => {
                let sum: f64 = arr[s..e].iter().map(|v| v.to_f64()).sum();
                T::from_f64(sum)
            }
            Min => {
                let mut m = arr[s];
                for v in arr[s + 1..e].iter() {
                    if v.total_cmp(&m) == cmp::Ordering::Less {
                        m = *v;
                    }
                }
                m
            }
            Max => {
                let mut m = arr[s];
                for v in arr[s + 1..e].iter() {
                    if v.total_cmp(&m) == cmp::Ordering::Greater {
                        m = *v;
                    }
                }
                m
            }
            VarPop | VarSamp | StdPop | StdSamp => {
                let sum: f64 = arr[s..e].iter().map(|v| v.to_f64()).sum();
                let avg = sum / (n as f64);
                let sq: f64 = arr[s..e]
                    .iter()
                    .map(|v| (v.to_f64() - avg) * (v.to_f64() - avg))
                    .sum();
                // sample denominators subtract one, clamped at one
                let div = match op {
                    VarSamp | StdSamp if n > 1 => (n - 1) as f64,
                    _ => n as f64,
                };
                let var = sq / div;
                match op {
                    VarPop | VarSamp => T::from_f64(var),
                    _ => T::from_f64(var.sqrt()),
                }
            }
            Distinct => {
                arr[s..e].sort_by(|a, b| a.total_cmp(b));
                let mut distinct = 1u32;
                for j in s + 1..e {
                    if arr[j].total_cmp(&arr[j - 1]) != cmp::Ordering::Equal {
                        distinct += 1;
                    }
                }
                T::from_f64(distinct as f64)
            }
            Median => {
                arr[s..e].sort_by(|a, b| a.total_cmp(b));
                if n % 2 == 1 {
                    arr[s + n / 2]
                } else {
                    let a = arr[s + n / 2 - 1].to_f64();
                    let b = arr[s + n / 2].to_f64();
                    T::from_f64((a + b) / 2.0)
                }
            }
        };
    }
    arr.truncate(nseg);
    arr.shrink_to_fit();
}

// string reduction for the non-arithmetic operators; MEDIAN of an even
// segment takes the upper of the two central elements.
fn reduce_strings(strs: &mut Vec<String>, starts: &[u32], op: Aggregator) {
    use Aggregator::*;

    let nseg = starts.len().saturating_sub(1);
    for i in 0..nseg {
        let (s, e) = (starts[i] as usize, starts[i + 1] as usize);
        let n = e - s;
        strs[i] = match op {
            Min => strs[s..e].iter().min().unwrap().clone(),
            Max => strs[s..e].iter().max().unwrap().clone(),
            Distinct => {
                strs[s..e].sort();
                let mut distinct = 1u64;
                for j in s + 1..e {
                    if strs[j] != strs[j - 1] {
                        distinct += 1;
                    }
                }
                distinct.to_string()
            }
            Median => {
                strs[s..e].sort();
                strs[s + n / 2].clone()
            }
            _ => strs[s].clone(),
        };
    }
    strs.truncate(nseg);
    strs.shrink_to_fit();
}
