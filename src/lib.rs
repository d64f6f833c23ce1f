//! Colbit is a column-oriented, read-mostly storage engine that
//! accelerates ad-hoc predicate evaluation over large tabular datasets
//! using compressed bitmap indexes.
//!
//! Data is organised as a [Table] of one or more [Partition]s. Each
//! partition stores every column as a dense little-endian array file on
//! disk, with a compressed-bitmap null mask alongside. Bitmap indexes,
//! one bit vector per distinct value or value bucket, are built per
//! column and persisted next to the data with a forward-compatible
//! offset-table envelope; at query time they are combined with
//! on-demand scans to produce exact answer bitmaps.
//!
//! **Inventory of subsystems**
//!
//! * [Bitvector] -- word-aligned hybrid run-length/literal compressed
//!   bit vector, the currency of all predicate evaluation.
//! * [Column] -- one typed attribute of a partition, with the
//!   `select_*` family that materializes values under a hit bitmap.
//! * [index] -- bitmap index flavors (equality buckets, binned
//!   ranges, keyword/term-document) sharing one on-disk envelope.
//! * [Roster] -- an out-of-core merge sort producing a sorted-values
//!   file plus a permutation, used for large discrete-set membership.
//! * [Values] -- typed in-memory result columns with sort, segment,
//!   reduce (group-by aggregation), topk and bottomk.
//! * [MemTable] -- a materialized result table with group-by,
//!   order-by, limit and a row cursor.
//! * [Table] -- the multi-partition front door that fans queries out
//!   and concatenates results.
//!
//! Queries are expressed as [Range] / [DiscreteSet] predicates over a
//! single column (the SQL surface lives outside this crate). The
//! evaluation pipeline intersects the index estimate with the null
//! mask, scans only the candidate rows the index could not decide, and
//! never propagates an index failure: a broken or stale index is
//! unloaded and the query degrades to a scan.

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Macro expanded to either of the two,
///
/// ```ignore
/// Error::<variant>(String::default(), format!(...))
/// Error::<variant>(format!("{}:{}", file!(), line!()), format!(...))
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

#[macro_use]
pub mod util;

mod array;
mod bitvector;
mod colvec;
mod column;
mod config;
mod dict;
pub mod index;
mod part;
mod query;
mod roster;
mod table;
mod types;

pub use crate::array::{Array, Bytes};
pub use crate::bitvector::{Bitvector, IndexSet};
pub use crate::colvec::{Companions, NoPermuter, Permuter, Values};
pub use crate::dict::Dictionary;
pub use crate::column::Column;
pub use crate::config::Params;
pub use crate::part::Partition;
pub use crate::query::{Aggregator, DiscreteSet, Range, SelectClause, SelectItem};
pub use crate::roster::Roster;
pub use crate::table::{Cursor, MemTable, Table};
pub use crate::types::{ElementType, Scalar};

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the error
/// location, and a message describing the failure.
#[derive(Clone, PartialEq)]
pub enum Error {
    Fatal(String, String),
    IOError(String, String),
    InvalidFile(String, String),
    InvalidInput(String, String),
    FailConvert(String, String),
    FailCbor(String, String),
    ThreadFail(String, String),
    IPCFail(String, String),
    /// A typed operation was called on an incompatible column; no
    /// state change has taken place.
    TypeMismatch(String, String),
    /// An on-disk index does not match the partition's current row
    /// count; the index is removed and the operation retried as a
    /// scan.
    Stale(String, String),
    /// Header magic or offset-table validation failed; recovery is
    /// identical to [Error::Stale].
    Corrupt(String, String),
    ResourceExhausted(String, String),
    /// The index flavor does not implement the requested operation.
    Unsupported(String, String),
    Cancelled(String, String),
    KeyNotFound(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, m) => write!(f, "{} Fatal: {}", p, m),
            IOError(p, m) => write!(f, "{} IOError: {}", p, m),
            InvalidFile(p, m) => write!(f, "{} InvalidFile: {}", p, m),
            InvalidInput(p, m) => write!(f, "{} InvalidInput: {}", p, m),
            FailConvert(p, m) => write!(f, "{} FailConvert: {}", p, m),
            FailCbor(p, m) => write!(f, "{} FailCbor: {}", p, m),
            ThreadFail(p, m) => write!(f, "{} ThreadFail: {}", p, m),
            IPCFail(p, m) => write!(f, "{} IPCFail: {}", p, m),
            TypeMismatch(p, m) => write!(f, "{} TypeMismatch: {}", p, m),
            Stale(p, m) => write!(f, "{} Stale: {}", p, m),
            Corrupt(p, m) => write!(f, "{} Corrupt: {}", p, m),
            ResourceExhausted(p, m) => write!(f, "{} ResourceExhausted: {}", p, m),
            Unsupported(p, m) => write!(f, "{} Unsupported: {}", p, m),
            Cancelled(p, m) => write!(f, "{} Cancelled: {}", p, m),
            KeyNotFound(p, m) => write!(f, "{} KeyNotFound: {}", p, m),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}

impl Error {
    /// Whether the predicate driver shall downgrade this failure to a
    /// plain scan instead of surfacing it. Everything an index can
    /// throw qualifies, except running out of memory.
    pub fn scan_recoverable(&self) -> bool {
        use Error::*;

        matches!(
            self,
            Fatal(_, _)
                | IOError(_, _)
                | InvalidFile(_, _)
                | Stale(_, _)
                | Corrupt(_, _)
                | Unsupported(_, _)
                | Cancelled(_, _)
        )
    }
}
