//! Package implement [Column], one typed attribute of a partition.
//!
//! A column owns nothing but names: the raw data file, the `.msk` null
//! mask, the `.idx` bitmap index and the `.ind`/`.srt` roster all live
//! in the partition directory and are opened on demand. The null mask
//! is cached behind a spinlock after first load; the index pointer sits
//! behind a read-write lock whose read guards double as borrow handles,
//! so an index can only be unloaded while nobody is using it.

use log::{debug, info, warn};

use std::{ffi, sync::RwLock, sync::RwLockReadGuard};

use crate::{
    bitvector::Bitvector,
    config::Params,
    index::{self, BuildSpec, Index},
    types::ElementType,
    util::{self, Spinlock},
    Error, Result,
};

// expand `$body` with `$T` bound to the fixed-width Rust type backing
// the numeric element type in `$typ`.
macro_rules! with_numeric_type {
    ($self:ident, $typ:expr, $T:ident, $body:block) => {
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
            ElementType::ULong | ElementType::Oid => {
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
            typ => err_at!(
                TypeMismatch, msg: "{:?} column {} is not fixed-width", $self.name, typ
            ),
        }
    };
}

mod append;
mod evaluate;
mod select;

pub(crate) use select::write_whole;

/// Loading state of the per-column index pointer.
pub(crate) enum IndexSlot {
    /// Nothing known yet; the first query probes the `.idx` file.
    Unloaded,
    /// Probed and found absent or unusable; queries scan.
    NoIndex,
    Loaded(Box<dyn Index>),
}

// value statistics; `lower > upper` means unknown/empty.
struct Stats {
    lower: f64,
    upper: f64,
}

/// One typed attribute of a partition.
pub struct Column {
    name: String,
    description: String,
    typ: ElementType,
    part_name: String,
    dir: ffi::OsString,
    nrows: u32,
    sorted: bool,
    params: Params,

    stats: Spinlock<Stats>,
    mask: Spinlock<Option<Bitvector>>,
    index: RwLock<IndexSlot>,
}

impl Column {
    pub fn new(
        name: &str,
        typ: ElementType,
        part_name: &str,
        dir: &ffi::OsStr,
        nrows: u32,
        params: Params,
    ) -> Column {
        Column {
            name: name.to_string(),
            description: String::default(),
            typ,
            part_name: part_name.to_string(),
            dir: dir.to_os_string(),
            nrows,
            sorted: false,
            params,

            stats: Spinlock::new(Stats { lower: 1.0, upper: -1.0 }),
            mask: Spinlock::new(None),
            index: RwLock::new(IndexSlot::Unloaded),
        }
    }

    pub fn set_description(&mut self, description: &str) -> &mut Self {
        self.description = description.to_string();
        self
    }

    /// Hint that the data file is already sorted, enabling binary
    /// search paths without a roster.
    pub fn set_sorted(&mut self, sorted: bool) -> &mut Self {
        self.sorted = sorted;
        self
    }

    pub fn set_bounds(&mut self, lower: f64, upper: f64) -> &mut Self {
        {
            let mut stats = self.stats.write();
            stats.lower = lower;
            stats.upper = upper;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn element_type(&self) -> ElementType {
        self.typ
    }

    pub fn part_name(&self) -> &str {
        &self.part_name
    }

    pub fn nrows(&self) -> u32 {
        self.nrows
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Inclusive lower bound over non-null values; meaningful only
    /// when `lower() <= upper()`.
    pub fn lower(&self) -> f64 {
        self.stats.read().lower
    }

    pub fn upper(&self) -> f64 {
        self.stats.read().upper
    }

    pub fn current_data_dir(&self) -> &ffi::OsStr {
        &self.dir
    }

    pub(crate) fn params(&self) -> &Params {
        &self.params
    }

    pub fn data_location(&self) -> ffi::OsString {
        util::to_column_location(&self.dir, &self.name, "")
    }

    pub fn mask_location(&self) -> ffi::OsString {
        util::to_column_location(&self.dir, &self.name, "msk")
    }

    pub fn index_location(&self) -> ffi::OsString {
        util::to_column_location(&self.dir, &self.name, "idx")
    }

    /// Start-offsets file for variable-length text.
    pub fn spill_location(&self) -> ffi::OsString {
        util::to_column_location(&self.dir, &self.name, "sp")
    }

    pub fn dict_location(&self) -> ffi::OsString {
        util::to_column_location(&self.dir, &self.name, "dic")
    }

    /// The null mask: bit `i` set iff row `i` has a value. Lazily
    /// loaded from `.msk`; an absent file or a short one reads as
    /// all-valid for the missing tail. Cached after first load.
    pub fn null_mask(&self) -> Result<Bitvector> {
        if let Some(mask) = self.mask.read().as_ref() {
            return Ok(mask.clone());
        }

        let loc = self.mask_location();
        let mut bv = if util::file_size(&loc) > 0 {
            let bytes = err_at!(IOError, std::fs::read(&loc), "{:?}", loc)?;
            match Bitvector::from_bytes(&bytes) {
                Ok((bv, _)) => bv,
                Err(err) => {
                    warn!(
                        target: "column ",
                        "{}.{}, bad null mask {:?}: {}", self.part_name, self.name, loc, err
                    );
                    Bitvector::new()
                }
            }
        } else {
            Bitvector::new()
        };
        // absent tail is all-valid; an over-long mask is clipped
        bv.adjust_size(self.nrows as usize, self.nrows as usize);

        let mut slot = self.mask.write();
        if slot.is_none() {
            *slot = Some(bv.clone());
        }
        Ok(bv)
    }

    /// Persist a new null mask and only then replace the cache.
    pub fn write_null_mask(&self, bv: &Bitvector) -> Result<()> {
        let loc = self.mask_location();
        let shadow = {
            let mut shadow = loc.clone();
            shadow.push(".shadow");
            shadow
        };
        let res = || -> Result<()> {
            let mut buf = vec![];
            bv.to_bytes(&mut buf)?;
            let mut fd = util::create_file_a(&shadow)?;
            write_file!(fd, &buf, &shadow, "null mask")?;
            err_at!(IOError, fd.sync_all())?;
            Ok(())
        }();
        match res {
            Ok(_) => {
                util::rename_file(&shadow, &loc)?;
                *self.mask.write() = Some(bv.clone());
                Ok(())
            }
            Err(err) => {
                util::remove_file(&shadow).ok();
                Err(err)
            }
        }
    }

    /// Scan the data file under `mask` and return the actual min/max
    /// of the covered values, refreshing the cached statistics.
    pub fn actual_min_max(&self, mask: &Bitvector) -> Result<(f64, f64)> {
        let (vals, _) = self.to_f64_values(mask)?;
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for v in vals.into_iter().filter(|v| !v.is_nan()) {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if lo <= hi {
            let mut stats = self.stats.write();
            stats.lower = lo;
            stats.upper = hi;
        }
        Ok((lo, hi))
    }

    /// Build (or rebuild) the bitmap index per `spec`, persist it, and
    /// load it into the slot.
    pub fn build_index(&self, spec: &BuildSpec) -> Result<()> {
        let res = index::create(self, spec).and_then(|idx| {
            idx.write(&self.index_location())?;
            Ok(idx)
        });
        let mut slot = self.index.write().expect("index lock poisoned");
        match res {
            Ok(idx) => {
                *slot = IndexSlot::Loaded(idx);
                Ok(())
            }
            Err(err) => {
                if self.params.is_index_disabled_on_failure(&self.part_name, &self.name) {
                    warn!(
                        target: "column ",
                        "{}.{}, index build failed, marked no-index: {}",
                        self.part_name, self.name, err
                    );
                    *slot = IndexSlot::NoIndex;
                } else {
                    *slot = IndexSlot::Unloaded;
                }
                Err(err)
            }
        }
    }

    /// Read-guard over the index slot, probing the `.idx` file on
    /// first use. The guard is the borrow handle: unload waits for it.
    pub(crate) fn acquire_index(&self) -> RwLockReadGuard<IndexSlot> {
        loop {
            {
                let slot = self.index.read().expect("index lock poisoned");
                match &*slot {
                    IndexSlot::Unloaded => (),
                    _ => return slot,
                }
            }

            let mut slot = self.index.write().expect("index lock poisoned");
            if let IndexSlot::Unloaded = &*slot {
                let loc = self.index_location();
                *slot = if util::file_size(&loc) == 0 {
                    IndexSlot::NoIndex
                } else {
                    match index::open(&loc, self.nrows, false) {
                        Ok(idx) => {
                            info!(
                                target: "column ",
                                "{}.{}, loaded index {:?}", self.part_name, self.name, loc
                            );
                            IndexSlot::Loaded(idx)
                        }
                        Err(err) => {
                            warn!(
                                target: "column ",
                                "{}.{}, dropping index {:?}: {}",
                                self.part_name, self.name, loc, err
                            );
                            util::remove_file(&loc).ok();
                            IndexSlot::NoIndex
                        }
                    }
                };
            }
        }
    }

    /// Drop the in-memory index. Blocks until outstanding read guards
    /// are released; the `.idx` file is left alone.
    pub fn unload_index(&self) {
        let mut slot = self.index.write().expect("index lock poisoned");
        *slot = IndexSlot::Unloaded;
    }

    /// Drop the in-memory index and delete the `.idx` file.
    pub fn purge_index(&self) {
        let mut slot = self.index.write().expect("index lock poisoned");
        *slot = IndexSlot::NoIndex;
        util::remove_file(&self.index_location()).ok();
        debug!(
            target: "column ",
            "{}.{}, purged index", self.part_name, self.name
        );
    }

    /// Value distribution from the attached index.
    pub fn index_distribution(&self) -> Result<Vec<(f64, f64, u32)>> {
        let slot = self.acquire_index();
        match &*slot {
            IndexSlot::Loaded(idx) => idx.distribution(),
            _ => err_at!(
                Unsupported, msg: "{}.{} has no index to describe", self.part_name, self.name
            ),
        }
    }

    /// Rows of this text column containing keyword `kw`.
    pub fn search(&self, kw: &str) -> Result<Bitvector> {
        let slot = self.acquire_index();
        match &*slot {
            IndexSlot::Loaded(idx) => idx.search_keyword(kw),
            _ => err_at!(
                Unsupported, msg: "{}.{} has no keyword index", self.part_name, self.name
            ),
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
