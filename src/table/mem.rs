//! Module `mem` implement [MemTable], the materialized result table:
//! typed in-memory columns with group-by, order-by, limit and row
//! cursors. This is what a select query returns.

use log::{debug, warn};

use std::{cmp, io::Write};

use crate::{
    bitvector::Bitvector,
    colvec::{Companions, Values},
    query::{Range, SelectClause},
    table::Cursor,
    types::ElementType,
    Error, Partition, Result,
};

pub(crate) struct MemColumn {
    pub name: String,
    pub values: Values,
}

/// A table whose columns live in memory, built by appending partition
/// query results and shaped by group-by/order-by/limit.
pub struct MemTable {
    name: String,
    nrows: usize,
    pub(crate) cols: Vec<MemColumn>,
}

impl MemTable {
    pub fn new(name: &str) -> MemTable {
        MemTable {
            name: name.to_string(),
            nrows: 0,
            cols: vec![],
        }
    }

    /// Assemble from parallel buffers; all must have the same length.
    pub fn from_buffers(name: &str, names: Vec<String>, buffers: Vec<Values>) -> Result<MemTable> {
        if names.len() != buffers.len() {
            return err_at!(
                InvalidInput, msg: "{} names for {} buffers", names.len(), buffers.len()
            );
        }
        let nrows = buffers.first().map(|b| b.len()).unwrap_or(0);
        if buffers.iter().any(|b| b.len() != nrows) {
            return err_at!(InvalidInput, msg: "ragged buffers building table {}", name);
        }
        let cols = names
            .into_iter()
            .zip(buffers.into_iter())
            .map(|(name, values)| MemColumn { name, values })
            .collect();
        Ok(MemTable {
            name: name.to_string(),
            nrows,
            cols,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn column_names(&self) -> Vec<String> {
        self.cols.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_types(&self) -> Vec<ElementType> {
        self.cols.iter().map(|c| c.values.element_type()).collect()
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.cols.iter().position(|c| c.name == name)
    }

    /// One-line schema summary.
    pub fn describe(&self) -> String {
        let cols: Vec<String> = self
            .cols
            .iter()
            .map(|c| format!("{}:{}", c.name, c.values.element_type()))
            .collect();
        format!("{} ({} rows) [{}]", self.name, self.nrows, cols.join(", "))
    }

    /// Emit rows `[begin, end)` delimited by `delim`, one line per row.
    pub fn dump<W>(&self, w: &mut W, begin: usize, end: usize, delim: &str) -> Result<()>
    where
        W: Write,
    {
        let end = cmp::min(end, self.nrows);
        for row in begin..end {
            let mut fields = vec![];
            for col in self.cols.iter() {
                match col.values.get_scalar(row) {
                    Some(v) => fields.push(v.to_string()),
                    None => fields.push(String::default()),
                }
            }
            err_at!(IOError, writeln!(w, "{}", fields.join(delim)))?;
        }
        Ok(())
    }

    /// Evaluate each clause item over `part` under `mask` and
    /// concatenate into the matching columns. Columns this table
    /// carries that `part` lacks are padded with their type's sentinel.
    pub fn append(
        &mut self,
        clause: &SelectClause,
        part: &Partition,
        mask: &Bitvector,
    ) -> Result<()> {
        let n = mask.cnt();
        for item in clause.items.iter() {
            let out_name = item.out_name();
            let pos = self.position(&out_name);
            match (part.get_column(&item.name), pos) {
                (Some(col), Some(pos)) => {
                    let buf = col.select_buffer(mask)?;
                    self.cols[pos].values.extend_values(&buf)?;
                }
                (Some(col), None) => {
                    let mut values = Values::new(col.element_type())?;
                    if self.nrows > 0 {
                        values.push_sentinels(self.nrows);
                    }
                    let buf = col.select_buffer(mask)?;
                    values.extend_values(&buf)?;
                    self.cols.push(MemColumn { name: out_name, values });
                }
                (None, Some(pos)) => {
                    debug!(
                        target: "memtab ",
                        "{}, column {} missing in partition {}, padding sentinels",
                        self.name, item.name, part.name()
                    );
                    self.cols[pos].values.push_sentinels(n);
                }
                (None, None) => {
                    return err_at!(
                        KeyNotFound, msg: "column {} in partition {}", item.name, part.name()
                    )
                }
            }
        }
        self.nrows += n;
        Ok(())
    }

    /// Group rows by the clause's key items (the ones with no
    /// aggregator) and reduce every column: keys keep their first
    /// value, the rest apply their item's aggregator. Items are
    /// matched to columns positionally.
    pub fn groupby(&mut self, clause: &SelectClause) -> Result<()> {
        if clause.items.len() != self.cols.len() {
            return err_at!(
                InvalidInput, msg: "clause width {} table width {}",
                clause.items.len(), self.cols.len()
            );
        }
        let keys = clause.key_positions();
        if keys.is_empty() {
            return err_at!(InvalidInput, msg: "group-by without key columns");
        }

        let starts = self.sort_keys(&keys)?;
        for (i, item) in clause.items.iter().enumerate() {
            if keys.contains(&i) {
                self.cols[i].values.reduce(&starts);
            } else {
                self.cols[i].values.reduce_op(&starts, item.agg);
            }
        }
        self.nrows = starts.len().saturating_sub(1);
        debug!(
            target: "memtab ",
            "{}, grouped into {} rows by {} keys", self.name, self.nrows, keys.len()
        );
        Ok(())
    }

    // sort rows by the key columns in order, all other columns
    // carried in lockstep; returns the final segment boundaries.
    fn sort_keys(&mut self, keys: &[usize]) -> Result<Vec<u32>> {
        let nrows = self.nrows;
        let mut starts: Option<Vec<u32>> = None;
        for key in keys.iter() {
            let (mut kv, mut rest) = self.detach(*key);
            let res = match starts.as_ref() {
                None => {
                    kv.sort_range(0, nrows, &mut Companions(&mut rest));
                    kv.segment(None)
                }
                Some(prev) => {
                    for w in prev.windows(2) {
                        kv.sort_range(
                            w[0] as usize,
                            w[1] as usize,
                            &mut Companions(&mut rest),
                        );
                    }
                    kv.segment(Some(prev.as_slice()))
                }
            };
            self.attach(*key, kv, rest);
            starts = Some(res);
        }
        Ok(starts.unwrap_or_else(|| vec![0, nrows as u32]))
    }

    // pull column `pos` out, leaving the others as a sibling slice.
    fn detach(&mut self, pos: usize) -> (Values, Vec<Values>) {
        let kv = std::mem::replace(&mut self.cols[pos].values, Values::Int(vec![]));
        let rest = self
            .cols
            .iter_mut()
            .enumerate()
            .filter(|(i, _)| *i != pos)
            .map(|(_, c)| std::mem::replace(&mut c.values, Values::Int(vec![])))
            .collect();
        (kv, rest)
    }

    fn attach(&mut self, pos: usize, kv: Values, rest: Vec<Values>) {
        self.cols[pos].values = kv;
        let mut rest = rest.into_iter();
        for (i, col) in self.cols.iter_mut().enumerate() {
            if i != pos {
                col.values = rest.next().unwrap();
            }
        }
    }

    /// Sort rows by the named columns, first name most significant,
    /// using the in-place lockstep sort.
    pub fn orderby(&mut self, names: &[&str]) -> Result<()> {
        let keys = self.positions_of(names)?;
        self.sort_keys(&keys)?;
        Ok(())
    }

    /// As [MemTable::orderby] with a stability guarantee: rows equal
    /// under all keys keep their current relative order.
    pub fn reorder(&mut self, names: &[&str]) -> Result<()> {
        let keys = self.positions_of(names)?;
        let mut perm: Vec<u32> = (0..self.nrows as u32).collect();
        perm.sort_by(|a, b| {
            for key in keys.iter() {
                let values = &self.cols[*key].values;
                let ord = values.cmp_rows(*a as usize, *b as usize);
                if ord != cmp::Ordering::Equal {
                    return ord;
                }
            }
            cmp::Ordering::Equal
        });
        for col in self.cols.iter_mut() {
            col.values.reorder(&perm)?;
        }
        Ok(())
    }

    fn positions_of(&self, names: &[&str]) -> Result<Vec<usize>> {
        let mut keys = vec![];
        for name in names.iter() {
            match self.position(name) {
                Some(pos) => keys.push(pos),
                None => return err_at!(KeyNotFound, msg: "column {} in {}", name, self.name),
            }
        }
        Ok(keys)
    }

    /// Keep only the first `n` rows.
    pub fn limit(&mut self, n: usize) {
        for col in self.cols.iter_mut() {
            col.values.truncate(n, 0);
        }
        self.nrows = cmp::min(self.nrows, n);
    }

    /// Filter rows by an in-memory range predicate and project the
    /// named columns into a new table.
    pub fn select(&self, sel: &SelectClause, cond: &Range) -> Result<MemTable> {
        let pos = match self.position(&cond.column) {
            Some(pos) => pos,
            None => {
                return err_at!(KeyNotFound, msg: "column {} in {}", cond.column, self.name)
            }
        };
        let keep: Vec<u32> = (0..self.nrows)
            .filter_map(|row| match self.cols[pos].values.to_f64(row) {
                Some(v) if cond.contains(v) => Some(row as u32),
                _ => None,
            })
            .collect();

        let mut names = vec![];
        let mut buffers = vec![];
        for item in sel.items.iter() {
            let pos = match self.position(&item.name) {
                Some(pos) => pos,
                None => {
                    return err_at!(KeyNotFound, msg: "column {} in {}", item.name, self.name)
                }
            };
            let mut values = self.cols[pos].values.clone();
            values.reorder(&keep)?;
            names.push(item.out_name());
            buffers.push(values);
        }
        if names.is_empty() {
            warn!(target: "memtab ", "{}, select with an empty projection", self.name);
        }
        MemTable::from_buffers(&self.name, names, buffers)
    }

    /// Bind output names to the clause's aliases, positionally.
    pub fn rename_columns(&mut self, clause: &SelectClause) -> Result<()> {
        if clause.items.len() != self.cols.len() {
            return err_at!(
                InvalidInput, msg: "clause width {} table width {}",
                clause.items.len(), self.cols.len()
            );
        }
        for (col, item) in self.cols.iter_mut().zip(clause.items.iter()) {
            col.name = item.out_name();
        }
        Ok(())
    }

    /// Row-wise cursor positioned before the first row.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self)
    }
}

#[cfg(test)]
#[path = "mem_test.rs"]
mod mem_test;
