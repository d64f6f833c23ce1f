//! Module `cursor` implement row-wise access over a [MemTable].

use std::collections::HashMap;

use crate::{
    table::mem::MemTable,
    types::{ElementType, Scalar},
    Error, Result,
};

/// Row cursor over an in-memory table. Starts one before the first
/// row; [Cursor::fetch] advances, the typed getters read the current
/// row with safe widening.
pub struct Cursor<'a> {
    table: &'a MemTable,
    cur_row: i64,
    positions: HashMap<String, usize>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(table: &'a MemTable) -> Cursor<'a> {
        let positions = table
            .cols
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Cursor {
            table,
            cur_row: -1,
            positions,
        }
    }

    /// Current row, -1 before the first fetch.
    pub fn cur_row(&self) -> i64 {
        self.cur_row
    }

    /// Advance one row; false at end of table.
    pub fn fetch(&mut self) -> bool {
        if (self.cur_row + 1) as usize >= self.table.nrows() {
            false
        } else {
            self.cur_row += 1;
            true
        }
    }

    /// Position at row `i`.
    pub fn fetch_at(&mut self, i: usize) -> Result<()> {
        if i >= self.table.nrows() {
            return err_at!(InvalidInput, msg: "row {}/{}", i, self.table.nrows());
        }
        self.cur_row = i as i64;
        Ok(())
    }

    fn scalar(&self, name: &str) -> Result<Scalar> {
        let pos = match self.positions.get(name) {
            Some(pos) => *pos,
            None => return err_at!(KeyNotFound, msg: "column {}", name),
        };
        self.scalar_at(pos)
    }

    /// Current value of column `pos`, by position.
    pub fn scalar_at(&self, pos: usize) -> Result<Scalar> {
        if self.cur_row < 0 {
            return err_at!(InvalidInput, msg: "fetch before reading");
        }
        let col = match self.table.cols.get(pos) {
            Some(col) => col,
            None => return err_at!(KeyNotFound, msg: "column #{}", pos),
        };
        match col.values.get_scalar(self.cur_row as usize) {
            Some(v) => Ok(v),
            None => err_at!(Fatal, msg: "row {} missing in {}", self.cur_row, col.name),
        }
    }

    fn get_widened(&self, name: &str, want: ElementType) -> Result<f64> {
        let scalar = self.scalar(name)?;
        let have = scalar.element_type();
        if !have.widens_to(&want) {
            return err_at!(
                TypeMismatch, msg: "column {} is {:?}, wanted {:?}", name, have, want
            );
        }
        match scalar.to_f64() {
            Some(v) => Ok(v),
            None => err_at!(TypeMismatch, msg: "column {} is not numeric", name),
        }
    }

    pub fn get_as_byte(&self, name: &str) -> Result<i8> {
        Ok(self.get_widened(name, ElementType::Byte)? as i8)
    }

    pub fn get_as_ubyte(&self, name: &str) -> Result<u8> {
        Ok(self.get_widened(name, ElementType::UByte)? as u8)
    }

    pub fn get_as_short(&self, name: &str) -> Result<i16> {
        Ok(self.get_widened(name, ElementType::Short)? as i16)
    }

    pub fn get_as_ushort(&self, name: &str) -> Result<u16> {
        Ok(self.get_widened(name, ElementType::UShort)? as u16)
    }

    pub fn get_as_int(&self, name: &str) -> Result<i32> {
        Ok(self.get_widened(name, ElementType::Int)? as i32)
    }

    pub fn get_as_uint(&self, name: &str) -> Result<u32> {
        Ok(self.get_widened(name, ElementType::UInt)? as u32)
    }

    pub fn get_as_long(&self, name: &str) -> Result<i64> {
        // wide integers bypass the f64 bridge to keep full precision
        if let Scalar::Long(v) = self.scalar(name)? {
            return Ok(v);
        }
        Ok(self.get_widened(name, ElementType::Long)? as i64)
    }

    pub fn get_as_ulong(&self, name: &str) -> Result<u64> {
        if let Scalar::ULong(v) = self.scalar(name)? {
            return Ok(v);
        }
        Ok(self.get_widened(name, ElementType::ULong)? as u64)
    }

    pub fn get_as_float(&self, name: &str) -> Result<f32> {
        Ok(self.get_widened(name, ElementType::Float)? as f32)
    }

    pub fn get_as_double(&self, name: &str) -> Result<f64> {
        self.get_widened(name, ElementType::Double)
    }

    /// Any column renders to text.
    pub fn get_as_string(&self, name: &str) -> Result<String> {
        Ok(self.scalar(name)?.to_string())
    }
}
