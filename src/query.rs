//! Module `query` define the predicate and projection values consumed
//! by the evaluation pipeline. The SQL-ish surface that produces these
//! lives outside this crate.

use std::{fmt, ops::Bound, result};

use crate::{Error, Result};

/// A continuous range predicate `lo OP column OP hi` over one column.
/// Bounds are carried as f64, the common domain every numeric element
/// type converts into for comparison.
#[derive(Clone)]
pub struct Range {
    pub column: String,
    pub lo: Bound<f64>,
    pub hi: Bound<f64>,
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match &self.lo {
            Bound::Included(v) => write!(f, "{} <= ", v)?,
            Bound::Excluded(v) => write!(f, "{} < ", v)?,
            Bound::Unbounded => (),
        }
        write!(f, "{}", self.column)?;
        match &self.hi {
            Bound::Included(v) => write!(f, " <= {}", v),
            Bound::Excluded(v) => write!(f, " < {}", v),
            Bound::Unbounded => Ok(()),
        }
    }
}

impl Range {
    pub fn new(column: &str, lo: Bound<f64>, hi: Bound<f64>) -> Range {
        Range { column: column.to_string(), lo, hi }
    }

    pub fn less_than(column: &str, v: f64) -> Range {
        Range::new(column, Bound::Unbounded, Bound::Excluded(v))
    }

    pub fn at_most(column: &str, v: f64) -> Range {
        Range::new(column, Bound::Unbounded, Bound::Included(v))
    }

    pub fn greater_than(column: &str, v: f64) -> Range {
        Range::new(column, Bound::Excluded(v), Bound::Unbounded)
    }

    pub fn at_least(column: &str, v: f64) -> Range {
        Range::new(column, Bound::Included(v), Bound::Unbounded)
    }

    pub fn equals(column: &str, v: f64) -> Range {
        Range::new(column, Bound::Included(v), Bound::Included(v))
    }

    pub fn between(column: &str, lo: f64, hi: f64) -> Range {
        Range::new(column, Bound::Included(lo), Bound::Included(hi))
    }

    /// Whether `v` satisfies the predicate.
    pub fn contains(&self, v: f64) -> bool {
        let lo_ok = match self.lo {
            Bound::Included(b) => v >= b,
            Bound::Excluded(b) => v > b,
            Bound::Unbounded => true,
        };
        let hi_ok = match self.hi {
            Bound::Included(b) => v <= b,
            Bound::Excluded(b) => v < b,
            Bound::Unbounded => true,
        };
        lo_ok && hi_ok
    }

    /// Whether no value can satisfy the predicate.
    pub fn is_vacuous(&self) -> bool {
        match (&self.lo, &self.hi) {
            (Bound::Included(l), Bound::Included(h)) => l > h,
            (Bound::Included(l), Bound::Excluded(h))
            | (Bound::Excluded(l), Bound::Included(h))
            | (Bound::Excluded(l), Bound::Excluded(h)) => l >= h,
            _ => false,
        }
    }

    /// Loose bounds as closed values, for cost estimates. `None` for
    /// an unbounded side.
    pub fn lo_value(&self) -> Option<f64> {
        match self.lo {
            Bound::Included(v) | Bound::Excluded(v) => Some(v),
            Bound::Unbounded => None,
        }
    }

    pub fn hi_value(&self) -> Option<f64> {
        match self.hi {
            Bound::Included(v) | Bound::Excluded(v) => Some(v),
            Bound::Unbounded => None,
        }
    }
}

/// A discrete membership predicate `column IN {v1, v2, ...}`. Values
/// are kept sorted and de-duplicated.
#[derive(Clone)]
pub struct DiscreteSet {
    pub column: String,
    values: Vec<f64>,
}

impl fmt::Display for DiscreteSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{} in [{}]", self.column, self.values.len())
    }
}

impl DiscreteSet {
    pub fn new(column: &str, mut values: Vec<f64>) -> DiscreteSet {
        values.retain(|v| !v.is_nan());
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.dedup();
        DiscreteSet { column: column.to_string(), values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn contains(&self, v: f64) -> bool {
        self.values
            .binary_search_by(|x| x.partial_cmp(&v).unwrap())
            .is_ok()
    }

    /// When the values form a dense integer interval, the membership
    /// test is really the continuous range `[first, last]`.
    pub fn as_continuous(&self) -> Option<Range> {
        let (first, last) = match (self.values.first(), self.values.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return None,
        };
        if self.values.iter().any(|v| v.fract() != 0.0) {
            return None;
        }
        if (last - first) as usize == self.values.len() - 1 {
            Some(Range::between(&self.column, first, last))
        } else {
            None
        }
    }
}

/// Reduction operators applied per group-by segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregator {
    /// Keep the first value of each segment; the operator used for
    /// group-by key columns.
    Nil,
    Cnt,
    Avg,
    Sum,
    Min,
    Max,
    VarPop,
    VarSamp,
    StdPop,
    StdSamp,
    Distinct,
    Median,
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Aggregator::*;

        let name = match self {
            Nil => "nil",
            Cnt => "count",
            Avg => "avg",
            Sum => "sum",
            Min => "min",
            Max => "max",
            VarPop => "varpop",
            VarSamp => "varsamp",
            StdPop => "stdpop",
            StdSamp => "stdsamp",
            Distinct => "countdistinct",
            Median => "median",
        };
        write!(f, "{}", name)
    }
}

impl Aggregator {
    pub fn from_name(name: &str) -> Result<Aggregator> {
        use Aggregator::*;

        match name.to_lowercase().as_str() {
            "nil" | "" => Ok(Nil),
            "count" | "cnt" => Ok(Cnt),
            "avg" | "mean" => Ok(Avg),
            "sum" => Ok(Sum),
            "min" => Ok(Min),
            "max" => Ok(Max),
            "varpop" => Ok(VarPop),
            "varsamp" | "var" => Ok(VarSamp),
            "stdpop" => Ok(StdPop),
            "stdsamp" | "std" | "stdev" => Ok(StdSamp),
            "countdistinct" | "distinct" => Ok(Distinct),
            "median" => Ok(Median),
            name => err_at!(InvalidInput, msg: "unknown aggregator {}", name),
        }
    }

    /// Whether the operator needs arithmetic on the values, which
    /// string columns cannot provide.
    pub fn is_arithmetic(&self) -> bool {
        use Aggregator::*;

        matches!(
            self,
            Avg | Sum | VarPop | VarSamp | StdPop | StdSamp
        )
    }
}

/// One projected output column: a source column, the aggregator to
/// apply under group-by, and an optional output alias.
#[derive(Clone)]
pub struct SelectItem {
    pub name: String,
    pub agg: Aggregator,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(name: &str, agg: Aggregator) -> SelectItem {
        SelectItem { name: name.to_string(), agg, alias: None }
    }

    pub fn with_alias(name: &str, agg: Aggregator, alias: &str) -> SelectItem {
        SelectItem {
            name: name.to_string(),
            agg,
            alias: Some(alias.to_string()),
        }
    }

    /// Output column name: the alias when given, else
    /// `aggregator(column)` for aggregated items, else the column.
    pub fn out_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None if self.agg == Aggregator::Nil => self.name.clone(),
            None => format!("{}({})", self.agg, self.name),
        }
    }
}

/// Projection list for select and group-by.
#[derive(Clone, Default)]
pub struct SelectClause {
    pub items: Vec<SelectItem>,
}

impl fmt::Display for SelectClause {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        let names: Vec<String> = self.items.iter().map(|i| i.out_name()).collect();
        write!(f, "{}", names.join(", "))
    }
}

impl SelectClause {
    pub fn new(items: Vec<SelectItem>) -> SelectClause {
        SelectClause { items }
    }

    /// Shorthand for a plain projection of named columns.
    pub fn names(names: &[&str]) -> SelectClause {
        let items = names
            .iter()
            .map(|n| SelectItem::new(n, Aggregator::Nil))
            .collect();
        SelectClause { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Group-by key items are the ones carrying no aggregator.
    pub fn key_positions(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| (item.agg == Aggregator::Nil).then(|| i))
            .collect()
    }
}

#[cfg(test)]
#[path = "query_test.rs"]
mod query_test;
