use super::*;

use crate::query::{Aggregator, SelectItem};

fn sample_table() -> MemTable {
    // k: [1,2,1,2,3,1], v: [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
    MemTable::from_buffers(
        "t",
        vec!["k".to_string(), "v".to_string()],
        vec![
            Values::UByte(vec![1, 2, 1, 2, 3, 1]),
            Values::Float(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        ],
    )
    .unwrap()
}

#[test]
fn test_from_buffers() {
    let t = sample_table();
    assert_eq!(t.nrows(), 6);
    assert_eq!(t.column_names(), vec!["k", "v"]);
    assert_eq!(
        t.column_types(),
        vec![ElementType::UByte, ElementType::Float]
    );
    assert_eq!(t.describe(), "t (6 rows) [k:ubyte, v:float]");

    let bad = MemTable::from_buffers(
        "bad",
        vec!["a".to_string(), "b".to_string()],
        vec![Values::Int(vec![1]), Values::Int(vec![1, 2])],
    );
    assert!(bad.is_err());
}

#[test]
fn test_groupby_sum_count() {
    // SELECT k, SUM(v), COUNT(*) GROUP BY k
    let mut t = MemTable::from_buffers(
        "t",
        vec!["k".to_string(), "sum(v)".to_string(), "count(v)".to_string()],
        vec![
            Values::UByte(vec![1, 2, 1, 2, 3, 1]),
            Values::Float(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            Values::Float(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        ],
    )
    .unwrap();

    let clause = SelectClause::new(vec![
        SelectItem::new("k", Aggregator::Nil),
        SelectItem::new("v", Aggregator::Sum),
        SelectItem::new("v", Aggregator::Cnt),
    ]);
    t.groupby(&clause).unwrap();

    assert_eq!(t.nrows(), 3);
    assert_eq!(t.cols[0].values, Values::UByte(vec![1, 2, 3]));
    assert_eq!(t.cols[1].values, Values::Float(vec![10.0, 6.0, 5.0]));
    assert_eq!(t.cols[2].values, Values::UInt(vec![3, 2, 1]));
}

#[test]
fn test_groupby_two_keys() {
    let mut t = MemTable::from_buffers(
        "t",
        vec!["a".to_string(), "b".to_string(), "v".to_string()],
        vec![
            Values::Int(vec![1, 1, 2, 2, 1]),
            Values::Int(vec![9, 8, 9, 9, 8]),
            Values::Long(vec![10, 20, 30, 40, 50]),
        ],
    )
    .unwrap();

    let clause = SelectClause::new(vec![
        SelectItem::new("a", Aggregator::Nil),
        SelectItem::new("b", Aggregator::Nil),
        SelectItem::new("v", Aggregator::Sum),
    ]);
    t.groupby(&clause).unwrap();

    // groups: (1,8)->70, (1,9)->10, (2,9)->70
    assert_eq!(t.nrows(), 3);
    assert_eq!(t.cols[0].values, Values::Int(vec![1, 1, 2]));
    assert_eq!(t.cols[1].values, Values::Int(vec![8, 9, 9]));
    assert_eq!(t.cols[2].values, Values::Long(vec![70, 10, 70]));
}

#[test]
fn test_orderby_and_limit() {
    let mut t = sample_table();
    t.orderby(&["k"]).unwrap();
    assert_eq!(t.cols[0].values, Values::UByte(vec![1, 1, 1, 2, 2, 3]));

    t.limit(2);
    assert_eq!(t.nrows(), 2);
    assert_eq!(t.cols[0].values, Values::UByte(vec![1, 1]));
    assert_eq!(t.cols[1].values.len(), 2);
}

#[test]
fn test_orderby_twice_is_stable_shape() {
    let mut t = sample_table();
    t.orderby(&["k", "v"]).unwrap();
    let keys = t.cols[0].values.clone();
    let vals = t.cols[1].values.clone();

    // ordering an ordered table changes nothing
    t.orderby(&["k", "v"]).unwrap();
    assert_eq!(t.cols[0].values, keys);
    assert_eq!(t.cols[1].values, vals);
    assert_eq!(keys, Values::UByte(vec![1, 1, 1, 2, 2, 3]));
    assert_eq!(vals, Values::Float(vec![1.0, 3.0, 6.0, 2.0, 4.0, 5.0]));
}

#[test]
fn test_reorder_is_stable() {
    let mut t = MemTable::from_buffers(
        "t",
        vec!["k".to_string(), "tag".to_string()],
        vec![
            Values::Int(vec![2, 1, 2, 1]),
            Values::Text(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
        ],
    )
    .unwrap();
    t.reorder(&["k"]).unwrap();
    // equal keys keep their original relative order
    assert_eq!(t.cols[0].values, Values::Int(vec![1, 1, 2, 2]));
    assert_eq!(
        t.cols[1].values,
        Values::Text(vec!["b".into(), "d".into(), "a".into(), "c".into()])
    );
}

#[test]
fn test_select_filter_project() {
    let t = sample_table();
    let sel = SelectClause::names(&["v"]);
    let out = t.select(&sel, &Range::at_least("k", 2.0)).unwrap();
    assert_eq!(out.nrows(), 3);
    assert_eq!(out.cols[0].values, Values::Float(vec![2.0, 4.0, 5.0]));

    assert!(t.select(&sel, &Range::at_least("zzz", 2.0)).is_err());
}

#[test]
fn test_rename_columns() {
    let mut t = sample_table();
    let clause = SelectClause::new(vec![
        SelectItem::new("k", Aggregator::Nil),
        SelectItem::with_alias("v", Aggregator::Sum, "total"),
    ]);
    t.rename_columns(&clause).unwrap();
    assert_eq!(t.column_names(), vec!["k", "total"]);
}

#[test]
fn test_dump() {
    let t = sample_table();
    let mut out = vec![];
    t.dump(&mut out, 0, 2, ", ").unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "1, 1\n2, 2\n");
}

#[test]
fn test_cursor() {
    let t = sample_table();
    let mut cur = t.cursor();
    assert_eq!(cur.cur_row(), -1);
    assert!(cur.scalar_at(0).is_err()); // must fetch first

    let mut rows = 0;
    while cur.fetch() {
        rows += 1;
    }
    assert_eq!(rows, 6);
    assert!(!cur.fetch());

    cur.fetch_at(4).unwrap();
    assert_eq!(cur.get_as_int("k").unwrap(), 3);
    assert_eq!(cur.get_as_uint("k").unwrap(), 3);
    assert_eq!(cur.get_as_double("v").unwrap(), 5.0);
    assert_eq!(cur.get_as_string("v").unwrap(), "5");
    // narrowing float -> int is refused
    assert!(cur.get_as_int("v").is_err());
    // ubyte does not widen into byte
    assert!(cur.get_as_byte("k").is_err());
    assert!(cur.get_as_short("k").is_ok());
    assert!(cur.fetch_at(6).is_err());
    assert!(cur.get_as_int("zzz").is_err());
}
