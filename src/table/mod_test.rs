use super::*;

use crate::{
    colvec::Values,
    query::{Aggregator, SelectItem},
    Partition,
};

fn testdir(name: &str) -> ffi::OsString {
    let dir = std::env::temp_dir().join("colbit-table-test").join(name);
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();
    dir.into_os_string()
}

fn two_part_table(base: &str) -> Table {
    let d0 = testdir(&format!("{}-p0", base));
    let d1 = testdir(&format!("{}-p1", base));
    let p0 = Partition::create(
        &d0,
        "p0",
        vec![
            (
                "k".to_string(),
                ElementType::UByte,
                Values::UByte(vec![1, 2, 1]),
                None,
            ),
            (
                "v".to_string(),
                ElementType::Int,
                Values::Int(vec![10, 20, 30]),
                None,
            ),
        ],
        Params::default(),
    )
    .unwrap();
    let p1 = Partition::create(
        &d1,
        "p1",
        vec![
            (
                "k".to_string(),
                ElementType::UByte,
                Values::UByte(vec![2, 3]),
                None,
            ),
            (
                "v".to_string(),
                ElementType::Int,
                Values::Int(vec![40, 50]),
                None,
            ),
        ],
        Params::default(),
    )
    .unwrap();

    let mut table = Table::new("t", Params::default());
    table.add_partition(p0);
    table.add_partition(p1);
    table
}

#[test]
fn test_schema_union() {
    let table = two_part_table("schema");
    assert_eq!(table.nrows(), 5);
    assert_eq!(table.column_names(), vec!["k", "v"]);
    assert_eq!(table.column_types(), vec![ElementType::UByte, ElementType::Int]);
    assert_eq!(table.parts().len(), 2);
}

#[test]
fn test_schema_type_conflict_first_seen_wins() {
    let d0 = testdir("conflict-p0");
    let d1 = testdir("conflict-p1");
    let p0 = Partition::create(
        &d0,
        "p0",
        vec![("a".to_string(), ElementType::Int, Values::Int(vec![1]), None)],
        Params::default(),
    )
    .unwrap();
    let p1 = Partition::create(
        &d1,
        "p1",
        vec![("a".to_string(), ElementType::Double, Values::Double(vec![1.0]), None)],
        Params::default(),
    )
    .unwrap();

    let mut table = Table::new("t", Params::default());
    table.add_partition(p0);
    table.add_partition(p1);
    assert_eq!(table.column_types(), vec![ElementType::Int]);
}

#[test]
fn test_select_concatenates_partitions() {
    let table = two_part_table("select");
    let sel = SelectClause::names(&["k", "v"]);
    let out = table.select(&sel, &Range::at_least("v", 25.0)).unwrap();

    assert_eq!(out.nrows(), 3);
    let mut cur = out.cursor();
    let mut got = vec![];
    while cur.fetch() {
        got.push((cur.get_as_int("k").unwrap(), cur.get_as_int("v").unwrap()));
    }
    assert_eq!(got, vec![(1, 30), (2, 40), (3, 50)]);
}

#[test]
fn test_select_empty_result() {
    let table = two_part_table("select-empty");
    let sel = SelectClause::names(&["v"]);
    let out = table.select(&sel, &Range::at_least("v", 1000.0)).unwrap();
    assert_eq!(out.nrows(), 0);
}

#[test]
fn test_select_in() {
    let table = two_part_table("select-in");
    let sel = SelectClause::names(&["v"]);
    let set = DiscreteSet::new("v", vec![10.0, 50.0]);
    let out = table.select_in(&sel, &set).unwrap();
    assert_eq!(out.nrows(), 2);
}

#[test]
fn test_groupby_across_partitions() {
    let table = two_part_table("groupby");
    let clause = SelectClause::new(vec![
        SelectItem::new("k", Aggregator::Nil),
        SelectItem::new("v", Aggregator::Sum),
    ]);
    let out = table
        .groupby(&clause, &Range::new("v", std::ops::Bound::Unbounded, std::ops::Bound::Unbounded))
        .unwrap();

    assert_eq!(out.nrows(), 3);
    let mut cur = out.cursor();
    let mut got = vec![];
    while cur.fetch() {
        got.push((cur.get_as_int("k").unwrap(), cur.get_as_long("sum(v)").unwrap()));
    }
    // k=1 -> 10+30, k=2 -> 20+40, k=3 -> 50
    assert_eq!(got, vec![(1, 40), (2, 60), (3, 50)]);
}

#[test]
fn test_estimate_sums_partitions() {
    let table = two_part_table("estimate");
    // no indexes: every partition contributes (0, nrows)
    let (nmin, nmax) = table.estimate(&Range::at_least("v", 25.0));
    assert_eq!(nmin, 0);
    assert_eq!(nmax, 5);

    for part in table.parts().iter() {
        part.build_index("v", &crate::index::BuildSpec::Equality).unwrap();
    }
    let (nmin, nmax) = table.estimate(&Range::at_least("v", 25.0));
    assert_eq!((nmin, nmax), (3, 3));
}

#[test]
fn test_column_as_concatenates() {
    let table = two_part_table("column-as");
    assert_eq!(table.column_as_ints("v").unwrap(), vec![10, 20, 30, 40, 50]);
    assert_eq!(table.column_as_longs("v").unwrap(), vec![10, 20, 30, 40, 50]);
    assert_eq!(
        table.column_as_doubles("v").unwrap(),
        vec![10.0, 20.0, 30.0, 40.0, 50.0]
    );
    // narrowing refused
    assert!(table.column_as::<i16>("v").is_err());
}

#[test]
fn test_histogram_sums_buckets() {
    let table = two_part_table("histogram");
    for part in table.parts().iter() {
        part.build_index("k", &crate::index::BuildSpec::Equality).unwrap();
    }
    let hist = table.histogram("k").unwrap();
    assert_eq!(hist, vec![(1.0, 1.0, 2), (2.0, 2.0, 2), (3.0, 3.0, 1)]);
}

#[test]
fn test_histogram2d() {
    let table = two_part_table("histogram2d");
    let cells = table.histogram2d("k", 3, "v", 2).unwrap();
    let total: u64 = cells.iter().map(|(_, _, n)| *n).sum();
    assert_eq!(total, 5);

    let cells3 = table.histogram3d("k", 2, "v", 2, "k", 2).unwrap();
    let total: u64 = cells3.iter().map(|(_, _, _, n)| *n).sum();
    assert_eq!(total, 5);
}

#[test]
fn test_open_directory_of_partitions() {
    let base = std::env::temp_dir().join("colbit-table-test").join("open-dir");
    std::fs::remove_dir_all(&base).ok();
    std::fs::create_dir_all(&base).unwrap();

    for (i, vals) in [vec![1_i32, 2], vec![3_i32]].iter().enumerate() {
        let pdir = base.join(format!("p{}", i));
        Partition::create(
            pdir.as_os_str(),
            &format!("p{}", i),
            vec![("a".to_string(), ElementType::Int, Values::Int(vals.clone()), None)],
            Params::default(),
        )
        .unwrap();
    }
    // a stray non-partition directory is skipped with a warning
    std::fs::create_dir_all(base.join("lost+found")).unwrap();

    let table = Table::open("t", base.as_os_str(), Params::default()).unwrap();
    assert_eq!(table.parts().len(), 2);
    assert_eq!(table.nrows(), 3);
    assert_eq!(table.column_as_ints("a").unwrap(), vec![1, 2, 3]);
}
