use super::*;

use crate::{
    index::BuildSpec,
    query::{Aggregator, SelectItem},
    SelectClause,
};

fn testdir(name: &str) -> ffi::OsString {
    let dir = std::env::temp_dir().join("colbit-part-test").join(name);
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();
    dir.into_os_string()
}

fn sample_partition(dir: &ffi::OsStr, name: &str) -> Partition {
    Partition::create(
        dir,
        name,
        vec![
            (
                "x".to_string(),
                ElementType::Int,
                Values::Int(vec![3, 1, 4, 1, 5, 9, 2, 6]),
                None,
            ),
            (
                "v".to_string(),
                ElementType::Double,
                Values::Double(vec![0.5, 1.5, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5]),
                None,
            ),
        ],
        Params::default(),
    )
    .unwrap()
}

#[test]
fn test_create_open() {
    let dir = testdir("create-open");
    let part = sample_partition(&dir, "p0");
    assert_eq!(part.nrows(), 8);
    assert_eq!(part.name(), "p0");
    assert_eq!(part.columns().len(), 2);

    let back = Partition::open(&dir, Params::default()).unwrap();
    assert_eq!(back.nrows(), 8);
    let col = back.get_column("x").unwrap();
    assert_eq!(col.element_type(), ElementType::Int);
    // bounds were computed at create time
    assert_eq!(col.lower(), 1.0);
    assert_eq!(col.upper(), 9.0);
    assert!(back.get_column("zzz").is_none());
}

#[test]
fn test_query_matches_scan() {
    let dir = testdir("query");
    let part = sample_partition(&dir, "p0");

    let range = Range::less_than("x", 4.0);
    let scan_hits = part.query_range(&range).unwrap();
    assert_eq!(scan_hits.iter().collect::<Vec<usize>>(), vec![0, 1, 3, 6]);

    // with an index the answer is identical
    part.build_index("x", &BuildSpec::Equality).unwrap();
    let idx_hits = part.query_range(&range).unwrap();
    assert!(scan_hits == idx_hits);

    let (nmin, nmax) = part.estimate(&range);
    assert_eq!((nmin, nmax), (4, 4));

    let set = DiscreteSet::new("x", vec![1.0, 9.0]);
    let hits = part.query_discrete(&set).unwrap();
    assert_eq!(hits.iter().collect::<Vec<usize>>(), vec![1, 3, 5]);
}

#[test]
fn test_do_scan_under_candidates() {
    let dir = testdir("do-scan");
    let part = sample_partition(&dir, "p0");

    let mut candidates = Bitvector::filled(false, 8);
    for i in [0_usize, 4, 5].iter() {
        candidates.set_bit(*i, true);
    }
    let hits = part.do_scan(&Range::at_least("x", 5.0), &candidates).unwrap();
    assert_eq!(hits.iter().collect::<Vec<usize>>(), vec![4, 5]);
}

#[test]
fn test_empty_partition() {
    let dir = testdir("empty");
    let part = Partition::create(&dir, "p0", vec![], Params::default()).unwrap();
    assert_eq!(part.nrows(), 0);
    assert_eq!(part.columns().len(), 0);
    assert_eq!(part.null_mask().size(), 0);
}

#[test]
fn test_append_partitions() {
    let dta = testdir("append-a");
    let dtb = testdir("append-b");
    let mut pa = sample_partition(&dta, "pa");
    let pb = Partition::create(
        &dtb,
        "pb",
        vec![(
            "x".to_string(),
            ElementType::Int,
            Values::Int(vec![7, 8]),
            None,
        )],
        Params::default(),
    )
    .unwrap();
    assert_eq!(pb.nrows(), 2);

    let n = pa.append(&dtb).unwrap();
    assert_eq!(n, 2);
    assert_eq!(pa.nrows(), 10);

    let x = pa.get_column("x").unwrap();
    let vals: Vec<i32> = x.select_values(&Bitvector::filled(true, 10)).unwrap();
    assert_eq!(vals, vec![3, 1, 4, 1, 5, 9, 2, 6, 7, 8]);

    // the source lacked v: sentinels and cleared mask bits
    let v = pa.get_column("v").unwrap();
    let mask = v.null_mask().unwrap();
    assert_eq!(mask.cnt(), 8);
    assert!(!mask.is_set(8) && !mask.is_set(9));
    let vals: Vec<f64> = v.select_values(&Bitvector::filled(true, 10)).unwrap();
    assert!(vals[8].is_nan() && vals[9].is_nan());

    // queries respect the post-append state
    let hits = pa.query_range(&Range::at_least("x", 7.0)).unwrap();
    assert_eq!(hits.iter().collect::<Vec<usize>>(), vec![5, 8, 9]);
}

#[test]
fn test_distribution() {
    let dir = testdir("distribution");
    let part = sample_partition(&dir, "p0");

    // without an index the histogram comes from a scan
    let dist = part.distribution("x").unwrap();
    let total: u64 = dist.iter().map(|(_, _, n)| *n as u64).sum();
    assert_eq!(total, 8);

    // with an equality index, buckets are exact values
    part.build_index("x", &BuildSpec::Equality).unwrap();
    let dist = part.distribution("x").unwrap();
    assert_eq!(dist.len(), 7);
    assert_eq!(dist[0], (1.0, 1.0, 2));
    let total: u32 = dist.iter().map(|(_, _, n)| n).sum();
    assert_eq!(total, 8);
}

#[test]
fn test_groupby_through_memtable() {
    // the partition-to-memtable group-by path
    let dir = testdir("groupby");
    let part = Partition::create(
        &dir,
        "p0",
        vec![
            (
                "k".to_string(),
                ElementType::UByte,
                Values::UByte(vec![1, 2, 1, 2, 3, 1]),
                None,
            ),
            (
                "v".to_string(),
                ElementType::Float,
                Values::Float(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
                None,
            ),
        ],
        Params::default(),
    )
    .unwrap();

    let clause = SelectClause::new(vec![
        SelectItem::new("k", Aggregator::Nil),
        SelectItem::new("v", Aggregator::Sum),
        SelectItem::new("v", Aggregator::Cnt),
    ]);
    let mut out = crate::MemTable::new("g");
    out.append(&clause, &part, &part.null_mask()).unwrap();
    out.groupby(&clause).unwrap();

    assert_eq!(out.nrows(), 3);
    let mut cur = out.cursor();
    let mut got = vec![];
    while cur.fetch() {
        got.push((
            cur.get_as_int("k").unwrap(),
            cur.get_as_double("sum(v)").unwrap(),
            cur.get_as_long("count(v)").unwrap(),
        ));
    }
    assert_eq!(got, vec![(1, 10.0, 3), (2, 6.0, 2), (3, 5.0, 1)]);
}
