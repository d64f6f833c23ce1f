use super::*;

use crate::{bitvector::Bitvector, colvec::Values, index::BuildSpec, query::{DiscreteSet, Range}};

fn testdir(name: &str) -> ffi::OsString {
    let dir = std::env::temp_dir().join("colbit-column-test").join(name);
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();
    dir.into_os_string()
}

fn int_column(dir: &ffi::OsStr, name: &str, vals: Vec<i32>, mask: Option<Bitvector>) -> Column {
    let nrows = vals.len() as u32;
    let col = Column::new(name, ElementType::Int, "tpart", dir, nrows, Params::default());
    let mask = mask.unwrap_or_else(|| Bitvector::filled(true, vals.len()));
    col.write_values(&Values::Int(vals), &mask).unwrap();
    col
}

#[test]
fn test_select_values() {
    let dir = testdir("select-values");
    let col = int_column(&dir, "x", vec![3, 1, 4, 1, 5, 9, 2, 6], None);

    // full mask bulk-reads the file
    let mask = Bitvector::filled(true, 8);
    let vals: Vec<i32> = col.select_values(&mask).unwrap();
    assert_eq!(vals, vec![3, 1, 4, 1, 5, 9, 2, 6]);

    // partial mask gathers runs and sparse bits
    let mut mask = Bitvector::filled(false, 8);
    for i in [0_usize, 2, 3, 7].iter() {
        mask.set_bit(*i, true);
    }
    let (vals, rids) = col.select_values_rids::<i32>(&mask).unwrap();
    assert_eq!(vals, vec![3, 4, 1, 6]);
    assert_eq!(rids, vec![0, 2, 3, 7]);

    // empty mask does no I/O and returns nothing
    let empty = Bitvector::filled(false, 8);
    assert!(col.select_values::<i32>(&empty).unwrap().is_empty());

    // element width must match
    assert!(col.select_values::<i16>(&mask).is_err());
}

#[test]
fn test_select_short_file() {
    let dir = testdir("select-short");
    // the data file holds 4 rows but the partition claims 8
    let col = {
        let col = Column::new("x", ElementType::Int, "tpart", &dir, 8, Params::default());
        let loc = col.data_location();
        let mut buf = vec![];
        Values::Int(vec![10, 20, 30, 40]).write_le_bytes(&mut buf);
        crate::column::write_whole(&loc, &buf).unwrap();
        col
    };

    // rows beyond EOF are treated as absent
    let mask = Bitvector::filled(true, 8);
    let vals: Vec<i32> = col.select_values(&mask).unwrap();
    assert_eq!(vals, vec![10, 20, 30, 40]);

    let mut mask = Bitvector::filled(false, 8);
    mask.set_bit(1, true);
    mask.set_bit(6, true);
    let (vals, rids) = col.select_values_rids::<i32>(&mask).unwrap();
    assert_eq!(vals, vec![20]);
    assert_eq!(rids, vec![1]);
}

#[test]
fn test_select_widening() {
    let dir = testdir("select-widening");
    let col = {
        let col = Column::new("s", ElementType::Short, "tpart", &dir, 4, Params::default());
        col.write_values(&Values::Short(vec![1, -2, 300, -400]), &Bitvector::filled(true, 4))
            .unwrap();
        col
    };

    let mask = Bitvector::filled(true, 4);
    assert_eq!(col.select_ints(&mask).unwrap(), vec![1, -2, 300, -400]);
    assert_eq!(col.select_longs(&mask).unwrap(), vec![1, -2, 300, -400]);
    assert_eq!(col.select_doubles(&mask).unwrap(), vec![1.0, -2.0, 300.0, -400.0]);
    // narrowing is refused with no output
    assert!(col.select_bytes(&mask).is_err());
    assert!(col.select_ushorts(&mask).is_err());
    assert!(col.select_strings(&mask).is_err());
}

#[test]
fn test_null_mask_defaults() {
    let dir = testdir("null-mask");
    let col = int_column(&dir, "x", vec![1, 2, 3, 4], None);
    // all-valid masks stay implicit on disk
    assert_eq!(util::file_size(&col.mask_location()), 0);
    let mask = col.null_mask().unwrap();
    assert_eq!(mask.size(), 4);
    assert_eq!(mask.cnt(), 4);

    let mut holes = Bitvector::filled(true, 4);
    holes.set_bit(2, false);
    col.write_null_mask(&holes).unwrap();
    let mask = col.null_mask().unwrap();
    assert_eq!(mask.cnt(), 3);
    assert!(!mask.is_set(2));
}

#[test]
fn test_actual_min_max() {
    let dir = testdir("min-max");
    let col = int_column(&dir, "x", vec![7, -3, 12, 0], None);
    let (lo, hi) = col.actual_min_max(&Bitvector::filled(true, 4)).unwrap();
    assert_eq!((lo, hi), (-3.0, 12.0));
    assert_eq!(col.lower(), -3.0);
    assert_eq!(col.upper(), 12.0);
}

#[test]
fn test_evaluate_range_with_index() {
    // x = [3,1,4,1,5,9,2,6], query x < 4
    let dir = testdir("eval-range");
    let col = int_column(&dir, "x", vec![3, 1, 4, 1, 5, 9, 2, 6], None);
    col.build_index(&BuildSpec::Equality).unwrap();

    let mask = Bitvector::filled(true, 8);
    let hits = col.evaluate_range(&Range::less_than("x", 4.0), &mask).unwrap();
    let got: Vec<usize> = hits.iter().collect();
    assert_eq!(got, vec![0, 1, 3, 6]);
    assert_eq!(hits.cnt(), 4);

    // same answer as the index-free scan
    col.purge_index();
    let hits2 = col.evaluate_range(&Range::less_than("x", 4.0), &mask).unwrap();
    assert!(hits == hits2);
}

#[test]
fn test_evaluate_range_respects_mask_and_nulls() {
    let dir = testdir("eval-masked");
    let mut nulls = Bitvector::filled(true, 8);
    nulls.set_bit(0, false); // row 0 is null
    let col = int_column(&dir, "x", vec![3, 1, 4, 1, 5, 9, 2, 6], Some(nulls));

    let mut mask = Bitvector::filled(true, 8);
    mask.set_bit(6, false); // caller excludes row 6
    let hits = col.evaluate_range(&Range::less_than("x", 4.0), &mask).unwrap();
    let got: Vec<usize> = hits.iter().collect();
    assert_eq!(got, vec![1, 3]);

    // empty mask short-circuits
    let empty = Bitvector::filled(false, 8);
    let hits = col.evaluate_range(&Range::less_than("x", 4.0), &empty).unwrap();
    assert_eq!(hits.cnt(), 0);
    assert_eq!(hits.size(), 8);
}

#[test]
fn test_evaluate_discrete_dense_rewrite() {
    // y = [10..15], y in {11,12,13} is a dense interval
    let dir = testdir("eval-discrete");
    let col = {
        let col = Column::new("y", ElementType::UInt, "tpart", &dir, 6, Params::default());
        col.write_values(
            &Values::UInt(vec![10, 11, 12, 13, 14, 15]),
            &Bitvector::filled(true, 6),
        )
        .unwrap();
        col
    };

    let mask = Bitvector::filled(true, 6);
    let set = DiscreteSet::new("y", vec![11.0, 12.0, 13.0]);
    let hits = col.evaluate_discrete(&set, &mask).unwrap();
    let got: Vec<usize> = hits.iter().collect();
    assert_eq!(got, vec![1, 2, 3]);

    // sparse set takes the membership path
    let set = DiscreteSet::new("y", vec![10.0, 13.0, 15.0]);
    let hits = col.evaluate_discrete(&set, &mask).unwrap();
    let got: Vec<usize> = hits.iter().collect();
    assert_eq!(got, vec![0, 3, 5]);

    // empty set answers instantly with an empty bitmap
    let set = DiscreteSet::new("y", vec![]);
    let hits = col.evaluate_discrete(&set, &mask).unwrap();
    assert_eq!(hits.cnt(), 0);
    assert_eq!(hits.size(), 6);
}

#[test]
fn test_corrupt_index_degrades_to_scan() {
    let dir = testdir("corrupt-index");
    let col = int_column(&dir, "x", vec![5, 6, 7, 8], None);
    std::fs::write(&col.index_location(), b"#IBIS\x07garbage-not-an-index").unwrap();

    let mask = Bitvector::filled(true, 4);
    let hits = col.evaluate_range(&Range::at_least("x", 7.0), &mask).unwrap();
    let got: Vec<usize> = hits.iter().collect();
    assert_eq!(got, vec![2, 3]);
    // the bad file was dropped on first probe
    assert_eq!(util::file_size(&col.index_location()), 0);
}

#[test]
fn test_stale_index_removed() {
    let dir = testdir("stale-index");
    let col = int_column(&dir, "x", vec![1, 2, 3, 4], None);
    col.build_index(&BuildSpec::Equality).unwrap();
    col.unload_index();

    // partition grew; the persisted index claims fewer rows
    let col8 = {
        let col8 = Column::new("x", ElementType::Int, "tpart", &dir, 8, Params::default());
        let loc = col8.data_location();
        let mut buf = vec![];
        Values::Int(vec![1, 2, 3, 4, 5, 6, 7, 8]).write_le_bytes(&mut buf);
        crate::column::write_whole(&loc, &buf).unwrap();
        col8
    };
    let mask = Bitvector::filled(true, 8);
    let hits = col8.evaluate_range(&Range::at_most("x", 3.0), &mask).unwrap();
    assert_eq!(hits.iter().collect::<Vec<usize>>(), vec![0, 1, 2]);
    assert_eq!(util::file_size(&col8.index_location()), 0);
}

#[test]
fn test_text_select_strings() {
    let dir = testdir("text-select");
    let col = {
        let col = Column::new("t", ElementType::Text, "tpart", &dir, 3, Params::default());
        let strs = vec!["red blue".to_string(), String::new(), "green".to_string()];
        col.write_values(&Values::Text(strs), &Bitvector::filled(true, 3)).unwrap();
        col
    };

    let mask = Bitvector::filled(true, 3);
    let strs = col.select_strings(&mask).unwrap();
    assert_eq!(strs, vec!["red blue", "", "green"]);

    let mut mask = Bitvector::filled(false, 3);
    mask.set_bit(2, true);
    assert_eq!(col.select_strings(&mask).unwrap(), vec!["green"]);

    // numeric ranges are rejected on text columns
    let res = col.evaluate_range(&Range::less_than("t", 1.0), &Bitvector::filled(true, 3));
    assert!(res.is_err());
}

#[test]
fn test_category_round_trip() {
    let dir = testdir("category");
    let col = {
        let mut col = Column::new("c", ElementType::Category, "tpart", &dir, 4, Params::default());
        col.set_description("color tags");
        let strs = vec!["red".to_string(), "blue".to_string(), "red".to_string(), String::new()];
        col.write_values(&Values::Text(strs), &Bitvector::filled(true, 4)).unwrap();
        col
    };
    assert_eq!(col.description(), "color tags");

    let mask = Bitvector::filled(true, 4);
    // codes surface through the uint selector, strings through the
    // dictionary
    assert_eq!(col.select_uints(&mask).unwrap(), vec![1, 2, 1, 0]);
    assert_eq!(col.select_strings(&mask).unwrap(), vec!["red", "blue", "red", ""]);

    let buf = col.select_buffer(&mask).unwrap();
    assert_eq!(
        buf,
        Values::Text(vec!["red".into(), "blue".into(), "red".into(), "".into()])
    );

    // range predicates address the codes
    let hits = col.evaluate_range(&Range::equals("c", 1.0), &mask).unwrap();
    assert_eq!(hits.iter().collect::<Vec<usize>>(), vec![0, 2]);
}

#[test]
fn test_append_missing_source_pads_sentinels() {
    // appending from a partition that lacks the column
    let dt = testdir("append-target");
    let df = testdir("append-source-empty");
    let col = int_column(&dt, "z", vec![1, 2, 3], None);

    col.append(&dt, &df, 3, 2).unwrap();

    let col5 = Column::new("z", ElementType::Int, "tpart", &dt, 5, Params::default());
    let mask = col5.null_mask().unwrap();
    assert_eq!(mask.size(), 5);
    assert_eq!(mask.cnt(), 3); // old bits kept, new bits cleared
    assert!(!mask.is_set(3) && !mask.is_set(4));

    let vals: Vec<i32> = col5.select_values(&Bitvector::filled(true, 5)).unwrap();
    assert_eq!(vals, vec![1, 2, 3, 0x7FFF_FFFF, 0x7FFF_FFFF]);
}

#[test]
fn test_append_with_source_data() {
    let dt = testdir("append2-target");
    let df = testdir("append2-source");
    let col = int_column(&dt, "x", vec![1, 2, 3], None);
    let mut holes = Bitvector::filled(true, 2);
    holes.set_bit(1, false);
    int_column(&df, "x", vec![9, 8], Some(holes));

    col.append(&dt, &df, 3, 2).unwrap();

    let col5 = Column::new("x", ElementType::Int, "tpart", &dt, 5, Params::default());
    let vals: Vec<i32> = col5.select_values(&Bitvector::filled(true, 5)).unwrap();
    assert_eq!(vals, vec![1, 2, 3, 9, 8]);
    let mask = col5.null_mask().unwrap();
    assert_eq!(mask.cnt(), 4);
    assert!(!mask.is_set(4));
}

#[test]
fn test_append_extends_index() {
    let dt = testdir("append3-target");
    let df = testdir("append3-source");
    let col = int_column(&dt, "x", vec![1, 2, 2], None);
    let src = int_column(&df, "x", vec![2, 3], None);
    col.build_index(&BuildSpec::Equality).unwrap();
    src.build_index(&BuildSpec::Equality).unwrap();

    col.append(&dt, &df, 3, 2).unwrap();

    // the rewritten index answers for the grown column
    let col5 = Column::new("x", ElementType::Int, "tpart", &dt, 5, Params::default());
    let mask = Bitvector::filled(true, 5);
    let hits = col5.evaluate_range(&Range::equals("x", 2.0), &mask).unwrap();
    assert_eq!(hits.iter().collect::<Vec<usize>>(), vec![1, 2, 3]);
}
