use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;

use crate::{colvec::Values, config::Params, types::ElementType};

fn testdir(name: &str) -> ffi::OsString {
    let dir = std::env::temp_dir().join("colbit-binned-test").join(name);
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();
    dir.into_os_string()
}

fn double_column(dir: &ffi::OsStr, vals: Vec<f64>) -> Column {
    let nrows = vals.len() as u32;
    let col = Column::new("v", ElementType::Double, "tpart", dir, nrows, Params::default());
    col.write_values(&Values::Double(vals), &Bitvector::filled(true, nrows as usize))
        .unwrap();
    col
}

#[test]
fn test_build_and_weights() {
    let dir = testdir("build");
    let vals: Vec<f64> = (0..100).map(|i| i as f64).collect();
    let col = double_column(&dir, vals);
    let idx = BinnedIndex::build(&col, 10).unwrap();

    assert_eq!(idx.nrows(), 100);
    assert_eq!(idx.nobs(), 10);
    let weights = idx.bin_weights().unwrap();
    assert_eq!(weights.iter().sum::<u32>(), 100);
    assert_eq!(weights, vec![10; 10]);
    assert_eq!(idx.to_min().unwrap(), 0.0);
    assert_eq!(idx.to_max().unwrap(), 99.0);
}

#[test]
fn test_estimate_brackets_scan() {
    let seed: u64 = random();
    println!("test_estimate_brackets_scan seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    let dir = testdir("brackets");
    let vals: Vec<f64> = (0..500).map(|_| rng.gen_range(-100.0..100.0)).collect();
    let col = double_column(&dir, vals.clone());
    let idx = BinnedIndex::build(&col, 16).unwrap();

    for _case in 0..20 {
        let a: f64 = rng.gen_range(-120.0..120.0);
        let b: f64 = rng.gen_range(-120.0..120.0);
        let range = Range::between("v", a.min(b), a.max(b));

        let est = idx.estimate(&range).unwrap();
        let high = est.high.expect("binned estimates are inexact");

        // low subset of scan subset of high
        let scan: Vec<usize> = vals
            .iter()
            .enumerate()
            .filter_map(|(i, v)| range.contains(*v).then(|| i))
            .collect();
        let scan_bv = {
            let positions: Vec<u32> = scan.iter().map(|i| *i as u32).collect();
            let mut bv = Bitvector::from_indices(&positions);
            bv.adjust_size(0, 500);
            bv
        };
        assert_eq!((&est.low - &scan_bv).cnt(), 0, "{}", range);
        assert_eq!((&scan_bv - &high).cnt(), 0, "{}", range);

        // undecidable is exactly the gap between the bounds
        let iffy = idx.undecidable(&range).unwrap();
        assert!(&high - &est.low == iffy, "{}", range);
    }
}

#[test]
fn test_discrete_unsupported() {
    let dir = testdir("discrete");
    let col = double_column(&dir, vec![1.0, 2.0, 3.0]);
    let idx = BinnedIndex::build(&col, 4).unwrap();
    let set = DiscreteSet::new("v", vec![2.0]);
    assert!(matches!(idx.evaluate(&set), Err(Error::Unsupported(_, _))));
}

#[test]
fn test_write_read_round_trip() {
    let dir = testdir("round-trip");
    let vals: Vec<f64> = (0..64).map(|i| ((i * 37) % 64) as f64).collect();
    let col = double_column(&dir, vals);
    let idx = BinnedIndex::build(&col, 8).unwrap();
    let loc = col.index_location();
    idx.write(&loc).unwrap();

    let back = crate::index::open(&loc, 64, false).unwrap();
    assert_eq!(back.flavor(), Flavor::Binned);
    assert_eq!(back.bin_boundaries().unwrap(), idx.bin_boundaries().unwrap());
    assert_eq!(back.bin_weights().unwrap(), idx.bin_weights().unwrap());

    let range = Range::between("v", 10.0, 30.0);
    let a = idx.estimate(&range).unwrap();
    let b = back.estimate(&range).unwrap();
    assert!(a.low == b.low);
    assert!(a.high.unwrap() == b.high.unwrap());
}

#[test]
fn test_empty_column() {
    let dir = testdir("empty");
    let col = double_column(&dir, vec![]);
    let idx = BinnedIndex::build(&col, 4).unwrap();
    assert_eq!(idx.nrows(), 0);
    assert_eq!(idx.bin_weights().unwrap().iter().sum::<u32>(), 0);
    let est = idx.estimate(&Range::less_than("v", 1.0)).unwrap();
    assert_eq!(est.low.cnt(), 0);
}
