use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;
use crate::colvec::NoPermuter;

#[test]
fn test_hybrid_sort_small() {
    // under the cutoff, exercising the selection-sort arm
    let mut arr = vec![5_i32, 3, 1, 4, 2];
    hybrid_sort(&mut arr, 0, 5, &|a, b| a.cmp(b), &mut NoPermuter);
    assert_eq!(arr, vec![1, 2, 3, 4, 5]);

    let mut arr: Vec<i32> = vec![];
    hybrid_sort(&mut arr, 0, 0, &|a, b| a.cmp(b), &mut NoPermuter);
    assert!(arr.is_empty());

    let mut arr = vec![7_i32];
    hybrid_sort(&mut arr, 0, 1, &|a, b| a.cmp(b), &mut NoPermuter);
    assert_eq!(arr, vec![7]);
}

#[test]
fn test_hybrid_sort_random() {
    let seed: u64 = random();
    println!("test_hybrid_sort_random seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    for _case in 0..50 {
        let n: usize = rng.gen_range(0..500);
        let mut arr: Vec<i64> = (0..n).map(|_| rng.gen_range(-50..50)).collect();
        let mut want = arr.clone();
        want.sort_unstable();

        hybrid_sort(&mut arr, 0, n, &|a, b| a.cmp(b), &mut NoPermuter);
        assert_eq!(arr, want, "n:{}", n);
    }
}

#[test]
fn test_hybrid_sort_carries_permuter() {
    let seed: u64 = random();
    println!("test_hybrid_sort_carries_permuter seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    for _case in 0..20 {
        let n: usize = rng.gen_range(2..300);
        let arr0: Vec<u32> = (0..n).map(|_| rng.gen_range(0..40)).collect();
        let mut arr = arr0.clone();
        let mut rids: Vec<u32> = (0..n as u32).collect();

        hybrid_sort(&mut arr, 0, n, &|a, b| a.cmp(b), &mut rids);

        // the carried row ids still name the original positions
        for (k, rid) in rids.iter().enumerate() {
            assert_eq!(arr[k], arr0[*rid as usize]);
        }
    }
}

#[test]
fn test_hybrid_sort_subrange() {
    let mut arr = vec![9_i32, 8, 50, 40, 30, 20, 10, 1, 0];
    hybrid_sort(&mut arr, 2, 7, &|a, b| a.cmp(b), &mut NoPermuter);
    assert_eq!(arr, vec![9, 8, 10, 20, 30, 40, 50, 1, 0]);
}

#[test]
fn test_stable_argsort() {
    let arr = vec![3_i32, 1, 4, 1, 5, 9, 2, 6];
    let perm = stable_argsort(&arr, 0, arr.len(), &|a, b| a.cmp(b));
    assert_eq!(perm, vec![1, 3, 6, 0, 2, 4, 7, 5]);

    let perm = stable_argsort(&arr, 2, 5, &|a, b| a.cmp(b));
    assert_eq!(perm, vec![3, 2, 4]);
}

#[test]
fn test_segment_starts_fresh() {
    let arr = vec![1_u8, 1, 1, 2, 2, 3];
    assert_eq!(segment_starts(&arr, None, &|a, b| a.cmp(b)), vec![0, 3, 5, 6]);

    let arr = vec![7_u8];
    assert_eq!(segment_starts(&arr, None, &|a, b| a.cmp(b)), vec![0, 1]);

    let arr = vec![1_u8, 2, 3];
    assert_eq!(segment_starts(&arr, None, &|a, b| a.cmp(b)), vec![0, 1, 2, 3]);

    let arr: Vec<u8> = vec![];
    assert_eq!(segment_starts(&arr, None, &|a, b| a.cmp(b)), vec![0]);

    let arr = vec![4_u8, 4, 4, 4];
    assert_eq!(segment_starts(&arr, None, &|a, b| a.cmp(b)), vec![0, 4]);
}

#[test]
fn test_segment_starts_refine() {
    // two outer segments, refined by a second key
    let arr = vec![10_u8, 10, 20, 5, 5, 5];
    let old = vec![0, 3, 6];
    let got = segment_starts(&arr, Some(&old), &|a, b| a.cmp(b));
    assert_eq!(got, vec![0, 2, 3, 6]);

    // refinement never crosses an old boundary even when values match
    let arr = vec![1_u8, 1, 1, 1];
    let old = vec![0, 2, 4];
    let got = segment_starts(&arr, Some(&old), &|a, b| a.cmp(b));
    assert_eq!(got, vec![0, 2, 4]);
}
