//! In-place sorting and segmentation shared by every [Values] variant:
//! selection sort for short slices, median-of-three quicksort above
//! the cutoff, with swaps echoed to the companion [Permuter].

use std::cmp::Ordering;

use crate::colvec::{Permuter, SORT_CUTOFF};

// sort `arr[i..j)` in place; every swap is forwarded to `bdl`.
pub(crate) fn hybrid_sort<T, F>(arr: &mut [T], i: usize, j: usize, cmp: &F, bdl: &mut dyn Permuter)
where
    T: Clone,
    F: Fn(&T, &T) -> Ordering,
{
    if i + SORT_CUTOFF > j {
        // selection sort
        for i1 in i..j.saturating_sub(1) {
            let mut imin = i1;
            for i2 in i1 + 1..j {
                if cmp(&arr[i2], &arr[imin]) == Ordering::Less {
                    imin = i2;
                }
            }
            if imin > i1 {
                arr.swap(i1, imin);
                bdl.swap_rows(i1, imin);
            }
        }
        return;
    }

    // sort three rows to find the median
    let mut i1 = (i + j) / 2;
    let mut i2 = j - 1;
    if cmp(&arr[i], &arr[i1]) == Ordering::Greater {
        arr.swap(i, i1);
        bdl.swap_rows(i, i1);
    }
    if cmp(&arr[i1], &arr[i2]) == Ordering::Greater {
        arr.swap(i2, i1);
        bdl.swap_rows(i2, i1);
        if cmp(&arr[i], &arr[i1]) == Ordering::Greater {
            arr.swap(i, i1);
            bdl.swap_rows(i, i1);
        }
    }

    let sep = arr[(i + j) / 2].clone(); // the median of the three
    i1 = i;
    i2 = j - 1;
    while i1 < i2 {
        let lt1 = cmp(&arr[i1], &sep) == Ordering::Less;
        let ge2 = cmp(&arr[i2], &sep) != Ordering::Less;
        if lt1 && ge2 {
            // both ends already on the right side
            i1 += 1;
            i2 -= 1;
        } else if lt1 {
            i1 += 1;
        } else if ge2 {
            i2 -= 1;
        } else {
            arr.swap(i2, i1);
            bdl.swap_rows(i2, i1);
            i1 += 1;
            i2 -= 1;
        }
    }
    if cmp(&arr[i1], &sep) == Ordering::Less {
        i1 += 1;
    }

    if i1 > i + 1 {
        // elements in [i, i1) are smaller than the separator
        hybrid_sort(arr, i, i1, cmp, bdl);
        hybrid_sort(arr, i1, j, cmp, bdl);
    } else {
        // the separator is among the smallest values; move it next to
        // the front, skip its equal run, and sort the rest
        i1 = i + 1;
        i2 = (i + j) / 2;
        arr.swap(i1, i2);
        bdl.swap_rows(i1, i2);

        i2 = i1 + 1;
        while i2 < j && cmp(&arr[i1], &arr[i2]) == Ordering::Equal {
            i2 += 1;
        }
        if i2 < j {
            hybrid_sort(arr, i2, j, cmp, bdl);
        }
    }
}

// stable permutation of absolute indices `[begin, end)` ordering the
// slice without moving it.
pub(crate) fn stable_argsort<T, F>(arr: &[T], begin: usize, end: usize, cmp: &F) -> Vec<u32>
where
    F: Fn(&T, &T) -> Ordering,
{
    let mut perm: Vec<u32> = (begin as u32..end as u32).collect();
    perm.sort_by(|a, b| cmp(&arr[*a as usize], &arr[*b as usize]));
    perm
}

// boundary offsets of equal-value runs; with `old` given, refine the
// previously found segments instead of starting over.
pub(crate) fn segment_starts<T, F>(arr: &[T], old: Option<&[u32]>, cmp: &F) -> Vec<u32>
where
    F: Fn(&T, &T) -> Ordering,
{
    let nelm = arr.len() as u32;
    let mut res: Vec<u32> = vec![];

    match old {
        Some(old) if old.len() > 2 => {
            // refine within the previously defined segments
            for i in 0..old.len() - 1 {
                let mut j = old[i];
                if i == 0 || *res.last().unwrap() < j {
                    res.push(j);
                }
                let mut target = j as usize;
                j += 1;
                while j < old[i + 1] {
                    while j < old[i + 1]
                        && cmp(&arr[j as usize], &arr[target]) == Ordering::Equal
                    {
                        j += 1;
                    }
                    res.push(j);
                    if j < nelm {
                        target = j as usize;
                    }
                    j += 1;
                }
            }
        }
        _ => {
            // all elements start in one segment
            if nelm == 0 {
                res.push(0);
                res.push(0);
                return dedup_starts(res);
            }
            let mut j = 1u32;
            res.push(0); // the first offset is always 0
            let mut target = 0usize;
            while j < nelm {
                while j < nelm && cmp(&arr[j as usize], &arr[target]) == Ordering::Equal {
                    j += 1;
                }
                res.push(j);
                if j < nelm {
                    target = j as usize;
                    j += 1;
                }
            }
        }
    }
    if *res.last().unwrap() < nelm {
        res.push(nelm);
    }
    dedup_starts(res)
}

// refinement can emit an offset twice at a segment boundary.
fn dedup_starts(mut res: Vec<u32>) -> Vec<u32> {
    res.dedup();
    res
}

#[cfg(test)]
#[path = "sorting_test.rs"]
mod sorting_test;
