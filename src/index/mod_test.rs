use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::io::Read;

use super::*;

fn testdir(name: &str) -> ffi::OsString {
    let dir = std::env::temp_dir().join("colbit-index-test").join(name);
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();
    dir.into_os_string()
}

fn random_bitmaps(rng: &mut SmallRng, n: usize, nrows: usize) -> Vec<Arc<Bitvector>> {
    (0..n)
        .map(|_| {
            let mut bv = Bitvector::new();
            while bv.size() < nrows {
                let run = cmp::min(rng.gen_range(1..50), nrows - bv.size());
                bv.append_fill(rng.gen_bool(0.3), run);
            }
            Arc::new(bv)
        })
        .collect()
}

#[test]
fn test_envelope_round_trip() {
    let seed: u64 = random();
    println!("test_envelope_round_trip seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    let dir = testdir("envelope");
    let loc = util::to_column_location(&dir, "c", "idx");

    for _case in 0..10 {
        let nrows = rng.gen_range(1..500);
        let nobs = rng.gen_range(1..20);
        let bitmaps = random_bitmaps(&mut rng, nobs, nrows);
        let trailer: Vec<u8> = (0..rng.gen_range(0..64)).map(|_| rng.gen()).collect();

        write_envelope(&loc, Flavor::Equality, nrows as u32, &bitmaps, &trailer).unwrap();

        let mut fd = util::open_file_r(&loc).unwrap();
        let (header, offsets) = read_envelope(&mut fd).unwrap();
        assert_eq!(header.flavor, Flavor::Equality.to_code());
        assert_eq!(header.width, 4); // small files keep 4-byte offsets
        assert_eq!(header.nrows as usize, nrows);
        assert_eq!(header.nobs as usize, nobs);
        assert_eq!(offsets.len(), nobs + 1);
        assert_eq!(offsets[0], 16 + 4 * (nobs as u64 + 1));

        // every bitmap activates bit-identical
        let store = BitmapStore::from_disk(fd, offsets.clone());
        for (i, want) in bitmaps.iter().enumerate() {
            let got = store.get(i).unwrap();
            assert!(*got == **want, "bitmap {}", i);
            assert_eq!(
                (offsets[i + 1] - offsets[i]) as usize,
                want.serial_size(),
                "offset span {}",
                i
            );
        }

        // trailer round-trips too
        let mut fd = util::open_file_r(&loc).unwrap();
        let got = read_trailer(&mut fd, &offsets).unwrap();
        assert_eq!(got, trailer);
    }
}

#[test]
fn test_envelope_header_bytes() {
    let dir = testdir("header-bytes");
    let loc = util::to_column_location(&dir, "c", "idx");
    let bitmaps = vec![Arc::new(Bitvector::filled(true, 10))];
    write_envelope(&loc, Flavor::Keyword, 10, &bitmaps, &[]).unwrap();

    let mut head = [0u8; 8];
    util::open_file_r(&loc).unwrap().read_exact(&mut head).unwrap();
    assert_eq!(&head[..6], b"#IBIS\x07");
    assert_eq!(head[6], Flavor::Keyword.to_code());
    assert_eq!(head[7], 4);
}

#[test]
fn test_envelope_rejects_corruption() {
    let dir = testdir("corrupt");
    let loc = util::to_column_location(&dir, "c", "idx");

    std::fs::write(&loc, b"#IBIT\x07\x02\x04junkjunkjunk").unwrap();
    let mut fd = util::open_file_r(&loc).unwrap();
    assert!(matches!(read_envelope(&mut fd), Err(Error::Corrupt(_, _))));

    // valid magic, bad offset width
    std::fs::write(&loc, b"#IBIS\x07\x02\x05aaaabbbbccccdddd").unwrap();
    let mut fd = util::open_file_r(&loc).unwrap();
    assert!(matches!(read_envelope(&mut fd), Err(Error::Corrupt(_, _))));

    // an empty file is no index at all
    std::fs::write(&loc, b"").unwrap();
    let mut fd = util::open_file_r(&loc).unwrap();
    assert!(read_envelope(&mut fd).is_err());
}

#[test]
fn test_open_stale_detection() {
    let dir = testdir("stale");
    let loc = util::to_column_location(&dir, "c", "idx");
    let bitmaps = vec![Arc::new(Bitvector::filled(true, 6))];
    let mut trailer = vec![];
    f64s_to_bytes(&[1.0], &mut trailer);
    write_envelope(&loc, Flavor::Equality, 6, &bitmaps, &trailer).unwrap();

    assert!(open(&loc, 6, false).is_ok());
    assert!(matches!(open(&loc, 9, false), Err(Error::Stale(_, _))));
    // tolerant mode accepts an index built on a prefix
    assert!(open(&loc, 9, true).is_ok());
    assert!(matches!(open(&loc, 3, true), Err(Error::Stale(_, _))));
}

#[test]
fn test_f64_trailer_codec() {
    let vals = vec![1.5, -2.25, f64::MAX, 0.0];
    let mut buf = vec![];
    f64s_to_bytes(&vals, &mut buf);
    let (got, n) = f64s_from_bytes(&buf, 4).unwrap();
    assert_eq!(got, vals);
    assert_eq!(n, 32);
    assert!(f64s_from_bytes(&buf[..16], 4).is_err());
}
