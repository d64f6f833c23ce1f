use super::*;

#[test]
fn test_element_sizes() {
    use ElementType::*;

    assert_eq!(Byte.element_size(), 1);
    assert_eq!(UByte.element_size(), 1);
    assert_eq!(Short.element_size(), 2);
    assert_eq!(UShort.element_size(), 2);
    assert_eq!(Int.element_size(), 4);
    assert_eq!(UInt.element_size(), 4);
    assert_eq!(Float.element_size(), 4);
    assert_eq!(Category.element_size(), 4);
    assert_eq!(Long.element_size(), 8);
    assert_eq!(ULong.element_size(), 8);
    assert_eq!(Double.element_size(), 8);
    assert_eq!(Oid.element_size(), 8);
    assert_eq!(Text.element_size(), 0);
}

#[test]
fn test_type_codes() {
    use ElementType::*;

    for t in [
        Byte, UByte, Short, UShort, Int, UInt, Long, ULong, Float, Double, Category,
        Text, Oid,
    ]
    .iter()
    {
        assert_eq!(ElementType::from_code(t.to_code()).unwrap(), *t);
    }
    assert!(ElementType::from_code(0).is_err());
    assert!(ElementType::from_code(14).is_err());
}

#[test]
fn test_sentinels() {
    assert_eq!(<i8 as Element>::SENTINEL, 0x7F);
    assert_eq!(<u8 as Element>::SENTINEL, 0xFF);
    assert_eq!(<i16 as Element>::SENTINEL, 0x7FFF);
    assert_eq!(<u16 as Element>::SENTINEL, 0xFFFF);
    assert_eq!(<i32 as Element>::SENTINEL, 0x7FFF_FFFF);
    assert_eq!(<u32 as Element>::SENTINEL, 0xFFFF_FFFF);
    assert_eq!(<i64 as Element>::SENTINEL, 0x7FFF_FFFF_FFFF_FFFF);
    assert_eq!(<u64 as Element>::SENTINEL, 0xFFFF_FFFF_FFFF_FFFF);
    assert!(<f32 as Element>::SENTINEL.is_nan());
    assert!(<f64 as Element>::SENTINEL.is_nan());
}

#[test]
fn test_widening() {
    use ElementType::*;

    // identity
    assert!(Int.widens_to(&Int));
    // signed to wider signed
    assert!(Byte.widens_to(&Short));
    assert!(Short.widens_to(&Long));
    assert!(Int.widens_to(&Long));
    // unsigned to wider unsigned and to double-width signed
    assert!(UByte.widens_to(&UShort));
    assert!(UByte.widens_to(&Short));
    assert!(UShort.widens_to(&Int));
    assert!(UInt.widens_to(&Long));
    // narrowing is disallowed
    assert!(!Int.widens_to(&Short));
    assert!(!Long.widens_to(&Int));
    assert!(!UInt.widens_to(&Int));
    assert!(!Double.widens_to(&Float));
    assert!(!ULong.widens_to(&Long));
    // floats
    assert!(Float.widens_to(&Double));
    assert!(Byte.widens_to(&Float));
    assert!(Int.widens_to(&Double));
    assert!(!Int.widens_to(&Float));
    // strings never convert to numbers
    assert!(!Text.widens_to(&Int));
    assert!(!Int.widens_to(&Text));
}

#[test]
fn test_widening_never_narrows() {
    use arbitrary::Unstructured;
    use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

    let seed: u64 = random();
    println!("test_widening_never_narrows seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    for _case in 0..200 {
        let bytes: Vec<u8> = (0..8).map(|_| rng.gen()).collect();
        let mut uns = Unstructured::new(&bytes);
        let from = ElementType::arbitrary(&mut uns).unwrap();
        let to = ElementType::arbitrary(&mut uns).unwrap();

        if from.widens_to(&to) && from != to {
            // a widening target is never smaller than its source
            assert!(
                to.element_size() >= from.element_size(),
                "{:?} -> {:?}",
                from,
                to
            );
            // and strings never take part
            assert!(from.is_numeric() && to.is_numeric(), "{:?} -> {:?}", from, to);
        }
    }
}

#[test]
fn test_le_round_trip() {
    let mut buf = vec![];
    0x1234_5678_i32.write_le_bytes(&mut buf);
    (-40_i8).write_le_bytes(&mut buf);
    3.25_f64.write_le_bytes(&mut buf);
    assert_eq!(buf.len(), 4 + 1 + 8);

    assert_eq!(<i32 as Element>::from_le_bytes(&buf[0..4]), 0x1234_5678);
    assert_eq!(<i8 as Element>::from_le_bytes(&buf[4..5]), -40);
    assert_eq!(<f64 as Element>::from_le_bytes(&buf[5..13]), 3.25);
}

#[test]
fn test_total_cmp_nan() {
    use std::cmp::Ordering;

    assert_eq!(Element::total_cmp(&1.0_f64, &2.0), Ordering::Less);
    assert_eq!(Element::total_cmp(&f64::NAN, &2.0), Ordering::Greater);
    assert_eq!(Element::total_cmp(&2.0_f64, &f64::NAN), Ordering::Less);
    assert_eq!(Element::total_cmp(&f64::NAN, &f64::NAN), Ordering::Equal);
}
