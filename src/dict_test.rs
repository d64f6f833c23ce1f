use super::*;

#[test]
fn test_intern() {
    let mut dict = Dictionary::new();
    assert_eq!(dict.insert("Red"), 1);
    assert_eq!(dict.insert("blue"), 2);
    // case-insensitive, first spelling wins
    assert_eq!(dict.insert("RED"), 1);
    assert_eq!(dict.insert("Blue"), 2);
    assert_eq!(dict.len(), 2);

    assert_eq!(dict.lookup("red"), Some(1));
    assert_eq!(dict.lookup("BLUE"), Some(2));
    assert_eq!(dict.lookup("green"), None);

    assert_eq!(dict.term(1), Some("Red"));
    assert_eq!(dict.term(2), Some("blue"));
    assert_eq!(dict.term(0), None);
    assert_eq!(dict.term(3), None);

    let terms: Vec<&str> = dict.iter().collect();
    assert_eq!(terms, vec!["Red", "blue"]);
}

#[test]
fn test_read_write() {
    let dir = std::env::temp_dir().join("colbit-dict-test");
    std::fs::create_dir_all(&dir).unwrap();
    let loc = dir.join("tags.terms").into_os_string();

    let mut dict = Dictionary::new();
    for term in ["alpha", "Beta", "gamma", "delta"].iter() {
        dict.insert(term);
    }
    dict.write(&loc).unwrap();

    let back = Dictionary::read(&loc).unwrap();
    assert_eq!(back.len(), 4);
    // ids assigned by file order stay stable
    for term in ["alpha", "Beta", "gamma", "delta"].iter() {
        assert_eq!(back.lookup(term), dict.lookup(term), "{}", term);
    }
    assert_eq!(back.term(2), Some("Beta"));

    std::fs::remove_dir_all(&dir).ok();
}
