use super::*;

use crate::{colvec::Values, config::Params, types::ElementType};

fn testdir(name: &str) -> ffi::OsString {
    let dir = std::env::temp_dir().join("colbit-keyword-test").join(name);
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();
    dir.into_os_string()
}

fn text_column(dir: &ffi::OsStr, rows: &[&str]) -> Column {
    let nrows = rows.len() as u32;
    let col = Column::new("doc", ElementType::Text, "tpart", dir, nrows, Params::default());
    let strs: Vec<String> = rows.iter().map(|s| s.to_string()).collect();
    col.write_values(&Values::Text(strs), &Bitvector::filled(true, rows.len())).unwrap();
    col
}

#[test]
fn test_tokenizers() {
    let tkn = WordTokenizer;
    assert_eq!(tkn.tokenize(b"red blue"), vec!["red", "blue"]);
    assert_eq!(tkn.tokenize(b"a-b_c, d!"), vec!["a", "b", "c", "d"]);
    assert!(tkn.tokenize(b"...").is_empty());

    let tkn = DelimTokenizer::new(",;");
    assert_eq!(tkn.tokenize(b"x,y;;z"), vec!["x", "y", "z"]);
    assert_eq!(tkn.tokenize(b"one two,three"), vec!["one two", "three"]);
}

#[test]
fn test_build_from_text() {
    // scenario: row 0 "red blue", row 1 "blue green"
    let dir = testdir("from-text");
    let col = text_column(&dir, &["red blue", "blue green"]);
    let idx = KeywordIndex::from_text_column(&col, &WordTokenizer).unwrap();

    assert_eq!(idx.terms().len(), 3);
    assert_eq!(idx.terms().lookup("red"), Some(1));
    assert_eq!(idx.terms().lookup("blue"), Some(2));
    assert_eq!(idx.terms().lookup("green"), Some(3));

    assert_eq!(idx.search("blue").unwrap().iter().collect::<Vec<usize>>(), vec![0, 1]);
    assert_eq!(idx.search("red").unwrap().iter().collect::<Vec<usize>>(), vec![0]);
    let miss = idx.search("yellow").unwrap();
    assert_eq!(miss.cnt(), 0);
    assert_eq!(miss.size(), 2);
    assert_eq!(idx.search_count("green").unwrap(), 1);
}

#[test]
fn test_bitmap_zero_is_union_complement() {
    let dir = testdir("union");
    let col = text_column(&dir, &["red", "", "blue red", ""]);
    let idx = KeywordIndex::from_text_column(&col, &WordTokenizer).unwrap();

    // bits[0] marks the rows carrying no term at all
    let mut union = idx.search("red").unwrap();
    union |= &idx.search("blue").unwrap();
    union.flip();
    let none: Vec<usize> = union.iter().collect();
    assert_eq!(none, vec![1, 3]);
}

#[test]
fn test_term_doc_ingestion() {
    let dir = testdir("term-doc");
    let loc = util::to_column_location(&dir, "terms", "txt");
    std::fs::write(
        &loc,
        concat!(
            "red: 0, 2\n",
            "BLUE: 1,2\n",
            "red: 4\n",       // merges into the first spelling
            "\n",
            "malformed line\n",
            "green: 3\n",
        ),
    )
    .unwrap();

    let idx = KeywordIndex::from_term_doc("doc", &loc, 5).unwrap();
    assert_eq!(idx.terms().len(), 3);
    assert_eq!(idx.search("red").unwrap().iter().collect::<Vec<usize>>(), vec![0, 2, 4]);
    assert_eq!(idx.search("blue").unwrap().iter().collect::<Vec<usize>>(), vec![1, 2]);
    assert_eq!(idx.search("green").unwrap().iter().collect::<Vec<usize>>(), vec![3]);
}

#[test]
fn test_case_insensitive_search() {
    let dir = testdir("case");
    let col = text_column(&dir, &["Red RED red"]);
    let idx = KeywordIndex::from_text_column(&col, &WordTokenizer).unwrap();
    assert_eq!(idx.terms().len(), 1);
    // the first seen spelling is preserved
    assert_eq!(idx.terms().term(1), Some("Red"));
    assert_eq!(idx.search("rEd").unwrap().cnt(), 1);
}

#[test]
fn test_write_read_round_trip() {
    let dir = testdir("round-trip");
    let col = text_column(&dir, &["red blue", "blue green", "", "red"]);
    let idx = KeywordIndex::from_text_column(&col, &WordTokenizer).unwrap();
    let loc = col.index_location();
    idx.write(&loc).unwrap();
    assert!(util::file_size(&util::to_column_location(&dir, "doc", "terms")) > 0);

    let back = crate::index::open(&loc, 4, false).unwrap();
    assert_eq!(back.flavor(), Flavor::Keyword);
    assert_eq!(back.nobs(), 4); // three terms plus the no-term bitmap

    for term in ["red", "blue", "green", "yellow"].iter() {
        let a = idx.search(term).unwrap();
        let b = back.search_keyword(term).unwrap();
        assert!(a == b, "{}", term);
    }

    // column-level search goes through the loaded index
    let hits = col.search("blue").unwrap();
    assert_eq!(hits.iter().collect::<Vec<usize>>(), vec![0, 1]);
}

#[test]
fn test_estimate_by_term_id() {
    let dir = testdir("estimate");
    let col = text_column(&dir, &["red blue", "blue green", "red"]);
    let idx = KeywordIndex::from_text_column(&col, &WordTokenizer).unwrap();

    // term ids are the numeric domain of a keyword column
    let est = idx.estimate(&Range::equals("doc", 2.0)).unwrap();
    assert!(est.high.is_none());
    assert!(est.low == idx.search("blue").unwrap());

    let hits = idx.evaluate(&DiscreteSet::new("doc", vec![1.0, 3.0])).unwrap();
    let mut want = idx.search("red").unwrap();
    want |= &idx.search("green").unwrap();
    assert!(hits == want);

    assert!(idx.estimate_cost(&Range::equals("doc", 2.0)) > 0.0);
}
