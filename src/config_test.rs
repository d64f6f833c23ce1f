use super::*;

#[test]
fn test_params_default() {
    let params = Params::default();
    assert_eq!(params.verbose, 0);
    assert!(params.threads >= 1);
    assert!(!params.is_index_disabled_on_failure("trades", "price"));
}

#[test]
fn test_params_builders() {
    let mut params = Params::default();
    params
        .set_verbose(3)
        .set_threads(2)
        .set_cache_directory(std::ffi::OsStr::new("/var/tmp/scratch"))
        .set_disable_index_on_failure("trades", "price");

    assert_eq!(params.verbose, 3);
    assert_eq!(params.threads, 2);
    assert_eq!(
        params.to_cache_dir().unwrap(),
        path::PathBuf::from("/var/tmp/scratch")
    );
    assert!(params.is_index_disabled_on_failure("trades", "price"));
    assert!(!params.is_index_disabled_on_failure("trades", "qty"));
}

#[test]
fn test_params_from_file() {
    let dir = std::env::temp_dir().join("colbit-config-test");
    std::fs::create_dir_all(&dir).unwrap();
    let loc = dir.join("params.toml");
    std::fs::write(
        &loc,
        concat!(
            "cache_directory = \"/var/tmp/colbit\"\n",
            "verbose = 2\n",
            "threads = 4\n",
            "disable_index_on_failure = [\"trades.price\"]\n",
        ),
    )
    .unwrap();

    let params = Params::from_file(&loc).unwrap();
    assert_eq!(params.verbose, 2);
    assert_eq!(params.threads, 4);
    assert!(params.is_index_disabled_on_failure("trades", "price"));

    std::fs::remove_dir_all(&dir).ok();
}
