use pretty_assertions::assert_eq;
use std::fs;
use std::path::PathBuf;
use tessera_core::{GraphVerifier, VerificationLevel};
use tessera_parser::{parse_dir, parse_file, ParseError};

fn demos() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos")
}

#[test]
fn test_demo_files_are_well_formed() {
    let results = parse_dir(demos());
    assert!(results.len() >= 2);
    for (path, result) in results {
        let mut built = result.unwrap_or_else(|e| panic!("{}: {}", path.display(), e));
        let verified = GraphVerifier::new(VerificationLevel::Full).verify(&mut built.graph);
        assert_eq!(verified, Ok(()), "{}", path.display());
    }
}

#[test]
fn test_parse_dir_walks_nested_tir_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("b.tir"), "bb 2 -> end { 1: return_void }").unwrap();
    fs::write(dir.path().join("nested/a.tir"), "bb 2 -> 7 { }").unwrap();
    fs::write(dir.path().join("notes.txt"), "not a graph").unwrap();

    let results = parse_dir(dir.path());
    let names: Vec<_> = results
        .iter()
        .map(|(path, _)| path.strip_prefix(dir.path()).unwrap().to_path_buf())
        .collect();
    assert_eq!(names, vec![PathBuf::from("b.tir"), PathBuf::from("nested/a.tir")]);
    assert!(results[0].1.is_ok());
    assert!(matches!(results[1].1, Err(ParseError::Build(_))));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = parse_file(dir.path().join("absent.tir"));
    assert!(matches!(missing, Err(ParseError::Io { .. })));
}
