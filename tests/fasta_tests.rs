use kinase_kld::fasta;

#[test]
fn test_read_fasta() {
    let path = "tests/data/module_fasta/Induced_M1.fasta";
    let df = fasta::read_fasta(path).unwrap();
    assert_eq!(df.height(), 4);
    assert_eq!(df.width(), 2);

    let unique = fasta::unique_sequences(&df).unwrap();
    assert_eq!(unique.height(), 3);

    // test file does not exist
    let result = fasta::read_fasta("tests/data/nonexistent.fasta");
    assert!(result.is_err());
}

#[test]
fn test_empty_fasta() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.fasta");
    std::fs::write(&path, "\n\n").unwrap();
    assert!(fasta::read_fasta(&path).is_err());
}
