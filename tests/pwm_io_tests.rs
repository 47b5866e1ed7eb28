use kinase_kld::error::MotifError;
use kinase_kld::pwm;
use kinase_kld::types::AMINO_ACIDS;

#[test]
fn test_read_pwm_table() {
    let load = pwm::read_pwm_table("tests/data/kinase_pwms.csv").unwrap();
    assert_eq!(load.pwms.len(), 3);
    assert!(load.skipped.is_empty());

    let hog1 = &load.pwms["Hog1"];
    assert_eq!(hog1.width(), 5);
    assert_eq!(hog1.frequency('A', 0), Some(0.019481));
    for p in 0..hog1.width() {
        assert!((hog1.position(p).sum() - 1.0).abs() < 1e-4);
    }
}

#[test]
fn test_malformed_motif_is_skipped() {
    let load = pwm::read_pwm_table("tests/data/module_pwms.tsv").unwrap();
    assert_eq!(load.pwms.len(), 2);
    assert!(!load.pwms.contains_key("Broken_M3"));
    assert_eq!(load.skipped.len(), 1);
    assert!(matches!(
        &load.skipped[0],
        MotifError::MalformedPwm { motif, .. } if motif == "Broken_M3"
    ));
}

#[test]
fn test_read_pwm_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::copy(
        "tests/data/kinase_pwms.csv",
        dir.path().join("kinases.csv"),
    )
    .unwrap();
    std::fs::write(dir.path().join("garbage.csv"), "Motif,AA\nX,A\n").unwrap();

    let load = pwm::read_pwms(dir.path()).unwrap();
    assert_eq!(load.pwms.len(), 3);
    assert_eq!(load.skipped.len(), 1);

    let empty = tempfile::tempdir().unwrap();
    assert!(matches!(
        pwm::read_pwm_dir(empty.path()),
        Err(MotifError::NoValidPwms(_))
    ));
}

#[test]
fn test_write_pwm_table() {
    let load = pwm::read_pwm_table("tests/data/kinase_pwms.csv").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("copy.tsv");
    pwm::write_pwm_table(&path, &load.pwms).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("Motif\tAA\t0\t1\t2\t3\t4\n"));
    assert_eq!(text.lines().count(), 1 + 3 * AMINO_ACIDS.len());

    let reread = pwm::read_pwm_table(&path).unwrap();
    assert_eq!(reread.pwms, load.pwms);
}

#[test]
fn test_pwms_from_fasta_dir() {
    let load = pwm::pwms_from_fasta_dir("tests/data/module_fasta", 1.0, true).unwrap();
    assert_eq!(load.pwms.len(), 2);
    assert_eq!(load.skipped.len(), 1);

    // three unique peptides plus a pseudocount of 1 for each of 20 residues
    let m1 = &load.pwms["Induced_M1"];
    assert_eq!(m1.width(), 7);
    let s = m1.frequency('S', 3).unwrap();
    assert!((s - 3.0 / 23.0).abs() < 1e-12);

    let with_duplicates = pwm::pwms_from_fasta_dir("tests/data/module_fasta", 1.0, false).unwrap();
    let s = with_duplicates.pwms["Induced_M1"].frequency('S', 3).unwrap();
    assert!((s - 4.0 / 24.0).abs() < 1e-12);
}
