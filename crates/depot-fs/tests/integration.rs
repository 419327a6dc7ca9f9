use depot_fs::{AtomicWriteOptions, Result, atomic_write, read_optional, remove_if_exists};
use tempfile::tempdir;

#[test]
fn test_atomic_write_basic() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("account.config");

    atomic_write(&path, b"hello world", AtomicWriteOptions::new()).unwrap();

    assert!(path.exists());
    assert_eq!(read_optional(&path).unwrap().unwrap(), b"hello world");
}

#[test]
fn test_atomic_write_replaces_existing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("existing.config");

    std::fs::write(&path, "original").unwrap();

    let result = atomic_write(&path, b"new content", AtomicWriteOptions::new());

    assert!(result.is_ok());
    assert_eq!(read_optional(&path).unwrap().unwrap(), b"new content");
}

#[test]
fn test_custom_temp_naming() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("manifest.bin");

    atomic_write(
        &path,
        b"data",
        AtomicWriteOptions::new().prefix(".depot-").suffix(".partial"),
    )
    .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"data");
}

#[test]
fn test_write_then_remove_roundtrip() -> Result<()> {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a/b/c.bin");

    atomic_write(&path, &[0u8; 4096], AtomicWriteOptions::new())?;
    assert_eq!(read_optional(&path)?.map(|b| b.len()), Some(4096));

    assert!(remove_if_exists(&path)?);
    assert!(read_optional(&path)?.is_none());
    Ok(())
}
