//! Resource pack round trips
//!
//! Files written through every add path read back byte-identical, across
//! close and reopen.

use respack::pack::{FILE_NODE_SIZE, HEADER_SIZE, MIN_COMPRESS_SIZE};
use respack::{AccessMode, CompressType, PackError, ResourcePack, UseFlag};
use std::fs;
use tempfile::TempDir;

/// Helper: deterministic, mildly compressible test data
fn sample_data(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| ((i / 7) as u8).wrapping_add(seed)).collect()
}

#[test]
fn test_roundtrip_none_and_zlib() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("roundtrip.pack");

    let mut pack = ResourcePack::create(&path, 50).unwrap();
    pack.set_version("2.4.1").unwrap();
    for (i, size) in [0usize, 1, 7, 8, 100, 4096, 70_000].iter().enumerate() {
        let data = sample_data(*size, i as u8);
        pack.add_bytes(&format!("none/{}.bin", size), &data, CompressType::None)
            .unwrap();
        pack.add_bytes(&format!("zlib/{}.bin", size), &data, CompressType::Zlib)
            .unwrap();
    }
    pack.close_file().unwrap();

    let mut pack = ResourcePack::open(&path, AccessMode::ReadOnly).unwrap();
    assert_eq!(pack.version(), "2.4.1");
    assert_eq!(pack.live_count(), 14);
    for (i, size) in [0usize, 1, 7, 8, 100, 4096, 70_000].iter().enumerate() {
        let data = sample_data(*size, i as u8);
        assert_eq!(pack.read_file(&format!("none/{}.bin", size)).unwrap(), &data[..]);
        assert_eq!(pack.read_file(&format!("zlib/{}.bin", size)).unwrap(), &data[..]);
    }
}

#[test]
fn test_small_inputs_stored_verbatim() {
    let dir = TempDir::new().unwrap();
    let mut pack = ResourcePack::create(dir.path().join("tiny.pack"), 50).unwrap();

    pack.add_bytes("tiny", b"1234567", CompressType::Zlib).unwrap();
    let node = pack.node("tiny").unwrap().clone();
    assert!((node.real_size as usize) < MIN_COMPRESS_SIZE);
    assert_eq!(node.compress_size, node.real_size);
    assert_eq!(pack.read_compressed("tiny").unwrap(), b"1234567");
    assert_eq!(pack.read_file("tiny").unwrap(), b"1234567");
}

#[test]
fn test_add_from_disk_and_raw_copy() {
    let dir = TempDir::new().unwrap();
    let loose = dir.path().join("loose.txt");
    let text = "the quick brown fox ".repeat(200);
    fs::write(&loose, &text).unwrap();

    let mut source = ResourcePack::create(dir.path().join("source.pack"), 50).unwrap();
    source.add_file(&loose, "docs/fox.txt", CompressType::Zlib).unwrap();
    let node = source.node("docs/fox.txt").unwrap().clone();
    assert!(node.compress_size < node.real_size);
    let stored = source.read_compressed("docs/fox.txt").unwrap();

    let mut target = ResourcePack::create(dir.path().join("target.pack"), 50).unwrap();
    target.add_raw("copied/fox.txt", &node, &stored).unwrap();
    assert_eq!(target.read_file("copied/fox.txt").unwrap(), text.as_bytes());

    assert!(matches!(
        source.add_file(dir.path().join("missing.txt"), "missing", CompressType::Zlib),
        Err(PackError::Io(_))
    ));
    assert!(source.last_error().is_some());
}

#[test]
fn test_delete_keeps_file_size() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("delete.pack");
    let mut pack = ResourcePack::create(&path, 50).unwrap();
    pack.add_bytes("keep", &sample_data(500, 1), CompressType::Zlib).unwrap();
    pack.add_bytes("drop", &sample_data(500, 2), CompressType::Zlib).unwrap();
    pack.flush().unwrap();
    let size_before = fs::metadata(&path).unwrap().len();

    pack.del_file("drop").unwrap();
    assert!(!pack.is_file_exist("drop"));
    assert!(matches!(pack.del_file("drop"), Err(PackError::NotFound(_))));
    pack.close_file().unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), size_before);

    let mut pack = ResourcePack::open(&path, AccessMode::ReadWrite).unwrap();
    assert!(!pack.is_file_exist("drop"));
    assert_eq!(pack.file_list()[1].use_flag, UseFlag::Deleted);
    assert_eq!(pack.read_file("keep").unwrap(), &sample_data(500, 1)[..]);

    // The name is free again after a delete
    pack.add_bytes("drop", b"second life", CompressType::None).unwrap();
    assert_eq!(pack.read_file("drop").unwrap(), b"second life");
}

#[test]
fn test_names_stay_unique() {
    let dir = TempDir::new().unwrap();
    let mut pack = ResourcePack::create(dir.path().join("unique.pack"), 50).unwrap();
    pack.add_bytes("a", b"first copy", CompressType::None).unwrap();
    assert!(matches!(
        pack.add_bytes("a", b"second copy", CompressType::None),
        Err(PackError::Duplicate(_))
    ));
    pack.del_file("a").unwrap();
    pack.add_bytes("a", b"third copy", CompressType::None).unwrap();

    let live: Vec<_> = pack.live_files().map(|n| n.name.to_string()).collect();
    assert_eq!(live, vec!["a"]);
    assert_eq!(pack.read_file("a").unwrap(), b"third copy");
}

#[test]
fn test_layout_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("layout.pack");
    let mut pack = ResourcePack::create(&path, 50).unwrap();
    pack.add_bytes("x", b"payload!", CompressType::None).unwrap();
    pack.close_file().unwrap();

    let bytes = fs::read(&path).unwrap();
    let table_end = HEADER_SIZE + 50 * FILE_NODE_SIZE;
    assert_eq!(bytes.len(), table_end + 8);
    assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), HEADER_SIZE as u32);
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 50);

    let record = &bytes[HEADER_SIZE..HEADER_SIZE + FILE_NODE_SIZE];
    assert_eq!(&record[..2], b"x\0");
    assert_eq!(u32::from_le_bytes(record[64..68].try_into().unwrap()), table_end as u32);
    assert_eq!(u32::from_le_bytes(record[68..72].try_into().unwrap()), 8);
    assert_eq!(record[77], UseFlag::InUsing as u8);
    assert_eq!(&bytes[table_end..], b"payload!");
}

#[test]
fn test_read_only_rejects_mutation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ro.pack");
    ResourcePack::create(&path, 50).unwrap().close_file().unwrap();

    let mut pack = ResourcePack::open(&path, AccessMode::ReadOnly).unwrap();
    assert!(matches!(
        pack.add_bytes("a", b"data data", CompressType::Zlib),
        Err(PackError::ReadOnly)
    ));
    assert!(matches!(pack.set_version("9"), Err(PackError::ReadOnly)));
    assert!(matches!(pack.del_file("a"), Err(PackError::ReadOnly)));
}

#[test]
fn test_create_refuses_existing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("exists.pack");
    fs::write(&path, b"something").unwrap();
    assert!(matches!(
        ResourcePack::create(&path, 50),
        Err(PackError::AlreadyExists(_))
    ));
    assert_eq!(fs::read(&path).unwrap(), b"something");
}
