//! Archive manager across backends
//!
//! Packs and loose directories mounted side by side, resolved in load order.

use respack::archive::{
    ExternalArchiveFactory, ExternalEntry, ExternalHandle, ExternalOpener, PackArchiveFactory,
    FILESYSTEM_ARCHIVE_TYPE, PACK_ARCHIVE_TYPE,
};
use respack::{
    ArchiveError, ArchiveManager, ArchiveResult, CompressType, ManagerConfig, ResourcePack,
};
use std::fs;
use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;

/// Helper: pack with the given files, all zlib-compressed
fn create_pack(dir: &TempDir, name: &str, files: &[(&str, &[u8])]) -> String {
    let path = dir.path().join(name);
    let mut pack = ResourcePack::create(&path, 50).unwrap();
    for (file, data) in files {
        pack.add_bytes(file, data, CompressType::Zlib).unwrap();
    }
    pack.close_file().unwrap();
    path.to_str().unwrap().to_string()
}

/// Helper: directory with the given loose files
fn create_dir(dir: &TempDir, name: &str, files: &[(&str, &[u8])]) -> String {
    let root = dir.path().join(name);
    for (file, data) in files {
        let path = root.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }
    root.to_str().unwrap().to_string()
}

fn read_stream(manager: &ArchiveManager, file: &str) -> Option<Vec<u8>> {
    manager.exists(file).unwrap().map(|mut stream| {
        let mut data = Vec::new();
        stream.read_to_end(&mut data).unwrap();
        data
    })
}

#[test]
fn test_overrides_shadow_base_pack() {
    let dir = TempDir::new().unwrap();
    let overrides = create_dir(&dir, "overrides", &[("ui/title.txt", b"patched title")]);
    let base = create_pack(
        &dir,
        "base.pack",
        &[
            ("ui/title.txt", b"original title"),
            ("ui/font.ttf", b"font bytes here"),
        ],
    );

    let mut manager = ArchiveManager::with_default_factories();
    manager.load(&overrides, FILESYSTEM_ARCHIVE_TYPE).unwrap();
    manager.load(&base, PACK_ARCHIVE_TYPE).unwrap();

    assert_eq!(read_stream(&manager, "ui/title.txt").unwrap(), b"patched title");
    assert_eq!(read_stream(&manager, "ui/font.ttf").unwrap(), b"font bytes here");
    assert!(read_stream(&manager, "ui/missing.png").is_none());

    let owner = manager.find_archive("ui/font.ttf").unwrap().unwrap();
    assert_eq!(owner.archive_type(), PACK_ARCHIVE_TYPE);
}

#[test]
fn test_duplicate_pack_load() {
    let dir = TempDir::new().unwrap();
    let base = create_pack(&dir, "dup.pack", &[("a.txt", b"aaaaaaaaaa")]);

    let mut manager = ArchiveManager::with_default_factories();
    let first = manager.load(&base, PACK_ARCHIVE_TYPE).unwrap();
    let second = manager.load(&base, PACK_ARCHIVE_TYPE).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(manager.archives().count(), 1);

    manager.unload(&base).unwrap();
    assert!(manager.get(&base).is_none());
    assert!(matches!(
        first.exists("a.txt"),
        Err(ArchiveError::NotLoaded(_))
    ));
}

#[test]
fn test_load_config() {
    let dir = TempDir::new().unwrap();
    let loose = create_dir(&dir, "loose", &[("readme.txt", b"loose readme")]);
    let fresh = dir.path().join("fresh.pack");
    let source = format!(
        r#"
        [pack]
        table_size = 80
        writable = true

        [[archive]]
        name = '{}'
        type = "filesystem"

        [[archive]]
        name = '{}'
        type = "pack"
        "#,
        loose,
        fresh.display()
    );
    let config = ManagerConfig::from_toml_str(&source).unwrap();

    let mut manager = ArchiveManager::with_default_factories();
    let mounted = manager.load_config(&config).unwrap();
    assert_eq!(mounted.len(), 2);

    let pack_archive = &mounted[1];
    assert!(pack_archive.capabilities().writable);
    pack_archive.add_file("saves/slot1.sav", &[42u8; 256]).unwrap();
    assert_eq!(read_stream(&manager, "saves/slot1.sav").unwrap(), vec![42u8; 256]);
    assert_eq!(read_stream(&manager, "readme.txt").unwrap(), b"loose readme");

    manager.shutdown().unwrap();
    let pack = ResourcePack::open(&fresh, respack::AccessMode::ReadOnly).unwrap();
    assert_eq!(pack.node_count(), 80);
    assert!(pack.is_file_exist("saves/slot1.sav"));
}

#[test]
fn test_load_config_without_pack_section_keeps_registered_factory() {
    let dir = TempDir::new().unwrap();
    let fresh = dir.path().join("caller.pack");
    let source = format!(
        r#"
        [[archive]]
        name = '{}'
        type = "pack"
        "#,
        fresh.display()
    );
    let config = ManagerConfig::from_toml_str(&source).unwrap();
    assert!(config.pack.is_none());

    let mut manager = ArchiveManager::with_default_factories();
    manager.register_factory(Box::new(PackArchiveFactory::writable(120)));
    let mounted = manager.load_config(&config).unwrap();

    assert!(mounted[0].capabilities().writable);
    mounted[0].add_file("notes.txt", b"kept writable").unwrap();
    manager.shutdown().unwrap();

    let pack = ResourcePack::open(&fresh, respack::AccessMode::ReadOnly).unwrap();
    assert_eq!(pack.node_count(), 120);
    assert!(pack.is_file_exist("notes.txt"));
}

#[test]
fn test_load_config_unknown_type() {
    let config = ManagerConfig::from_toml_str(
        r#"
        [[archive]]
        name = "bundle.7z"
        type = "sevenzip"
        "#,
    )
    .unwrap();

    let mut manager = ArchiveManager::with_default_factories();
    assert!(matches!(
        manager.load_config(&config),
        Err(ArchiveError::UnknownArchiveType(_))
    ));
}

/// Helper: a third-party container holding a fixed set of files
struct FixedHandle;

impl ExternalHandle for FixedHandle {
    fn entries(&mut self) -> ArchiveResult<Vec<ExternalEntry>> {
        Ok(vec![ExternalEntry::file("vendor/logo.png", 3, 5)])
    }

    fn read(&mut self, name: &str) -> ArchiveResult<Vec<u8>> {
        match name {
            "vendor/logo.png" => Ok(b"logo!".to_vec()),
            other => Err(ArchiveError::External(format!("no entry {}", other))),
        }
    }
}

#[test]
fn test_external_factory_registration() {
    let opener: ExternalOpener =
        Arc::new(|_name: &str| -> ArchiveResult<Box<dyn ExternalHandle>> { Ok(Box::new(FixedHandle)) });

    let mut manager = ArchiveManager::with_default_factories();
    manager.register_factory(Box::new(ExternalArchiveFactory::new("vendor", opener)));
    assert!(manager.has_factory("vendor"));

    let archive = manager.load("assets.vnd", "vendor").unwrap();
    assert_eq!(archive.archive_type(), "vendor");
    assert_eq!(read_stream(&manager, "vendor/logo.png").unwrap(), b"logo!");

    manager.unload_archive(&archive).unwrap();
    assert!(manager.is_empty());
}
