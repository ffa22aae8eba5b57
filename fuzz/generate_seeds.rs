//! Generate seed corpus for fuzzing

use respack::{CompressType, ResourcePack};
use std::fs;
use std::path::Path;

fn seed(
    corpus_dir: &str,
    name: &str,
    build: impl FnOnce(&mut ResourcePack) -> respack::Result<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = format!("{}/{}", corpus_dir, name);
    if Path::new(&path).exists() {
        fs::remove_file(&path)?;
    }
    let mut pack = ResourcePack::create(&path, 50)?;
    build(&mut pack)?;
    pack.close_file()?;
    println!("Generated: {}", path);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let corpus_dir = "fuzz/corpus/fuzz_pack_open";
    fs::create_dir_all(corpus_dir)?;

    seed(corpus_dir, "seed_empty.pack", |_| Ok(()))?;

    seed(corpus_dir, "seed_single_small.pack", |pack| {
        pack.add_bytes("test.txt", b"Hello, World!", CompressType::None)
    })?;

    seed(corpus_dir, "seed_multi.pack", |pack| {
        pack.set_version("1.0")?;
        pack.add_bytes("file1.txt", b"First file", CompressType::Zlib)?;
        pack.add_bytes("file2.txt", b"Second file", CompressType::None)?;
        pack.add_bytes("dir/file3.txt", b"Third file in directory", CompressType::Zlib)
    })?;

    seed(corpus_dir, "seed_large.pack", |pack| {
        let large = b"This is test data for compression. ".repeat(1000);
        pack.add_bytes("large.txt", &large, CompressType::Zlib)
    })?;

    seed(corpus_dir, "seed_deleted.pack", |pack| {
        pack.add_bytes("keep.bin", &(0..255).collect::<Vec<u8>>(), CompressType::Zlib)?;
        pack.add_bytes("gone.bin", b"deleted payload", CompressType::None)?;
        pack.del_file("gone.bin")
    })?;

    seed(corpus_dir, "seed_tiny.pack", |pack| {
        pack.add_bytes("empty.txt", b"", CompressType::Zlib)?;
        pack.add_bytes("tiny.txt", b"abc", CompressType::Zlib)
    })?;

    println!("\nGenerated 6 seed files in {}", corpus_dir);
    Ok(())
}
