#![no_main]

use libfuzzer_sys::fuzz_target;
use respack::{AccessMode, CompressType, ResourcePack};
use std::io::Write;
use tempfile::NamedTempFile;

fuzz_target!(|data: &[u8]| {
    // Skip inputs shorter than the header
    if data.len() < 72 {
        return;
    }

    let mut temp_file = match NamedTempFile::new() {
        Ok(f) => f,
        Err(_) => return,
    };
    if temp_file.write_all(data).is_err() || temp_file.flush().is_err() {
        return;
    }

    // Opening must validate rather than panic
    let mut pack = ResourcePack::new();
    if pack.open_file(temp_file.path(), AccessMode::ReadWrite).is_err() {
        return;
    }

    let names: Vec<String> = pack.live_files().map(|node| node.name.to_string()).collect();
    for name in &names {
        let _ = pack.read_file(name);
        let _ = pack.read_compressed(name);
    }

    let _ = pack.is_file_exist("");
    let _ = pack.is_file_exist("../../../etc/passwd");
    let _ = pack.version();

    // Mutations on an accepted pack, including a rebuild once the table fills
    let _ = pack.add_bytes("fuzz/added.bin", data, CompressType::Zlib);
    if let Some(name) = names.first() {
        let _ = pack.del_file(name);
    }
    let _ = pack.close_file();
});
