#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Create a file with the given contents, creating parent directories
pub fn create_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();

    let file_path = dir.join(name);
    let mut file = File::create(&file_path).unwrap();
    file.write_all(contents).unwrap();
    file_path
}

/// Write an executable shell script
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = create_file(dir, name, format!("#!/bin/sh\n{}", body).as_bytes());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    path
}

/// Extractor stand-in: writes `pngs` images and `others` text files into `<stem>_images`
pub fn extractor_script(dir: &Path, pngs: usize, others: usize) -> PathBuf {
    let body = format!(
        r#"out="${{CLEANUP_MONITOR_FILE%.*}}_images"
mkdir -p "$out"
i=0
while [ $i -lt {pngs} ]; do i=$((i+1)); printf 'image' > "$out/img$i.png"; done
i=0
while [ $i -lt {others} ]; do i=$((i+1)); printf 'text' > "$out/note$i.txt"; done
"#,
        pngs = pngs,
        others = others
    );
    write_script(dir, "extract.sh", &body)
}

/// Duplicate-remover stand-in: deletes `*.dup.png` files from `<stem>_images`
pub fn remover_script(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "dedupe.sh",
        "rm -f \"${CLEANUP_MONITOR_FILE%.*}_images\"/*.dup.png\n",
    )
}
