use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::ZipWriter;

fn main() {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR not set"));
    let spv_dir = out_dir.join("spv");

    if let Err(e) = std::fs::create_dir(&spv_dir) {
        if e.kind() != ErrorKind::AlreadyExists {
            panic!("{e}")
        }
    }

    let mut compiled = Vec::new();

    for file in std::fs::read_dir("shaders").unwrap() {
        let path = file.unwrap().path();

        if path.extension().and_then(|e| e.to_str()) != Some("comp") {
            continue;
        }

        let stem = path.file_stem().unwrap().to_str().unwrap().to_owned();
        let output = spv_dir.join(format!("{stem}.spv"));

        if compile(&path, &output) {
            compiled.push((stem, output));
        }
    }

    let archive = std::fs::File::create(out_dir.join("shaders.zip")).unwrap();
    let mut zip = ZipWriter::new(archive);
    let options = FileOptions::default();

    zip.start_file("manifest.toml", options).unwrap();
    zip.write_all(&std::fs::read("shaders/manifest.toml").unwrap()).unwrap();

    for (stem, output) in compiled {
        zip.start_file(format!("{stem}.spv"), options).unwrap();
        zip.write_all(&std::fs::read(output).unwrap()).unwrap();
    }

    zip.finish().unwrap();

    println!("cargo:rerun-if-changed=shaders");
}

fn compile(input: &Path, output: &Path) -> bool {
    let status = std::process::Command::new("glslc")
        .arg(input)
        .arg("-o")
        .arg(output)
        .status();

    match status {
        Ok(s) if s.success() => true,
        Ok(s) => {
            println!("cargo:warning=glslc failed on {} ({s})", input.display());
            false
        }
        Err(e) => {
            println!("cargo:warning=glslc unavailable, {} not compiled: {e}", input.display());
            false
        }
    }
}
