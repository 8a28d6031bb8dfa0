use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn liberator() -> Command {
    Command::new(env!("CARGO_BIN_EXE_kicad-liberator"))
}

#[test]
fn test_missing_project_fails() {
    let source = TempDir::new().unwrap();
    let config = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let dest = out.path().join("liberated");

    let output = liberator()
        .arg("-i")
        .arg(source.path())
        .arg("-o")
        .arg(&dest)
        .arg("--config-dir")
        .arg(config.path())
        .env_remove("RUST_LOG")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"), "stderr: {stderr}");
    assert!(stderr.contains(".kicad_pro"), "stderr: {stderr}");
    assert!(!dest.exists());
}

#[test]
fn test_existing_destination_fails() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("demo.kicad_pro"), "{}").unwrap();
    fs::write(source.path().join("demo.kicad_sch"), "(kicad_sch)").unwrap();
    let config = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    fs::write(dest.path().join("mine.txt"), "keep").unwrap();

    let output = liberator()
        .arg("-i")
        .arg(source.path())
        .arg("-o")
        .arg(dest.path())
        .arg("--config-dir")
        .arg(config.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert_eq!(fs::read_to_string(dest.path().join("mine.txt")).unwrap(), "keep");
    assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 1);
}

#[test]
fn test_requires_input_and_output() {
    let output = liberator().output().unwrap();
    assert!(!output.status.success());
}
