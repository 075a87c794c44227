use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use layerpick::LayerDigest;
use tempfile::TempDir;

fn layer_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap()
}

/// a minimal `docker save` archive tagged noske:latest
fn saved_image(dir: &Path, layers: &[Vec<u8>]) -> PathBuf {
    let digests: Vec<LayerDigest> = layers.iter().map(|l| LayerDigest::sha256_of(l)).collect();
    let layer_paths: Vec<String> = digests
        .iter()
        .map(|d| format!("{}/layer.tar", d.encoded()))
        .collect();
    let config = serde_json::json!({
        "rootfs": {
            "type": "layers",
            "diff_ids": digests.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
        },
    })
    .to_string();
    let manifest = serde_json::json!([{
        "Config": "config.json",
        "RepoTags": ["noske:latest"],
        "Layers": layer_paths,
    }])
    .to_string();

    let mut entries: Vec<(&str, &[u8])> = layer_paths
        .iter()
        .zip(layers)
        .map(|(p, l)| (p.as_str(), l.as_slice()))
        .collect();
    entries.push(("config.json", config.as_bytes()));
    entries.push(("manifest.json", manifest.as_bytes()));

    let path = dir.join("noske.tar");
    fs::write(&path, layer_tar(&entries)).unwrap();
    path
}

fn layerpick() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_layerpick"));
    cmd.env_remove("LAYERPICK_CONFIG").env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_cli_extracts_from_saved_archive() {
    let dir = TempDir::new().unwrap();
    let archive = saved_image(
        dir.path(),
        &[
            layer_tar(&[("etc/hostname", b"noske")]),
            layer_tar(&[("corpora/registry/susanne", b"NAME susanne")]),
        ],
    );
    let output = dir.path().join("registry");

    let status = layerpick()
        .current_dir(dir.path())
        .args(["extract", "noske", "--archive"])
        .arg(&archive)
        .arg("--output")
        .arg(&output)
        .arg("--work-dir")
        .arg(dir.path().join("work"))
        .status()
        .unwrap();

    assert!(status.success());
    assert_eq!(
        fs::read_to_string(output.join("susanne")).unwrap(),
        "NAME susanne"
    );
    // the caller's archive is left alone
    assert!(archive.exists());
}

#[test]
fn test_cli_reads_settings_from_config_file() {
    let dir = TempDir::new().unwrap();
    let archive = saved_image(
        dir.path(),
        &[layer_tar(&[("srv/index/brown", b"NAME brown")])],
    );
    let config = dir.path().join("layerpick.toml");
    fs::write(
        &config,
        "image = \"noske:latest\"\noutput_dir = \"idx\"\ntarget = \"srv/index/*\"\n",
    )
    .unwrap();

    let status = layerpick()
        .current_dir(dir.path())
        .args(["extract", "--archive"])
        .arg(&archive)
        .status()
        .unwrap();

    assert!(status.success());
    assert!(dir.path().join("idx/brown").exists());
}

#[test]
fn test_cli_fails_without_image() {
    let dir = TempDir::new().unwrap();
    let output = layerpick()
        .current_dir(dir.path())
        .args(["extract", "--runtime", "layerpick-test-no-such-runtime"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no image reference"));
}

#[test]
fn test_cli_fails_when_runtime_cannot_pull() {
    let dir = TempDir::new().unwrap();
    let output = layerpick()
        .current_dir(dir.path())
        .args(["extract", "noske", "--runtime", "false", "--output"])
        .arg(dir.path().join("out"))
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("false pull failed"));
}

#[test]
fn test_cli_lists_layers_of_archive() {
    let dir = TempDir::new().unwrap();
    let layers = vec![layer_tar(&[("a", b"a")]), layer_tar(&[("b", b"b")])];
    let archive = saved_image(dir.path(), &layers);

    let output = layerpick()
        .current_dir(dir.path())
        .args(["layers", "--archive"])
        .arg(&archive)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let expected: Vec<String> = layers
        .iter()
        .map(|l| LayerDigest::sha256_of(l).to_string())
        .collect();
    assert_eq!(stdout.lines().collect::<Vec<_>>(), expected);
}

#[test]
fn test_cli_cat_prints_and_writes_combined_yaml() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("b.yml"), "b: 2\n").unwrap();
    fs::write(data.join("a.yml"), "a: 1\n").unwrap();
    fs::write(data.join("readme.md"), "# no").unwrap();
    let combined = dir.path().join("combined.yaml");

    let output = layerpick()
        .current_dir(dir.path())
        .arg("cat")
        .arg(&data)
        .arg("--output")
        .arg(&combined)
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "a: 1\nb: 2\n");
    assert_eq!(fs::read_to_string(&combined).unwrap(), "a: 1\nb: 2\n");
}

#[test]
fn test_cli_extracts_first_image_of_archive_without_reference() {
    let dir = TempDir::new().unwrap();
    let archive = saved_image(
        dir.path(),
        &[layer_tar(&[("corpora/registry/susanne", b"NAME susanne")])],
    );

    let output = layerpick()
        .current_dir(dir.path())
        .args(["extract", "--archive"])
        .arg(&archive)
        .args(["-j", "4", "--on-layer-error", "skip"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("noske:latest"));
    assert!(dir.path().join("registry/susanne").exists());
}

#[test]
fn test_cli_rejects_image_missing_from_archive() {
    let dir = TempDir::new().unwrap();
    let archive = saved_image(
        dir.path(),
        &[layer_tar(&[("corpora/registry/susanne", b"NAME susanne")])],
    );

    let output = layerpick()
        .current_dir(dir.path())
        .args(["extract", "wrongname:9", "--archive"])
        .arg(&archive)
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no image tagged wrongname:9"));
    assert!(!dir.path().join("registry/susanne").exists());
}
