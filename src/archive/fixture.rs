//! in-memory builders for layer and image archives used by tests

use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::digest::LayerDigest;

/// uncompressed tar holding the given files
pub fn layer_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
    layer_tar_with_links(files, &[])
}

/// uncompressed tar holding the given files followed by hardlinks
/// `(path, target)` to earlier entries
pub fn layer_tar_with_links(files: &[(&str, &[u8])], links: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    for (name, target) in links {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Link);
        header.set_size(0);
        header.set_mode(0o644);
        header.set_link_name(target).unwrap();
        builder.append_data(&mut header, name, std::io::empty()).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn zstd_compress(data: &[u8]) -> Vec<u8> {
    zstd::encode_all(data, 0).unwrap()
}

/// digest of the uncompressed tar stream, as image configs record it
pub fn diff_id(layer: &[u8]) -> LayerDigest {
    if layer.starts_with(&[0x1f, 0x8b]) {
        let mut tar = Vec::new();
        GzDecoder::new(layer).read_to_end(&mut tar).unwrap();
        LayerDigest::sha256_of(&tar)
    } else if layer.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        LayerDigest::sha256_of(&zstd::decode_all(layer).unwrap())
    } else {
        LayerDigest::sha256_of(layer)
    }
}

/// write a `docker save` style archive: legacy `<id>/layer.tar` entries,
/// a config json with diff ids and a manifest.json tagged `tag`
///
/// returns the layer digests, base layer first.
pub fn write_image_archive(path: &Path, tag: &str, layers: &[Vec<u8>]) -> Vec<LayerDigest> {
    let digests: Vec<LayerDigest> = layers.iter().map(|l| diff_id(l)).collect();

    let layer_paths: Vec<String> = digests
        .iter()
        .map(|d| format!("{}/layer.tar", d.encoded()))
        .collect();
    let config = serde_json::json!({
        "architecture": "amd64",
        "os": "linux",
        "rootfs": {
            "type": "layers",
            "diff_ids": digests.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
        },
    })
    .to_string();
    let config_name = format!("{}.json", LayerDigest::sha256_of(config.as_bytes()).encoded());
    let manifest = serde_json::json!([{
        "Config": config_name,
        "RepoTags": [tag],
        "Layers": layer_paths,
    }])
    .to_string();

    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    for (layer_path, layer) in layer_paths.iter().zip(layers) {
        entries.push((layer_path.clone(), layer.clone()));
    }
    entries.push((config_name, config.into_bytes()));
    entries.push(("manifest.json".to_string(), manifest.into_bytes()));

    let borrowed: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(n, d)| (n.as_str(), d.as_slice()))
        .collect();
    std::fs::write(path, layer_tar(&borrowed)).unwrap();

    digests
}
