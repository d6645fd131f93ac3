//! Integration tests for the checksum embedder, exercised offline through
//! the checksum-file mode.

use binstaller::{config, embed_checksums, net, EmbedMode};
use binstaller_schema::{AssetConfig, InstallSpec, PlatformPair, SortedMap};
use camino::Utf8PathBuf;
use temp_dir::TempDir;

fn two_platform_spec() -> InstallSpec {
    InstallSpec {
        name: Some("binst".to_owned()),
        repo: Some("binary-install/binstaller".to_owned()),
        asset: Some(AssetConfig {
            template: Some("${NAME}_${OS}_${ARCH}${EXT}".to_owned()),
            default_extension: Some(".tar.gz".to_owned()),
            ..Default::default()
        }),
        supported_platforms: Some(vec![
            PlatformPair {
                os: Some("linux".to_owned()),
                arch: Some("amd64".to_owned()),
            },
            PlatformPair {
                os: Some("darwin".to_owned()),
                arch: Some("arm64".to_owned()),
            },
        ]),
        ..Default::default()
    }
}

fn write_checksum_file(dir: &TempDir, contents: &str) -> Utf8PathBuf {
    let path = dir.path().join("checksums.txt");
    std::fs::write(&path, contents).unwrap();
    Utf8PathBuf::from_path_buf(path).unwrap()
}

#[test]
fn embeds_matching_entries_sorted_by_filename() {
    let tmp = TempDir::new().unwrap();
    let sums = write_checksum_file(
        &tmp,
        "1111aa  binst_linux_amd64.tar.gz\n\
         2222bb  binst_darwin_arm64.tar.gz\n\
         3333cc  unrelated_asset.tar.gz\n",
    );
    let client = net::create_client(&net::ClientSettings::new()).unwrap();
    let mut spec = two_platform_spec();
    let count = embed_checksums(
        &client,
        &mut spec,
        "v1.2.3",
        EmbedMode::ChecksumFile(sums),
    )
    .unwrap();

    assert_eq!(count, 2);
    let entries = spec
        .checksums
        .as_ref()
        .unwrap()
        .embedded_for_version("v1.2.3")
        .unwrap();
    // sorted by filename, unrelated asset dropped
    assert_eq!(
        entries[0].filename.as_deref(),
        Some("binst_darwin_arm64.tar.gz")
    );
    assert_eq!(entries[0].hash.as_deref(), Some("2222bb"));
    assert_eq!(
        entries[1].filename.as_deref(),
        Some("binst_linux_amd64.tar.gz")
    );
    assert_eq!(entries[1].hash.as_deref(), Some("1111aa"));
}

#[test]
fn duplicate_entries_last_wins() {
    let tmp = TempDir::new().unwrap();
    let sums = write_checksum_file(
        &tmp,
        "1111aa  binst_linux_amd64.tar.gz\n\
         9999ff  binst_linux_amd64.tar.gz\n",
    );
    let client = net::create_client(&net::ClientSettings::new()).unwrap();
    let mut spec = two_platform_spec();
    embed_checksums(
        &client,
        &mut spec,
        "v1.2.3",
        EmbedMode::ChecksumFile(sums),
    )
    .unwrap();

    let entries = spec
        .checksums
        .as_ref()
        .unwrap()
        .embedded_for_version("1.2.3")
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].hash.as_deref(), Some("9999ff"));
}

#[test]
fn embedding_twice_is_idempotent_on_disk() {
    let tmp = TempDir::new().unwrap();
    let sums = write_checksum_file(
        &tmp,
        "1111aa  binst_linux_amd64.tar.gz\n\
         2222bb  binst_darwin_arm64.tar.gz\n",
    );
    let spec_path = Utf8PathBuf::from_path_buf(tmp.path().join("binstaller.yml")).unwrap();
    let client = net::create_client(&net::ClientSettings::new()).unwrap();

    let mut spec = two_platform_spec();
    embed_checksums(
        &client,
        &mut spec,
        "v1.2.3",
        EmbedMode::ChecksumFile(sums.clone()),
    )
    .unwrap();
    config::save_spec(&spec_path, &spec).unwrap();
    let first = std::fs::read(&spec_path).unwrap();

    let mut spec = config::load_spec(&spec_path).unwrap();
    embed_checksums(
        &client,
        &mut spec,
        "v1.2.3",
        EmbedMode::ChecksumFile(sums),
    )
    .unwrap();
    config::save_spec(&spec_path, &spec).unwrap();
    let second = std::fs::read(&spec_path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn existing_version_key_spelling_is_preserved() {
    let tmp = TempDir::new().unwrap();
    let sums = write_checksum_file(&tmp, "1111aa  binst_linux_amd64.tar.gz\n");
    let client = net::create_client(&net::ClientSettings::new()).unwrap();

    let mut spec = two_platform_spec();
    // the user keyed this version without the leading v
    let mut map = SortedMap::new();
    map.insert("1.2.3".to_owned(), vec![]);
    spec.checksums = Some(binstaller_schema::ChecksumConfig {
        embedded_checksums: Some(map),
        ..Default::default()
    });

    embed_checksums(
        &client,
        &mut spec,
        "v1.2.3",
        EmbedMode::ChecksumFile(sums),
    )
    .unwrap();

    let map = spec
        .checksums
        .as_ref()
        .unwrap()
        .embedded_checksums
        .as_ref()
        .unwrap();
    assert!(map.contains_key("1.2.3"), "key spelling must be kept");
    assert!(!map.contains_key("v1.2.3"));
    assert_eq!(map["1.2.3"].len(), 1);
}

#[test]
fn failures_leave_the_spec_untouched() {
    let client = net::create_client(&net::ClientSettings::new()).unwrap();
    let mut spec = two_platform_spec();
    let before = spec.clone();
    let missing = Utf8PathBuf::from("/nonexistent/checksums.txt");
    embed_checksums(
        &client,
        &mut spec,
        "v1.2.3",
        EmbedMode::ChecksumFile(missing),
    )
    .unwrap_err();
    assert_eq!(spec, before);
}
