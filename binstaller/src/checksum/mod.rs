//! The checksum embedder: populating `checksums.embedded_checksums` for a
//! release so the emitted script can verify assets offline.
//!
//! Three modes cover the three places a hash can come from: a checksum file
//! published with the release, a checksum file on the local disk, or
//! downloading every asset and hashing it ourselves.

pub mod digest;

use axoasset::LocalAsset;
use binstaller_schema::{ChecksumAlgorithm, EmbeddedChecksum, InstallSpec};
use camino::Utf8PathBuf;
use reqwest::blocking::Client;
use tracing::{info, warn};

use crate::errors::{BinstallError, BinstallResult};
use crate::net;
use crate::resolver::{self, interpolate, version_of_tag, TemplateVars};
use crate::SortedMap;

/// Where the embedder gets its hashes from
#[derive(Debug, Clone)]
pub enum EmbedMode {
    /// Fetch the checksum file the release publishes (`checksums.template`)
    Download,
    /// Parse a checksum file already on disk
    ChecksumFile(Utf8PathBuf),
    /// Download every asset and hash it locally
    Calculate,
}

/// One line of a checksum file: `(filename, hash)`, filename absent for
/// bare-hash lines
pub type ParsedChecksum = (Option<String>, String);

/// Parse the line-oriented checksum file formats: `<hex>  <file>`,
/// `<hex> *<file>` and bare `<hex>`. Returns entries in file order so
/// callers can apply last-wins semantics.
pub fn parse_checksum_text(origin: &str, text: &str) -> BinstallResult<Vec<ParsedChecksum>> {
    let mut parsed = Vec::new();
    for (i, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let (hash, rest) = match line.split_once(char::is_whitespace) {
            Some((hash, rest)) => (hash, rest.trim_start()),
            None => (line, ""),
        };
        if hash.is_empty() || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(BinstallError::ChecksumParse {
                origin: origin.to_owned(),
                line_number: i + 1,
                line: raw_line.to_owned(),
            });
        }
        let filename = rest.strip_prefix('*').unwrap_or(rest);
        let filename = if filename.is_empty() {
            None
        } else {
            Some(filename.to_owned())
        };
        parsed.push((filename, hash.to_lowercase()));
    }
    Ok(parsed)
}

fn basename(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Filter parsed checksum entries down to the filenames the resolver can
/// produce. Later entries for the same file win; a bare hash is taken to
/// mean the lone expected asset when there is exactly one.
fn match_expected(parsed: Vec<ParsedChecksum>, expected: &[String]) -> SortedMap<String, String> {
    let mut by_file = SortedMap::new();
    let mut bare = None;
    for (filename, hash) in parsed {
        match filename {
            Some(filename) => {
                let base = basename(&filename);
                if expected.iter().any(|want| want == base) {
                    by_file.insert(base.to_owned(), hash);
                }
            }
            None => bare = Some(hash),
        }
    }
    if by_file.is_empty() && expected.len() == 1 {
        if let Some(hash) = bare {
            by_file.insert(expected[0].clone(), hash);
        }
    }
    by_file
}

/// The distinct checksum file names a spec's `checksums.template` resolves
/// to for a tag. Usually one; more when the template mentions `${OS}` or
/// `${ARCH}` and the release publishes per-platform checksum files.
fn checksum_filenames(spec: &InstallSpec, tag: &str) -> BinstallResult<Vec<String>> {
    let template = spec
        .checksums
        .as_ref()
        .and_then(|checksums| checksums.template.as_deref())
        .filter(|template| !template.is_empty())
        .ok_or(BinstallError::MissingField {
            field: "checksums.template".to_owned(),
        })?;
    let name = spec.name.as_deref().unwrap_or_default();
    let mut filenames = std::collections::BTreeSet::new();
    for (os, arch) in resolver::platforms_of(spec)? {
        let resolved = resolver::resolve_asset(spec, tag, &os, &arch)?;
        let vars = TemplateVars {
            name,
            version: version_of_tag(tag),
            tag,
            os: &resolved.os,
            arch: &resolved.arch,
            ext: &resolved.ext,
            asset_filename: Some(&resolved.filename),
        };
        filenames.insert(interpolate(template, &vars)?);
    }
    Ok(filenames.into_iter().collect())
}

/// Populate `spec.checksums.embedded_checksums` for a version.
///
/// Only the embedded-checksum map is touched: the entry list for the
/// resolved version is replaced wholesale with a filename-sorted list, so
/// repeated runs against the same release are idempotent. An existing map
/// key for the version is reused as spelled (`v`-prefixed or not); other
/// versions' entries are left alone. Any error leaves the spec unmodified.
pub fn embed_checksums(
    client: &Client,
    spec: &mut InstallSpec,
    version: &str,
    mode: EmbedMode,
) -> BinstallResult<usize> {
    let mut resolved_spec = spec.clone();
    resolved_spec.normalize();
    let repo = resolved_spec
        .repo
        .clone()
        .ok_or(BinstallError::MissingField {
            field: "repo".to_owned(),
        })?;
    let tag = if version == "latest" {
        net::latest_release_tag(client, &repo)?
    } else {
        version.to_owned()
    };
    let expected = resolver::possible_filenames(&resolved_spec, &tag)?;
    let download_base = format!("https://github.com/{repo}/releases/download/{tag}");
    let algorithm = resolved_spec
        .checksums
        .as_ref()
        .map(|checksums| checksums.algorithm())
        .unwrap_or(ChecksumAlgorithm::Sha256);

    let by_file = match mode {
        EmbedMode::Download => {
            let mut parsed = Vec::new();
            for filename in checksum_filenames(&resolved_spec, &tag)? {
                let url = format!("{download_base}/{filename}");
                info!("downloading checksum file {url}");
                let text = net::fetch_text(client, &url)?;
                parsed.extend(parse_checksum_text(&url, &text)?);
            }
            match_expected(parsed, &expected)
        }
        EmbedMode::ChecksumFile(path) => {
            let text = LocalAsset::load_string(&path)?;
            match_expected(parse_checksum_text(path.as_str(), &text)?, &expected)
        }
        EmbedMode::Calculate => {
            let mut by_file = SortedMap::new();
            for filename in &expected {
                let url = format!("{download_base}/{filename}");
                match net::fetch_bytes(client, &url)? {
                    Some(bytes) => {
                        info!("hashed {filename} ({} bytes)", bytes.len());
                        by_file.insert(filename.clone(), digest::hash_bytes(algorithm, &bytes));
                    }
                    // assets don't have to exist for every resolvable
                    // platform; a missing one just isn't embedded
                    None => warn!("no asset {filename} published for {tag}, skipping"),
                }
            }
            by_file
        }
    };

    let entries: Vec<EmbeddedChecksum> = by_file
        .into_iter()
        .map(|(filename, hash)| EmbeddedChecksum {
            filename: Some(filename),
            hash: Some(hash),
        })
        .collect();
    let count = entries.len();

    let checksums = spec.checksums.get_or_insert_with(Default::default);
    let map = checksums
        .embedded_checksums
        .get_or_insert_with(Default::default);
    let bare = tag.strip_prefix('v').unwrap_or(&tag);
    let prefixed = format!("v{bare}");
    let key = if map.contains_key(&tag) {
        tag.clone()
    } else if map.contains_key(bare) {
        bare.to_owned()
    } else if map.contains_key(&prefixed) {
        prefixed
    } else {
        tag.clone()
    };
    map.insert(key, entries);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_three_line_shapes() {
        let text = "abc123  file.tgz\ndef456 *other.tgz\n0123abcd\n";
        let parsed = parse_checksum_text("checksums.txt", text).unwrap();
        assert_eq!(
            parsed,
            vec![
                (Some("file.tgz".to_owned()), "abc123".to_owned()),
                (Some("other.tgz".to_owned()), "def456".to_owned()),
                (None, "0123abcd".to_owned()),
            ]
        );
    }

    #[test]
    fn rejects_non_hex_hashes() {
        let err = parse_checksum_text("checksums.txt", "nothex  file.tgz").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 1"), "{msg}");
        assert!(msg.contains("checksums.txt"), "{msg}");
    }

    #[test]
    fn hashes_normalize_to_lowercase() {
        let parsed = parse_checksum_text("x", "ABC123  file.tgz").unwrap();
        assert_eq!(parsed[0].1, "abc123");
    }

    #[test]
    fn later_entries_win() {
        let parsed = vec![
            (Some("file.tgz".to_owned()), "aaaa".to_owned()),
            (Some("file.tgz".to_owned()), "bbbb".to_owned()),
        ];
        let matched = match_expected(parsed, &["file.tgz".to_owned()]);
        assert_eq!(matched.get("file.tgz").map(String::as_str), Some("bbbb"));
    }

    #[test]
    fn entries_match_by_basename() {
        let parsed = vec![(Some("dist/file.tgz".to_owned()), "aaaa".to_owned())];
        let matched = match_expected(parsed, &["file.tgz".to_owned()]);
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn unexpected_filenames_are_dropped() {
        let parsed = vec![(Some("unrelated.tgz".to_owned()), "aaaa".to_owned())];
        let matched = match_expected(parsed, &["file.tgz".to_owned()]);
        assert!(matched.is_empty());
    }

    #[test]
    fn bare_hash_applies_to_a_lone_asset() {
        let parsed = vec![(None, "aaaa".to_owned())];
        let matched = match_expected(parsed, &["file.tgz".to_owned()]);
        assert_eq!(matched.get("file.tgz").map(String::as_str), Some("aaaa"));

        let parsed = vec![(None, "aaaa".to_owned())];
        let matched = match_expected(
            parsed,
            &["file.tgz".to_owned(), "other.tgz".to_owned()],
        );
        assert!(matched.is_empty());
    }
}
