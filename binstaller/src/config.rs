//! Loading and saving install spec files.
//!
//! Specs are YAML by default, JSON when the file says so. Saving goes
//! through write-temp-then-rename so an interrupted embedder run never
//! clobbers the user's config.

use axoasset::SourceFile;
use binstaller_schema::InstallSpec;
use camino::{Utf8Path, Utf8PathBuf};

use crate::errors::BinstallResult;

/// Load a spec from a YAML or JSON file (by extension; YAML is the default)
pub fn load_spec(path: &Utf8Path) -> BinstallResult<InstallSpec> {
    let source = SourceFile::load_local(path)?;
    let spec = if path.extension() == Some("json") {
        source.deserialize_json()?
    } else {
        source.deserialize_yaml()?
    };
    Ok(spec)
}

/// Write a spec back to disk in the format its extension indicates.
///
/// Serialization happens into a sibling temp file which is renamed over the
/// target only once fully written.
pub fn save_spec(path: &Utf8Path, spec: &InstallSpec) -> BinstallResult<()> {
    let serialized = if path.extension() == Some("json") {
        let mut out = serde_json::to_string_pretty(spec)?;
        out.push('\n');
        out
    } else {
        serde_yml::to_string(spec)?
    };
    let tmp = Utf8PathBuf::from(format!("{path}.tmp"));
    std::fs::write(&tmp, serialized)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    fn sample_spec() -> InstallSpec {
        let mut spec = InstallSpec {
            repo: Some("binary-install/binstaller".to_owned()),
            asset: Some(binstaller_schema::AssetConfig {
                template: Some("${NAME}_${OS}_${ARCH}${EXT}".to_owned()),
                default_extension: Some(".tar.gz".to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        };
        spec.normalize();
        spec
    }

    #[test]
    fn yaml_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("binstaller.yml")).unwrap();
        let spec = sample_spec();
        save_spec(&path, &spec).unwrap();
        assert_eq!(load_spec(&path).unwrap(), spec);
    }

    #[test]
    fn json_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("binstaller.json")).unwrap();
        let spec = sample_spec();
        save_spec(&path, &spec).unwrap();
        assert_eq!(load_spec(&path).unwrap(), spec);
    }

    #[test]
    fn repeated_saves_are_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("binstaller.yml")).unwrap();
        let spec = sample_spec();
        save_spec(&path, &spec).unwrap();
        let first = std::fs::read(&path).unwrap();
        save_spec(&path, &spec).unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);
    }
}
