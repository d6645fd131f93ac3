//! Code for generating installer and runner scripts.
//!
//! The emitted script replays the resolver's rule algorithm in shell, because
//! the end user's platform isn't known at generation time. Everything the
//! spec contributes to the script goes through one of two renderings:
//! single-quoting (for plain values) or placeholder translation into a
//! double-quoted expression over the script's own variables (for templates).
//! Nothing else from the spec ever reaches the byte stream.

use binstaller_schema::{CaseConvention, ChecksumAlgorithm, EmbeddedChecksum, InstallSpec};
use serde::Serialize;

use crate::backend::templates::{
    sh_quote, Templates, TEMPLATE_INSTALL_SH, TEMPLATE_RUN_SH,
};
use crate::errors::{BinstallError, BinstallResult};
use crate::resolver::{tokenize_template, Placeholder, TemplateToken};
use crate::validate::{check_shell_safe, validate_spec};

/// Which kind of script to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    /// Downloads, verifies and installs the binary into a bin dir
    Installer,
    /// Downloads into a temp dir, verifies and `exec`s the binary
    Runner,
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = match self {
            ScriptType::Installer => "installer",
            ScriptType::Runner => "runner",
        };
        string.fmt(f)
    }
}

impl std::str::FromStr for ScriptType {
    type Err = String;
    fn from_str(val: &str) -> Result<Self, Self::Err> {
        let res = match val {
            "installer" => ScriptType::Installer,
            "runner" => ScriptType::Runner,
            s => return Err(format!("unrecognized script type: {s}")),
        };
        Ok(res)
    }
}

/// Everything the jinja2 templates interpolate.
///
/// String fields suffixed `_expr` are pre-rendered double-quoted shell
/// expressions (placeholders already translated to shell variables, the rest
/// escaped); they are inserted into the template raw. Every other
/// spec-derived field goes through the `sh_quote` filter at the template
/// level.
#[derive(Debug, Clone, Serialize)]
struct ScriptContext {
    /// binstaller's own version, for the generated-by header
    bin_version: &'static str,
    /// install name
    name: String,
    /// owner/project
    repo: String,
    /// pinned tag, if the script is pinned
    pinned_tag_expr: Option<String>,
    /// escaped default version for the `${1:-...}` fallback
    default_version_expr: String,
    /// raw (pre-sanitized) bin dir expression, double-quoted
    bin_dir_expr: String,
    /// whether `${OS}` starts out titlecased
    os_titlecase: bool,
    /// whether the detector should prefer amd64 under Rosetta 2
    rosetta2: bool,
    /// leading path components stripped during extraction
    strip_components: u32,
    /// allow-list of platforms; empty accepts anything the detector names
    supported_platforms: Vec<PlatformContext>,
    /// the spec's rules, pre-rendered for the shell rule chain
    rules: Vec<RuleContext>,
    /// default filename template as a shell expression
    default_template_expr: String,
    /// default `${EXT}` value
    default_ext: String,
    /// binary lists; index 0 is the default, the rest come from rules
    bin_sets: Vec<Vec<BinaryContext>>,
    /// checksum algorithm key (sha256/sha512/sha1/md5)
    algorithm: String,
    /// embedded checksum lines, `<version>:<filename> <hash>` each
    checksum_blob: String,
    /// checksum file URL template as a shell expression, if configured
    checksum_url_expr: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct PlatformContext {
    os: String,
    arch: String,
}

#[derive(Debug, Clone, Serialize)]
struct RuleContext {
    /// 1-based position, doubling as the TPL_ID selector value
    index: usize,
    /// the full `when` conjunction as a shell condition
    condition: String,
    os: Option<String>,
    arch: Option<String>,
    ext: Option<String>,
    template_expr: Option<String>,
    /// index into `bin_sets` when this rule overrides the binary list
    bin_set: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
struct BinaryContext {
    name_expr: String,
    path_expr: String,
}

/// Escape text for a double-quoted shell context.
///
/// Everything the shell treats specially between double quotes is neutered,
/// including `$`, so no expansion can happen that we didn't put there.
fn dquote_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Escape text for a double-quoted shell context, leaving `$` alone.
///
/// Only used for `default_bin_dir`, whose `${...}` references are
/// deliberately re-evaluated at script runtime (the validator has already
/// rejected command substitution in it).
fn dquote_escape_keep_dollar(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '"' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Translate a filename template into a double-quoted shell expression whose
/// placeholders reference the script's runtime variables.
fn template_to_shell_expr(template: &str, allow_asset_filename: bool) -> BinstallResult<String> {
    let mut out = String::from("\"");
    for token in tokenize_template(template)? {
        match token {
            TemplateToken::Literal(text) => out.push_str(&dquote_escape(&text)),
            TemplateToken::Placeholder(placeholder) => {
                if placeholder == Placeholder::AssetFilename && !allow_asset_filename {
                    return Err(BinstallError::UnknownPlaceholder {
                        template: template.to_owned(),
                        placeholder: placeholder.shell_var().to_owned(),
                    });
                }
                out.push_str("${");
                out.push_str(placeholder.shell_var());
                out.push('}');
            }
        }
    }
    out.push('"');
    Ok(out)
}

impl ScriptContext {
    fn build(spec: &InstallSpec, target_version: Option<&str>) -> BinstallResult<Self> {
        let name = spec.name.clone().ok_or(BinstallError::MissingField {
            field: "name".to_owned(),
        })?;
        let repo = spec.repo.clone().ok_or(BinstallError::MissingField {
            field: "repo".to_owned(),
        })?;
        let asset = spec.asset.as_ref().ok_or(BinstallError::MissingField {
            field: "asset".to_owned(),
        })?;
        let template = asset.template.as_ref().ok_or(BinstallError::MissingField {
            field: "asset.template".to_owned(),
        })?;

        let pinned_tag_expr = match target_version {
            Some(tag) => {
                check_shell_safe("target_version", tag)?;
                Some(dquote_escape(tag))
            }
            None => None,
        };
        let default_version = spec.default_version.as_deref().unwrap_or("latest");
        let default_version_expr = dquote_escape(default_version);
        let bin_dir = spec.default_bin_dir.as_deref().unwrap_or_default();
        let bin_dir_expr = format!("\"{}\"", dquote_escape_keep_dollar(bin_dir));

        let os_titlecase = asset
            .naming_convention
            .as_ref()
            .and_then(|convention| convention.os)
            == Some(CaseConvention::Titlecase);
        let rosetta2 = asset
            .arch_emulation
            .as_ref()
            .and_then(|emulation| emulation.rosetta2)
            .unwrap_or(false);

        let supported_platforms = spec
            .supported_platforms()
            .iter()
            .enumerate()
            .map(|(i, pair)| {
                let os = pair.os.clone().ok_or(BinstallError::MissingField {
                    field: format!("supported_platforms[{i}].os"),
                })?;
                let arch = pair.arch.clone().ok_or(BinstallError::MissingField {
                    field: format!("supported_platforms[{i}].arch"),
                })?;
                Ok(PlatformContext {
                    os: os.to_lowercase(),
                    arch: arch.to_lowercase(),
                })
            })
            .collect::<BinstallResult<Vec<_>>>()?;

        // binaries are synthesized by normalize, so this is always non-empty
        let default_binaries = asset.binaries.as_deref().unwrap_or(&[]);
        let mut bin_sets = vec![Self::binary_set(&name, default_binaries)?];

        let mut rules = Vec::new();
        for (i, rule) in asset.rules.as_deref().unwrap_or(&[]).iter().enumerate() {
            let condition = match &rule.when {
                Some(when) => {
                    let mut tests = Vec::new();
                    if let Some(os) = &when.os {
                        tests.push(format!(
                            "[ \"$OS_MATCH\" = {} ]",
                            sh_quote(os.to_lowercase())
                        ));
                    }
                    if let Some(arch) = &when.arch {
                        tests.push(format!(
                            "[ \"$ARCH_MATCH\" = {} ]",
                            sh_quote(arch.to_lowercase())
                        ));
                    }
                    if tests.is_empty() {
                        "true".to_owned()
                    } else {
                        tests.join(" && ")
                    }
                }
                None => "true".to_owned(),
            };
            let template_expr = match &rule.template {
                Some(template) => Some(template_to_shell_expr(template, false)?),
                None => None,
            };
            let bin_set = match rule.binaries.as_deref() {
                Some(binaries) if !binaries.is_empty() => {
                    bin_sets.push(Self::binary_set(&name, binaries)?);
                    Some(bin_sets.len() - 1)
                }
                _ => None,
            };
            rules.push(RuleContext {
                index: i + 1,
                condition,
                os: rule.os.clone(),
                arch: rule.arch.clone(),
                ext: rule.ext.clone(),
                template_expr,
                bin_set,
            });
        }

        let (algorithm, checksum_url_expr) = match &spec.checksums {
            Some(checksums) => {
                let url_expr = match checksums.template.as_deref() {
                    Some(template) if !template.is_empty() => {
                        Some(template_to_shell_expr(template, false)?)
                    }
                    _ => None,
                };
                (checksums.algorithm(), url_expr)
            }
            None => (ChecksumAlgorithm::Sha256, None),
        };

        let checksum_blob = Self::checksum_blob(spec, target_version)?;

        Ok(ScriptContext {
            bin_version: env!("CARGO_PKG_VERSION"),
            name,
            repo,
            pinned_tag_expr,
            default_version_expr,
            bin_dir_expr,
            os_titlecase,
            rosetta2,
            strip_components: spec.strip_components(),
            supported_platforms,
            rules,
            default_template_expr: template_to_shell_expr(template, false)?,
            default_ext: asset.default_extension.clone().unwrap_or_default(),
            bin_sets,
            algorithm: algorithm.as_str().to_owned(),
            checksum_blob,
            checksum_url_expr,
        })
    }

    fn binary_set(
        name: &str,
        binaries: &[binstaller_schema::BinaryConfig],
    ) -> BinstallResult<Vec<BinaryContext>> {
        binaries
            .iter()
            .map(|binary| {
                let bin_name = binary.name.as_deref().unwrap_or(name);
                let bin_path = binary.path.as_deref().unwrap_or(bin_name);
                Ok(BinaryContext {
                    name_expr: template_to_shell_expr(bin_name, true)?,
                    path_expr: template_to_shell_expr(bin_path, true)?,
                })
            })
            .collect()
    }

    /// Serialize embedded checksums into the line-oriented lookup blob.
    ///
    /// Lines are `<version-without-v>:<filename> <hash>`. With a target
    /// version only that version's entries are kept (trying both key forms);
    /// without one, everything is. Versions and filenames are emitted in
    /// sorted order so identical specs produce identical scripts.
    fn checksum_blob(spec: &InstallSpec, target_version: Option<&str>) -> BinstallResult<String> {
        let Some(map) = spec
            .checksums
            .as_ref()
            .and_then(|checksums| checksums.embedded_checksums.as_ref())
        else {
            return Ok(String::new());
        };

        let selected: Vec<(&String, &Vec<EmbeddedChecksum>)> = match target_version {
            Some(tag) => {
                let bare = tag.strip_prefix('v').unwrap_or(tag);
                let prefixed = format!("v{bare}");
                [tag, bare, prefixed.as_str()]
                    .iter()
                    .find_map(|key| map.get_key_value(*key))
                    .into_iter()
                    .collect()
            }
            None => map.iter().collect(),
        };

        let mut lines = Vec::new();
        for (key, entries) in selected {
            let version = key.strip_prefix('v').unwrap_or(key);
            let mut entries: Vec<&EmbeddedChecksum> = entries.iter().collect();
            entries.sort_by(|a, b| a.filename.cmp(&b.filename));
            for (i, entry) in entries.iter().enumerate() {
                let field = format!("checksums.embedded_checksums[{key}][{i}]");
                let filename =
                    entry
                        .filename
                        .as_deref()
                        .ok_or_else(|| BinstallError::MissingField {
                            field: format!("{field}.filename"),
                        })?;
                let hash = entry
                    .hash
                    .as_deref()
                    .ok_or_else(|| BinstallError::MissingField {
                        field: format!("{field}.hash"),
                    })?;
                check_shell_safe(&format!("{field}.filename"), filename)?;
                if hash.is_empty() || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
                    return Err(BinstallError::InvalidHash {
                        filename: filename.to_owned(),
                        hash: hash.to_owned(),
                    });
                }
                lines.push(format!("{version}:{filename} {}", hash.to_lowercase()));
            }
        }
        Ok(lines.join("\n"))
    }
}

/// Deterministically serialize a spec into a POSIX shell script.
///
/// With `target_version` the script is pinned: it never consults GitHub for
/// the latest tag, refuses other tags, and carries only that version's
/// embedded checksums. The input spec is not mutated; it is normalized and
/// validated on a copy.
pub fn generate_script(
    spec: &InstallSpec,
    target_version: Option<&str>,
    script_type: ScriptType,
) -> BinstallResult<String> {
    let mut spec = spec.clone();
    spec.normalize();
    validate_spec(&spec)?;

    let context = ScriptContext::build(&spec, target_version)?;
    let templates = Templates::new()?;
    let key = match script_type {
        ScriptType::Installer => TEMPLATE_INSTALL_SH,
        ScriptType::Runner => TEMPLATE_RUN_SH,
    };
    templates.render_file_to_clean_string(key, &context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_exprs_translate_placeholders() {
        let expr = template_to_shell_expr("${NAME}_${OS}_${ARCH}${EXT}", false).unwrap();
        assert_eq!(expr, "\"${NAME}_${OS}_${ARCH}${EXT}\"");
    }

    #[test]
    fn template_exprs_escape_stray_dollars() {
        let expr = template_to_shell_expr("a$b\"c", false).unwrap();
        assert_eq!(expr, "\"a\\$b\\\"c\"");
    }

    #[test]
    fn asset_filename_only_in_binary_paths() {
        template_to_shell_expr("${ASSET_FILENAME}", true).unwrap();
        template_to_shell_expr("${ASSET_FILENAME}", false).unwrap_err();
    }

    #[test]
    fn bin_dir_keeps_variable_references() {
        assert_eq!(
            dquote_escape_keep_dollar("${BINSTALLER_BIN:-${HOME}/.local/bin}"),
            "${BINSTALLER_BIN:-${HOME}/.local/bin}"
        );
        assert_eq!(dquote_escape_keep_dollar("a\"b"), "a\\\"b");
    }
}
