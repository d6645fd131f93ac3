//! Asset filename resolution.
//!
//! Maps `(spec, version, os, arch)` to the release asset filename by
//! interpolating the spec's template after applying its override rules in
//! order. The generated scripts replay exactly this algorithm in shell, so
//! any change here has to be mirrored in the templates.

use std::collections::BTreeSet;

use binstaller_schema::{AssetRule, BinaryConfig, CaseConvention, InstallSpec, KNOWN_ARCH, KNOWN_OS};
use itertools::Itertools;

use crate::errors::{BinstallError, BinstallResult};

/// A `${...}` placeholder recognized in asset templates and binary paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// The install name
    Name,
    /// The version with a leading `v` stripped
    Version,
    /// The raw release tag
    Tag,
    /// The (possibly rule-overridden) OS key
    Os,
    /// The (possibly rule-overridden) ARCH key
    Arch,
    /// The (possibly rule-overridden) extension
    Ext,
    /// The resolved asset filename (binary paths only)
    AssetFilename,
}

impl Placeholder {
    fn from_name(name: &str) -> Option<Self> {
        let placeholder = match name {
            "NAME" => Placeholder::Name,
            "VERSION" => Placeholder::Version,
            "TAG" => Placeholder::Tag,
            "OS" => Placeholder::Os,
            "ARCH" => Placeholder::Arch,
            "EXT" => Placeholder::Ext,
            "ASSET_FILENAME" => Placeholder::AssetFilename,
            _ => return None,
        };
        Some(placeholder)
    }

    /// The shell variable the generated script keeps this value in
    pub fn shell_var(&self) -> &'static str {
        match self {
            Placeholder::Name => "NAME",
            Placeholder::Version => "VERSION",
            Placeholder::Tag => "TAG",
            Placeholder::Os => "OS",
            Placeholder::Arch => "ARCH",
            Placeholder::Ext => "EXT",
            Placeholder::AssetFilename => "ASSET_FILENAME",
        }
    }
}

/// One parsed piece of a filename template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateToken {
    /// Literal text, emitted as-is
    Literal(String),
    /// A `${...}` substitution
    Placeholder(Placeholder),
}

/// Parse a filename template into literal and placeholder tokens.
///
/// `${...}` sequences must name a known placeholder; anything else is a
/// configuration error. A `$` that doesn't open a `${...}` sequence (or an
/// unclosed one) is plain text.
pub fn tokenize_template(template: &str) -> BinstallResult<Vec<TemplateToken>> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let (before, after) = rest.split_at(start);
        literal.push_str(before);
        match after[2..].find('}') {
            Some(end) => {
                let name = &after[2..2 + end];
                let Some(placeholder) = Placeholder::from_name(name) else {
                    return Err(BinstallError::UnknownPlaceholder {
                        template: template.to_owned(),
                        placeholder: name.to_owned(),
                    });
                };
                if !literal.is_empty() {
                    tokens.push(TemplateToken::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(TemplateToken::Placeholder(placeholder));
                rest = &after[2 + end + 1..];
            }
            None => {
                // unclosed ${ is plain text
                literal.push_str(after);
                rest = "";
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        tokens.push(TemplateToken::Literal(literal));
    }
    Ok(tokens)
}

/// The values substituted for placeholders during resolution
#[derive(Debug, Clone, Default)]
pub struct TemplateVars<'a> {
    /// `${NAME}`
    pub name: &'a str,
    /// `${VERSION}` (leading `v` already stripped)
    pub version: &'a str,
    /// `${TAG}`
    pub tag: &'a str,
    /// `${OS}`
    pub os: &'a str,
    /// `${ARCH}`
    pub arch: &'a str,
    /// `${EXT}`
    pub ext: &'a str,
    /// `${ASSET_FILENAME}`; None where the placeholder isn't meaningful
    pub asset_filename: Option<&'a str>,
}

impl TemplateVars<'_> {
    fn lookup(&self, placeholder: Placeholder) -> Option<&str> {
        match placeholder {
            Placeholder::Name => Some(self.name),
            Placeholder::Version => Some(self.version),
            Placeholder::Tag => Some(self.tag),
            Placeholder::Os => Some(self.os),
            Placeholder::Arch => Some(self.arch),
            Placeholder::Ext => Some(self.ext),
            Placeholder::AssetFilename => self.asset_filename,
        }
    }
}

/// Interpolate a template against concrete values
pub fn interpolate(template: &str, vars: &TemplateVars<'_>) -> BinstallResult<String> {
    let tokens = tokenize_template(template)?;
    let mut out = String::new();
    for token in &tokens {
        match token {
            TemplateToken::Literal(text) => out.push_str(text),
            TemplateToken::Placeholder(placeholder) => {
                let Some(value) = vars.lookup(*placeholder) else {
                    return Err(BinstallError::UnknownPlaceholder {
                        template: template.to_owned(),
                        placeholder: placeholder.shell_var().to_owned(),
                    });
                };
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

/// A binary with its name and in-archive path fully interpolated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinary {
    /// Name to install as
    pub name: String,
    /// Path inside the extracted asset (or the asset itself for raw binaries)
    pub path: String,
}

/// The outcome of resolving a platform against a spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// The release asset filename
    pub filename: String,
    /// The binaries to install out of it
    pub binaries: Vec<ResolvedBinary>,
    /// The `${OS}` value after casing and rules
    pub os: String,
    /// The `${ARCH}` value after rules
    pub arch: String,
    /// The `${EXT}` value after rules
    pub ext: String,
}

fn rule_matches(rule: &AssetRule, os_match: &str, arch_match: &str) -> bool {
    let Some(when) = &rule.when else {
        return true;
    };
    if let Some(os) = &when.os {
        if os.to_lowercase() != os_match {
            return false;
        }
    }
    if let Some(arch) = &when.arch {
        if arch.to_lowercase() != arch_match {
            return false;
        }
    }
    true
}

fn title_case(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Strip one leading `v` from a tag, yielding the `${VERSION}` value
pub fn version_of_tag(tag: &str) -> &str {
    tag.strip_prefix('v').unwrap_or(tag)
}

/// Resolve the asset filename and binary list for one platform.
///
/// Rules are cumulative: each matching rule sees the values written by the
/// rules before it, but `when` conditions always test the *originally*
/// detected os/arch. The binary list comes from the first matching rule that
/// provides a non-empty one.
pub fn resolve_asset(
    spec: &InstallSpec,
    version: &str,
    os: &str,
    arch: &str,
) -> BinstallResult<ResolvedAsset> {
    let asset = spec.asset.as_ref().ok_or(BinstallError::MissingField {
        field: "asset".to_owned(),
    })?;
    let template = asset.template.as_ref().ok_or(BinstallError::MissingField {
        field: "asset.template".to_owned(),
    })?;
    let name = spec.name.as_deref().unwrap_or_default();

    let os_match = os.to_lowercase();
    let arch_match = arch.to_lowercase();

    let titlecase_os = asset
        .naming_convention
        .as_ref()
        .and_then(|convention| convention.os)
        == Some(CaseConvention::Titlecase);
    let mut os_out = if titlecase_os {
        title_case(&os_match)
    } else {
        os_match.clone()
    };
    let mut arch_out = arch_match.clone();
    let mut ext = asset.default_extension.clone().unwrap_or_default();
    let mut template = template.clone();
    let mut rule_binaries: Option<&[BinaryConfig]> = None;

    for rule in asset.rules.as_deref().unwrap_or(&[]) {
        if !rule_matches(rule, &os_match, &arch_match) {
            continue;
        }
        if let Some(os) = &rule.os {
            os_out = os.clone();
        }
        if let Some(arch) = &rule.arch {
            arch_out = arch.clone();
        }
        if let Some(rule_ext) = &rule.ext {
            ext = rule_ext.clone();
        }
        if let Some(rule_template) = &rule.template {
            template = rule_template.clone();
        }
        if rule_binaries.is_none() {
            if let Some(binaries) = &rule.binaries {
                if !binaries.is_empty() {
                    rule_binaries = Some(binaries);
                }
            }
        }
    }

    let vars = TemplateVars {
        name,
        version: version_of_tag(version),
        tag: version,
        os: &os_out,
        arch: &arch_out,
        ext: &ext,
        asset_filename: None,
    };
    let filename = interpolate(&template, &vars)?;
    if filename.is_empty() {
        return Err(BinstallError::EmptyFilename {
            os: os_match,
            arch: arch_match,
        });
    }

    let configured = rule_binaries
        .or(asset.binaries.as_deref())
        .unwrap_or(&[]);
    let binary_vars = TemplateVars {
        asset_filename: Some(&filename),
        ..vars
    };
    let mut binaries = Vec::new();
    for binary in configured {
        let bin_name = binary.name.as_deref().unwrap_or(name);
        let bin_path = binary.path.as_deref().unwrap_or(bin_name);
        binaries.push(ResolvedBinary {
            name: interpolate(bin_name, &binary_vars)?,
            path: interpolate(bin_path, &binary_vars)?,
        });
    }

    Ok(ResolvedAsset {
        filename,
        binaries,
        os: os_out,
        arch: arch_out,
        ext,
    })
}

/// The platforms a spec resolves filenames for: its `supported_platforms`
/// when present, else the full cross-product of known os/arch keys
pub fn platforms_of(spec: &InstallSpec) -> BinstallResult<Vec<(String, String)>> {
    let supported = spec.supported_platforms();
    if supported.is_empty() {
        return Ok(KNOWN_OS
            .iter()
            .cartesian_product(KNOWN_ARCH.iter())
            .map(|(os, arch)| ((*os).to_owned(), (*arch).to_owned()))
            .collect());
    }
    supported
        .iter()
        .enumerate()
        .map(|(i, pair)| {
            let os = pair.os.clone().ok_or(BinstallError::MissingField {
                field: format!("supported_platforms[{i}].os"),
            })?;
            let arch = pair.arch.clone().ok_or(BinstallError::MissingField {
                field: format!("supported_platforms[{i}].arch"),
            })?;
            Ok((os, arch))
        })
        .collect()
}

/// Every distinct asset filename a spec can resolve to for a version,
/// sorted for deterministic downstream iteration
pub fn possible_filenames(spec: &InstallSpec, version: &str) -> BinstallResult<Vec<String>> {
    let mut filenames = BTreeSet::new();
    for (os, arch) in platforms_of(spec)? {
        let resolved = resolve_asset(spec, version, &os, &arch)?;
        filenames.insert(resolved.filename);
    }
    Ok(filenames.into_iter().collect())
}
