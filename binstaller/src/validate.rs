//! Shell-safety validation of install specs.
//!
//! Every string in a spec eventually lands inside a generated shell script,
//! so before emission we reject anything that could break out of quoting.
//! The checks run in a fixed order so the same bad value always yields the
//! same diagnosis.

use binstaller_schema::InstallSpec;

use crate::errors::{BinstallError, BinstallResult};

/// Dangerous substrings, checked in this order.
///
/// Multi-character tokens come before their single-character prefixes
/// (`>>` before `>`, `&&` before `&`) so the diagnosis names the construct
/// the author actually wrote.
const DANGEROUS_TOKENS: &[(&str, &str)] = &[
    ("$(", "contains command substitution"),
    ("`", "contains backtick"),
    (">>", "contains append redirection"),
    ("<<", "contains here-document"),
    ("||", "contains or-list"),
    ("&&", "contains and-list"),
    (";", "contains semicolon"),
    ("|", "contains pipe"),
    ("&", "contains ampersand"),
    (">", "contains output redirection"),
    ("<", "contains input redirection"),
    ("\n", "contains newline"),
    ("\r", "contains carriage return"),
];

/// Check a single spec-derived string for shell metacharacters.
///
/// `field` is the dotted path of the value in the spec, used verbatim in the
/// error. `${...}` variable references pass; command substitution never does.
pub fn check_shell_safe(field: &str, value: &str) -> BinstallResult<()> {
    for (token, reason) in DANGEROUS_TOKENS {
        if value.contains(token) {
            return Err(BinstallError::ShellUnsafe {
                field: field.to_owned(),
                reason: (*reason).to_owned(),
                value: value.to_owned(),
            });
        }
    }
    if let Some(ch) = value.chars().find(|ch| ch.is_control() && *ch != '\t') {
        return Err(BinstallError::ShellUnsafe {
            field: field.to_owned(),
            reason: format!("contains control character {ch:?}"),
            value: value.to_owned(),
        });
    }
    Ok(())
}

/// Validate every spec string that gets embedded into a generated script,
/// returning the first offense.
///
/// Run this after [`InstallSpec::normalize`][] and before emission; a failure
/// is fatal and no script may be produced from the spec.
pub fn validate_spec(spec: &InstallSpec) -> BinstallResult<()> {
    let check = |field: &str, value: &Option<String>| -> BinstallResult<()> {
        if let Some(value) = value {
            check_shell_safe(field, value)?;
        }
        Ok(())
    };

    check("name", &spec.name)?;
    check("repo", &spec.repo)?;
    check("default_version", &spec.default_version)?;
    // default_bin_dir intentionally goes through the same token list: `${...}`
    // variable references are permitted, command substitution is not.
    check("default_bin_dir", &spec.default_bin_dir)?;

    if let Some(asset) = &spec.asset {
        check("asset.default_extension", &asset.default_extension)?;
        check("asset.template", &asset.template)?;
        for (i, binary) in asset.binaries.as_deref().unwrap_or(&[]).iter().enumerate() {
            check(&format!("asset.binaries[{i}].name"), &binary.name)?;
            check(&format!("asset.binaries[{i}].path"), &binary.path)?;
        }
        for (i, rule) in asset.rules.as_deref().unwrap_or(&[]).iter().enumerate() {
            check(&format!("asset.rules[{i}].os"), &rule.os)?;
            check(&format!("asset.rules[{i}].arch"), &rule.arch)?;
            check(&format!("asset.rules[{i}].ext"), &rule.ext)?;
            check(&format!("asset.rules[{i}].template"), &rule.template)?;
            for (j, binary) in rule.binaries.as_deref().unwrap_or(&[]).iter().enumerate() {
                check(&format!("asset.rules[{i}].binaries[{j}].name"), &binary.name)?;
                check(&format!("asset.rules[{i}].binaries[{j}].path"), &binary.path)?;
            }
        }
    }

    if let Some(checksums) = &spec.checksums {
        check("checksums.template", &checksums.template)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use binstaller_schema::{AssetConfig, InstallSpec};

    fn spec_with_template(template: &str) -> InstallSpec {
        InstallSpec {
            name: Some("binst".to_owned()),
            repo: Some("binary-install/binstaller".to_owned()),
            asset: Some(AssetConfig {
                template: Some(template.to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn clean_spec_passes() {
        let spec = spec_with_template("${NAME}_${OS}_${ARCH}${EXT}");
        validate_spec(&spec).unwrap();
    }

    #[test]
    fn semicolon_is_diagnosed_as_semicolon() {
        let spec = spec_with_template("${NAME};rm -rf /");
        let err = validate_spec(&spec).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("asset.template"), "{msg}");
        assert!(msg.contains("semicolon"), "{msg}");
        assert!(msg.contains("${NAME};rm -rf /"), "{msg}");
    }

    #[test]
    fn command_substitution_wins_over_later_tokens() {
        // `$(` is checked before `;`, so a value containing both is
        // diagnosed as command substitution
        let err = check_shell_safe("name", "$(evil);").unwrap_err();
        assert!(err.to_string().contains("command substitution"));
    }

    #[test]
    fn backtick_rejected() {
        let err = check_shell_safe("name", "a`b`").unwrap_err();
        assert!(err.to_string().contains("backtick"));
    }

    #[test]
    fn double_tokens_reported_before_singles() {
        let err = check_shell_safe("name", "a>>b").unwrap_err();
        assert!(err.to_string().contains("append redirection"));
        let err = check_shell_safe("name", "a&&b").unwrap_err();
        assert!(err.to_string().contains("and-list"));
    }

    #[test]
    fn control_characters_rejected_except_tab() {
        check_shell_safe("name", "a\tb").unwrap();
        let err = check_shell_safe("name", "a\x07b").unwrap_err();
        assert!(err.to_string().contains("control character"));
    }

    #[test]
    fn bin_dir_permits_variable_references() {
        let mut spec = spec_with_template("${NAME}${EXT}");
        spec.default_bin_dir = Some("${BINSTALLER_BIN:-${HOME}/.local/bin}".to_owned());
        validate_spec(&spec).unwrap();

        spec.default_bin_dir = Some("$(whoami)/bin".to_owned());
        let err = validate_spec(&spec).unwrap_err();
        assert!(err.to_string().contains("default_bin_dir"));
        assert!(err.to_string().contains("command substitution"));
    }

    #[test]
    fn rule_fields_are_validated_with_paths() {
        let mut spec = spec_with_template("${NAME}${EXT}");
        spec.asset.as_mut().unwrap().rules = Some(vec![binstaller_schema::AssetRule {
            ext: Some(".zip|.tar".to_owned()),
            ..Default::default()
        }]);
        let err = validate_spec(&spec).unwrap_err();
        assert!(err.to_string().contains("asset.rules[0].ext"));
        assert!(err.to_string().contains("pipe"));
    }
}
