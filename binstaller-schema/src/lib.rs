#![deny(missing_docs)]

//! # binstaller-schema
//!
//! This crate exists to serialize and deserialize the binstaller install spec
//! (`.config/binstaller.yml` or `.json`). Ideally it should be reasonably
//! forward and backward compatible with different versions of this format,
//! which is why every scalar is optional: emission logic must branch on
//! presence, never on the truthiness of a defaulted value.
//!
//! The root type of the schema is [`InstallSpec`][].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The schema version this crate reads and writes
pub const SCHEMA_V1: &str = "v1";

/// Bin dir used when the spec doesn't provide one.
///
/// `BINSTALLER_BIN` is left as a runtime shell reference on purpose: the
/// generated script re-evaluates it on the end user's machine.
pub const DEFAULT_BIN_DIR: &str = "${BINSTALLER_BIN:-${HOME}/.local/bin}";

/// Version used when the spec doesn't provide one
pub const DEFAULT_VERSION: &str = "latest";

/// Placeholder for the install name in templates
pub const PLACEHOLDER_NAME: &str = "${NAME}";
/// Placeholder for the raw downloaded asset filename in binary paths
pub const PLACEHOLDER_ASSET_FILENAME: &str = "${ASSET_FILENAME}";

macro_rules! define_platform_keys {
    ($($(#[$meta:meta])* const $name:ident = $key:expr;)*) => {
        $(
            $(#[$meta])*
            pub const $name: &str = $key;
        )*
    };
}

define_platform_keys!(
    /// Linux (any libc)
    const OS_LINUX = "linux";
    /// macOS
    const OS_DARWIN = "darwin";
    /// Windows (msys/mingw/cygwin uname spellings all normalize to this)
    const OS_WINDOWS = "windows";
    /// FreeBSD
    const OS_FREEBSD = "freebsd";
    /// NetBSD
    const OS_NETBSD = "netbsd";
    /// OpenBSD
    const OS_OPENBSD = "openbsd";
    /// DragonFly BSD
    const OS_DRAGONFLY = "dragonfly";
    /// Solaris and descendants (`uname -s` says SunOS)
    const OS_SOLARIS = "solaris";
    /// Android
    const OS_ANDROID = "android";
);

/// Every OS key the runtime platform detector can produce
pub const KNOWN_OS: &[&str] = &[
    OS_LINUX,
    OS_DARWIN,
    OS_WINDOWS,
    OS_FREEBSD,
    OS_NETBSD,
    OS_OPENBSD,
    OS_DRAGONFLY,
    OS_SOLARIS,
    OS_ANDROID,
];

define_platform_keys!(
    /// 64-bit x86 (x86_64 in uname terms)
    const ARCH_AMD64 = "amd64";
    /// 64-bit ARM (aarch64 in uname terms)
    const ARCH_ARM64 = "arm64";
    /// 32-bit x86 (i386/i686 in uname terms)
    const ARCH_386 = "386";
    /// ARMv5 softfloat
    const ARCH_ARMV5 = "armv5";
    /// ARMv6
    const ARCH_ARMV6 = "armv6";
    /// ARMv7
    const ARCH_ARMV7 = "armv7";
    /// 64-bit PowerPC, big-endian
    const ARCH_PPC64 = "ppc64";
    /// 64-bit PowerPC, little-endian
    const ARCH_PPC64LE = "ppc64le";
    /// IBM S/390x
    const ARCH_S390X = "s390x";
    /// 64-bit RISC-V
    const ARCH_RISCV64 = "riscv64";
    /// 32-bit MIPS, big-endian
    const ARCH_MIPS = "mips";
    /// 32-bit MIPS, little-endian
    const ARCH_MIPSLE = "mipsle";
    /// 64-bit MIPS, big-endian
    const ARCH_MIPS64 = "mips64";
    /// 64-bit MIPS, little-endian
    const ARCH_MIPS64LE = "mips64le";
    /// 64-bit LoongArch
    const ARCH_LOONG64 = "loong64";
);

/// Every ARCH key the runtime platform detector can produce
pub const KNOWN_ARCH: &[&str] = &[
    ARCH_AMD64,
    ARCH_ARM64,
    ARCH_386,
    ARCH_ARMV5,
    ARCH_ARMV6,
    ARCH_ARMV7,
    ARCH_PPC64,
    ARCH_PPC64LE,
    ARCH_S390X,
    ARCH_RISCV64,
    ARCH_MIPS,
    ARCH_MIPSLE,
    ARCH_MIPS64,
    ARCH_MIPS64LE,
    ARCH_LOONG64,
];

/// The root of an install spec: everything binstaller needs to know to turn
/// "a GitHub repo with release assets" into an installer script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InstallSpec {
    /// Version of this schema (currently always `v1`)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Name the binary is installed under; defaults to the trailing segment of `repo`
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// GitHub repository as `owner/project`
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Version installed when the end user doesn't pass a tag (defaults to `latest`)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_version: Option<String>,
    /// Directory the installer script installs into.
    ///
    /// May contain `${...}` shell variable references (they are re-evaluated
    /// at script runtime), but never command substitution.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_bin_dir: Option<String>,
    /// How release asset filenames are constructed
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetConfig>,
    /// How downloaded assets are integrity-checked
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksums: Option<ChecksumConfig>,
    /// How archives are unpacked
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unpack: Option<UnpackConfig>,
    /// The (os, arch) pairs release assets exist for.
    ///
    /// When empty or absent the generated script accepts any platform the
    /// detector can name.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_platforms: Option<Vec<PlatformPair>>,
}

/// How to build the asset filename for a platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AssetConfig {
    /// Filename template; may contain `${NAME}` `${VERSION}` `${TAG}` `${OS}`
    /// `${ARCH}` `${EXT}`
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Extension substituted for `${EXT}` when no rule overrides it
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_extension: Option<String>,
    /// Casing applied to `${OS}`/`${ARCH}` before rules run
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub naming_convention: Option<NamingConvention>,
    /// Architecture-emulation quirks of the runtime platform detector
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch_emulation: Option<ArchEmulation>,
    /// The binaries inside the asset; defaulted by [`InstallSpec::normalize`][]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binaries: Option<Vec<BinaryConfig>>,
    /// Ordered, cumulative per-platform overrides
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<AssetRule>>,
}

/// Casing convention for `${OS}`/`${ARCH}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NamingConvention {
    /// Casing for `${OS}` (defaults to lowercase)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<CaseConvention>,
    /// Casing for `${ARCH}` (only lowercase is defined)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<CaseConvention>,
}

/// A casing applied to a detected platform key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CaseConvention {
    /// `linux`, `amd64`
    #[default]
    Lowercase,
    /// `Linux` (first character uppercased)
    Titlecase,
}

impl std::fmt::Display for CaseConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = match self {
            CaseConvention::Lowercase => "lowercase",
            CaseConvention::Titlecase => "titlecase",
        };
        string.fmt(f)
    }
}

/// Architecture-emulation quirks applied by the runtime detector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArchEmulation {
    /// When true and the script runs on Apple Silicon with Rosetta 2
    /// available, the detector reports `amd64` instead of `arm64`.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rosetta2: Option<bool>,
}

/// One binary to install out of the downloaded asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BinaryConfig {
    /// Name to install the binary as
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Path of the binary inside the extracted asset; `${ASSET_FILENAME}`
    /// refers to the raw downloaded file for unarchived assets
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// A `(when -> overrides)` pair; rules apply in order and are cumulative
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AssetRule {
    /// Condition, matched against the *originally* detected platform
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<RuleCondition>,
    /// Replaces `${OS}` from here on
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// Replaces `${ARCH}` from here on
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Replaces `${EXT}` from here on
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    /// Replaces the filename template from here on
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Replaces the binary list (first matching rule with a non-empty list wins)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binaries: Option<Vec<BinaryConfig>>,
}

/// Condition of an [`AssetRule`][]; a conjunction of the provided keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuleCondition {
    /// Matches when the detected OS equals this (case-insensitive)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// Matches when the detected ARCH equals this (case-insensitive)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

/// How asset integrity is verified
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChecksumConfig {
    /// Hash algorithm (defaults to sha256)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<ChecksumAlgorithm>,
    /// Filename template of a checksum file published alongside the assets;
    /// empty means there is no downloadable checksum file
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Per-version hashes baked into the spec (and thus into emitted scripts).
    ///
    /// Keys are release versions and may or may not carry a leading `v`;
    /// lookup tries both forms and writers must not rewrite user-provided keys.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_checksums: Option<crate::SortedMap<String, Vec<EmbeddedChecksum>>>,
}

/// A single `(filename, hash)` entry of an embedded checksum list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EmbeddedChecksum {
    /// Asset filename the hash belongs to
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Hex-encoded hash
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// The checksum algorithms binstaller can embed and the generated scripts can
/// recompute with stock unix tooling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// sha256sum (the default)
    #[default]
    Sha256,
    /// sha512sum
    Sha512,
    /// sha1sum
    Sha1,
    /// md5sum
    Md5,
}

impl ChecksumAlgorithm {
    /// The canonical lowercase name, as it appears in spec files
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Md5 => "md5",
        }
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

impl std::str::FromStr for ChecksumAlgorithm {
    type Err = String;
    fn from_str(val: &str) -> Result<Self, Self::Err> {
        let res = match val {
            "sha256" => ChecksumAlgorithm::Sha256,
            "sha512" => ChecksumAlgorithm::Sha512,
            "sha1" => ChecksumAlgorithm::Sha1,
            "md5" => ChecksumAlgorithm::Md5,
            s => return Err(format!("unrecognized checksum algorithm: {s}")),
        };
        Ok(res)
    }
}

/// How archives are unpacked before installing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UnpackConfig {
    /// Number of leading path components stripped from every archive entry
    /// (entries with fewer components are skipped)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strip_components: Option<u32>,
}

/// An (os, arch) pair a release publishes assets for
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct PlatformPair {
    /// OS key (see [`KNOWN_OS`][])
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// ARCH key (see [`KNOWN_ARCH`][])
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

/// A map whose keys serialize in sorted order, so repeated spec writes are
/// byte-identical
pub type SortedMap<K, V> = std::collections::BTreeMap<K, V>;

impl InstallSpec {
    /// Fill in every defaultable field (idempotent; never fails).
    ///
    /// After this returns, `schema`, `default_version`, `default_bin_dir`,
    /// `naming_convention.os`/`.arch` and `asset.binaries` (when `asset` is
    /// present) are all non-empty.
    pub fn normalize(&mut self) {
        if self.schema.is_none() {
            self.schema = Some(SCHEMA_V1.to_owned());
        }
        if self.name.is_none() {
            if let Some(repo) = &self.repo {
                if let Some((_, project)) = repo.rsplit_once('/') {
                    if !project.is_empty() {
                        self.name = Some(project.to_owned());
                    }
                }
            }
        }
        if self.default_version.is_none() {
            self.default_version = Some(DEFAULT_VERSION.to_owned());
        }
        if self.default_bin_dir.is_none() {
            self.default_bin_dir = Some(DEFAULT_BIN_DIR.to_owned());
        }
        if let Some(asset) = &mut self.asset {
            let convention = asset.naming_convention.get_or_insert_with(Default::default);
            if convention.os.is_none() {
                convention.os = Some(CaseConvention::Lowercase);
            }
            if convention.arch.is_none() {
                convention.arch = Some(CaseConvention::Lowercase);
            }
            let needs_binaries = asset
                .binaries
                .as_ref()
                .map(|bins| bins.is_empty())
                .unwrap_or(true);
            if needs_binaries {
                let path = if asset.default_extension.is_some() {
                    PLACEHOLDER_NAME
                } else {
                    PLACEHOLDER_ASSET_FILENAME
                };
                asset.binaries = Some(vec![BinaryConfig {
                    name: Some(PLACEHOLDER_NAME.to_owned()),
                    path: Some(path.to_owned()),
                }]);
            }
        }
        if let Some(checksums) = &mut self.checksums {
            if checksums.algorithm.is_none() {
                checksums.algorithm = Some(ChecksumAlgorithm::Sha256);
            }
        }
    }

    /// The effective strip-components count (defaults to 0)
    pub fn strip_components(&self) -> u32 {
        self.unpack
            .as_ref()
            .and_then(|unpack| unpack.strip_components)
            .unwrap_or(0)
    }

    /// The supported platform list, with absent and empty treated the same
    pub fn supported_platforms(&self) -> &[PlatformPair] {
        self.supported_platforms.as_deref().unwrap_or(&[])
    }

    /// Get the JSON Schema for an InstallSpec
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(InstallSpec)
    }
}

impl ChecksumConfig {
    /// The effective algorithm (defaults to sha256)
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm.unwrap_or_default()
    }

    /// Look up embedded checksums for a version, trying the key both with and
    /// without a leading `v`
    pub fn embedded_for_version(&self, version: &str) -> Option<&[EmbeddedChecksum]> {
        let map = self.embedded_checksums.as_ref()?;
        let bare = version.strip_prefix('v').unwrap_or(version);
        map.get(version)
            .or_else(|| map.get(bare))
            .or_else(|| map.get(&format!("v{bare}")))
            .map(|entries| entries.as_slice())
    }
}


/// Regenerates `binstaller-json-schema.json` (the artifact editor tooling
/// points at) and pins the parts of the schema the config format promises:
/// the full type vocabulary, the spelling of the enum keys, and that every
/// root scalar stays optional so old configs keep deserializing.
#[test]
fn emit() {
    let schema = InstallSpec::json_schema();
    let json = serde_json::to_value(&schema).unwrap();

    let definitions = json["definitions"].as_object().unwrap();
    for name in [
        "AssetConfig",
        "AssetRule",
        "RuleCondition",
        "NamingConvention",
        "CaseConvention",
        "ArchEmulation",
        "BinaryConfig",
        "ChecksumConfig",
        "ChecksumAlgorithm",
        "EmbeddedChecksum",
        "UnpackConfig",
        "PlatformPair",
    ] {
        assert!(definitions.contains_key(name), "schema lost `{name}`");
    }

    // enum keys must serialize exactly as spec files spell them
    assert_eq!(
        json["definitions"]["ChecksumAlgorithm"]["enum"],
        serde_json::json!(["sha256", "sha512", "sha1", "md5"])
    );
    assert_eq!(
        json["definitions"]["CaseConvention"]["enum"],
        serde_json::json!(["lowercase", "titlecase"])
    );

    // no required fields at the root: readers branch on presence
    assert!(json["required"].is_null());
    let properties = json["properties"].as_object().unwrap();
    for field in [
        "schema",
        "name",
        "repo",
        "default_version",
        "default_bin_dir",
        "asset",
        "checksums",
        "unpack",
        "supported_platforms",
    ] {
        assert!(properties.contains_key(field), "root lost `{field}`");
    }

    let out = std::path::PathBuf::from(std::env!("CARGO_MANIFEST_DIR"))
        .join("binstaller-json-schema.json");
    let mut pretty = serde_json::to_string_pretty(&schema).unwrap();
    pretty.push('\n');
    std::fs::write(out, pretty).unwrap();
}
