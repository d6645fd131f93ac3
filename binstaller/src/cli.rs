//! All the clap stuff for parsing/documenting the cli

use binstaller::ScriptType;
use camino::Utf8PathBuf;
use clap::{
    builder::{PossibleValuesParser, TypedValueParser},
    Args, Parser, Subcommand, ValueEnum,
};
use tracing::level_filters::LevelFilter;

#[derive(Parser, Clone, Debug)]
#[clap(version)]
#[clap(bin_name = "binstaller")]
/// Generate reproducible POSIX installer scripts for binaries published on
/// GitHub Releases.
///
/// See 'gen' and 'embed' for the two most important subcommands.
pub struct Cli {
    /// Subcommands
    #[clap(subcommand)]
    pub command: Commands,

    /// How verbose logging should be (log level)
    #[clap(long, short)]
    #[clap(default_value_t = LevelFilter::WARN)]
    #[clap(value_parser = PossibleValuesParser::new(["off", "error", "warn", "info", "debug", "trace"]).map(|s| s.parse::<LevelFilter>().expect("possible values are valid")))]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub verbose: LevelFilter,

    /// The format of the output
    #[clap(long, short, value_enum)]
    #[clap(default_value_t = OutputFormat::Human)]
    #[clap(help_heading = "GLOBAL OPTIONS", global = true)]
    pub output_format: OutputFormat,
}

/// Style of output we should produce
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// Machine-readable JSON output
    Json,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Generate an installer or runner script from a spec
    #[clap(disable_version_flag = true)]
    Gen(GenArgs),
    /// Embed a release's per-asset checksums into the spec
    ///
    /// The spec file is rewritten in place (atomically); the emitted
    /// scripts then verify downloads offline against the embedded hashes.
    #[clap(disable_version_flag = true)]
    Embed(EmbedArgs),
    /// Normalize and validate a spec, reporting the first problem
    #[clap(disable_version_flag = true)]
    Check(CheckArgs),
    /// Print the JSON schema for spec files
    #[clap(disable_version_flag = true)]
    Schema(SchemaArgs),
}

/// Arguments for `binstaller gen`
#[derive(Args, Clone, Debug)]
pub struct GenArgs {
    /// Path of the spec file
    #[clap(long, short, default_value = ".config/binstaller.yml")]
    pub config: Utf8PathBuf,

    /// Kind of script to generate
    #[clap(long = "type", value_enum, default_value_t = ScriptKind::Installer)]
    pub script_type: ScriptKind,

    /// Pin the script to one release tag.
    ///
    /// A pinned script never asks GitHub for the latest release, refuses
    /// other tags, and embeds only this version's checksums.
    #[clap(long)]
    pub target_version: Option<String>,

    /// Where to write the script (stdout when omitted)
    #[clap(long, short)]
    pub output: Option<Utf8PathBuf>,
}

/// The kind of script `gen` emits
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScriptKind {
    /// Download, verify and install into a bin dir
    Installer,
    /// Download into a temp dir, verify and exec with forwarded args
    Runner,
}

impl From<ScriptKind> for ScriptType {
    fn from(kind: ScriptKind) -> Self {
        match kind {
            ScriptKind::Installer => ScriptType::Installer,
            ScriptKind::Runner => ScriptType::Runner,
        }
    }
}

/// Arguments for `binstaller embed`
#[derive(Args, Clone, Debug)]
pub struct EmbedArgs {
    /// Path of the spec file
    #[clap(long, short, default_value = ".config/binstaller.yml")]
    pub config: Utf8PathBuf,

    /// Where the hashes come from
    #[clap(long, short, value_enum, default_value_t = EmbedModeKind::Download)]
    pub mode: EmbedModeKind,

    /// Release tag to embed checksums for
    #[clap(long, default_value = "latest")]
    pub version: String,

    /// Local checksum file (required with --mode checksum-file)
    #[clap(long)]
    pub file: Option<Utf8PathBuf>,
}

/// Hash source for `binstaller embed`
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EmbedModeKind {
    /// Download the checksum file the release publishes
    Download,
    /// Parse a checksum file on the local disk
    ChecksumFile,
    /// Download every asset and hash it locally
    Calculate,
}

/// Arguments for `binstaller check`
#[derive(Args, Clone, Debug)]
pub struct CheckArgs {
    /// Path of the spec file
    #[clap(long, short, default_value = ".config/binstaller.yml")]
    pub config: Utf8PathBuf,
}

/// Arguments for `binstaller schema`
#[derive(Args, Clone, Debug)]
pub struct SchemaArgs {}
