//! Errors!
//!
//! Every fallible operation in this crate funnels into [`BinstallError`][];
//! the CLI folds it into a miette::Report for printing.

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// An alias for the common Result type of this crate
pub type BinstallResult<T> = std::result::Result<T, BinstallError>;

/// Errors binstaller can have
#[derive(Debug, Error, Diagnostic)]
pub enum BinstallError {
    /// random i/o error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// random axoasset error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Asset(#[from] axoasset::AxoassetError),

    /// random http error
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// random zip error
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// random camino conversion error
    #[error(transparent)]
    FromPathBufError(#[from] camino::FromPathBufError),

    /// error serializing a spec back to yaml
    #[error(transparent)]
    YamlSer(#[from] serde_yml::Error),

    /// error serializing a spec back to json
    #[error(transparent)]
    JsonSer(#[from] serde_json::Error),

    /// A problem with a jinja template, which is always a binstaller bug
    #[error("Failed to render script template")]
    #[diagnostic(help(
        "this is a bug in binstaller, let us know and we'll fix it: https://github.com/binary-install/binstaller/issues/new"
    ))]
    Jinja(#[from] minijinja::Error),

    /// The spec is missing a field an operation needs
    #[error("install spec is missing required field `{field}`")]
    #[diagnostic(help("add `{field}` to your config and rerun"))]
    MissingField {
        /// path of the missing field
        field: String,
    },

    /// A spec string contains a character that could break out of shell quoting
    #[error("{field}: {reason}: {value}")]
    #[diagnostic(help(
        "values in the install spec end up inside a generated shell script and must not contain shell metacharacters"
    ))]
    ShellUnsafe {
        /// path of the offending field
        field: String,
        /// which dangerous token was found
        reason: String,
        /// the offending value
        value: String,
    },

    /// A template references a placeholder we don't define
    #[error("unknown placeholder ${{{placeholder}}} in template `{template}`")]
    #[diagnostic(help(
        "supported placeholders are ${{NAME}} ${{VERSION}} ${{TAG}} ${{OS}} ${{ARCH}} ${{EXT}}"
    ))]
    UnknownPlaceholder {
        /// the template being interpolated
        template: String,
        /// name of the placeholder that wasn't recognized
        placeholder: String,
    },

    /// The rule chain produced an empty asset filename
    #[error("asset filename resolved to an empty string for {os}/{arch}")]
    #[diagnostic(help("check the asset template and rules for this platform"))]
    EmptyFilename {
        /// detected os
        os: String,
        /// detected arch
        arch: String,
    },

    /// A downloaded asset's hash doesn't match its recorded hash
    #[error("checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// asset filename
        filename: String,
        /// hash we wanted
        expected: String,
        /// hash we computed
        actual: String,
    },

    /// A checksum file contained a line we couldn't make sense of
    #[error("malformed checksum line {line_number} in {origin}: `{line}`")]
    ChecksumParse {
        /// where the checksum data came from (url or path)
        origin: String,
        /// 1-indexed line
        line_number: usize,
        /// the offending line
        line: String,
    },

    /// An embedded checksum isn't plain hex and can't be baked into a script
    #[error("embedded checksum for {filename} is not a hex digest: {hash}")]
    InvalidHash {
        /// asset filename
        filename: String,
        /// the bogus hash value
        hash: String,
    },

    /// A download came back with a non-success status
    #[error("GET {url} returned HTTP {status}")]
    HttpStatus {
        /// what we requested
        url: String,
        /// what we got
        status: u16,
    },

    /// We couldn't figure out the latest release tag of a repo
    #[error("unable to determine the latest release of {repo}")]
    #[diagnostic(help("does the repository have any published releases?"))]
    NoLatestRelease {
        /// the owner/project we asked about
        repo: String,
    },

    /// We don't know how to unpack this file
    #[error("unsupported archive format: {path}")]
    UnsupportedArchive {
        /// path of the archive
        path: Utf8PathBuf,
    },

    /// An archive entry tried to escape the extraction dir
    #[error("archive entry escapes the destination directory: {entry}")]
    PathTraversal {
        /// entry path as recorded in the archive
        entry: String,
    },

    /// A symlink in an archive points outside the extraction dir
    #[error("archive symlink {entry} points outside the destination directory: {target}")]
    SymlinkEscape {
        /// entry path as recorded in the archive
        entry: String,
        /// where the symlink points
        target: String,
    },
}
