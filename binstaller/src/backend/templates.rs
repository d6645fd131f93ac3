//! Logic for resolving/rendering script templates

use include_dir::{include_dir, Dir};
use minijinja::Environment;
use newline_converter::dos2unix;
use serde::Serialize;

use crate::errors::BinstallResult;

const TEMPLATE_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/templates");

/// Key used for looking up templates (relative path from the templates dir)
pub type TemplateId = &'static str;
/// Template key for the installer script
pub const TEMPLATE_INSTALL_SH: TemplateId = "scripts/install.sh";
/// Template key for the runner script
pub const TEMPLATE_RUN_SH: TemplateId = "scripts/run.sh";

/// Main templates struct that gets passed around in the application.
#[derive(Debug)]
pub struct Templates {
    /// Minijinja environment that contains all loaded templates
    env: Environment<'static>,
}

impl Templates {
    /// Load + Parse templates from the binary
    pub fn new() -> BinstallResult<Self> {
        let mut env = Environment::new();
        env.set_debug(true);
        env.add_filter("sh_quote", sh_quote);

        fn jinja_error(details: String) -> std::result::Result<String, minijinja::Error> {
            Err(minijinja::Error::new(
                minijinja::ErrorKind::EvalBlock,
                details,
            ))
        }
        env.add_function("error", jinja_error);

        // This `expect` should never happen in production, because all of
        // these things are baked into the binary. If this fails at all it
        // should presumably *always* fail, and so it will only show up when
        // someone's messing with the templates locally during development
        // and wrote some malformed jinja2 markup.
        Self::load_files(&mut env, &TEMPLATE_DIR)
            .expect("failed to load jinja2 templates from binary");

        Ok(Self { env })
    }

    /// load + parse templates from the binary (recursive)
    fn load_files(env: &mut Environment<'static>, dir: &'static Dir) -> BinstallResult<()> {
        for entry in dir.entries() {
            if let Some(file) = entry.as_file() {
                let path = file.path();
                if path.extension().unwrap_or_default() != "j2" {
                    // Skip non-jinja-templates (useful for prototyping)
                    continue;
                }
                // Remove the .j2 extension
                let path = path.with_extension("");
                let name = path
                    .to_str()
                    .expect("non-utf8 jinja2 template path")
                    .replace('\\', "/");
                let contents = file
                    .contents_utf8()
                    .expect("non-utf8 jinja2 template")
                    .to_string();
                env.add_template_owned(name, contents)
                    .expect("failed to add jinja2 template");
            }
            if let Some(subdir) = entry.as_dir() {
                Self::load_files(env, subdir)?;
            }
        }
        Ok(())
    }

    /// Render a template file to a string, cleaning all newlines to be unix-y
    pub fn render_file_to_clean_string(
        &self,
        key: TemplateId,
        val: &impl Serialize,
    ) -> BinstallResult<String> {
        let template = self.env.get_template(key)?;
        let rendered = template.render(val)?;
        let cleaned = dos2unix(&rendered).into_owned();
        Ok(cleaned)
    }
}

/// Quote a string for POSIX sh.
///
/// Single quotes pass everything through verbatim; an embedded single quote
/// is spliced out as `'\''`. The result is safe to paste anywhere a shell
/// word is expected, whatever the input contains.
pub fn sh_quote(value: String) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_known_templates() {
        let templates = Templates::new().unwrap();
        templates.env.get_template(TEMPLATE_INSTALL_SH).unwrap();
        templates.env.get_template(TEMPLATE_RUN_SH).unwrap();
    }

    #[test]
    fn sh_quote_passes_metacharacters_inertly() {
        assert_eq!(sh_quote("plain".to_owned()), "'plain'");
        assert_eq!(sh_quote("".to_owned()), "''");
        assert_eq!(sh_quote("a b".to_owned()), "'a b'");
        assert_eq!(sh_quote("$(evil)".to_owned()), "'$(evil)'");
        assert_eq!(sh_quote("don't".to_owned()), r"'don'\''t'");
    }
}
