//! Config document rendering
//!
//! The base documents are minijinja templates, embedded in the binary and
//! optionally replaced by files from an operator templates directory. The
//! override document is the user's `customServiceConfig`, published
//! verbatim after a line-level sanity check.

use std::collections::BTreeMap;
use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use tracing::debug;

use nova_common::Error;

use crate::clients::ConfigRenderer;

/// Base service config document
pub const BASE_CONFIG_KEY: &str = "01-nova.conf";

/// Logging config document
pub const LOGGING_CONFIG_KEY: &str = "logging.conf";

/// User override document
pub const OVERRIDE_CONFIG_KEY: &str = "03-nova-override.conf";

/// Field path of the override text, used in validation errors
pub const OVERRIDE_FIELD: &str = "spec.customServiceConfig";

const TEMPLATE_SUFFIX: &str = ".j2";

const EMBEDDED_TEMPLATES: [(&str, &str); 2] = [
    (BASE_CONFIG_KEY, include_str!("templates/01-nova.conf.j2")),
    (LOGGING_CONFIG_KEY, include_str!("templates/logging.conf.j2")),
];

/// Values substituted into the config templates
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct RenderParams {
    /// Message bus URL
    pub transport_url: String,
    /// Keystone user
    pub service_user: String,
    /// Keystone user password
    pub service_password: String,
    /// Internal keystone URL
    pub keystone_auth_url: String,
    /// Public keystone URL
    pub keystone_public_auth_url: String,
    /// API database host
    pub api_database_hostname: String,
    /// API database user
    pub api_database_user: String,
    /// API database password
    pub api_database_password: String,
    /// cell0 database host
    pub cell0_database_hostname: String,
    /// cell0 database user
    pub cell0_database_user: String,
    /// cell0 database password
    pub cell0_database_password: String,
    /// Verbose service logging
    pub debug: bool,
}

/// Renders the base documents from minijinja templates
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    /// Renderer using only the templates compiled into the binary
    pub fn embedded() -> Result<Self, Error> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        for (name, source) in EMBEDDED_TEMPLATES {
            env.add_template(name, source)
                .map_err(|e| Error::template(format!("embedded {name}: {e}")))?;
        }
        Ok(Self { env })
    }

    /// Renderer whose templates may be overridden from `dir`.
    ///
    /// A file `<document>.j2` in `dir` replaces the embedded template of
    /// that document. Documents without a file keep the embedded one.
    pub fn from_dir(dir: &Path) -> Result<Self, Error> {
        let mut renderer = Self::embedded()?;
        for (name, _) in EMBEDDED_TEMPLATES {
            let path = dir.join(format!("{name}{TEMPLATE_SUFFIX}"));
            if !path.is_file() {
                continue;
            }
            let source = std::fs::read_to_string(&path)
                .map_err(|e| Error::template(format!("reading {}: {e}", path.display())))?;
            renderer
                .env
                .add_template_owned(name.to_string(), source)
                .map_err(|e| Error::template(format!("{}: {e}", path.display())))?;
            debug!(template = name, path = %path.display(), "loaded template override");
        }
        Ok(renderer)
    }
}

impl ConfigRenderer for TemplateRenderer {
    fn render(
        &self,
        params: &RenderParams,
        override_text: &str,
    ) -> Result<BTreeMap<String, String>, Error> {
        validate_override(override_text)?;

        let ctx = minijinja::Value::from_serialize(params);
        let mut documents = BTreeMap::new();
        for (name, _) in EMBEDDED_TEMPLATES {
            let rendered = self
                .env
                .get_template(name)
                .and_then(|t| t.render(&ctx))
                .map_err(|e| Error::template(format!("{name}: {e}")))?;
            documents.insert(name.to_string(), rendered);
        }
        documents.insert(OVERRIDE_CONFIG_KEY.to_string(), override_text.to_string());
        Ok(documents)
    }
}

/// Check that override text is INI-shaped.
///
/// Every non-blank line must be a comment, a `[section]` header, a
/// `key=value` pair, or an indented continuation of the previous value.
pub fn validate_override(text: &str) -> Result<(), Error> {
    for (i, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        if line.starts_with(char::is_whitespace) && i > 0 {
            continue;
        }
        if trimmed.starts_with('[') {
            if trimmed.ends_with(']') && trimmed.len() > 2 {
                continue;
            }
            return Err(override_error(i, "unterminated section header"));
        }
        match trimmed.split_once('=') {
            Some((key, _)) if !key.trim().is_empty() => {}
            Some(_) => return Err(override_error(i, "empty key")),
            None => return Err(override_error(i, "expected key=value")),
        }
    }
    Ok(())
}

fn override_error(index: usize, what: &str) -> Error {
    Error::validation_for_field(
        "customServiceConfig",
        OVERRIDE_FIELD,
        format!("line {}: {what}", index + 1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RenderParams {
        RenderParams {
            transport_url: "rabbit://fake".to_string(),
            service_user: "nova".to_string(),
            service_password: "12345678".to_string(),
            api_database_hostname: "openstack".to_string(),
            api_database_user: "nova_api".to_string(),
            api_database_password: "12345678".to_string(),
            ..Default::default()
        }
    }

    /// Story: Rendered documents carry the transport URL and the verbatim override
    #[test]
    fn story_render_substitutes_and_keeps_override() {
        let docs = TemplateRenderer::embedded()
            .unwrap()
            .render(&params(), "foo=bar")
            .unwrap();

        assert!(docs[BASE_CONFIG_KEY].contains("transport_url=rabbit://fake"));
        assert!(docs[BASE_CONFIG_KEY].contains("password=12345678"));
        assert_eq!(docs[OVERRIDE_CONFIG_KEY], "foo=bar");
        assert!(docs[LOGGING_CONFIG_KEY].contains("level=INFO"));
    }

    #[test]
    fn every_embedded_template_compiles() {
        let renderer = TemplateRenderer::embedded().unwrap();
        for (name, _) in EMBEDDED_TEMPLATES {
            assert!(renderer.env.get_template(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn debug_flag_raises_log_level() {
        let mut p = params();
        p.debug = true;
        let docs = TemplateRenderer::embedded().unwrap().render(&p, "").unwrap();
        assert!(docs[LOGGING_CONFIG_KEY].contains("level=DEBUG"));
    }

    #[test]
    fn override_accepts_ini_shapes() {
        let text = "[DEFAULT]\n# comment\n; other comment\n\ndebug = true\nx=\n  continued\n";
        assert!(validate_override(text).is_ok());
        assert!(validate_override("").is_ok());
    }

    #[test]
    fn override_rejects_bare_words() {
        let err = validate_override("[DEFAULT]\nnot an option\n").unwrap_err();
        assert_eq!(err.field(), Some(OVERRIDE_FIELD));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn override_rejects_broken_section() {
        assert!(validate_override("[DEFAULT\nfoo=bar").is_err());
        assert!(validate_override("=value").is_err());
    }

    #[test]
    fn render_refuses_invalid_override() {
        let err = TemplateRenderer::embedded()
            .unwrap()
            .render(&params(), "garbage")
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn templates_dir_overrides_base_document() {
        let dir = std::env::temp_dir().join(format!("nova-templates-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("01-nova.conf.j2"),
            "[DEFAULT]\ntransport_url={{ transport_url }}\ncustom=1\n",
        )
        .unwrap();

        let docs = TemplateRenderer::from_dir(&dir)
            .unwrap()
            .render(&params(), "")
            .unwrap();
        assert!(docs[BASE_CONFIG_KEY].contains("custom=1"));
        assert!(docs[LOGGING_CONFIG_KEY].contains("[loggers]"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn strict_mode_rejects_unknown_variables() {
        let dir = std::env::temp_dir().join(format!("nova-templates-strict-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("logging.conf.j2"), "{{ not_a_param }}").unwrap();

        let err = TemplateRenderer::from_dir(&dir)
            .unwrap()
            .render(&params(), "")
            .unwrap_err();
        assert!(matches!(err, Error::Template { .. }));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
