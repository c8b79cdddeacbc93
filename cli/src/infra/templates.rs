//! Infrastructure implementation of the `TemplateRenderer` port.
//!
//! Templates are embedded at compile time from `cli/templates/` and rendered
//! with handlebars. Values are escaped for single-quoted Groovy strings
//! instead of HTML.

use anyhow::{Context, Result};
use handlebars::Handlebars;
use include_dir::{Dir, include_dir};
use serde_json::Value;

use crate::application::ports::TemplateRenderer;
use crate::domain::TemplateId;
use crate::domain::templates::groovy_escape;

static EMBEDDED_TEMPLATES: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/templates");

pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
}

impl HandlebarsRenderer {
    /// Register every embedded template.
    ///
    /// # Errors
    ///
    /// Returns an error if a template file is missing, not UTF-8, or does
    /// not parse.
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(groovy_escape);

        for id in TemplateId::ALL {
            let file_name = format!("{}.hbs", id.name());
            let source = EMBEDDED_TEMPLATES
                .get_file(&file_name)
                .and_then(|f| f.contents_utf8())
                .ok_or_else(|| anyhow::anyhow!("embedded template not found: {file_name}"))?;
            registry
                .register_template_string(id.name(), source)
                .with_context(|| format!("parsing template {file_name}"))?;
        }
        Ok(Self { registry })
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn render(&self, template: TemplateId, vars: &Value) -> Result<Vec<u8>> {
        let text = self
            .registry
            .render(template.name(), vars)
            .with_context(|| format!("rendering template {}", template.name()))?;
        Ok(text.into_bytes())
    }
}
