use anyhow::{Error, Result, anyhow};
use handlebars::Handlebars;
use serde_json::Value;
use tracing::debug;

pub const EMAIL_TEMPLATE: &str = "notification";
pub const TICKET_TEMPLATE: &str = "ticket";

const EMAIL_TEMPLATE_SOURCE: &str = include_str!("../../templates/notification.hbs");
const TICKET_TEMPLATE_SOURCE: &str = include_str!("../../templates/ticket.hbs");

/// Renders a named template with a view model into an HTML string.
pub trait HtmlRenderer: Send + Sync {
    fn render_html(&self, template: &str, view: &Value) -> Result<String, Error>;
}

pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
}

impl TemplateRenderer {
    /// Renderer with the bundled email and ticket templates.
    pub fn new() -> Result<Self, Error> {
        let mut renderer = Self::empty();
        renderer.register(EMAIL_TEMPLATE, EMAIL_TEMPLATE_SOURCE)?;
        renderer.register(TICKET_TEMPLATE, TICKET_TEMPLATE_SOURCE)?;

        Ok(renderer)
    }

    pub fn empty() -> Self {
        let mut handlebars = Handlebars::new();
        // A view model missing a field the template uses is an error, not a blank.
        handlebars.set_strict_mode(true);

        Self { handlebars }
    }

    pub fn register(&mut self, name: &str, source: &str) -> Result<(), Error> {
        self.handlebars
            .register_template_string(name, source)
            .map_err(|e| anyhow!("Failed to register template '{}': {}", name, e))
    }
}

impl HtmlRenderer for TemplateRenderer {
    fn render_html(&self, template: &str, view: &Value) -> Result<String, Error> {
        let html = self
            .handlebars
            .render(template, view)
            .map_err(|e| anyhow!("Failed to render template '{}': {}", template, e))?;

        debug!(template, bytes = html.len(), "Template rendered");

        Ok(html)
    }
}
