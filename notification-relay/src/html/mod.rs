//! HTML template rendering for outgoing mail.

pub mod template;

pub use template::{render_str, FileTemplates, TemplateError, TemplateRenderer};
