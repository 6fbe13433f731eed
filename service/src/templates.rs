//! View rendering.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use handlebars::{DirectorySourceOptions, Handlebars};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("views directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("view '{0}' is not defined in the views directory")]
    MissingView(&'static str),

    #[error("failed to load templates: {0}")]
    Load(#[from] handlebars::TemplateError),

    #[error("failed to render template: {0}")]
    Render(#[from] handlebars::RenderError),
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        error!(error = %self, "view rendering failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
    }
}

/// Shared handle to the template engine.
#[derive(Clone)]
pub struct Templates {
    engine: Arc<Handlebars<'static>>,
}

fn engine(auto_escape: bool) -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    if !auto_escape {
        handlebars.register_escape_fn(handlebars::no_escape);
    }
    handlebars
}

impl Templates {
    /// Load every `.html` template under `views_dir`, named by its path
    /// relative to the directory without the extension.
    ///
    /// With `auto_escape = false` values are written verbatim, which lets any
    /// user-controlled value inject markup or script.
    ///
    /// # Errors
    /// Returns an error if the directory is missing or a template fails to parse.
    pub fn configure(auto_escape: bool, views_dir: &Path) -> Result<Self, ViewError> {
        if !views_dir.is_dir() {
            return Err(ViewError::MissingDirectory(views_dir.to_path_buf()));
        }

        let mut handlebars = engine(auto_escape);
        let mut options = DirectorySourceOptions::default();
        options.tpl_extension = ".html".to_string();
        handlebars.register_templates_directory(views_dir, options)?;

        if auto_escape {
            info!(views_dir = %views_dir.display(), "Template engine configured with auto-escaping");
        } else {
            warn!(
                views_dir = %views_dir.display(),
                "Template auto-escaping DISABLED; templated values are emitted raw"
            );
        }

        Ok(Self {
            engine: Arc::new(handlebars),
        })
    }

    #[cfg(test)]
    fn from_sources(auto_escape: bool, sources: &[(&str, &str)]) -> Result<Self, ViewError> {
        let mut handlebars = engine(auto_escape);
        for (name, source) in sources {
            handlebars.register_template_string(name, source)?;
        }
        Ok(Self {
            engine: Arc::new(handlebars),
        })
    }

    #[must_use]
    pub fn has_template(&self, name: &str) -> bool {
        self.engine.has_template(name)
    }

    /// Fail unless every view in `names` was loaded.
    ///
    /// # Errors
    /// Returns the first name with no matching template.
    pub fn require(&self, names: &[&'static str]) -> Result<(), ViewError> {
        match names.iter().find(|name| !self.has_template(name)) {
            Some(name) => Err(ViewError::MissingView(*name)),
            None => Ok(()),
        }
    }

    /// Render `name` with `data`.
    ///
    /// # Errors
    /// Returns an error if the template is unknown or references missing data.
    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, ViewError> {
        Ok(self.engine.render(name, data)?)
    }

    /// Render `name` into an HTML response.
    ///
    /// # Errors
    /// Returns an error if rendering fails.
    pub fn html<T: Serialize>(&self, name: &str, data: &T) -> Result<Html<String>, ViewError> {
        self.render(name, data).map(Html)
    }
}
