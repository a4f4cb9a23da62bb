//! Layout rendering with minijinja.

use std::path::Path;

use minijinja::Environment;

/// Name of the user layout looked up in the layouts directory.
pub const DEFAULT_LAYOUT: &str = "default.html";

const BUILTIN_LAYOUT_NAME: &str = "kiln/default.html";

/// Values exposed to layouts and in-place templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PageContext {
    /// Page title
    pub title: String,
    /// Site title
    pub site_title: String,
    /// Base URL
    pub base_url: String,
    /// Rendered content HTML
    pub content: String,
}

/// Template environment for one build.
///
/// Built fresh per build so layout edits are picked up without caching.
pub struct LayoutEngine {
    env: Environment<'static>,
    page_layout: &'static str,
}

impl LayoutEngine {
    /// Create an engine that resolves templates from `layouts_dir` when it exists.
    pub fn new(layouts_dir: &Path) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template_owned(BUILTIN_LAYOUT_NAME.to_string(), BUILTIN_LAYOUT.to_string())?;

        let page_layout = if layouts_dir.is_dir() {
            env.set_loader(minijinja::path_loader(layouts_dir));
            if layouts_dir.join(DEFAULT_LAYOUT).is_file() {
                DEFAULT_LAYOUT
            } else {
                BUILTIN_LAYOUT_NAME
            }
        } else {
            BUILTIN_LAYOUT_NAME
        };

        Ok(Self { env, page_layout })
    }

    /// Whether pages are wrapped in a layout from the layouts directory.
    pub fn uses_custom_layout(&self) -> bool {
        self.page_layout == DEFAULT_LAYOUT
    }

    /// Wrap rendered page content in the active layout.
    pub fn render_page(&self, page: &PageContext) -> Result<String, minijinja::Error> {
        let tmpl = self.env.get_template(self.page_layout)?;
        tmpl.render(page)
    }

    /// Render a standalone template source in place.
    pub fn render_in_place(
        &self,
        name: &str,
        source: &str,
        page: &PageContext,
    ) -> Result<String, minijinja::Error> {
        self.env.render_named_str(name, source, page)
    }
}

const BUILTIN_LAYOUT: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ title }} - {{ site_title }}</title>
</head>
<body>
  <header><a href="{{ base_url }}">{{ site_title }}</a></header>
  <main>
    {{ content | safe }}
  </main>
</body>
</html>"##;
