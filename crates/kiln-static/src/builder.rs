//! Default site builder.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::routine::{BuildContext, BuildError, BuildRoutine, BuildStats};
use crate::templates::{LayoutEngine, PageContext};

/// How a source file is turned into output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    /// Markdown rendered into the page layout
    Markdown,
    /// Template rendered in place, suffix dropped
    Template,
    /// Copied unchanged
    Asset,
}

/// A source file discovered for this build.
#[derive(Debug)]
struct SourceFile {
    /// Absolute source path
    source_path: PathBuf,

    /// Output path relative to the output dir
    output_relative: PathBuf,

    kind: SourceKind,
}

/// Renders markdown pages and in-place templates and copies everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteBuilder;

impl SiteBuilder {
    /// Create a new site builder.
    pub fn new() -> Self {
        Self
    }

    /// Discover all files in the source directory.
    fn discover(&self, source_dir: &Path) -> Result<Vec<SourceFile>, BuildError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(source_dir).follow_links(true) {
            let entry = entry.map_err(|e| BuildError::ReadError(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(source_dir).unwrap_or(path);
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

            let (kind, output_relative) = match ext {
                "md" | "markdown" => (SourceKind::Markdown, relative.with_extension("html")),
                "jinja" => (SourceKind::Template, relative.with_extension("")),
                _ => (SourceKind::Asset, relative.to_path_buf()),
            };

            files.push(SourceFile {
                source_path: path.to_path_buf(),
                output_relative,
                kind,
            });
        }

        Ok(files)
    }

    /// Build a single file.
    fn build_file(
        &self,
        file: &SourceFile,
        ctx: &BuildContext<'_>,
        layouts: &LayoutEngine,
    ) -> Result<SourceKind, BuildError> {
        let output_path = ctx.output_dir.join(&file.output_relative);
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::WriteError(e.to_string()))?;
        }

        match file.kind {
            SourceKind::Asset => {
                fs::copy(&file.source_path, &output_path).map_err(|e| {
                    BuildError::WriteError(format!("{}: {}", output_path.display(), e))
                })?;
            }
            SourceKind::Markdown | SourceKind::Template => {
                let source = fs::read_to_string(&file.source_path).map_err(|e| {
                    BuildError::ReadError(format!("{}: {}", file.source_path.display(), e))
                })?;
                let html = self.render(file, &source, ctx, layouts)?;
                fs::write(&output_path, html).map_err(|e| {
                    BuildError::WriteError(format!("{}: {}", output_path.display(), e))
                })?;
            }
        }

        Ok(file.kind)
    }

    /// Render a markdown page or in-place template.
    fn render(
        &self,
        file: &SourceFile,
        source: &str,
        ctx: &BuildContext<'_>,
        layouts: &LayoutEngine,
    ) -> Result<String, BuildError> {
        let stem = file
            .output_relative
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled");

        let mut page = PageContext {
            title: stem.to_string(),
            site_title: ctx.config.site.title.clone(),
            base_url: ctx.config.site.base_url.clone(),
            content: String::new(),
        };

        let rendered = match file.kind {
            SourceKind::Markdown => {
                if let Some(title) = first_heading(source) {
                    page.title = title;
                }
                page.content = render_markdown(source);
                layouts.render_page(&page)
            }
            _ => {
                let name = file.output_relative.to_string_lossy();
                layouts.render_in_place(&name, source, &page)
            }
        };

        rendered.map_err(|e| BuildError::RenderError {
            path: file.source_path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl BuildRoutine for SiteBuilder {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<BuildStats, BuildError> {
        let start = Instant::now();

        let source_dir = ctx.config.source_dir(ctx.root);
        if !source_dir.is_dir() {
            return Err(BuildError::ReadError(format!(
                "Source directory not found: {}",
                source_dir.display()
            )));
        }

        let layouts = LayoutEngine::new(&ctx.config.layouts_dir(ctx.root))
            .map_err(|e| BuildError::TemplateError(e.to_string()))?;

        let files = self.discover(&source_dir)?;
        tracing::debug!("Discovered {} source files", files.len());

        let results: Vec<Result<SourceKind, BuildError>> = files
            .par_iter()
            .map(|file| self.build_file(file, ctx, &layouts))
            .collect();

        let mut stats = BuildStats::default();
        for result in results {
            match result? {
                SourceKind::Asset => stats.assets += 1,
                _ => stats.pages += 1,
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok(stats)
    }
}

/// Render markdown to HTML.
fn render_markdown(content: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;

    let parser = Parser::new_ext(content, options);

    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);

    html_output
}

/// Plain text of the first heading, if any.
fn first_heading(content: &str) -> Option<String> {
    let mut title = String::new();
    let mut in_heading = false;

    for event in Parser::new(content) {
        match event {
            Event::Start(Tag::Heading { .. }) => in_heading = true,
            Event::End(TagEnd::Heading(_)) => break,
            Event::Text(text) | Event::Code(text) if in_heading => title.push_str(&text),
            _ => {}
        }
    }

    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use tempfile::tempdir;

    fn build_site(root: &Path, out: &Path) -> Result<BuildStats, BuildError> {
        let config = SiteConfig::default();
        SiteBuilder::new().build(&BuildContext {
            root,
            config: &config,
            output_dir: out,
        })
    }

    #[test]
    fn builds_simple_site() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        let out = temp.path().join("out");

        fs::create_dir_all(src.join("blog")).unwrap();
        fs::write(src.join("index.md"), "# Welcome\n\nHello").unwrap();
        fs::write(src.join("blog/first.md"), "# First post").unwrap();
        fs::write(src.join("style.css"), "body { color: red; }").unwrap();

        let stats = build_site(temp.path(), &out).unwrap();

        assert_eq!(stats.pages, 2);
        assert_eq!(stats.assets, 1);

        let index = fs::read_to_string(out.join("index.html")).unwrap();
        assert!(index.contains("<title>Welcome - Site</title>"));
        assert!(index.contains("<h1>Welcome</h1>"));
        assert!(out.join("blog/first.html").exists());
        assert_eq!(
            fs::read_to_string(out.join("style.css")).unwrap(),
            "body { color: red; }"
        );
    }

    #[test]
    fn renders_templates_in_place() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        let out = temp.path().join("out");

        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("about.html.jinja"), "<p>{{ site_title }}</p>").unwrap();

        build_site(temp.path(), &out).unwrap();

        assert_eq!(
            fs::read_to_string(out.join("about.html")).unwrap(),
            "<p>Site</p>"
        );
    }

    #[test]
    fn uses_layout_from_layouts_dir() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        let layouts = temp.path().join("layouts");
        let out = temp.path().join("out");

        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&layouts).unwrap();
        fs::write(src.join("index.md"), "hi").unwrap();
        fs::write(layouts.join("default.html"), "<main>{{ content | safe }}</main>").unwrap();

        build_site(temp.path(), &out).unwrap();

        let index = fs::read_to_string(out.join("index.html")).unwrap();
        assert_eq!(index.trim(), "<main><p>hi</p>\n</main>");
    }

    #[test]
    fn missing_source_dir_fails() {
        let temp = tempdir().unwrap();
        let err = build_site(temp.path(), &temp.path().join("out")).unwrap_err();

        assert!(matches!(err, BuildError::ReadError(_)));
    }

    #[test]
    fn template_errors_fail_the_build() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("broken.html.jinja"), "{% if %}").unwrap();

        let err = build_site(temp.path(), &temp.path().join("out")).unwrap_err();

        assert!(matches!(err, BuildError::RenderError { .. }));
    }

    #[test]
    fn extracts_first_heading() {
        assert_eq!(
            first_heading("intro\n\n## The `kiln` tool\n\n# Later"),
            Some("The kiln tool".to_string())
        );
        assert_eq!(first_heading("no headings here"), None);
    }
}
