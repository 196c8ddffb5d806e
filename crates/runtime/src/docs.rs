//! Plugin documentation generator
//!
//! Renders one markdown page per registered plugin under
//! `<output>/<plugins>/<category>/<name>.md` and a YAML navigation menu at
//! `<output>/<menu>` listing every page.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::registry::{PluginDoc, PluginRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocsOptions {
    pub output: PathBuf,
    /// Menu file name, relative to `output`
    pub menu: String,
    /// Plugin pages directory, relative to `output`
    pub plugins: String,
}

impl Default for DocsOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from("docs"),
            menu: "menu.yml".into(),
            plugins: "plugins".into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Menu {
    catalog: Vec<MenuSection>,
}

#[derive(Debug, Serialize)]
struct MenuSection {
    name: &'static str,
    catalog: Vec<MenuItem>,
}

#[derive(Debug, Serialize)]
struct MenuItem {
    name: &'static str,
    path: String,
}

/// Write every plugin page and the menu; returns the number of pages
pub fn generate(registry: &PluginRegistry, options: &DocsOptions) -> Result<usize> {
    let mut pages = 0;
    let mut menu = Menu {
        catalog: Vec::new(),
    };

    for (category, docs) in registry.catalog() {
        if docs.is_empty() {
            continue;
        }
        let dir = options.output.join(&options.plugins).join(category.as_str());
        fs::create_dir_all(&dir)?;

        let mut section = MenuSection {
            name: category.title(),
            catalog: Vec::with_capacity(docs.len()),
        };
        for doc in &docs {
            fs::write(dir.join(format!("{}.md", doc.name)), render(doc))?;
            section.catalog.push(MenuItem {
                name: doc.name,
                path: format!("/{}/{}/{}", options.plugins, category.as_str(), doc.name),
            });
            pages += 1;
        }
        menu.catalog.push(section);
    }

    write_menu(&options.output.join(&options.menu), &menu)?;
    info!(pages, output = %options.output.display(), "plugin docs generated");
    Ok(pages)
}

fn write_menu(path: &Path, menu: &Menu) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_yaml::to_string(menu)?)?;
    Ok(())
}

/// Markdown page for one plugin
pub fn render(doc: &PluginDoc) -> String {
    let defaults = doc.default_config.trim();
    let defaults = if defaults.is_empty() {
        "# no configuration"
    } else {
        defaults
    };
    format!(
        "# {}/{}\n## Description\n{}\n## DefaultConfig\n```yaml\n{}\n```\n",
        doc.category.title(),
        doc.name,
        doc.description,
        defaults
    )
}
