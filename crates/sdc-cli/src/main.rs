//! sdc - Main Entry Point
//!
//! `sdc diff OLD NEW` reconciles the markup of OLD into the shape of NEW
//! and prints the operation plan followed by the resulting markup.
//!
//! `sdc expand ROOT DIR` registers one tag per `DIR/<tag>.html` file,
//! expands the page in ROOT and prints the final body markup. With
//! `SDC_BASE_URL` set the content files are fetched over HTTP instead.

use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use sdc_dom::{apply, diff, DomTree, HtmlSerializer, NodeId, Side};
use sdc_engine::{App, AppConfig, ContentLoader, Controller, HttpLoader, StaticLoader};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: sdc diff OLD NEW | sdc expand ROOT DIR";

fn main() -> Result<()> {
    let config = AppConfig::default()
        .with_env()
        .context("invalid SDC_* environment")?;
    init_logging(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [command, old, new] if command == "diff" => run_diff(Path::new(old), Path::new(new)),
        [command, root, dir] if command == "expand" => run_expand(config, Path::new(root), Path::new(dir)),
        _ => bail!(USAGE),
    }
}

fn init_logging(config: &AppConfig) {
    let default = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

fn mount(tree: &mut DomTree, markup: &str) -> Result<NodeId> {
    let container = tree.create_element("div");
    sdc_html::parse_into(tree, container, markup)?;
    Ok(container)
}

fn run_diff(old: &Path, new: &Path) -> Result<()> {
    let mut tree = DomTree::new();
    let live = mount(&mut tree, &read(old)?)?;
    let candidate = mount(&mut tree, &read(new)?)?;

    let patch = diff(&tree, live, candidate)?;
    for step in patch.steps() {
        let (side, record) = match step.side {
            Side::Live => ("live", &patch.live[step.index]),
            Side::Candidate => ("candidate", &patch.candidate[step.index]),
        };
        if let Some(op) = &record.op {
            println!("{:<13} {:<9} {}", op.as_str(), side, record.path);
        }
    }

    let stats = apply(&mut tree, &patch)?;
    tracing::info!(
        "kept {}, moved {}, inserted {}, deleted {}, attributes {}",
        stats.kept,
        stats.moved,
        stats.inserted,
        stats.deleted,
        stats.attributes
    );
    println!("{}", HtmlSerializer::new().serialize_inner(&tree, live));
    Ok(())
}

/// Controller of a tag whose content is `<tag>.html`
struct FileView {
    url: String,
}

impl Controller for FileView {
    fn content_url(&self) -> Option<String> {
        Some(self.url.clone())
    }
}

fn run_expand(config: AppConfig, root: &Path, dir: &Path) -> Result<()> {
    let files = StaticLoader::new();
    let mut tags = Vec::new();
    let entries = std::fs::read_dir(dir).with_context(|| format!("cannot list {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "html") {
            continue;
        }
        let Some(tag) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let url = format!("{tag}.html");
        files.set_page(&url, &read(&path)?);
        tags.push((tag.to_ascii_lowercase(), url));
    }
    tags.sort();

    let loader: Rc<dyn ContentLoader> = match config.base_url {
        Some(_) => Rc::new(HttpLoader::new(&config)?),
        None => Rc::new(files),
    };
    let app = App::new(config, loader);
    for (tag, url) in &tags {
        let url = url.clone();
        app.register(tag, move || FileView { url: url.clone() });
    }
    tracing::info!("Registered {} tags from {}", tags.len(), dir.display());

    app.append_markup(&read(root)?)?;
    app.block_on(app.init());
    app.run_pending();

    let body = app.body();
    println!("{}", HtmlSerializer::pretty().serialize_inner(&app.tree(), body));
    Ok(())
}
