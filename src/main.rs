use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use log::info;
use pagewrap::{Context, Page, TemplateEngine, ViewLoader};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file or directory
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Template path or loader reference (NAME:VIEW)
    #[arg(short, long, global = true)]
    template: Option<String>,

    /// Page body file; reads stdin when omitted or "-"
    #[arg(short, long, global = true)]
    body: Option<PathBuf>,

    /// Write the rendered page here instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Register a view loader (NAME=DIR)
    #[arg(long, global = true)]
    views: Vec<String>,

    /// Set a configuration value (KEY=VALUE, VALUE parsed as YAML)
    #[arg(long, global = true)]
    set: Vec<String>,

    /// Set a registry option (KEY=VALUE)
    #[arg(long, global = true)]
    option: Vec<String>,

    /// Render undefined template variables as empty instead of failing
    #[arg(long, global = true)]
    lenient: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new site skeleton
    Init {
        /// Site directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Render a page (default command)
    Render,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { ref path }) => {
            init_site(path)?;
        }
        Some(Commands::Render) | None => {
            render(&cli)?;
        }
    }

    Ok(())
}

fn init_site(path: &Path) -> Result<()> {
    info!("Initializing site at {:?}", path);

    std::fs::create_dir_all(path.join("conf"))?;
    std::fs::create_dir_all(path.join("views"))?;

    let site_content = r#"title: "My Site"
template: "layout.html.j2"
"#;
    std::fs::write(path.join("conf/site.yaml"), site_content)?;

    let layout_content = r#"<!DOCTYPE html>
<html>
<head><title>{{ core.conf.site.title }}</title></head>
<body>
{{ content }}
</body>
</html>
"#;
    std::fs::write(path.join("layout.html.j2"), layout_content)?;

    let view_content = r#"<article id="{{ uid(core.conf.site.title) }}">
{{ content }}
</article>
"#;
    std::fs::write(path.join("views/article.html.j2"), view_content)?;

    info!("✓ Site initialized successfully!");
    info!("  Run: echo '<p>Hello</p>' | pagewrap -c conf");

    Ok(())
}

fn render(cli: &Cli) -> Result<()> {
    let engine = || {
        if cli.lenient {
            TemplateEngine::lenient()
        } else {
            TemplateEngine::new()
        }
    };
    let mut ctx = Context::new().with_renderer(engine());

    for spec in &cli.views {
        let (name, dir) = split_pair(spec)?;
        ctx.loaders
            .register(name, ViewLoader::with_engine(dir, engine()));
    }
    for spec in &cli.set {
        let (key, value) = split_pair(spec)?;
        ctx.conf
            .set(key, parse_value(value))
            .with_context(|| format!("Failed to set config value {:?}", key))?;
    }
    for spec in &cli.option {
        let (key, value) = split_pair(spec)?;
        ctx.opts.set(key, value);
    }

    let body = read_body(cli.body.as_deref())?;

    let mut page = Page::new(&mut ctx);
    page.start(cli.config.as_deref(), cli.template.as_deref())
        .context("Failed to start page")?;
    page.write_all(body.as_bytes())?;

    match &cli.output {
        Some(path) => {
            let html = page.end(false)?.unwrap_or_default();
            std::fs::write(path, html)
                .with_context(|| format!("Failed to write page to {:?}", path))?;
            info!("Wrote page to {:?}", path);
        }
        None => {
            page.end(true)?;
        }
    }

    Ok(())
}

fn read_body(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read page body {:?}", path)),
        _ => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read page body from stdin")?;
            Ok(body)
        }
    }
}

/// Reads a `--set` value as YAML so numbers, booleans and lists keep their type.
fn parse_value(value: &str) -> serde_json::Value {
    serde_yaml::from_str::<serde_json::Value>(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()))
}

fn split_pair(spec: &str) -> Result<(&str, &str)> {
    spec.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Expected KEY=VALUE, got {:?}", spec))
}
