use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zare_render::{Params, RenderOptions, Renderer};

#[derive(Parser)]
#[command(name = "zare")]
#[command(about = "Zare template engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a .zare template to HTML
    Render {
        /// Input .zare file
        path: PathBuf,

        /// JSON object with the template parameters
        #[arg(long, value_name = "FILE")]
        params: Option<PathBuf>,

        /// JSON file with renderer options
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Write the HTML here instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Do not HTML-escape parameter values
        #[arg(long)]
        raw: bool,
    },

    /// Render a .zare template with no parameters and report errors
    Check {
        /// Input .zare file
        path: PathBuf,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zare_render=info,zare_parser=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Render {
            path,
            params,
            config,
            out,
            raw,
        } => cmd_render(&path, params.as_deref(), config.as_deref(), out.as_deref(), raw),
        Command::Check { path } => cmd_check(&path),
    }
}

fn read_source(path: &Path) -> String {
    if !path.exists() {
        eprintln!("Error: file not found: {}", path.display());
        std::process::exit(1);
    }
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading {}: {e}", path.display());
            std::process::exit(1);
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    let source = read_source(path);
    match serde_json::from_str(&source) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Invalid JSON in {}: {e}", path.display());
            std::process::exit(1);
        }
    }
}

fn cmd_render(
    path: &Path,
    params: Option<&Path>,
    config: Option<&Path>,
    out: Option<&Path>,
    raw: bool,
) {
    let mut options: RenderOptions = config.map(read_json).unwrap_or_default();
    if raw {
        options.escape_parameters = false;
    }
    let params: Params = params.map(read_json).unwrap_or_default();
    let source = read_source(path);

    let html = match Renderer::new(options).render(&source, &params, path) {
        Ok(html) => html,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    match out {
        Some(out) => {
            if let Err(e) = std::fs::write(out, &html) {
                eprintln!("Error writing {}: {e}", out.display());
                std::process::exit(1);
            }
            tracing::info!(path = %out.display(), "wrote output");
        }
        None => print!("{html}"),
    }
}

fn cmd_check(path: &Path) {
    let source = read_source(path);

    if let Err(e) = Renderer::default().render(&source, &Params::new(), path) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    eprintln!("OK: {}", path.display());
}
