//! `figpack`: export a design file's text, images and indexes into one ZIP archive.

mod app;
mod error;

use crate::error::{ErrorKind, Result};
use clap::{Args, Parser, Subcommand};
use exn::ResultExt;
use figpack_config::Settings;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "figpack", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON). Defaults to the platform
    /// configuration directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// API access token; overrides the configuration.
    #[arg(long, global = true, env = "FIGMA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// More logging; repeat for more detail. `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export a design file into a ZIP archive.
    Export {
        #[command(flatten)]
        target: Target,

        /// Archive to create.
        #[arg(short, long)]
        output: PathBuf,

        /// Index format to include; repeatable. Defaults to the configuration.
        #[arg(short, long = "format")]
        formats: Vec<String>,

        /// Leave the indexes out.
        #[arg(long)]
        no_index: bool,

        /// Include at most this many images.
        #[arg(long)]
        max_images: Option<usize>,
    },
    /// Print what would be exported.
    Inspect {
        #[command(flatten)]
        target: Target,

        /// Print the extracted records as JSON instead of counts.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct Target {
    /// Key of the design file, as found in its URL.
    file_key: String,

    /// Export only these node identifiers (comma separated).
    #[arg(long, value_delimiter = ',')]
    nodes: Vec<String>,

    /// Depth of each selected node's subtree. Defaults to `fetch.deep_depth`.
    #[arg(long, requires = "nodes")]
    depth: Option<u32>,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "info,figpack=debug",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if cli.token.is_some() {
        settings.api.token = cli.token;
    }
    match cli.command {
        Command::Export { target, output, formats, no_index, max_images } => {
            if !formats.is_empty() {
                settings.archive.index_formats = formats;
            }
            if no_index {
                settings.archive.include_index = false;
            }
            if let Some(max_images) = max_images {
                settings.archive.max_images = max_images;
            }
            app::export(&settings, target.request(&settings), &output).await
        },
        Command::Inspect { target, json } => app::inspect(&settings, target.request(&settings), json).await,
    }
}

impl Target {
    fn request(self, settings: &Settings) -> figpack_jobs::ExportRequest {
        if self.nodes.is_empty() {
            figpack_jobs::ExportRequest::document(self.file_key)
        } else {
            let depth = self.depth.unwrap_or(settings.fetch.deep_depth);
            figpack_jobs::ExportRequest::nodes(self.file_key, self.nodes, depth)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_export_arguments() {
        let cli = Cli::try_parse_from([
            "figpack", "export", "AbC123", "-o", "out.zip", "--format", "csv", "-f", "jsonl", "--nodes", "1:2,3:4",
            "--depth", "4", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Export { target, output, formats, no_index, .. } = cli.command else {
            panic!("expected export");
        };
        assert_eq!(output, PathBuf::from("out.zip"));
        assert_eq!(formats, ["csv", "jsonl"]);
        assert!(!no_index);
        let request = target.request(&Settings::default());
        assert_eq!(request, figpack_jobs::ExportRequest::nodes("AbC123", vec!["1:2".into(), "3:4".into()], 4));
    }

    #[test]
    fn test_depth_requires_nodes() {
        assert!(Cli::try_parse_from(["figpack", "inspect", "AbC123", "--depth", "3"]).is_err());
    }
}
