//! CLI for MDM.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mdm_core::config;

use commands::{run_grab, run_serve};

/// Top-level CLI. With no subcommand, prompts for a page URL and grabs it.
#[derive(Debug, Parser)]
#[command(name = "mdm")]
#[command(about = "MDM: find and download the media embedded in a web page", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download every video (and its subtitles) found on a page.
    Grab {
        /// Page URL; prompted for on stdin when omitted.
        url: Option<String>,
        /// Output directory (default: config `download_dir`, else the current directory).
        #[arg(long, short = 'o', value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Run the HTTP service.
    Serve {
        /// Listen address (default: config `bind_addr`).
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
        /// Directory for finished downloads (default: config `download_dir`, else ./downloads).
        #[arg(long, value_name = "DIR")]
        download_dir: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            None => run_grab(&cfg, None, None).await?,
            Some(CliCommand::Grab { url, output }) => run_grab(&cfg, url, output).await?,
            Some(CliCommand::Serve { bind, download_dir }) => {
                run_serve(&cfg, bind, download_dir).await?
            }
        }

        Ok(())
    }
}
