use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fusion_protocol::{ErrorEnvelope, FusionRequest};
use fusion_search::FusionError;

pub mod command;
pub mod config;
pub mod report;

use command::{run_fuse, Overrides};
use config::FuseConfig;

#[derive(Parser)]
#[command(name = "rank-fuse")]
#[command(about = "Fuse ranked vector and lexical results with weighted RRF", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuse the pipelines of a JSON fusion request
    Fuse(FuseArgs),
    /// Print the JSON schema of a fusion request
    Schema,
}

#[derive(Args)]
struct FuseArgs {
    /// Request file; `-` or nothing reads stdin
    input: Option<PathBuf>,

    /// Config file (defaults to $RANK_FUSE_CONFIG, then ./rank-fuse.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// RRF smoothing constant
    #[arg(long)]
    k: Option<f64>,

    /// Keep only the best N fused results
    #[arg(long)]
    limit: Option<usize>,

    /// Drop repeated ids inside a pipeline instead of failing
    #[arg(long)]
    keep_first_duplicates: bool,

    /// Include per-pipeline score details
    #[arg(long)]
    details: bool,

    /// Emit JSON (stdout is reserved for JSON)
    #[arg(long)]
    json: bool,
}

pub fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();
    if matches!(&cli.command, Commands::Fuse(args) if args.json) {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Schema => {
            let schema = schemars::schema_for!(FusionRequest);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        Commands::Fuse(args) => {
            let json = args.json;
            let outcome = fuse(args);
            if json {
                if let Err(err) = &outcome {
                    println!("{}", serde_json::to_string_pretty(&error_envelope(err))?);
                }
            }
            outcome
        }
    }
}

fn fuse(args: FuseArgs) -> Result<()> {
    let config = FuseConfig::load(args.config.as_deref())?;
    let request = read_request(args.input.as_deref())?;
    let overrides = Overrides {
        k: args.k,
        limit: args.limit,
        keep_first_duplicates: args.keep_first_duplicates,
    };

    let outcome = run_fuse(&request, &config, &overrides)?;
    if args.json {
        let response = outcome.to_response(args.details);
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", report::render_fuse_report(&outcome, args.details));
    }
    Ok(())
}

fn read_request(input: Option<&Path>) -> Result<FusionRequest> {
    let raw = match input {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("failed to read request {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("invalid fusion request")
}

fn error_envelope(err: &anyhow::Error) -> ErrorEnvelope {
    let fusion = err.chain().find_map(|e| e.downcast_ref::<FusionError>());
    let (code, hint) = match fusion {
        Some(e @ FusionError::Configuration(_)) => (
            e.code(),
            Some("check pipeline names, weights and k".to_string()),
        ),
        Some(e @ FusionError::InvalidInput(_)) => (
            e.code(),
            Some("use --keep-first-duplicates to drop repeated ids".to_string()),
        ),
        Some(e) => (e.code(), None),
        None if err.chain().any(|e| e.is::<serde_json::Error>()) => ("invalid_request", None),
        None => ("internal_error", None),
    };
    ErrorEnvelope {
        code: code.to_string(),
        message: format!("{err:#}"),
        hint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn envelope_uses_fusion_error_codes() {
        let err = anyhow::Error::new(FusionError::Configuration("bad".to_string()))
            .context("fusing request");
        let envelope = error_envelope(&err);
        assert_eq!(envelope.code, "configuration_error");
        assert!(envelope.message.contains("bad"));
        assert!(envelope.hint.is_some());
    }

    #[test]
    fn envelope_falls_back_for_other_errors() {
        let parse = serde_json::from_str::<FusionRequest>("{").unwrap_err();
        let err = anyhow::Error::new(parse).context("invalid fusion request");
        assert_eq!(error_envelope(&err).code, "invalid_request");
        assert_eq!(error_envelope(&anyhow!("boom")).code, "internal_error");
    }
}
