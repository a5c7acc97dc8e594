//! Label verification CLI
//!
//! Drives the verification backend from a terminal: session login, catalog
//! management, DOCX conversion and label submission with word-level diffs
//! of the OCR result.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use verify_client::{ApiClient, AuthEvent, Session};
use verify_core::{ClientConfig, CropRegion};

mod commands;
mod output;

/// Command-line arguments for the verification client
#[derive(Parser, Debug)]
#[command(name = "verify-cli")]
#[command(about = "Compare label documents against photographed labels")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Obtain a bearer token
    Login {
        #[arg(short, long)]
        username: String,

        /// Falls back to VERIFY_PASSWORD
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Show the logged-in user
    Whoami,

    /// List verifications, newest first
    List {
        /// Case-insensitive name filter
        #[arg(short, long)]
        search: Option<String>,
    },

    Create { name: String },

    Rename { id: String, name: String },

    Delete { id: String },

    /// Show a verification with its field diffs
    Show { id: String },

    /// Convert a DOCX to PDF and report its pages
    Convert {
        docx: PathBuf,

        /// Write the converted PDF here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Upload document and image for OCR verification
    Submit {
        id: String,

        /// Uses the stored document when omitted
        #[arg(long)]
        docx: Option<PathBuf>,

        /// Uses the stored image when omitted
        #[arg(long)]
        image: Option<PathBuf>,

        /// Crop region in percent: x,y,width,height
        #[arg(long, value_parser = parse_region)]
        region: Option<CropRegion>,
    },

    /// Diff two strings the way field comparisons are shown
    Diff { document: String, ocr: String },
}

fn parse_region(s: &str) -> Result<CropRegion, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in region: {}", e))?;
    match values[..] {
        [x, y, width, height] => Ok(CropRegion::new(x, y, width, height)),
        _ => Err(format!("expected x,y,width,height, got {} values", values.len())),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("{}", output::error_message(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = ClientConfig::load(args.config.as_deref())?;

    let session = Arc::new(match &config.token {
        Some(token) => Session::with_token(token.clone()),
        None => Session::new(),
    });
    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event == AuthEvent::Expired {
                tracing::warn!("Stored credential rejected by the backend");
            }
        }
    });

    let client = Arc::new(ApiClient::new(config.client_options(), session)?);
    let ctx = commands::Context { client, config };

    match args.command {
        Command::Login { username, password } => {
            let password = password
                .or_else(|| std::env::var("VERIFY_PASSWORD").ok())
                .ok_or_else(|| anyhow::anyhow!("password required (--password or VERIFY_PASSWORD)"))?;
            commands::login(&ctx, &username, &password).await
        }
        Command::Whoami => commands::whoami(&ctx).await,
        Command::List { search } => commands::list(&ctx, search.as_deref()).await,
        Command::Create { name } => commands::create(&ctx, &name).await,
        Command::Rename { id, name } => commands::rename(&ctx, &id.into(), &name).await,
        Command::Delete { id } => commands::delete(&ctx, &id.into()).await,
        Command::Show { id } => commands::show(&ctx, &id.into()).await,
        Command::Convert { docx, out } => commands::convert(&ctx, &docx, out.as_deref()).await,
        Command::Submit {
            id,
            docx,
            image,
            region,
        } => {
            let inputs = commands::SubmitInputs {
                docx,
                image,
                region,
            };
            commands::submit(&ctx, &id.into(), inputs).await
        }
        Command::Diff { document, ocr } => {
            output::print_diff(&verify_core::compute_diff(&document, &ocr));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_region() {
        assert_eq!(
            parse_region("10, 20,30,40").unwrap(),
            CropRegion::new(10.0, 20.0, 30.0, 40.0)
        );
        assert!(parse_region("10,20,30").is_err());
        assert!(parse_region("a,b,c,d").is_err());
    }

    #[test]
    fn test_submit_args() {
        let args = Args::try_parse_from([
            "verify-cli",
            "-v",
            "submit",
            "12",
            "--image",
            "label.jpg",
            "--region",
            "5,5,50,50",
        ])
        .unwrap();
        assert!(args.verbose);
        match args.command {
            Command::Submit {
                id,
                docx,
                image,
                region,
            } => {
                assert_eq!(id, "12");
                assert_eq!(docx, None);
                assert_eq!(image, Some(PathBuf::from("label.jpg")));
                assert_eq!(region, Some(CropRegion::new(5.0, 5.0, 50.0, 50.0)));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
