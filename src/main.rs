use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use clap::Subcommand;
use mathcheck::lex::SingleTokenError;
use mathcheck::{Config, Lexer, VerificationRequest, VerifyError};
use miette::IntoDiagnostic;
use miette::WrapErr;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mathcheck", about = "Segment mixed math content and check answers")]
struct Args {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    tolerance: Option<f64>,
    /// Keep `\mathbf`, `\left` and friends
    #[arg(long, global = true)]
    no_cosmetic: bool,
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the segments of a content file as JSON
    Segment { filename: PathBuf },
    /// Check a verification request file
    Verify { filename: PathBuf },
    /// Print the tokens of a math expression
    Tokenize { expression: String },
    /// Print the canonical form of a math expression
    Simplify { expression: String },
    /// Parse a generator payload file
    Generated { filename: PathBuf },
}

fn read(filename: &Path) -> miette::Result<String> {
    fs::read_to_string(filename)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading `{}` failed", filename.display()))
}

fn load_config(args: &Args) -> Result<Config, VerifyError> {
    let mut config = match &args.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if let Some(tolerance) = args.tolerance {
        config.tolerance = tolerance;
    }
    if args.no_cosmetic {
        config.strip_cosmetic = false;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    config.validate()?;
    Ok(config)
}

/// Exits with the conventional code for bad input or a timeout; anything
/// else is returned as a diagnostic.
fn exit_on<T>(result: Result<T, VerifyError>) -> miette::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e @ VerifyError::Validation(_)) => {
            eprintln!("{:?}", miette::Report::new(e));
            std::process::exit(65);
        }
        Err(e @ VerifyError::Timeout { .. }) => {
            eprintln!("{:?}", miette::Report::new(e));
            std::process::exit(70);
        }
        Err(e) => Err(e.into()),
    }
}

fn print_json(value: &impl serde::Serialize) -> miette::Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mathcheck=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = exit_on(load_config(&args))?;

    match args.command {
        Commands::Segment { filename } => {
            let content = read(&filename)?;
            let segments = exit_on(mathcheck::parse_content_bounded(&content, &config))?;
            print_json(&segments)?;
        }
        Commands::Verify { filename } => {
            let request: VerificationRequest = exit_on(
                serde_json::from_str(&read(&filename)?)
                    .map_err(|e| VerifyError::Validation(format!("invalid request: {e}"))),
            )?;
            let result = exit_on(mathcheck::verify_bounded(request, &config))?;
            print_json(&result)?;
        }
        Commands::Tokenize { expression } => {
            for token in Lexer::new(None, &expression) {
                let token = match token {
                    Ok(token) => token,
                    Err(e) => {
                        if let Some(single_token_error) = e.downcast_ref::<SingleTokenError>() {
                            eprintln!("Error: Unexpected character: {}", single_token_error.token);
                            eprintln!("{e:?}");
                            std::process::exit(65);
                        }
                        return Err(e);
                    }
                };
                println!("{token}");
            }
            println!("EOF");
        }
        Commands::Simplify { expression } => {
            let normalized = mathcheck::normalize(&expression, &config);
            match mathcheck::simplify(&normalized, &config) {
                Ok(canonical) => println!("{canonical}"),
                Err(e) => {
                    eprintln!("{:?}", miette::Report::new(e));
                    std::process::exit(65);
                }
            }
        }
        Commands::Generated { filename } => {
            let payload = read(&filename)?;
            let generated = exit_on(mathcheck::parse_generated_bounded(&payload, &config))?;
            print_json(&generated)?;
        }
    }
    Ok(())
}
