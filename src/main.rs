use clap::Parser;
use dash_sampler::browser::chrome::{ChromeDriver, ConnectionMode};
use dash_sampler::error::Result;
use dash_sampler::sampler::{capture, SamplerConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Experiment identifier, used verbatim as the stats file prefix
    #[arg(value_parser = clap::builder::NonEmptyStringValueParser::new())]
    experiment_id: String,

    /// URL of the DASH monitoring page to sample
    webpage: String,

    /// Number of one-second samples to record
    duration: u32,

    /// Directory the stats file is written into
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Path to a Chrome/Chromium executable (default: cached download, then system Chrome)
    #[arg(long)]
    chrome_path: Option<String>,

    /// Pass --no-sandbox to Chrome (containers and other restricted environments)
    #[arg(long)]
    no_sandbox: bool,

    /// Run Chrome headless
    #[arg(long)]
    headless: bool,

    /// Attach to an existing Chrome on this debug port instead of launching one
    #[arg(long)]
    debug_port: Option<u16>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    match run(args).await {
        Ok(path) => {
            log::info!("Stats written to {}", path.display());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(args: Args) -> Result<PathBuf> {
    let mode = match args.debug_port {
        Some(port) => ConnectionMode::DebugPort(port),
        None => ConnectionMode::Sandboxed {
            chrome_path: args.chrome_path,
            no_sandbox: args.no_sandbox,
            headless: args.headless,
        },
    };

    let driver = ChromeDriver::new(mode).await?;

    let mut config = SamplerConfig::new(args.experiment_id, args.webpage, args.duration);
    config.output_dir = args.output_dir;

    let outcome = capture(&driver, &config).await;

    // A completed capture stays on disk even if teardown hiccups; a failed one
    // has already had its partial file removed.
    if let Err(e) = driver.close().await {
        log::warn!("Browser close failed: {}", e);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn parses_three_positional_arguments() {
        let args =
            Args::try_parse_from(["dash-sampler", "exp1", "http://host/page", "30"]).unwrap();
        assert_eq!(args.experiment_id, "exp1");
        assert_eq!(args.webpage, "http://host/page");
        assert_eq!(args.duration, 30);
        assert_eq!(args.output_dir, PathBuf::from("."));
        assert!(!args.no_sandbox);
        assert!(args.debug_port.is_none());
    }

    #[test]
    fn fewer_than_three_arguments_is_a_usage_error() {
        for argv in [
            vec!["dash-sampler"],
            vec!["dash-sampler", "exp1"],
            vec!["dash-sampler", "exp1", "http://host/page"],
        ] {
            let err = Args::try_parse_from(argv).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn empty_experiment_id_is_rejected() {
        let err =
            Args::try_parse_from(["dash-sampler", "", "http://host/page", "30"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn non_numeric_duration_is_rejected() {
        let err =
            Args::try_parse_from(["dash-sampler", "exp1", "http://host/page", "soon"])
                .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn browser_flags_are_accepted() {
        let args = Args::try_parse_from([
            "dash-sampler",
            "exp1",
            "http://host/page",
            "10",
            "--no-sandbox",
            "--headless",
            "--output-dir",
            "/tmp/runs",
        ])
        .unwrap();
        assert!(args.no_sandbox);
        assert!(args.headless);
        assert_eq!(args.output_dir, PathBuf::from("/tmp/runs"));
    }
}
