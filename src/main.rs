use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use codexbar::config::{Config, Settings};
use codexbar::{install, poller};

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging; stdout is reserved for Waybar
    setup_logging(cli.debug);

    if cli.is_install_mode() {
        run_install(&cli)
    } else {
        run_status(&cli)
    }
}

fn run_install(cli: &Config) -> ExitCode {
    let mut settings = match Settings::load(cli.config.as_ref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(1);
        }
    };
    settings.merge_cli(cli);
    settings.validate();

    ExitCode::from(install::run_cli(&settings))
}

fn run_status(cli: &Config) -> ExitCode {
    // Waybar needs a payload even when the config is broken
    let mut settings = Settings::load_or_default(cli.config.as_ref());
    settings.merge_cli(cli);
    settings.validate();

    println!("{}", poller::poll(&settings).to_json());
    ExitCode::SUCCESS
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("codexbar=debug,codexbar_core=debug")
    } else {
        EnvFilter::new("codexbar=warn,codexbar_core=warn")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
