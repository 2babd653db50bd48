use clap::Parser;
use config::Config;
use orchestrator::Output;
use pedump::{cli::Cli, error::Error};
use std::io::{self, Write};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(cli.log_level().into())
                .from_env_lossy(),
        )
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(io::stderr)
        .init();

    debug!(config = ?cli);

    let mut config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        _ => Config::from_env()?,
    };
    cli.apply(&mut config);
    config.validate()?;

    let mut stdout = io::stdout().lock();
    if cli.dump_config {
        stdout
            .write_all(config.to_toml()?.as_bytes())
            .map_err(Error::Stdout)?;
        return Ok(());
    }

    let target = cli.target()?;
    let output = if config.scan.quiet {
        Output::quiet()
    } else {
        writeln!(stdout, "pedump [{}]", env!("CARGO_PKG_VERSION")).map_err(Error::Stdout)?;
        Output::stdout()
    };
    drop(stdout);

    let system = memory::native();
    // The warned report goes to stdout even when per-image output is quiet.
    let summary = orchestrator::run(
        &config,
        target,
        system.as_ref(),
        output,
        &mut io::stdout(),
    )
    .map_err(Error::from)?;
    debug!(?summary, "done");
    Ok(())
}
