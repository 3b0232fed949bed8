use clap::Parser;

mod cli;
mod commands;
mod mutations;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = commands::load_config(&cli)?;
    init_tracing(&config.log.level, cli.verbose)?;
    commands::run_command(cli, config)
}

fn init_tracing(level: &str, verbose: bool) -> anyhow::Result<()> {
    let level: tracing::Level = if verbose {
        tracing::Level::DEBUG
    } else {
        level
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid log level {level:?}"))?
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
