use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = app_lib::Cli::parse();
    app_lib::init_logging(cli.verbose);
    app_lib::run(cli)
}
