mod cli;
mod paths;
mod run;
mod scene;

fn main() -> anyhow::Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();
    run::run(cli)
}
