mod cli;

use clap::Parser;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::CatFile(args) => cli::cat_file::run(args)?,
        Command::LsTree(args) => cli::ls_tree::run(args)?,
        Command::IndexPack(args) => cli::index_pack::run(args)?,
        Command::Fetch(args) => cli::fetch::run(args).await?,
    }

    Ok(())
}
