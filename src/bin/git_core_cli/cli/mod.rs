//! CLI subcommands, each a thin wrapper over the library surface.

pub mod cat_file;
pub mod fetch;
pub mod index_pack;
pub mod ls_tree;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "git-core-cli", about = "Git object store reader and wire-protocol fetch client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print a decoded object from a repository's object store.
    CatFile(cat_file::Args),
    /// List the entries of a tree object.
    LsTree(ls_tree::Args),
    /// Rebuild a `.idx` file from a `.pack` file.
    IndexPack(index_pack::Args),
    /// Fetch a pack over git:// and index it.
    Fetch(fetch::Args),
}
