use std::path::PathBuf;

use clap::Args as ClapArgs;

use git_core::object::Decoded;
use git_core::{open_repository, ObjectId, Result};

#[derive(ClapArgs)]
pub struct Args {
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,
    pub sha: String,
    /// print only the entry names, one per line.
    #[arg(long)]
    pub name_only: bool,
}

pub fn run(args: Args) -> Result<()> {
    let repo = open_repository(&args.repo)?;
    let sha = ObjectId::from_hex(&args.sha)?;
    let resolved = repo.cat(&sha)?;

    let Decoded::Tree(tree) = resolved.decoded else {
        return Err(git_core::GitError::object_broken(format!("{sha} is not a tree")));
    };

    for entry in tree.entries {
        if args.name_only {
            println!("{}", entry.name);
        } else {
            println!(
                "{} {}\t{}",
                String::from_utf8_lossy(&entry.mode),
                entry.sha1,
                entry.name
            );
        }
    }

    Ok(())
}
