use std::path::PathBuf;

use clap::Args as ClapArgs;

use git_core::object::Decoded;
use git_core::{open_repository, ObjectId, Result};

#[derive(ClapArgs)]
pub struct Args {
    /// Path to the repository root (containing `.git`).
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,
    /// sha1 of the object to print.
    pub sha: String,
}

pub fn run(args: Args) -> Result<()> {
    let repo = open_repository(&args.repo)?;
    let sha = ObjectId::from_hex(&args.sha)?;
    let resolved = repo.cat(&sha)?;

    match resolved.decoded {
        Decoded::Blob(data) => {
            use std::io::Write;
            std::io::stdout().write_all(&data)?;
        }
        Decoded::Commit(commit) => {
            println!("tree {}", commit.tree);
            for parent in commit.parent.as_slice() {
                println!("parent {parent}");
            }
            println!("author {} <{}> {}", commit.author_name, commit.author_email, commit.author_time);
            println!(
                "committer {} <{}> {}",
                commit.committer_name, commit.committer_email, commit.committer_time
            );
            println!();
            println!("{}", commit.message);
        }
        Decoded::Tree(tree) => {
            for entry in tree.entries {
                println!(
                    "{} {}",
                    String::from_utf8_lossy(&entry.mode),
                    entry.name
                );
            }
        }
        Decoded::Tag(tag) => {
            println!("object {}", tag.object);
            println!("type {}", tag.object_type);
            println!("tag {}", tag.tag);
            println!("tagger {} <{}> {}", tag.tagger_name, tag.tagger_email, tag.tagger_time);
            println!();
            println!("{}", tag.message);
        }
    }

    Ok(())
}
