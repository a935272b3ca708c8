use std::path::PathBuf;

use clap::Args as ClapArgs;

use git_core::pack::genidx::pack_to_idx;
use git_core::Result;

#[derive(ClapArgs)]
pub struct Args {
    /// path to the `.pack` file to index.
    pub pack_path: PathBuf,
}

pub fn run(args: Args) -> Result<()> {
    let pack_data = std::fs::read(&args.pack_path)?;
    let idx = pack_to_idx(&pack_data)?;
    let idx_path = args.pack_path.with_extension("idx");
    std::fs::write(&idx_path, &idx)?;
    tracing::info!(path = %idx_path.display(), objects_bytes = idx.len(), "wrote pack index");
    Ok(())
}
