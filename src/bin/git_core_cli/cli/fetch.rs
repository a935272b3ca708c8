use std::path::PathBuf;

use clap::Args as ClapArgs;

use git_core::config::Config;
use git_core::object::ObjectId;
use git_core::pack::genidx::pack_to_idx;
use git_core::wire::payload::FetchPayload;
use git_core::wire::transport::GitTransport;
use git_core::Result;

#[derive(ClapArgs)]
pub struct Args {
    /// `git://host[:port]/path` to fetch from.
    pub url: String,
    /// directory to write `pack-<sha>.pack`/`.idx` into.
    pub out_dir: PathBuf,
    /// sha1s already present locally, to shrink the negotiated pack.
    #[arg(long = "have")]
    pub haves: Vec<String>,
}

pub async fn run(args: Args) -> Result<()> {
    std::fs::create_dir_all(&args.out_dir)?;

    let config = Config::default();
    let transport = GitTransport::new(config);

    let refs = transport.fetch_refs(&args.url).await?;
    tracing::info!(count = refs.len(), "discovered refs");

    let mut payload = FetchPayload::new();
    for sha in refs.keys() {
        payload.add_want(sha, &["multi_ack", "side-band-64k", "ofs-delta"]);
    }
    for have in &args.haves {
        let sha = ObjectId::from_hex(have)?;
        payload.add_have(&sha);
    }
    payload.add_done();

    let pack_path = args.out_dir.join("fetched.pack");
    transport.fetch_pack(&args.url, &payload, &pack_path).await?;

    let pack_data = std::fs::read(&pack_path)?;
    let idx = pack_to_idx(&pack_data)?;
    std::fs::write(pack_path.with_extension("idx"), &idx)?;

    tracing::info!(pack_bytes = pack_data.len(), "fetch complete");
    Ok(())
}
