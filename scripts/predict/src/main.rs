//! 对一幅原始图像做血管分割预测, 将正类得分写为 npy 文件.

mod result;
mod runner;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vessel-predict")]
#[command(about = "Predict vessel scores for one original image")]
pub struct Args {
    /// Name key of the original image, e.g. `Normal-002`
    #[arg(long)]
    name_key: String,

    /// Parameter file (defaults to the usual `params.json` search)
    #[arg(long)]
    params: Option<PathBuf>,

    /// Log file, truncated on start
    #[arg(long, default_value = "vessel-predict.log")]
    log: PathBuf,

    /// Patches per model call
    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    /// `(K, N)` integer npy of voxel indices; every voxel when absent
    #[arg(long)]
    indices: Option<PathBuf>,

    /// Output npy file
    #[arg(long)]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let summary = runner::run(&args)?;
    summary.print();
    Ok(())
}
