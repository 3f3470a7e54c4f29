//! 预测结果摘要.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SEP: &str = "--------------------------------------------------------";

/// 判为血管的得分阈值.
const VESSEL_THRESHOLD: f32 = 0.5;

/// 一次预测的摘要.
#[derive(Debug)]
pub struct PredictionSummary {
    name_key: String,
    image: PathBuf,
    shape: Vec<usize>,
    count: usize,
    batch_size: usize,
    elapsed: Duration,
    min: Option<f32>,
    max: Option<f32>,
    mean: Option<f64>,
    vessels: usize,
    output: PathBuf,
    log: PathBuf,
}

impl PredictionSummary {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name_key: &str,
        image: &Path,
        shape: &[usize],
        batch_size: usize,
        elapsed: Duration,
        scores: &[f32],
        output: &Path,
        log: &Path,
    ) -> Self {
        let (min, max) = scores.iter().fold((None, None), |(lo, hi): (Option<f32>, Option<f32>), &v| {
            (
                Some(lo.map_or(v, |lo| lo.min(v))),
                Some(hi.map_or(v, |hi| hi.max(v))),
            )
        });
        let mean = (!scores.is_empty())
            .then(|| scores.iter().map(|&v| v as f64).sum::<f64>() / scores.len() as f64);

        Self {
            name_key: name_key.to_string(),
            image: image.to_owned(),
            shape: shape.to_vec(),
            count: scores.len(),
            batch_size,
            elapsed,
            min,
            max,
            mean,
            vessels: scores.iter().filter(|&&v| v >= VESSEL_THRESHOLD).count(),
            output: output.to_owned(),
            log: log.to_owned(),
        }
    }

    /// 将摘要写进 `w` 中.
    pub fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        const S4: &str = "    ";

        #[inline]
        fn to_display<T: std::fmt::Display>(v: Option<T>) -> String {
            match v {
                Some(v) => format!("{v:.6}"),
                None => "/".to_string(),
            }
        }

        writeln!(w, "Prediction `{}`:", self.name_key)?;
        writeln!(w, "{S4}Original image: {}", self.image.display())?;
        writeln!(w, "{S4}Image shape: {:?}", self.shape)?;
        writeln!(w, "{S4}Predicted voxels: {}", self.count)?;
        writeln!(w, "{S4}Batch size: {}", self.batch_size)?;
        writeln!(w, "{S4}Elapsed: {} ms", self.elapsed.as_millis())?;
        writeln!(w, "{S4}Min score: {}", to_display(self.min))?;
        writeln!(w, "{S4}Max score: {}", to_display(self.max))?;
        writeln!(w, "{S4}Mean score: {}", to_display(self.mean))?;
        writeln!(
            w,
            "{S4}Scores >= {VESSEL_THRESHOLD}: {} of {}",
            self.vessels, self.count
        )?;
        writeln!(w, "{S4}Scores: {}", self.output.display())?;
        write!(w, "{S4}Log: {}", self.log.display())?;
        Ok(())
    }

    /// 打印摘要.
    pub fn print(&self) {
        let mut buf = Vec::with_capacity(512);
        println!("{SEP}");
        // 写入 `Vec` 不会失败.
        if self.describe_into(&mut buf).is_ok() {
            println!("{}", String::from_utf8_lossy(&buf));
        }
        println!("{SEP}");
    }
}
