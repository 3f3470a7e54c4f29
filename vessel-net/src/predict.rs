//! 分批预测.

use crate::consts::POSITIVE_CLASS;
use crate::input::{prepare_input_array, InputError};
use crate::model::{Model, ModelError};
use crate::params::Params;
use crate::patch::{extract_patches, PatchError};
use ndarray::{Array1, ArrayBase, Axis, Data, Dimension};
use num::traits::AsPrimitive;
use ordered_float::OrderedFloat;
use std::fmt;

/// 分批预测错误. 任何一批失败都会中止整个预测, 不做重试.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    /// 批大小为 0.
    #[error("batch size must be positive")]
    ZeroBatchSize,

    /// 提取 patch 失败.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// 准备网络输入失败.
    #[error(transparent)]
    Input(#[from] InputError),

    /// 模型调用失败.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// 模型输出的行数与批大小不符, 或没有正类所在的列.
    #[error("model returned shape {shape:?} for a batch of {batch}")]
    OutputShape {
        /// 批大小.
        batch: usize,
        /// 模型输出形状.
        shape: Vec<usize>,
    },
}

/// 单批预测完成后的进度与得分统计.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BatchProgress {
    /// 已完成的索引个数 (含本批).
    pub done: usize,

    /// 索引总数.
    pub total: usize,

    /// 本批正类得分最小值.
    pub min: f32,

    /// 本批正类得分最大值.
    pub max: f32,

    /// 本批正类得分平均值.
    pub mean: f32,
}

impl BatchProgress {
    /// 从本批得分计算统计. `scores` 不能为空.
    fn new(done: usize, total: usize, scores: &[f32]) -> Self {
        debug_assert!(!scores.is_empty());
        let min = scores.iter().copied().map(OrderedFloat).min().map_or(f32::NAN, |v| v.0);
        let max = scores.iter().copied().map(OrderedFloat).max().map_or(f32::NAN, |v| v.0);
        let sum: f64 = scores.iter().map(|&v| v as f64).sum();
        Self {
            done,
            total,
            min,
            max,
            mean: (sum / scores.len() as f64) as f32,
        }
    }

    /// 完成百分比.
    #[inline]
    pub fn percent(&self) -> f64 {
        100.0 * self.done as f64 / self.total as f64
    }
}

impl fmt::Display for BatchProgress {
    /// 形如 `\t 37.50% 0.0012, 0.9871, 0.2310`, 后三项依次为最小值、最大值、平均值.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\t {:.2}% {:.4}, {:.4}, {:.4}",
            self.percent(),
            self.min,
            self.max,
            self.mean
        )
    }
}

/// 以 `indices` (相对未填充原图) 为中心, 在已填充图像 `padded` 上分批预测.
///
/// 每批完成后通过 `tracing` 输出一行进度, 见 [`BatchProgress`].
/// 返回值按 `indices` 的顺序给出每个索引的正类得分.
///
/// # 注意
///
/// `indices` 为空时不调用模型, 也不输出进度, 直接返回空数组.
pub fn predict_on_indices<M, A, S, D, I>(
    model: &mut M,
    padded: &ArrayBase<S, D>,
    indices: &[I],
    batch_size: usize,
    params: &Params,
) -> Result<Array1<f32>, PredictError>
where
    M: Model + ?Sized,
    A: AsPrimitive<f64> + Send + Sync,
    S: Data<Elem = A>,
    D: Dimension,
    I: AsRef<[usize]> + Sync,
{
    predict_on_indices_with(model, padded, indices, batch_size, params, |p| {
        tracing::info!("{p}");
    })
}

/// 与 [`predict_on_indices`] 相同, 但每批完成后调用 `on_batch` 而非输出日志.
pub fn predict_on_indices_with<M, A, S, D, I, F>(
    model: &mut M,
    padded: &ArrayBase<S, D>,
    indices: &[I],
    batch_size: usize,
    params: &Params,
    mut on_batch: F,
) -> Result<Array1<f32>, PredictError>
where
    M: Model + ?Sized,
    A: AsPrimitive<f64> + Send + Sync,
    S: Data<Elem = A>,
    D: Dimension,
    I: AsRef<[usize]> + Sync,
    F: FnMut(&BatchProgress),
{
    if batch_size == 0 {
        return Err(PredictError::ZeroBatchSize);
    }
    let (radius, design) = (params.patch_radius, params.network_design);

    let mut predictions = Vec::with_capacity(indices.len());
    for chunk in indices.chunks(batch_size) {
        let patches = extract_patches(padded, chunk, radius, design)?;
        let input = prepare_input_array(&patches, design)?;
        let out = model.predict_on_batch(&input)?;

        if out.nrows() != chunk.len() || out.ncols() <= POSITIVE_CLASS {
            return Err(PredictError::OutputShape {
                batch: chunk.len(),
                shape: out.shape().to_vec(),
            });
        }
        let start = predictions.len();
        predictions.extend(out.index_axis(Axis(1), POSITIVE_CLASS).iter().copied());

        on_batch(&BatchProgress::new(
            predictions.len(),
            indices.len(),
            &predictions[start..],
        ));
    }
    Ok(Array1::from(predictions))
}
