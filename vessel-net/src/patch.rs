//! 反射填充与 patch 提取.
//!
//! 原图先经 [`pad`] 在每个轴两侧各填充 `W` 个反射像素, 之后即可在
//! 原图任意体素 (包括边界) 处以 [`extract_patch`] 提取 patch,
//! 不会越界. 索引总是相对于 **未填充** 的原图.

use crate::params::NetworkDesign;
use ndarray::{stack, ArrayBase, ArrayD, ArrayViewD, Axis, Data, Dimension, ShapeError, Slice};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;
    }
}

/// 提取 patch 错误.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatchError {
    /// 索引维数与图像维数不符.
    #[error("expected {expected} indices, got {got}")]
    DimensionMismatch {
        /// 图像维数.
        expected: usize,
        /// 实际索引个数.
        got: usize,
    },

    /// patch 超出已填充图像的范围. 通常说明图像未经 [`pad`] 或半径不一致.
    #[error("patch at {indices:?} with radius {radius} exceeds padded shape {shape:?}")]
    OutOfBounds {
        /// 中心索引 (相对未填充图像).
        indices: Vec<usize>,
        /// patch 半径.
        radius: usize,
        /// 已填充图像形状.
        shape: Vec<usize>,
    },

    /// 对零维图像提取 patch.
    #[error("cannot extract patches from a zero-dimensional image")]
    ZeroDimensional,

    /// 无法反射填充长度为 0 的轴.
    #[error("cannot pad empty axis {0}")]
    EmptyAxis(usize),

    /// 批量提取时没有任何索引.
    #[error("no indices to extract patches at")]
    EmptyBatch,

    /// 堆叠 patch 时形状不一致.
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// 反射填充: 在每个轴两侧各填充 `radius` 个元素.
///
/// 反射不重复边缘元素, 即 `[1, 2, 3]` 填充 2 得到 `[3, 2, 1, 2, 3, 2, 1]`.
/// `radius` 大于轴长时继续往返反射; 长度为 1 的轴则重复唯一的元素.
///
/// # 返回值
///
/// 每个轴都比原图长 `2 * radius` 的新数组. 原图某个轴长度为 0 时返回 `Err`.
pub fn pad<A, S, D>(im: &ArrayBase<S, D>, radius: usize) -> Result<ArrayD<A>, PatchError>
where
    A: Clone,
    S: Data<Elem = A>,
    D: Dimension,
{
    if let Some(axis) = im.shape().iter().position(|&n| n == 0) {
        return Err(PatchError::EmptyAxis(axis));
    }

    let mut ans = im.view().into_dyn().to_owned();
    for (axis, &len) in im.shape().iter().enumerate() {
        let src: Vec<usize> = (0..len + 2 * radius)
            .map(|p| reflect_index(p, radius, len))
            .collect();
        ans = ans.select(Axis(axis), &src);
    }
    Ok(ans)
}

/// 已填充坐标 `p` 在长度为 `len` 的原轴上对应的位置.
#[inline]
fn reflect_index(p: usize, radius: usize, len: usize) -> usize {
    debug_assert!(len > 0);
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1) as isize;
    let m = (p as isize - radius as isize).rem_euclid(period);
    if m >= len as isize {
        (period - m) as usize
    } else {
        m as usize
    }
}

/// 在已填充图像 `padded` 上, 以原图索引 `indices` 为中心提取 patch.
///
/// 设原图为 N 维, 边长 `L = 2 * radius + 1`:
///
/// - [`NetworkDesign::Xyz`]: 对每个轴 `i`, 取固定轴 `i` 于中心的 (N-1) 维切片,
///   沿新的末轴堆叠, 形状为 `(L, ..., L, N)`. 三维时即 `(L, L, 3)`.
/// - [`NetworkDesign::Full3d`]: 完整的 N 维立方体, 形状为 `(L, ..., L)`.
///
/// `padded` 必须是用相同 `radius` 调用 [`pad`] 的结果, 否则可能返回
/// [`PatchError::OutOfBounds`], 或者得到偏移的 patch.
pub fn extract_patch<A, S, D>(
    padded: &ArrayBase<S, D>,
    indices: &[usize],
    radius: usize,
    design: NetworkDesign,
) -> Result<ArrayD<A>, PatchError>
where
    A: Clone,
    S: Data<Elem = A>,
    D: Dimension,
{
    let cube = patch_cube(padded.view().into_dyn(), indices, radius)?;
    match design {
        NetworkDesign::Full3d => Ok(cube.to_owned()),
        NetworkDesign::Xyz => {
            let slices: Vec<ArrayViewD<A>> = (0..cube.ndim())
                .map(|axis| cube.index_axis(Axis(axis), radius))
                .collect();
            let last = cube.ndim() - 1;
            Ok(stack(Axis(last), &slices)?)
        }
    }
}

/// 批量提取 patch, 并沿新的首轴堆叠. 输出顺序与 `indices` 相同.
///
/// 开启 `rayon` feature 时并行提取.
pub fn extract_patches<A, S, D, I>(
    padded: &ArrayBase<S, D>,
    indices: &[I],
    radius: usize,
    design: NetworkDesign,
) -> Result<ArrayD<A>, PatchError>
where
    A: Clone + Send + Sync,
    S: Data<Elem = A>,
    D: Dimension,
    I: AsRef<[usize]> + Sync,
{
    if indices.is_empty() {
        return Err(PatchError::EmptyBatch);
    }
    let view = padded.view().into_dyn();

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            let patches: Result<Vec<ArrayD<A>>, PatchError> = indices
                .par_iter()
                .map(|idx| extract_patch(&view, idx.as_ref(), radius, design))
                .collect();
        } else {
            let patches: Result<Vec<ArrayD<A>>, PatchError> = indices
                .iter()
                .map(|idx| extract_patch(&view, idx.as_ref(), radius, design))
                .collect();
        }
    }

    let patches = patches?;
    let views: Vec<ArrayViewD<A>> = patches.iter().map(|p| p.view()).collect();
    Ok(stack(Axis(0), &views)?)
}

/// 以原图索引 `indices` 为中心、边长 `2 * radius + 1` 的立方体视图.
fn patch_cube<'a, A>(
    padded: ArrayViewD<'a, A>,
    indices: &[usize],
    radius: usize,
) -> Result<ArrayViewD<'a, A>, PatchError> {
    if padded.ndim() == 0 {
        return Err(PatchError::ZeroDimensional);
    }
    if indices.len() != padded.ndim() {
        return Err(PatchError::DimensionMismatch {
            expected: padded.ndim(),
            got: indices.len(),
        });
    }
    let side = 2 * radius + 1;
    let fits = indices
        .iter()
        .zip(padded.shape())
        .all(|(&x, &len)| x.checked_add(side).is_some_and(|end| end <= len));
    if !fits {
        return Err(PatchError::OutOfBounds {
            indices: indices.to_vec(),
            radius,
            shape: padded.shape().to_vec(),
        });
    }

    let mut cube = padded;
    cube.slice_each_axis_inplace(|ax| {
        let x = indices[ax.axis.index()];
        Slice::from(x..x + side)
    });
    Ok(cube)
}
