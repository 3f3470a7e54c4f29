//! 将一批 patch 转换为网络输入.

use crate::params::NetworkDesign;
use ndarray::{ArrayBase, ArrayD, Axis, Data, Dimension};
use num::traits::AsPrimitive;

/// 准备网络输入错误.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum InputError {
    /// 批数组维数过少. `xyz` 结构至少需要 `(B, C)` 两个轴.
    #[error("batch of shape {0:?} has no channel axis to separate")]
    NoChannelAxis(Vec<usize>),
}

/// 网络输入.
#[derive(Clone, Debug, PartialEq)]
pub enum NetInput {
    /// `xyz` 结构: 每个空间轴一个形如 `(B, L, L, 1)` 的输入, 按轴序排列.
    Xyz(Vec<ArrayD<f64>>),

    /// `full3d` 结构: 单个形如 `(B, L, L, L, 1)` 的输入.
    Full3d(ArrayD<f64>),
}

impl NetInput {
    /// 按网络输入顺序迭代所有输入数组.
    pub fn arrays(&self) -> impl ExactSizeIterator<Item = &ArrayD<f64>> {
        match self {
            Self::Xyz(v) => v.iter(),
            Self::Full3d(a) => std::slice::from_ref(a).iter(),
        }
    }

    /// 批大小.
    #[inline]
    pub fn batch_len(&self) -> usize {
        self.arrays().next().map_or(0, |a| a.len_of(Axis(0)))
    }
}

/// 将数据转换为网络使用的 `f64`.
#[inline]
pub fn scale_net_input_data<A, S, D>(data: &ArrayBase<S, D>) -> ArrayD<f64>
where
    A: AsPrimitive<f64>,
    S: Data<Elem = A>,
    D: Dimension,
{
    data.view().into_dyn().mapv(|v| v.as_())
}

/// 将 `(..., C)` 数组拆分为 `C` 个 `(..., 1)` 数组.
///
/// 输入为零维时返回空 `Vec`.
pub fn separate_channels<A, S, D>(im: &ArrayBase<S, D>) -> Vec<ArrayD<A>>
where
    A: Clone,
    S: Data<Elem = A>,
    D: Dimension,
{
    let im = im.view().into_dyn();
    let Some(last) = im.ndim().checked_sub(1) else {
        return vec![];
    };
    im.axis_iter(Axis(last))
        .map(|channel| channel.insert_axis(Axis(last)).to_owned())
        .collect()
}

/// 将一批 patch (首轴为批轴) 转换为网络输入.
///
/// - [`NetworkDesign::Xyz`]: `(B, ..., C)` 拆分为 `C` 个 `(B, ..., 1)` 的 `f64` 数组.
/// - [`NetworkDesign::Full3d`]: 只在末尾加一个单例通道轴并转为 `f64`.
pub fn prepare_input_array<A, S, D>(
    batch: &ArrayBase<S, D>,
    design: NetworkDesign,
) -> Result<NetInput, InputError>
where
    A: AsPrimitive<f64>,
    S: Data<Elem = A>,
    D: Dimension,
{
    match design {
        NetworkDesign::Xyz => {
            if batch.ndim() < 2 {
                return Err(InputError::NoChannelAxis(batch.shape().to_vec()));
            }
            let scaled = scale_net_input_data(batch);
            Ok(NetInput::Xyz(separate_channels(&scaled)))
        }
        NetworkDesign::Full3d => {
            let scaled = scale_net_input_data(batch);
            let last = scaled.ndim();
            Ok(NetInput::Full3d(scaled.insert_axis(Axis(last))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{prepare_input_array, separate_channels, InputError, NetInput};
    use crate::params::NetworkDesign;
    use ndarray::{Array, Array1, ArrayD, Axis, IxDyn};

    fn batch(shape: &[usize]) -> ArrayD<u16> {
        let n: usize = shape.iter().product();
        Array::from_iter(0..n as u16)
            .into_shape(IxDyn(shape))
            .unwrap()
    }

    #[test]
    fn test_separate_channels() {
        let im = batch(&[2, 3, 4]);
        let parts = separate_channels(&im);
        assert_eq!(parts.len(), 4);
        for (c, p) in parts.iter().enumerate() {
            assert_eq!(p.shape(), &[2, 3, 1]);
            assert_eq!(p.index_axis(Axis(2), 0), im.index_axis(Axis(2), c));
        }
    }

    #[test]
    fn test_prepare_xyz() {
        // (B, 2W+1, 2W+1, N) with B = 4, W = 2, N = 3.
        let b = batch(&[4, 5, 5, 3]);
        let NetInput::Xyz(parts) = prepare_input_array(&b, NetworkDesign::Xyz).unwrap() else {
            panic!("xyz design must give one input per axis");
        };
        assert_eq!(parts.len(), 3);
        for (c, p) in parts.iter().enumerate() {
            assert_eq!(p.shape(), &[4, 5, 5, 1]);
            let expected = b.index_axis(Axis(3), c).mapv(f64::from);
            assert_eq!(p.index_axis(Axis(3), 0), expected);
        }
    }

    #[test]
    fn test_prepare_full3d() {
        let b = batch(&[2, 3, 3, 3]);
        let input = prepare_input_array(&b, NetworkDesign::Full3d).unwrap();
        assert_eq!(input.batch_len(), 2);
        let NetInput::Full3d(a) = input else {
            panic!("full3d design must give a single input");
        };
        assert_eq!(a.shape(), &[2, 3, 3, 3, 1]);
        assert_eq!(a.index_axis(Axis(4), 0), b.mapv(f64::from));
    }

    #[test]
    fn test_prepare_xyz_without_channels() {
        let b = Array1::<f32>::zeros(3);
        assert_eq!(
            prepare_input_array(&b, NetworkDesign::Xyz),
            Err(InputError::NoChannelAxis(vec![3]))
        );
    }

    #[test]
    fn test_net_input_arrays_order() {
        let b = batch(&[1, 3, 3, 2]);
        let input = prepare_input_array(&b, NetworkDesign::Xyz).unwrap();
        assert_eq!(input.arrays().len(), 2);
        assert_eq!(input.batch_len(), 1);
        let firsts: Vec<f64> = input.arrays().map(|a| a[IxDyn(&[0, 0, 0, 0])]).collect();
        assert_eq!(firsts, vec![0.0, 1.0]);
    }
}
