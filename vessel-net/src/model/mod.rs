//! 分割网络模型.
//!
//! 模型由训练侧保存, 本 crate 只负责定位、加载和调用.

use crate::consts::{BEST_MODEL_FILE_NAME, NET_PROTO_DIR, ONNX_EXTENSION};
use crate::input::NetInput;
use crate::params::Params;
use ndarray::Array2;
use std::path::PathBuf;

cfg_if::cfg_if! {
    if #[cfg(feature = "onnx")] {
        mod onnx;

        pub use onnx::OnnxModel;
    }
}

/// 模型加载或推理错误.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// 加载模型失败.
    #[error("failed to load model `{path}`: {message}")]
    Load {
        /// 模型文件路径.
        path: PathBuf,
        /// 底层错误描述.
        message: String,
    },

    /// 推理失败.
    #[error("inference failed: {0}")]
    Inference(String),

    /// 模型输出形状不符合 `(B, 类别数)`.
    #[error("unexpected model output shape {0:?}")]
    OutputShape(Vec<usize>),
}

/// 可以按批预测的模型.
///
/// 输出的每一行对应批中的一个 patch, 每一列对应一个类别的得分.
pub trait Model {
    /// 对一批输入做预测.
    fn predict_on_batch(&mut self, input: &NetInput) -> Result<Array2<f32>, ModelError>;
}

/// 任何形如 `FnMut(&NetInput) -> Result<Array2<f32>, ModelError>` 的闭包都是模型.
/// 便于包装其他推理后端.
impl<F> Model for F
where
    F: FnMut(&NetInput) -> Result<Array2<f32>, ModelError>,
{
    #[inline]
    fn predict_on_batch(&mut self, input: &NetInput) -> Result<Array2<f32>, ModelError> {
        self(input)
    }
}

/// 最优模型路径: `{OUTPUT_DATA_ROOT}/NetProto/net_best.hdf5`.
pub fn best_model_path(params: &Params) -> PathBuf {
    let mut ans = params.output_data_root.join(NET_PROTO_DIR);
    ans.push(BEST_MODEL_FILE_NAME);
    ans
}

/// 最优模型导出为 ONNX 后的路径: `{OUTPUT_DATA_ROOT}/NetProto/net_best.onnx`.
///
/// HDF5 格式的 Keras 模型无法直接在本 crate 中执行, 推理使用与之同名的 ONNX 导出.
#[inline]
pub fn onnx_model_path(params: &Params) -> PathBuf {
    best_model_path(params).with_extension(ONNX_EXTENSION)
}

/// 加载最优模型.
#[cfg(feature = "onnx")]
pub fn load_best_model(params: &Params) -> Result<OnnxModel, ModelError> {
    OnnxModel::open(onnx_model_path(params))
}
