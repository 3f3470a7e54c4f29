//! ONNX Runtime 推理后端.

use super::{Model, ModelError};
use crate::input::NetInput;
use ndarray::Array2;
use ort::logging::LogLevel;
use ort::session::{Session, SessionInputs};
use ort::value::TensorRef;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// 由 ONNX 文件加载的模型.
///
/// 网络输入按模型声明的输入顺序依次对应 [`NetInput::arrays`].
/// 推理以 `f32` 进行; 模型的第一个输出即类别得分.
pub struct OnnxModel {
    session: Session,
    path: PathBuf,
    input_names: Vec<String>,
    output_name: String,
}

impl OnnxModel {
    /// 从 `path` 加载模型.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let load_err = |e: ort::Error| ModelError::Load {
            path: path.to_owned(),
            message: e.to_string(),
        };

        let session = Session::builder()
            .and_then(|b| b.with_log_level(LogLevel::Error))
            .and_then(|b| b.commit_from_file(path))
            .map_err(load_err)?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        let Some(output_name) = session.outputs().first().map(|o| o.name().to_string()) else {
            return Err(ModelError::Load {
                path: path.to_owned(),
                message: "model declares no outputs".to_string(),
            });
        };
        tracing::info!(
            "loaded model {} (inputs: {})",
            path.display(),
            input_names.join(", ")
        );

        Ok(Self {
            session,
            path: path.to_owned(),
            input_names,
            output_name,
        })
    }

    /// 模型文件路径.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 模型声明的输入名.
    #[inline]
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }
}

impl Model for OnnxModel {
    fn predict_on_batch(&mut self, input: &NetInput) -> Result<Array2<f32>, ModelError> {
        if input.arrays().len() != self.input_names.len() {
            return Err(ModelError::Inference(format!(
                "model expects {} inputs, got {}",
                self.input_names.len(),
                input.arrays().len()
            )));
        }

        // 转为 f32 且保证内存连续.
        let arrays: Vec<(Vec<i64>, Vec<f32>)> = input
            .arrays()
            .map(|a| {
                let dims = a.shape().iter().map(|&d| d as i64).collect();
                (dims, a.iter().map(|&v| v as f32).collect())
            })
            .collect();

        let mut values = Vec::with_capacity(arrays.len());
        for (name, (dims, data)) in self.input_names.iter().zip(arrays.iter()) {
            let tensor = TensorRef::from_array_view((dims.clone(), data.as_slice()))
                .map_err(|e| ModelError::Inference(e.to_string()))?;
            values.push((Cow::Borrowed(name.as_str()), tensor.into()));
        }

        let outputs = self
            .session
            .run(SessionInputs::ValueMap(values))
            .map_err(|e| ModelError::Inference(e.to_string()))?;
        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let &[rows, cols] = shape.as_slice() else {
            return Err(ModelError::OutputShape(shape));
        };
        Array2::from_shape_vec((rows, cols), data.to_vec())
            .map_err(|_| ModelError::OutputShape(shape.clone()))
    }
}
