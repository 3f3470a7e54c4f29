//! 常用类型与函数.

pub use crate::input::{prepare_input_array, NetInput};
pub use crate::locate::original_image;
pub use crate::log::Logger;
pub use crate::model::{best_model_path, onnx_model_path, Model, ModelError};
pub use crate::params::global::{replace_params, script_params, set_params_path};
pub use crate::params::{NetworkDesign, Params};
pub use crate::patch::{extract_patch, extract_patches, pad};
pub use crate::predict::{predict_on_indices, predict_on_indices_with, BatchProgress};
pub use crate::volume::{read_volume, write_npy};

#[cfg(feature = "onnx")]
pub use crate::model::{load_best_model, OnnxModel};
