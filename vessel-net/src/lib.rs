#![warn(missing_docs)]

//! 血管分割网络的推理辅助库. 负责参数管理、反射填充与 patch 提取、
//! 网络输入准备、分批预测、原始图像定位以及日志输出.
//!
//! 网络的训练不在本 crate 范围内. 模型由训练侧保存到
//! `{OUTPUT_DATA_ROOT}/NetProto/` 下, 本 crate 只负责加载和调用.
//!
//! # 注意
//!
//! 1. 所有函数都显式接受 [`Params`]. 需要进程内共享参数时使用 [`params::global`].
//! 2. 图像数组的轴序总是最慢变化的轴在前 (`z, y, x`), patch 索引也按此顺序给出.
//! 3. 模型推理依赖 ONNX Runtime, 需开启 `onnx` feature.
//!
//! # 开发计划
//!
//! ### 参数文件读取与进程级参数上下文 ✅
//!
//! 实现位于 `vessel-net/src/params`.
//!
//! ### 反射填充与 patch 提取 ✅
//!
//! 支持 `xyz` (三个正交切片) 与 `full3d` (完整立方体) 两种网络结构.
//!
//! 实现位于 `vessel-net/src/patch.rs`.
//!
//! ### 分批预测 ✅
//!
//! 每批完成后输出进度与得分统计.
//!
//! 实现位于 `vessel-net/src/predict.rs`.
//!
//! ### MetaImage / nifti / npy 读取 ✅
//!
//! 实现位于 `vessel-net/src/volume`.
//!
//! ### 直接加载 HDF5 格式的 Keras 模型 ⌛️
//!
//! 目前需要先导出为 ONNX.

pub mod consts;
pub mod db;
pub mod fs;
pub mod input;
pub mod locate;
pub mod log;
pub mod model;
pub mod params;
pub mod patch;
pub mod predict;
pub mod prelude;
pub mod volume;

pub use input::NetInput;
pub use model::Model;
pub use params::{NetworkDesign, Params};
