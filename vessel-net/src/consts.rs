//! 通用常量.

/// 参数文件的默认文件名.
pub const PARAMS_FILE_NAME: &str = "params.json";

/// 指定参数文件路径的环境变量名.
pub const PARAMS_ENV_VAR: &str = "VESSEL_NET_PARAMS";

/// 数据目录下 SQLite 数据库的文件名.
pub const DB_FILE_NAME: &str = "data.sqlite3";

/// `OUTPUT_DATA_ROOT` 下存放网络模型的子目录.
pub const NET_PROTO_DIR: &str = "NetProto";

/// 最优模型文件名. 由训练侧的 Keras 写出.
pub const BEST_MODEL_FILE_NAME: &str = "net_best.hdf5";

/// 最优模型导出为 ONNX 后的扩展名.
pub const ONNX_EXTENSION: &str = "onnx";

/// 模型输出中代表 "血管" (正类) 的列.
pub const POSITIVE_CLASS: usize = 1;

/// 原始图像的文件名后缀 glob. 匹配 `.mha` 和 `.mhd`.
pub const ORIGINAL_IMAGE_SUFFIX: &str = ".mh[ad]";

/// 内置默认参数.
pub mod defaults {
    /// 默认 patch 半径.
    pub const PATCH_RADIUS: usize = 16;

    /// 默认输入数据根目录.
    pub const INPUT_DATA_ROOT: &str = "input";

    /// 默认输出数据根目录.
    pub const OUTPUT_DATA_ROOT: &str = "output";
}
