//! 流水线参数.
//!
//! 参数以 JSON 对象存储, 训练脚本和推理脚本共用同一份文件.
//! 本 crate 只关心其中五个键, 其余键原样保留在 [`Params::extra`] 中.

use crate::consts::{defaults, PARAMS_ENV_VAR, PARAMS_FILE_NAME};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

mod design;
pub mod global;

pub use design::{NetworkDesign, UnknownDesign};

/// 读取参数文件错误.
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    /// 无法读取参数文件.
    #[error("cannot read params file `{path}`")]
    Io {
        /// 参数文件路径.
        path: PathBuf,
        /// 底层 I/O 错误.
        #[source]
        source: std::io::Error,
    },

    /// 参数文件不是合法的参数 JSON 对象.
    #[error("invalid params file `{path}`")]
    Json {
        /// 参数文件路径.
        path: PathBuf,
        /// 底层解析错误.
        #[source]
        source: serde_json::Error,
    },
}

/// 流水线参数.
///
/// JSON 键名与训练侧保持一致 (全大写). 五个已知键都是必需的;
/// `NETWORK_DESIGN` 在解析时即转换为 [`NetworkDesign`], 取值非法时解析失败.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Params {
    /// patch 半径 `W` (不含中心). patch 边长为 `2W+1`.
    #[serde(rename = "PATCH_RADIUS")]
    pub patch_radius: usize,

    /// 网络结构.
    #[serde(rename = "NETWORK_DESIGN")]
    pub network_design: NetworkDesign,

    /// 输出数据根目录. 模型保存在其下的 `NetProto` 中.
    #[serde(rename = "OUTPUT_DATA_ROOT")]
    pub output_data_root: PathBuf,

    /// 输入数据根目录.
    #[serde(rename = "INPUT_DATA_ROOT")]
    pub input_data_root: PathBuf,

    /// 每个病例目录下, 原始图像所在的子目录模板. 允许包含 glob 通配符.
    #[serde(rename = "TYPE_SUBDIR_STRUCTURE")]
    pub type_subdir_structure: String,

    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for Params {
    /// 内置默认参数. 找不到可用参数文件时使用.
    fn default() -> Self {
        Self {
            patch_radius: defaults::PATCH_RADIUS,
            network_design: NetworkDesign::default(),
            output_data_root: PathBuf::from(defaults::OUTPUT_DATA_ROOT),
            input_data_root: PathBuf::from(defaults::INPUT_DATA_ROOT),
            type_subdir_structure: String::new(),
            extra: Map::new(),
        }
    }
}

impl Params {
    /// 从 JSON 字符串解析参数.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// 从 `path` 处的 JSON 文件读取参数.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ParamsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ParamsError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|source| ParamsError::Json {
            path: path.to_owned(),
            source,
        })
    }

    /// 按默认搜索顺序加载参数.
    ///
    /// 依次尝试 [`default_params_candidates`] 中第一个存在的文件.
    /// 如果没有文件存在, 或第一个存在的文件无法解析, 则退回到
    /// [`Params::default`] 并记录一条警告.
    pub fn load_default() -> Self {
        let Some(path) = default_params_candidates().into_iter().find(|p| p.is_file()) else {
            tracing::warn!("no `{PARAMS_FILE_NAME}` found, using built-in params");
            return Self::default();
        };
        match Self::open(&path) {
            Ok(p) => {
                tracing::debug!("params loaded from {}", path.display());
                p
            }
            Err(e) => {
                tracing::warn!("{e}: {}, using built-in params", error_chain(&e));
                Self::default()
            }
        }
    }

    /// patch 边长 `2W+1`.
    #[inline]
    pub fn patch_size(&self) -> usize {
        2 * self.patch_radius + 1
    }

    /// 获取本 crate 不直接使用的参数.
    #[inline]
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// 设置本 crate 不直接使用的参数. 返回旧值.
    pub fn set_extra<K: Into<String>>(&mut self, key: K, value: Value) -> Option<Value> {
        self.extra.insert(key.into(), value)
    }
}

/// 参数文件的默认搜索路径, 按优先级排序:
///
/// 1. 环境变量 `$VESSEL_NET_PARAMS`;
/// 2. 当前可执行文件所在目录下的 `params.json`;
/// 3. 当前工作目录下的 `params.json`;
/// 4. `{用户配置目录}/vessel-net/params.json`.
pub fn default_params_candidates() -> Vec<PathBuf> {
    let mut ans = Vec::with_capacity(4);
    if let Some(p) = env::var_os(PARAMS_ENV_VAR).filter(|p| !p.is_empty()) {
        ans.push(PathBuf::from(p));
    }
    if let Some(dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        ans.push(dir.join(PARAMS_FILE_NAME));
    }
    ans.push(PathBuf::from(PARAMS_FILE_NAME));
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("vessel-net");
        dir.push(PARAMS_FILE_NAME);
        ans.push(dir);
    }
    ans
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut parts = Vec::new();
    let mut cur = e.source();
    while let Some(s) = cur {
        parts.push(s.to_string());
        cur = s.source();
    }
    parts.join(": ")
}
