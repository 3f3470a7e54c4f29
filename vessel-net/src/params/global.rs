//! 进程级参数上下文.
//!
//! 库中所有函数都显式接受 [`Params`]. 对于只想 "加载一次, 到处使用"
//! 的脚本, 这里提供一个进程内共享的参数副本: 首次访问时通过
//! [`Params::load_default`] 初始化, 之后可以整体替换.

use super::{Params, ParamsError};
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

static SCRIPT_PARAMS: Lazy<RwLock<Params>> = Lazy::new(|| RwLock::new(Params::load_default()));

/// 获取当前进程级参数的快照.
pub fn script_params() -> Params {
    SCRIPT_PARAMS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// 从 `path` 读取新参数并整体替换进程级参数.
///
/// 读取或解析失败时返回 `Err`, 此时原参数保持不变.
pub fn set_params_path<P: AsRef<Path>>(path: P) -> Result<(), ParamsError> {
    let new_params = Params::open(path.as_ref())?;
    replace_params(new_params);
    tracing::debug!("params replaced from {}", path.as_ref().display());
    Ok(())
}

/// 直接整体替换进程级参数, 返回旧参数.
pub fn replace_params(new_params: Params) -> Params {
    let mut guard = SCRIPT_PARAMS
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *guard, new_params)
}
