//! 日志输出.
//!
//! 日志同时写到标准输出和一个日志文件. 日志级别由 `RUST_LOG` 控制, 默认为 `info`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// 安装日志错误.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// 无法创建日志文件.
    #[error("failed to create log file `{path}`")]
    Io {
        /// 日志文件路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },

    /// 进程中已经安装过全局日志. 此时不会创建或清空日志文件.
    #[error("a global logger is already installed")]
    AlreadyInstalled,

    /// 安装全局日志失败.
    #[error(transparent)]
    Init(#[from] TryInitError),
}

/// 已安装的全局日志.
///
/// # 注意
///
/// 一个进程只能安装一次; 安装后一直生效到进程结束, 丢弃该值不会卸载日志.
#[derive(Debug)]
pub struct Logger {
    path: PathBuf,
}

impl Logger {
    /// 安装全局日志, 日志文件为 `path`. 已存在的文件会被清空.
    pub fn install<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        if tracing::dispatcher::has_been_set() {
            return Err(LogError::AlreadyInstalled);
        }
        let path = path.as_ref().to_owned();
        let file = File::create(&path).map_err(|source| LogError::Io {
            path: path.clone(),
            source,
        })?;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
            .try_init()?;

        tracing::debug!("logging to {}", path.display());
        Ok(Self { path })
    }

    /// 日志文件路径.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
