//! 数据目录中的 SQLite 数据库.

use crate::consts::DB_FILE_NAME;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// 数据目录 `dir` 下的数据库文件路径, 即 `dir/data.sqlite3`.
#[inline]
pub fn sqlite3_db_path<P: AsRef<Path>>(dir: P) -> PathBuf {
    dir.as_ref().join(DB_FILE_NAME)
}

/// 打开 (不存在时创建) 数据目录 `dir` 下的 `data.sqlite3`.
///
/// 不做任何表结构管理. `dir` 本身必须已存在.
pub fn open_sqlite3_db<P: AsRef<Path>>(dir: P) -> rusqlite::Result<Connection> {
    let path = sqlite3_db_path(dir);
    tracing::debug!("opening sqlite db {}", path.display());
    Connection::open(path)
}
