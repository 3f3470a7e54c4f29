//! 文件系统辅助操作: 目录创建和 "穿透" 式符号链接.
//!
//! 所有底层错误原样返回.

use std::env;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// 创建 `path` 目录及其所有不存在的父目录. `path` 已存在时什么也不做.
pub fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// 对 `source_dir` 下的每个 `names` 项调用 [`symlink_through`],
/// 链接创建在 `dest_dir` 下的同名位置.
///
/// 遇到第一个错误即返回, 之前已创建的链接保留.
pub fn symlink_entries_through<P, Q, I, S>(source_dir: P, dest_dir: Q, names: I) -> io::Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    I: IntoIterator<Item = S>,
    S: AsRef<Path>,
{
    let (source_dir, dest_dir) = (source_dir.as_ref(), dest_dir.as_ref());
    for name in names {
        let name = name.as_ref();
        symlink_through(source_dir.join(name), dest_dir.join(name))?;
    }
    Ok(())
}

/// 在 `dest` 处创建指向 `source` 的符号链接.
///
/// 如果 `source` 本身是符号链接, 则改为指向它 (一层) 所链接的目标.
/// 链接内容总是相对于 `dest` 所在目录的相对路径.
///
/// # 注意
///
/// 1. `dest` 已存在时返回 `Err`.
/// 2. 不检查 `source` 是否存在; 悬空链接也会被创建.
pub fn symlink_through<P: AsRef<Path>, Q: AsRef<Path>>(source: P, dest: Q) -> io::Result<()> {
    let source = source.as_ref();
    let dest = dest.as_ref();

    let source = if is_symlink(source) {
        readlink_absolute(source)?
    } else {
        source.to_path_buf()
    };
    let dest_dir = dest.parent().unwrap_or_else(|| Path::new(""));
    let target = relative_path(&source, dest_dir)?;
    make_symlink(&target, dest)
}

/// 读取符号链接 `path` 的内容 (一层). 如果内容是相对路径,
/// 则将其解释为相对于链接所在目录, 并规范化后返回.
pub fn readlink_absolute<P: AsRef<Path>>(path: P) -> io::Result<PathBuf> {
    let path = path.as_ref();
    let rl = fs::read_link(path)?;
    if rl.is_absolute() {
        return Ok(rl);
    }
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(normalize(&parent.join(rl)))
}

/// 计算从目录 `base` 到 `target` 的相对路径. 两者都先按当前工作目录绝对化.
///
/// 该操作是纯词法的, 不解析符号链接.
pub fn relative_path<P: AsRef<Path>, Q: AsRef<Path>>(target: P, base: Q) -> io::Result<PathBuf> {
    let target = absolute(target.as_ref())?;
    let base = absolute(base.as_ref())?;

    let t: Vec<Component> = target.components().collect();
    let b: Vec<Component> = base.components().collect();
    let common = t.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();

    let mut ans = PathBuf::new();
    for _ in common..b.len() {
        ans.push("..");
    }
    ans.extend(&t[common..]);
    if ans.as_os_str().is_empty() {
        ans.push(".");
    }
    Ok(ans)
}

#[inline]
fn is_symlink(p: &Path) -> bool {
    fs::symlink_metadata(p).is_ok_and(|m| m.file_type().is_symlink())
}

/// 按当前工作目录绝对化并规范化.
fn absolute(p: &Path) -> io::Result<PathBuf> {
    if p.is_absolute() {
        Ok(normalize(p))
    } else {
        Ok(normalize(&env::current_dir()?.join(p)))
    }
}

/// 词法规范化: 去掉 `.`, 折叠 `..`.
fn normalize(p: &Path) -> PathBuf {
    let mut ans = PathBuf::new();
    for c in p.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => match ans.components().next_back() {
                Some(Component::Normal(_)) => {
                    ans.pop();
                }
                // 根目录的上级仍是根目录.
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => ans.push(".."),
            },
            other => ans.push(other),
        }
    }
    if ans.as_os_str().is_empty() {
        ans.push(".");
    }
    ans
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        #[inline]
        fn make_symlink(target: &Path, dest: &Path) -> io::Result<()> {
            std::os::unix::fs::symlink(target, dest)
        }
    } else if #[cfg(windows)] {
        fn make_symlink(target: &Path, dest: &Path) -> io::Result<()> {
            use std::os::windows::fs::{symlink_dir, symlink_file};

            let resolved = dest.parent().unwrap_or_else(|| Path::new("")).join(target);
            if resolved.is_dir() {
                symlink_dir(target, dest)
            } else {
                symlink_file(target, dest)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_directory_exists_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a").join("b").join("c");
        assert!(!p.exists());

        ensure_directory_exists(&p).unwrap();
        assert!(p.is_dir());
        // 第二次调用不报错.
        ensure_directory_exists(&p).unwrap();
        assert!(p.is_dir());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), Path::new("/a/c"));
        assert_eq!(normalize(Path::new("/../a")), Path::new("/a"));
        assert_eq!(normalize(Path::new("a/../../b")), Path::new("../b"));
        assert_eq!(normalize(Path::new("a/..")), Path::new("."));
    }

    #[test]
    fn test_relative_path() {
        let r = |t: &str, b: &str| relative_path(t, b).unwrap();
        assert_eq!(r("/x/y/f.txt", "/x/z"), Path::new("../y/f.txt"));
        assert_eq!(r("/x/y/f.txt", "/x/y"), Path::new("f.txt"));
        assert_eq!(r("/x/y", "/x/y"), Path::new("."));
        assert_eq!(r("/x", "/x/y/z"), Path::new("../.."));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_through_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let src_dir = dir.path().join("src");
        let dst_dir = dir.path().join("dst");
        ensure_directory_exists(&src_dir).unwrap();
        ensure_directory_exists(&dst_dir).unwrap();

        let file = src_dir.join("scan.mha");
        fs::write(&file, b"voxels").unwrap();
        let link = dst_dir.join("scan.mha");
        symlink_through(&file, &link).unwrap();

        // 链接内容是相对路径, 且能解析到原文件.
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("../src/scan.mha"));
        assert_eq!(fs::read(&link).unwrap(), b"voxels");

        // 目标已存在.
        assert!(symlink_through(&file, &link).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_through_link_chain() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        for d in ["data", "stage1", "stage2"] {
            ensure_directory_exists(base.join(d)).unwrap();
        }
        let file = base.join("data").join("vol.mhd");
        fs::write(&file, b"header").unwrap();

        let first = base.join("stage1").join("vol.mhd");
        symlink_through(&file, &first).unwrap();

        // 对链接再做一次 "穿透" 链接, 结果应直接指向最终文件, 而非中间链接.
        let second = base.join("stage2").join("vol.mhd");
        symlink_through(&first, &second).unwrap();
        assert_eq!(
            fs::read_link(&second).unwrap(),
            Path::new("../data/vol.mhd")
        );
        assert_eq!(
            fs::canonicalize(&second).unwrap(),
            fs::canonicalize(&file).unwrap()
        );

        assert_eq!(readlink_absolute(&first).unwrap(), normalize(&file));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_entries_through() {
        let dir = tempfile::tempdir().unwrap();
        let (src, dst) = (dir.path().join("in"), dir.path().join("out"));
        ensure_directory_exists(&src).unwrap();
        ensure_directory_exists(&dst).unwrap();
        for name in ["a.mha", "b.mha"] {
            fs::write(src.join(name), name).unwrap();
        }

        symlink_entries_through(&src, &dst, ["a.mha", "b.mha"]).unwrap();
        for name in ["a.mha", "b.mha"] {
            assert_eq!(fs::read_to_string(dst.join(name)).unwrap(), name);
        }

        // 目标已存在.
        assert!(symlink_entries_through(&src, &dst, ["a.mha"]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_through_missing_link_parent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"").unwrap();
        let e = symlink_through(&file, dir.path().join("no_such_dir").join("f")).unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::NotFound);
    }
}
