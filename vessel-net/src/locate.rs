//! 原始图像定位.
//!
//! 原始图像按 `{INPUT_DATA_ROOT}/{病例目录}/{TYPE_SUBDIR_STRUCTURE}/{name_key}.mh[ad]`
//! 组织. 查找分两步: [`original_image_candidates`] 惰性列出所有匹配,
//! [`exactly_one`] 断言恰好一个匹配.

use crate::consts::ORIGINAL_IMAGE_SUFFIX;
use crate::params::Params;
use itertools::Itertools;
use std::path::PathBuf;

/// 定位原始图像错误.
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    /// glob 模式本身非法.
    #[error("invalid glob pattern `{pattern}`")]
    Pattern {
        /// 模式.
        pattern: String,
        /// 底层错误.
        #[source]
        source: glob::PatternError,
    },

    /// 遍历目录时出错 (如权限不足).
    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    /// 没有任何匹配.
    #[error("no file matches `{0}`")]
    NoMatch(String),

    /// 不止一个匹配. 给出最先找到的两个.
    #[error("more than one file matches `{pattern}`: `{}`, `{}`", .first.display(), .second.display())]
    MultipleMatches {
        /// 模式.
        pattern: String,
        /// 第一个匹配.
        first: PathBuf,
        /// 第二个匹配.
        second: PathBuf,
    },
}

/// 构造 `name_key` 对应的原始图像 glob 模式.
///
/// `INPUT_DATA_ROOT` 和 `TYPE_SUBDIR_STRUCTURE` 按原样拼接, 其中的通配符仍然生效.
pub fn original_image_pattern(params: &Params, name_key: &str) -> String {
    let mut ans = params.input_data_root.join("*");
    if !params.type_subdir_structure.is_empty() {
        ans.push(&params.type_subdir_structure);
    }
    ans.push(format!("{name_key}{ORIGINAL_IMAGE_SUFFIX}"));
    ans.to_string_lossy().into_owned()
}

/// 惰性迭代 `name_key` 对应的所有原始图像候选, 按路径字典序.
pub fn original_image_candidates(
    params: &Params,
    name_key: &str,
) -> Result<impl Iterator<Item = Result<PathBuf, glob::GlobError>>, LocateError> {
    let pattern = original_image_pattern(params, name_key);
    glob::glob(&pattern).map_err(|source| LocateError::Pattern { pattern, source })
}

/// 断言 `candidates` 恰好只有一个元素并返回它.
///
/// `pattern` 只用于错误信息. 候选迭代中的错误原样返回.
pub fn exactly_one<I>(candidates: I, pattern: &str) -> Result<PathBuf, LocateError>
where
    I: IntoIterator<Item = Result<PathBuf, glob::GlobError>>,
{
    let paths: Vec<PathBuf> = candidates
        .into_iter()
        .take(2)
        .collect::<Result<_, _>>()?;
    paths.into_iter().exactly_one().map_err(|mut rest| match (rest.next(), rest.next()) {
        (Some(first), Some(second)) => LocateError::MultipleMatches {
            pattern: pattern.to_string(),
            first,
            second,
        },
        _ => LocateError::NoMatch(pattern.to_string()),
    })
}

/// 获取 `name_key` 对应的唯一原始图像路径.
///
/// 没有匹配或匹配多于一个时返回 `Err`.
pub fn original_image(params: &Params, name_key: &str) -> Result<PathBuf, LocateError> {
    let candidates = original_image_candidates(params, name_key)?;
    exactly_one(candidates, &original_image_pattern(params, name_key))
}
