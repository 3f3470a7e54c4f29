use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 网络结构. 决定 patch 的提取方式和网络输入的组织方式.
///
/// 该值在参数解析时一次性确定, 之后所有调用按模式匹配分派.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum NetworkDesign {
    /// 每个空间轴各取一张过中心的正交切片, 沿新的末轴堆叠.
    /// 三维图像对应 `(2W+1, 2W+1, 3)` 的 patch.
    #[default]
    #[serde(rename = "xyz")]
    Xyz,

    /// 取以中心为心的完整超立方体. 三维图像对应 `(2W+1, 2W+1, 2W+1)` 的 patch.
    #[serde(rename = "full3d")]
    Full3d,
}

impl NetworkDesign {
    /// 参数文件中的字符串表示.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Xyz => "xyz",
            Self::Full3d => "full3d",
        }
    }
}

impl fmt::Display for NetworkDesign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 无法识别的 `NETWORK_DESIGN` 取值.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown NETWORK_DESIGN `{0}`")]
pub struct UnknownDesign(pub String);

impl FromStr for NetworkDesign {
    type Err = UnknownDesign;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xyz" => Ok(Self::Xyz),
            "full3d" => Ok(Self::Full3d),
            other => Err(UnknownDesign(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NetworkDesign, UnknownDesign};

    #[test]
    fn test_design_from_str() {
        assert_eq!("xyz".parse(), Ok(NetworkDesign::Xyz));
        assert_eq!("full3d".parse(), Ok(NetworkDesign::Full3d));

        // 大小写敏感, 与参数文件保持一致.
        for bad in ["XYZ", "full2d", "", "2d"] {
            assert_eq!(
                bad.parse::<NetworkDesign>(),
                Err(UnknownDesign(bad.to_string()))
            );
        }
    }
}
