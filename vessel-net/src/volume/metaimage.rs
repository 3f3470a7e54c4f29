//! MetaImage (`.mha` / `.mhd`) 读取.
//!
//! 只支持单通道、单个数据块的图像: `ElementDataFile` 为 `LOCAL`
//! 或单个相对/绝对文件名, 不支持 `LIST` 和文件名模式.

use super::ReadVolumeError;
use flate2::read::ZlibDecoder;
use ndarray::{ArrayD, IxDyn};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// 体素类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElementType {
    /// `MET_CHAR`
    I8,
    /// `MET_UCHAR`
    U8,
    /// `MET_SHORT`
    I16,
    /// `MET_USHORT`
    U16,
    /// `MET_INT`
    I32,
    /// `MET_UINT`
    U32,
    /// `MET_FLOAT`
    F32,
    /// `MET_DOUBLE`
    F64,
}

impl ElementType {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "MET_CHAR" => Self::I8,
            "MET_UCHAR" => Self::U8,
            "MET_SHORT" => Self::I16,
            "MET_USHORT" => Self::U16,
            "MET_INT" => Self::I32,
            "MET_UINT" => Self::U32,
            "MET_FLOAT" => Self::F32,
            "MET_DOUBLE" => Self::F64,
            _ => return None,
        })
    }

    /// 单个体素的字节数.
    #[inline]
    pub const fn size(&self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// 数据块位置.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DataFile {
    /// 紧跟在头部之后 (`.mha`).
    Local,

    /// 独立的原始数据文件. 相对路径相对于头部文件所在目录.
    External(PathBuf),
}

/// MetaImage 头部.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaHeader {
    /// 各轴大小, 最快变化的轴在前 (即 `x, y, z`).
    pub dim_size: Vec<usize>,

    /// 各轴体素间距, 顺序同 `dim_size`. 缺省为 1.
    pub spacing: Vec<f64>,

    /// 体素类型.
    pub element_type: ElementType,

    /// 是否大端序.
    pub msb: bool,

    /// 数据块是否经过 zlib 压缩.
    pub compressed: bool,

    /// 数据块位置.
    pub data_file: DataFile,

    /// 外部数据文件中需跳过的字节数. `-1` 表示数据位于文件末尾.
    pub header_size: i64,
}

impl MetaHeader {
    /// 解析头部文本.
    pub fn parse(text: &str) -> Result<Self, ReadVolumeError> {
        let mut ndims: Option<usize> = None;
        let mut dim_size: Option<Vec<usize>> = None;
        let mut spacing: Option<Vec<f64>> = None;
        let mut element_type = None;
        let mut msb = false;
        let mut compressed = false;
        let mut channels = 1usize;
        let mut header_size = 0i64;
        let mut data_file = None;

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "NDims" => ndims = Some(parse_one(key, value)?),
                "DimSize" => dim_size = Some(parse_list(key, value)?),
                "ElementSpacing" => spacing = Some(parse_list(key, value)?),
                "ElementType" => {
                    element_type = Some(ElementType::parse(value).ok_or_else(|| {
                        ReadVolumeError::Unsupported(format!("element type `{value}`"))
                    })?)
                }
                "BinaryDataByteOrderMSB" | "ElementByteOrderMSB" => msb = parse_bool(value),
                "CompressedData" => compressed = parse_bool(value),
                "ElementNumberOfChannels" => channels = parse_one(key, value)?,
                "HeaderSize" => header_size = parse_one(key, value)?,
                "ElementDataFile" => {
                    data_file = Some(match value {
                        "LOCAL" | "Local" | "local" => DataFile::Local,
                        v if v.starts_with("LIST") || v.contains('%') => {
                            return Err(ReadVolumeError::Unsupported(format!(
                                "ElementDataFile `{v}`"
                            )))
                        }
                        v => DataFile::External(PathBuf::from(v)),
                    });
                    // 该键总是头部最后一项.
                    break;
                }
                _ => {}
            }
        }

        let dim_size = dim_size.ok_or_else(|| missing("DimSize"))?;
        if ndims.is_some_and(|n| n != dim_size.len()) {
            return Err(ReadVolumeError::Header(format!(
                "NDims {} does not match DimSize {dim_size:?}",
                ndims.unwrap_or_default()
            )));
        }
        if channels != 1 {
            return Err(ReadVolumeError::Unsupported(format!(
                "{channels} channels per element"
            )));
        }
        let spacing = spacing.unwrap_or_else(|| vec![1.0; dim_size.len()]);

        let ans = Self {
            spacing,
            element_type: element_type.ok_or_else(|| missing("ElementType"))?,
            msb,
            compressed,
            data_file: data_file.ok_or_else(|| missing("ElementDataFile"))?,
            header_size,
            dim_size,
        };
        ans.byte_len()?;
        Ok(ans)
    }

    /// 体素个数. 溢出时饱和为 `usize::MAX`.
    #[inline]
    pub fn len(&self) -> usize {
        self.dim_size
            .iter()
            .fold(1usize, |acc, &d| acc.saturating_mul(d))
    }

    /// 未压缩数据块的字节数. 溢出 `usize` 时返回 `Err`.
    pub fn byte_len(&self) -> Result<usize, ReadVolumeError> {
        self.dim_size
            .iter()
            .try_fold(self.element_type.size(), |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| {
                ReadVolumeError::Header(format!("DimSize {:?} is too large", self.dim_size))
            })
    }

    /// 是否没有体素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[inline]
fn missing(key: &str) -> ReadVolumeError {
    ReadVolumeError::Header(format!("missing `{key}`"))
}

fn parse_one<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ReadVolumeError> {
    value
        .parse()
        .map_err(|_| ReadVolumeError::Header(format!("bad value `{value}` for `{key}`")))
}

fn parse_list<T: std::str::FromStr>(key: &str, value: &str) -> Result<Vec<T>, ReadVolumeError> {
    value
        .split_whitespace()
        .map(|v| parse_one(key, v))
        .collect()
}

#[inline]
fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

/// 读取 MetaImage 文件, 返回头部和 `f32` 体素数组.
///
/// 数组形状为 `DimSize` 的逆序, 即最慢变化的轴在前 (`z, y, x`).
pub fn read_metaimage<P: AsRef<Path>>(path: P) -> Result<(MetaHeader, ArrayD<f32>), ReadVolumeError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| ReadVolumeError::Io {
        path: path.to_owned(),
        source,
    })?;

    let (header_text, local_start) = split_header(&bytes);
    let header = MetaHeader::parse(&header_text)?;

    let raw: Vec<u8> = match &header.data_file {
        DataFile::Local => bytes[local_start..].to_vec(),
        DataFile::External(f) => {
            let data_path = path.parent().unwrap_or_else(|| Path::new("")).join(f);
            let data = fs::read(&data_path).map_err(|source| ReadVolumeError::Io {
                path: data_path,
                source,
            })?;
            skip_header_bytes(data, &header)?
        }
    };

    let raw = if header.compressed {
        // 预分配不超过压缩数据本身的大小.
        let mut out = Vec::with_capacity(header.byte_len()?.min(raw.len()));
        ZlibDecoder::new(raw.as_slice())
            .read_to_end(&mut out)
            .map_err(|source| ReadVolumeError::Io {
                path: path.to_owned(),
                source,
            })?;
        out
    } else {
        raw
    };

    let data = decode(&raw, &header)?;
    let shape: Vec<usize> = header.dim_size.iter().rev().copied().collect();
    let arr = ArrayD::from_shape_vec(IxDyn(&shape), data)
        .map_err(|e| ReadVolumeError::Header(e.to_string()))?;
    Ok((header, arr))
}

/// 切分 `.mha` / `.mhd` 文件的头部文本. 返回头部和 `LOCAL` 数据起始位置.
fn split_header(bytes: &[u8]) -> (String, usize) {
    let mut pos = 0;
    while pos < bytes.len() {
        let end = bytes[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |i| pos + i + 1);
        let line = String::from_utf8_lossy(&bytes[pos..end]);
        pos = end;
        if line.trim_start().starts_with("ElementDataFile") {
            break;
        }
    }
    (String::from_utf8_lossy(&bytes[..pos]).into_owned(), pos)
}

fn skip_header_bytes(data: Vec<u8>, header: &MetaHeader) -> Result<Vec<u8>, ReadVolumeError> {
    match header.header_size {
        0 => Ok(data),
        -1 => {
            // 数据位于文件末尾. 压缩数据无法据此定位.
            if header.compressed {
                return Err(ReadVolumeError::Unsupported(
                    "HeaderSize = -1 with compressed data".to_string(),
                ));
            }
            let need = header.byte_len()?;
            let start = data.len().checked_sub(need).ok_or(ReadVolumeError::SizeMismatch {
                expected: need,
                got: data.len(),
            })?;
            Ok(data[start..].to_vec())
        }
        n if n > 0 && (n as usize) <= data.len() => Ok(data[n as usize..].to_vec()),
        n => Err(ReadVolumeError::Header(format!("bad HeaderSize {n}"))),
    }
}

/// 按体素类型和字节序解码为 `f32`.
fn decode(raw: &[u8], header: &MetaHeader) -> Result<Vec<f32>, ReadVolumeError> {
    let size = header.element_type.size();
    let need = header.byte_len()?;
    if raw.len() < need {
        return Err(ReadVolumeError::SizeMismatch {
            expected: need,
            got: raw.len(),
        });
    }
    let raw = &raw[..need];

    macro_rules! decode_as {
        ($t: ty) => {
            raw.chunks_exact(size)
                .map(|c| {
                    let b = c.try_into().unwrap_or_default();
                    if header.msb {
                        <$t>::from_be_bytes(b) as f32
                    } else {
                        <$t>::from_le_bytes(b) as f32
                    }
                })
                .collect()
        };
    }

    Ok(match header.element_type {
        ElementType::I8 => decode_as!(i8),
        ElementType::U8 => decode_as!(u8),
        ElementType::I16 => decode_as!(i16),
        ElementType::U16 => decode_as!(u16),
        ElementType::I32 => decode_as!(i32),
        ElementType::U32 => decode_as!(u32),
        ElementType::F32 => decode_as!(f32),
        ElementType::F64 => decode_as!(f64),
    })
}
