//! 三维医学图像读写.
//!
//! 读入的数组一律为 `f32`, 轴序为最慢变化的轴在前 (`z, y, x`), 与 NumPy 中
//! 读出的图像数组一致.

mod metaimage;

pub use metaimage::{read_metaimage, DataFile, ElementType, MetaHeader};

use ndarray::{ArrayBase, ArrayD, Data, Dimension};
use ndarray_npy::{ReadNpyError, WriteNpyError, WritableElement};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// 读取图像错误.
#[derive(Debug, thiserror::Error)]
pub enum ReadVolumeError {
    /// 文件读写失败.
    #[error("failed to read `{path}`")]
    Io {
        /// 文件路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },

    /// MetaImage 头部缺项或取值非法.
    #[error("bad MetaImage header: {0}")]
    Header(String),

    /// 合法但不支持的 MetaImage 特性.
    #[error("unsupported MetaImage feature: {0}")]
    Unsupported(String),

    /// 数据字节数少于头部声明.
    #[error("expected {expected} bytes of image data, got {got}")]
    SizeMismatch {
        /// 应有字节数.
        expected: usize,
        /// 实际字节数.
        got: usize,
    },

    /// nifti 读取失败.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// npy 读取失败.
    #[error(transparent)]
    Npy(#[from] ReadNpyError),

    /// 无法由扩展名判断格式.
    #[error("unknown image format `{}`", .0.display())]
    UnknownExtension(PathBuf),
}

/// 支持的图像格式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VolumeFormat {
    /// `.mha` / `.mhd`
    MetaImage,
    /// `.nii` / `.nii.gz`
    Nifti,
    /// `.npy`
    Npy,
}

impl VolumeFormat {
    /// 由文件扩展名 (不区分大小写) 判断格式.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".mha") || name.ends_with(".mhd") {
            Some(Self::MetaImage)
        } else if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Some(Self::Nifti)
        } else if name.ends_with(".npy") {
            Some(Self::Npy)
        } else {
            None
        }
    }
}

/// 读取 `path` 处的图像, 按扩展名选择格式.
pub fn read_volume<P: AsRef<Path>>(path: P) -> Result<ArrayD<f32>, ReadVolumeError> {
    let path = path.as_ref();
    let format = VolumeFormat::from_path(path)
        .ok_or_else(|| ReadVolumeError::UnknownExtension(path.to_owned()))?;
    let ans = match format {
        VolumeFormat::MetaImage => read_metaimage(path)?.1,
        VolumeFormat::Nifti => read_nifti(path)?,
        VolumeFormat::Npy => read_npy_as_f32(path)?,
    };
    tracing::debug!("read {} with shape {:?}", path.display(), ans.shape());
    Ok(ans)
}

/// nifti 数据以 `[x, y, z]` 存储, 逆转为 `[z, y, x]`.
fn read_nifti(path: &Path) -> Result<ArrayD<f32>, ReadVolumeError> {
    let obj = ReaderOptions::new().read_file(path)?;
    let data = obj.into_volume().into_ndarray::<f32>()?.reversed_axes();
    Ok(data.as_standard_layout().into_owned())
}

/// 读取 npy 数组. 元素类型不是 `f32` 时依次尝试常见类型并转换.
fn read_npy_as_f32(path: &Path) -> Result<ArrayD<f32>, ReadVolumeError> {
    fn open(path: &Path) -> Result<BufReader<File>, ReadVolumeError> {
        File::open(path)
            .map(BufReader::new)
            .map_err(|source| ReadVolumeError::Io {
                path: path.to_owned(),
                source,
            })
    }

    macro_rules! try_as {
        ($t: ty) => {
            match <ArrayD<$t> as ndarray_npy::ReadNpyExt>::read_npy(open(path)?) {
                Ok(a) => return Ok(a.mapv(|v| v as f32)),
                Err(ReadNpyError::WrongDescriptor(_)) => {}
                Err(e) => return Err(e.into()),
            }
        };
    }

    try_as!(f32);
    try_as!(f64);
    try_as!(i16);
    try_as!(u16);
    try_as!(u8);
    try_as!(i8);
    try_as!(i32);
    try_as!(u32);

    // 以上都不匹配时, 再读一次以取得准确的错误.
    Ok(<ArrayD<f32> as ndarray_npy::ReadNpyExt>::read_npy(open(path)?)?)
}

/// 将 `array` 以 npy 格式写入 `path`. 父目录不存在时会先创建.
pub fn write_npy<P, A, S, D>(path: P, array: &ArrayBase<S, D>) -> Result<(), WriteNpyError>
where
    P: AsRef<Path>,
    A: WritableElement,
    S: Data<Elem = A>,
    D: Dimension,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        crate::fs::ensure_directory_exists(parent)?;
    }
    ndarray_npy::write_npy(path, array)
}

#[cfg(test)]
mod tests {
    use super::{read_volume, write_npy, ReadVolumeError, VolumeFormat};
    use ndarray::{Array, Array3, IxDyn};
    use std::path::Path;

    #[test]
    fn test_format_from_path() {
        let f = |s: &str| VolumeFormat::from_path(Path::new(s));
        assert_eq!(f("a/b.mha"), Some(VolumeFormat::MetaImage));
        assert_eq!(f("b.MHD"), Some(VolumeFormat::MetaImage));
        assert_eq!(f("c.nii"), Some(VolumeFormat::Nifti));
        assert_eq!(f("c.nii.gz"), Some(VolumeFormat::Nifti));
        assert_eq!(f("d.npy"), Some(VolumeFormat::Npy));
        assert_eq!(f("d.npz"), None);
        assert_eq!(f("noext"), None);
    }

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            read_volume("vol.tiff"),
            Err(ReadVolumeError::UnknownExtension(_))
        ));
    }

    #[test]
    fn test_npy_round_trip_with_conversion() {
        let dir = tempfile::tempdir().unwrap();

        let a: Array3<i16> = Array::from_iter(-6..6).into_shape((2, 3, 2)).unwrap();
        let path = dir.path().join("sub/dir/a.npy");
        write_npy(&path, &a).unwrap();
        let back = read_volume(&path).unwrap();
        assert_eq!(back.shape(), &[2, 3, 2]);
        assert_eq!(back, a.mapv(f32::from).into_dyn());

        let b = Array::from_iter((0..8).map(|v| v as f64 * 0.5))
            .into_shape(IxDyn(&[2, 2, 2]))
            .unwrap();
        let path = dir.path().join("b.npy");
        write_npy(&path, &b).unwrap();
        assert_eq!(read_volume(&path).unwrap(), b.mapv(|v| v as f32));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_volume(dir.path().join("none.mha")),
            Err(ReadVolumeError::Io { .. })
        ));
    }
}
