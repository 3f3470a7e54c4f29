//! 程序运行函数.

use crate::result::PredictionSummary;
use crate::Args;
use anyhow::{ensure, Context};
use ndarray::{s, Array1, Array2, ArrayD, IxDyn};
use ndarray_npy::{ReadNpyError, ReadNpyExt};
use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::path::Path;
use std::time::Instant;
use vessel_net::locate::original_image;
use vessel_net::log::Logger;
use vessel_net::model::Model;
use vessel_net::params::global::{script_params, set_params_path};
use vessel_net::params::Params;
use vessel_net::patch::pad;
use vessel_net::predict::{predict_on_indices_with, BatchProgress, PredictError};
use vessel_net::volume::{read_volume, write_npy};

/// 实际运行.
pub fn run(args: &Args) -> anyhow::Result<PredictionSummary> {
    // 先安装日志, 以便记录参数加载时的警告.
    let logger = Logger::install(&args.log)?;
    if let Some(p) = args.params.as_deref() {
        set_params_path(p).with_context(|| format!("loading {}", p.display()))?;
    }
    let params = script_params();
    tracing::info!(
        "PATCH_RADIUS = {}, NETWORK_DESIGN = {}",
        params.patch_radius,
        params.network_design
    );

    let mut model = load_model(&params)?;
    predict_and_write(args, &params, model.as_mut(), logger.path())
}

/// 定位并读取原始图像, 用 `model` 预测, 将得分写到 `args.output`.
fn predict_and_write<M: Model + ?Sized>(
    args: &Args,
    params: &Params,
    model: &mut M,
    log: &Path,
) -> anyhow::Result<PredictionSummary> {
    let image_path = original_image(params, &args.name_key)?;
    tracing::info!("original image: {}", image_path.display());
    let image = read_volume(&image_path)?;
    let padded = pad(&image, params.patch_radius)?;

    let indices = match args.indices.as_deref() {
        Some(p) => VoxelIndices::listed(read_indices(p, image.ndim())?, image.shape())?,
        None => VoxelIndices::Every(image.shape().to_vec()),
    };
    tracing::info!("predicting {} voxels", indices.len());

    let start = Instant::now();
    let scores = predict_blocks(model, &padded, &indices, args.batch_size, params)?;
    let elapsed = start.elapsed();

    let summary = PredictionSummary::new(
        &args.name_key,
        &image_path,
        image.shape(),
        args.batch_size,
        elapsed,
        scores.as_slice().unwrap_or_default(),
        &args.output,
        log,
    );

    let scores: ArrayD<f32> = match indices {
        VoxelIndices::Every(shape) => scores.into_shape(IxDyn(&shape))?,
        VoxelIndices::Listed(_) => scores.into_dyn(),
    };
    write_npy(&args.output, &scores)
        .with_context(|| format!("writing {}", args.output.display()))?;
    tracing::info!("scores written to {}", args.output.display());

    Ok(summary)
}

/// 加载最优模型.
#[cfg(feature = "onnx")]
fn load_model(params: &Params) -> anyhow::Result<Box<dyn Model>> {
    Ok(Box::new(vessel_net::model::load_best_model(params)?))
}

/// 未开启 `onnx` feature 时无法推理.
#[cfg(not(feature = "onnx"))]
fn load_model(params: &Params) -> anyhow::Result<Box<dyn Model>> {
    anyhow::bail!(
        "built without the `onnx` feature, cannot load {}",
        vessel_net::model::onnx_model_path(params).display()
    )
}

/// 待预测的体素索引.
enum VoxelIndices {
    /// 由文件给出的 `(K, N)` 索引.
    Listed(Array2<usize>),

    /// 形状为给定值的图像的全部体素, 按行优先顺序. 索引在用到时才生成.
    Every(Vec<usize>),
}

impl VoxelIndices {
    /// 检查 `indices` 的每一行都落在 `shape` 内.
    fn listed(indices: Array2<usize>, shape: &[usize]) -> anyhow::Result<Self> {
        for row in indices.outer_iter() {
            ensure!(
                row.iter().zip(shape).all(|(&i, &n)| i < n),
                "index {row} is outside image of shape {shape:?}"
            );
        }
        Ok(Self::Listed(indices))
    }

    fn len(&self) -> usize {
        match self {
            Self::Listed(a) => a.nrows(),
            Self::Every(shape) => shape.iter().product(),
        }
    }

    fn ndim(&self) -> usize {
        match self {
            Self::Listed(a) => a.ncols(),
            Self::Every(shape) => shape.len(),
        }
    }

    /// 第 `range` 个索引, 依次展平为一个 `(range.len() * ndim)` 的数组.
    fn block(&self, range: Range<usize>) -> Vec<usize> {
        match self {
            Self::Listed(a) => a.slice(s![range, ..]).iter().copied().collect(),
            Self::Every(shape) => {
                let n = shape.len();
                let mut ans = vec![0; range.len() * n];
                for (idx, mut rem) in ans.chunks_exact_mut(n).zip(range) {
                    for (i, &len) in idx.iter_mut().zip(shape).rev() {
                        *i = rem % len;
                        rem /= len;
                    }
                }
                ans
            }
        }
    }
}

/// 按块生成索引并分批预测. 每次只展开一批索引.
fn predict_blocks<M: Model + ?Sized>(
    model: &mut M,
    padded: &ArrayD<f32>,
    indices: &VoxelIndices,
    batch_size: usize,
    params: &Params,
) -> Result<Array1<f32>, PredictError> {
    if batch_size == 0 {
        return Err(PredictError::ZeroBatchSize);
    }
    let (total, ndim) = (indices.len(), indices.ndim());

    let mut scores = Vec::with_capacity(total);
    for start in (0..total).step_by(batch_size) {
        let flat = indices.block(start..total.min(start + batch_size));
        let rows: Vec<&[usize]> = flat.chunks_exact(ndim).collect();
        let part = predict_on_indices_with(&mut *model, padded, &rows, batch_size, params, |p| {
            let p = BatchProgress {
                done: start + p.done,
                total,
                ..*p
            };
            tracing::info!("{p}");
        })?;
        scores.extend(part.iter().copied());
    }
    Ok(Array1::from(scores))
}

/// 读取 `(K, N)` 整数索引数组, `N` 须等于图像维数.
fn read_indices(path: &Path, ndim: usize) -> anyhow::Result<Array2<usize>> {
    let open = || -> anyhow::Result<BufReader<File>> {
        Ok(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        ))
    };

    let raw: Array2<i64> = match Array2::<i64>::read_npy(open()?) {
        Ok(a) => a,
        Err(ReadNpyError::WrongDescriptor(_)) => Array2::<i32>::read_npy(open()?)?.mapv(i64::from),
        Err(e) => return Err(e.into()),
    };
    ensure!(
        raw.ncols() == ndim,
        "indices of shape {:?} do not match a {ndim}-d image",
        raw.shape()
    );
    if let Some(v) = raw.iter().find(|&&v| v < 0) {
        anyhow::bail!("negative index {v}");
    }
    Ok(raw.mapv(|v| v as usize))
}

#[cfg(test)]
mod tests {
    use super::{predict_and_write, read_indices, VoxelIndices};
    use crate::Args;
    use ndarray::{array, Array, Array2, Axis, IxDyn};
    use std::path::Path;
    use vessel_net::input::NetInput;
    use vessel_net::model::ModelError;
    use vessel_net::params::{NetworkDesign, Params};
    use vessel_net::volume::read_volume;

    #[test]
    fn test_every_voxel_order() {
        let all = VoxelIndices::Every(vec![2, 1, 2]);
        assert_eq!(all.len(), 4);
        assert_eq!(all.block(0..4), vec![0, 0, 0, 0, 0, 1, 1, 0, 0, 1, 0, 1]);
        assert_eq!(all.block(1..3), vec![0, 0, 1, 1, 0, 0]);

        let all = VoxelIndices::Every(vec![3, 4]);
        assert_eq!(all.block(5..7), vec![1, 1, 1, 2]);
    }

    #[test]
    fn test_listed_indices() {
        let listed = VoxelIndices::listed(array![[1usize, 2], [0, 3], [2, 0]], &[3, 4]).unwrap();
        assert_eq!((listed.len(), listed.ndim()), (3, 2));
        assert_eq!(listed.block(1..3), vec![0, 3, 2, 0]);

        assert!(VoxelIndices::listed(array![[3usize, 0]], &[3, 4]).is_err());
    }

    #[test]
    fn test_read_indices() {
        let dir = tempfile::tempdir().unwrap();

        let p = dir.path().join("i64.npy");
        ndarray_npy::write_npy(&p, &array![[1i64, 2, 3], [0, 0, 4]]).unwrap();
        assert_eq!(read_indices(&p, 3).unwrap(), array![[1usize, 2, 3], [0, 0, 4]]);
        assert!(read_indices(&p, 2).is_err());

        let p = dir.path().join("i32.npy");
        ndarray_npy::write_npy(&p, &array![[5i32, 6]]).unwrap();
        assert_eq!(read_indices(&p, 2).unwrap(), array![[5usize, 6]]);

        let p = dir.path().join("neg.npy");
        ndarray_npy::write_npy(&p, &array![[-1i64, 0]]).unwrap();
        assert!(read_indices(&p, 2).is_err());
    }

    /// 以 patch 中心体素值作为正类得分.
    fn center_model(input: &NetInput) -> Result<Array2<f32>, ModelError> {
        let first = input.arrays().next().unwrap();
        let b = first.len_of(Axis(0));
        let mut out = Array2::zeros((b, 2));
        for i in 0..b {
            let mut idx = vec![1; first.ndim()];
            idx[0] = i;
            idx[first.ndim() - 1] = 0;
            out[[i, 1]] = first[IxDyn(&idx)] as f32;
        }
        Ok(out)
    }

    /// 在 `root/input/case1/TYPE-MRA/` 下写一个 `3x3x3` 的 MET_SHORT 图像.
    fn write_image(root: &Path) -> Vec<f32> {
        let dir = root.join("input/case1/TYPE-MRA");
        std::fs::create_dir_all(&dir).unwrap();
        let values: Vec<i16> = (0..27).map(|v| v * 10).collect();
        let mut bytes = "NDims = 3\nDimSize = 3 3 3\nElementType = MET_SHORT\n\
                         ElementDataFile = LOCAL\n"
            .as_bytes()
            .to_vec();
        bytes.extend(values.iter().flat_map(|v| v.to_le_bytes()));
        std::fs::write(dir.join("Normal-002.mha"), bytes).unwrap();
        values.into_iter().map(f32::from).collect()
    }

    fn setup(root: &Path) -> (Params, Args) {
        let mut params = Params::default();
        params.patch_radius = 1;
        params.network_design = NetworkDesign::Full3d;
        params.input_data_root = root.join("input");
        params.type_subdir_structure = "TYPE-MRA".to_string();

        let args = Args {
            name_key: "Normal-002".to_string(),
            params: None,
            log: root.join("run.log"),
            batch_size: 4,
            indices: None,
            output: root.join("out/scores.npy"),
        };
        (params, args)
    }

    #[test]
    fn test_predict_whole_volume() {
        let dir = tempfile::tempdir().unwrap();
        let expected = write_image(dir.path());
        let (params, args) = setup(dir.path());

        let mut model = center_model;
        predict_and_write(&args, &params, &mut model, &args.log).unwrap();

        let scores = read_volume(&args.output).unwrap();
        assert_eq!(scores.shape(), &[3, 3, 3]);
        assert_eq!(
            scores,
            Array::from_vec(expected).into_shape(IxDyn(&[3, 3, 3])).unwrap()
        );
    }

    #[test]
    fn test_predict_listed_indices() {
        let dir = tempfile::tempdir().unwrap();
        let expected = write_image(dir.path());
        let (params, mut args) = setup(dir.path());

        let indices = dir.path().join("idx.npy");
        ndarray_npy::write_npy(&indices, &array![[2i64, 2, 2], [0, 1, 0], [1, 0, 2]]).unwrap();
        args.indices = Some(indices);
        args.batch_size = 2;

        let mut model = center_model;
        predict_and_write(&args, &params, &mut model, &args.log).unwrap();

        let scores = read_volume(&args.output).unwrap();
        assert_eq!(scores.shape(), &[3]);
        assert_eq!(
            scores.iter().copied().collect::<Vec<_>>(),
            vec![expected[26], expected[3], expected[11]]
        );

        // 越界索引.
        ndarray_npy::write_npy(args.indices.as_ref().unwrap(), &array![[3i64, 0, 0]]).unwrap();
        assert!(predict_and_write(&args, &params, &mut model, &args.log).is_err());
    }

    #[test]
    fn test_predict_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let (params, args) = setup(dir.path());
        let mut model = center_model;
        assert!(predict_and_write(&args, &params, &mut model, Path::new("x.log")).is_err());
        assert!(!args.output.exists());
    }
}
