//! Dataset acquisition: the collaborators that turn a [DatasetSpec](DatasetSpec) into raw
//! train and test splits.
//!
//! ## Sources
//! - [DownloadSource](DownloadSource) fetches the published files on first use and keeps them in a
//!   cache directory.
//! - [InMemorySource](InMemorySource) serves splits that are already in memory.
//!
//! ## File formats
//! - MNIST and Fashion-MNIST use the IDX format: a big-endian header (magic, count, rows, cols)
//!   followed by one byte per pixel or per label.
//! - CIFAR-10 and CIFAR-100 binary batches hold fixed size records: the label byte(s) followed by
//!   3072 pixels stored channel by channel (1024 red, 1024 green, 1024 blue).

use std::fs::{create_dir_all, remove_dir_all, remove_file, rename, File};
use std::path::{Path, PathBuf};

use burn_common::network::downloader;
use flate2::read::GzDecoder;
use tar::Archive;

use crate::data::RawSplit;
use crate::dataset::{DatasetId, DatasetSpec, LabelMode};
use crate::error::PipelineError;

// CVDF mirror of http://yann.lecun.com/exdb/mnist/
const MNIST_URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";
const FASHION_MNIST_URL: &str = "http://fashion-mnist.s3-website.eu-central-1.amazonaws.com/";
const CIFAR_10_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";
const CIFAR_100_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-100-binary.tar.gz";

const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IDX_IMAGES_MAGIC: u32 = 2051;
const IDX_LABELS_MAGIC: u32 = 2049;

const CIFAR_SIDE: usize = 32;
const CIFAR_CHANNELS: usize = 3;
const CIFAR_IMAGE_LEN: usize = CIFAR_SIDE * CIFAR_SIDE * CIFAR_CHANNELS;

/// Provides a deterministic train/test split for a dataset.
pub trait DatasetSource {
    /// Loads the `(train, test)` partitions of the dataset.
    fn load(&self, spec: &DatasetSpec) -> Result<(RawSplit, RawSplit), PipelineError>;
}

/// Loads the dataset from `source` and reports its shapes.
pub fn acquire(
    source: &dyn DatasetSource,
    spec: &DatasetSpec,
) -> Result<(RawSplit, RawSplit), PipelineError> {
    let (train, test) = source.load(spec)?;

    println!("Dataset: {}", spec.id);
    println!("Shape of train images: {:?}.", train.shape());
    println!("Shape of train labels: {:?}.", [train.labels().len()]);
    println!("Shape of test images: {:?}.", test.shape());
    println!("Shape of test labels: {:?}.", [test.labels().len()]);

    Ok((train, test))
}

/// Splits held in memory, returned as-is for any dataset.
#[derive(new, Debug, Clone)]
pub struct InMemorySource {
    train: RawSplit,
    test: RawSplit,
}

impl DatasetSource for InMemorySource {
    fn load(&self, _spec: &DatasetSpec) -> Result<(RawSplit, RawSplit), PipelineError> {
        Ok((self.train.clone(), self.test.clone()))
    }
}

/// Downloads the published dataset files into a cache directory and parses them.
#[derive(Debug, Clone)]
pub struct DownloadSource {
    root: PathBuf,
}

impl Default for DownloadSource {
    /// Caches files under `<user cache dir>/classifier-pipeline`.
    fn default() -> Self {
        let root = dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
            .unwrap_or_else(std::env::temp_dir)
            .join("classifier-pipeline");

        Self { root }
    }
}

impl DatasetSource for DownloadSource {
    fn load(&self, spec: &DatasetSpec) -> Result<(RawSplit, RawSplit), PipelineError> {
        match spec.id {
            DatasetId::DigitGrayscale => self.load_idx("mnist", MNIST_URL),
            DatasetId::GarmentGrayscale => self.load_idx("fashion-mnist", FASHION_MNIST_URL),
            DatasetId::SmallColor10 => self.load_cifar_10(),
            DatasetId::SmallColor100Fine | DatasetId::SmallColor100Coarse => {
                self.load_cifar_100(spec.label_mode)
            }
        }
    }
}

impl DownloadSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_idx(&self, name: &str, url: &str) -> Result<(RawSplit, RawSplit), PipelineError> {
        let dir = self.root.join(name);
        create_dir_all(&dir)?;

        let mut splits = Vec::with_capacity(2);
        for (images, labels) in [(TRAIN_IMAGES, TRAIN_LABELS), (TEST_IMAGES, TEST_LABELS)] {
            let images = std::fs::read(download_gz(url, images, &dir)?)?;
            let labels = std::fs::read(download_gz(url, labels, &dir)?)?;

            let (pixels, image_shape) = parse_idx_images(&images)?;
            let labels = parse_idx_labels(&labels)?;
            splits.push(RawSplit::new(pixels, image_shape, labels));
        }

        let test = splits.pop().ok_or(PipelineError::EmptySplit("test"))?;
        let train = splits.pop().ok_or(PipelineError::EmptySplit("train"))?;
        Ok((train, test))
    }

    fn load_cifar_10(&self) -> Result<(RawSplit, RawSplit), PipelineError> {
        let dir = self.unpack(CIFAR_10_URL, "cifar-10-binary.tar.gz", "cifar-10-batches-bin")?;

        let train_files: Vec<_> = (1..=5)
            .map(|i| dir.join(format!("data_batch_{i}.bin")))
            .collect();
        let train = read_cifar(&train_files, LabelMode::Single)?;
        let test = read_cifar(&[dir.join("test_batch.bin")], LabelMode::Single)?;

        Ok((train, test))
    }

    fn load_cifar_100(&self, mode: LabelMode) -> Result<(RawSplit, RawSplit), PipelineError> {
        let dir = self.unpack(CIFAR_100_URL, "cifar-100-binary.tar.gz", "cifar-100-binary")?;

        let train = read_cifar(&[dir.join("train.bin")], mode)?;
        let test = read_cifar(&[dir.join("test.bin")], mode)?;

        Ok((train, test))
    }

    /// Downloads and unpacks a `tar.gz` archive unless `dir_name` already exists under the root.
    fn unpack(&self, url: &str, archive: &str, dir_name: &str) -> Result<PathBuf, PipelineError> {
        let dir = self.root.join(dir_name);

        if !dir.exists() {
            create_dir_all(&self.root)?;
            log::info!("Downloading {archive}");
            let bytes = downloader::download_file_as_bytes(url, archive);

            unpack_archive(&bytes, &self.root, dir_name)?;
        }

        Ok(dir)
    }
}

/// Extracts the `tar.gz` bytes into a staging directory and moves `dir_name` under `root` once
/// the whole archive is unpacked. Nothing is left under `root` on failure.
fn unpack_archive(bytes: &[u8], root: &Path, dir_name: &str) -> Result<(), PipelineError> {
    let staging = root.join(format!("{dir_name}.part"));
    if staging.exists() {
        remove_dir_all(&staging)?;
    }

    let result = Archive::new(GzDecoder::new(bytes))
        .unpack(&staging)
        .and_then(|_| rename(staging.join(dir_name), root.join(dir_name)));

    if staging.exists() {
        remove_dir_all(&staging)?;
    }

    Ok(result?)
}

/// Downloads `<url><name>.gz` into `dir` and decompresses it, unless the file is already there.
fn download_gz(url: &str, name: &str, dir: &Path) -> Result<PathBuf, PipelineError> {
    let file_name = dir.join(name);

    if !file_name.exists() {
        log::info!("Downloading {name}");
        let bytes = downloader::download_file_as_bytes(&format!("{url}{name}.gz"), name);

        write_gunzipped(&bytes, &file_name)?;
    }

    Ok(file_name)
}

/// Decompresses gzip bytes into `<file_name>.part`, renamed to `file_name` when complete.
fn write_gunzipped(bytes: &[u8], file_name: &Path) -> Result<(), PipelineError> {
    let mut partial = file_name.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let result = File::create(&partial).and_then(|mut output_file| {
        let mut gz_buffer = GzDecoder::new(bytes);
        std::io::copy(&mut gz_buffer, &mut output_file)?;
        output_file.sync_all()
    });

    match result.and_then(|_| rename(&partial, file_name)) {
        Ok(()) => Ok(()),
        Err(err) => {
            if partial.exists() {
                remove_file(&partial)?;
            }
            Err(err.into())
        }
    }
}

fn read_u32(bytes: &[u8], offset: usize, file: &str) -> Result<u32, PipelineError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| <[u8; 4]>::try_from(b).ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| PipelineError::corrupt(file, "truncated header"))
}

/// Parses an uncompressed IDX image file into a pixel buffer and the per image shape.
pub fn parse_idx_images(bytes: &[u8]) -> Result<(Vec<u8>, [usize; 3]), PipelineError> {
    const FILE: &str = "idx images";

    let magic = read_u32(bytes, 0, FILE)?;
    if magic != IDX_IMAGES_MAGIC {
        return Err(PipelineError::corrupt(
            FILE,
            format!("invalid magic number {magic}"),
        ));
    }

    let count = read_u32(bytes, 4, FILE)? as usize;
    let rows = read_u32(bytes, 8, FILE)? as usize;
    let cols = read_u32(bytes, 12, FILE)? as usize;

    let end = count
        .checked_mul(rows)
        .and_then(|len| len.checked_mul(cols))
        .and_then(|len| len.checked_add(16))
        .ok_or_else(|| {
            PipelineError::corrupt(FILE, format!("header {count}x{rows}x{cols} overflows"))
        })?;
    let pixels = bytes
        .get(16..end)
        .ok_or_else(|| PipelineError::corrupt(FILE, format!("expected {count} images")))?;
    log::debug!("Parsed {count} images of {rows}x{cols}");

    Ok((pixels.to_vec(), [rows, cols, 1]))
}

/// Parses an uncompressed IDX label file.
pub fn parse_idx_labels(bytes: &[u8]) -> Result<Vec<usize>, PipelineError> {
    const FILE: &str = "idx labels";

    let magic = read_u32(bytes, 0, FILE)?;
    if magic != IDX_LABELS_MAGIC {
        return Err(PipelineError::corrupt(
            FILE,
            format!("invalid magic number {magic}"),
        ));
    }

    let count = read_u32(bytes, 4, FILE)? as usize;
    let end = count
        .checked_add(8)
        .ok_or_else(|| PipelineError::corrupt(FILE, format!("header count {count} overflows")))?;
    let labels = bytes
        .get(8..end)
        .ok_or_else(|| PipelineError::corrupt(FILE, format!("expected {count} labels")))?;

    Ok(labels.iter().map(|&label| label as usize).collect())
}

fn read_cifar(files: &[PathBuf], mode: LabelMode) -> Result<RawSplit, PipelineError> {
    let mut pixels = Vec::new();
    let mut labels = Vec::new();

    for file in files {
        let bytes = std::fs::read(file)?;
        parse_cifar_records(&bytes, mode, &mut pixels, &mut labels)
            .map_err(|err| match err {
                PipelineError::Corrupt { reason, .. } => {
                    PipelineError::corrupt(file.display().to_string(), reason)
                }
                other => other,
            })?;
        log::debug!("Parsed {}", file.display());
    }

    Ok(RawSplit::new(
        pixels,
        [CIFAR_SIDE, CIFAR_SIDE, CIFAR_CHANNELS],
        labels,
    ))
}

/// Appends the records of a CIFAR binary batch, converting pixels to channels last.
///
/// Single label files carry one label byte per record, two-level files carry the coarse label
/// then the fine label.
pub fn parse_cifar_records(
    bytes: &[u8],
    mode: LabelMode,
    pixels: &mut Vec<u8>,
    labels: &mut Vec<usize>,
) -> Result<(), PipelineError> {
    let (label_bytes, label_offset) = match mode {
        LabelMode::Single => (1, 0),
        LabelMode::Coarse => (2, 0),
        LabelMode::Fine => (2, 1),
    };
    let record_len = label_bytes + CIFAR_IMAGE_LEN;

    if bytes.len() % record_len != 0 {
        return Err(PipelineError::corrupt(
            "cifar batch",
            format!("{} bytes is not a multiple of {record_len}", bytes.len()),
        ));
    }

    let plane = CIFAR_SIDE * CIFAR_SIDE;
    pixels.reserve(bytes.len() / record_len * CIFAR_IMAGE_LEN);

    for record in bytes.chunks_exact(record_len) {
        labels.push(record[label_offset] as usize);

        let image = &record[label_bytes..];
        for position in 0..plane {
            for channel in 0..CIFAR_CHANNELS {
                pixels.push(image[channel * plane + position]);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;
    use tempfile::tempdir;

    fn idx_header(magic: u32, dims: &[u32]) -> Vec<u8> {
        let mut bytes = magic.to_be_bytes().to_vec();
        for dim in dims {
            bytes.extend(dim.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn parses_idx_images() {
        let mut bytes = idx_header(2051, &[2, 2, 3]);
        bytes.extend(0..12u8);

        let (pixels, shape) = parse_idx_images(&bytes).unwrap();

        assert_eq!(shape, [2, 3, 1]);
        assert_eq!(pixels, (0..12u8).collect::<Vec<_>>());
    }

    #[test]
    fn rejects_idx_images_with_wrong_magic() {
        let mut bytes = idx_header(2049, &[1, 1, 1]);
        bytes.push(0);

        let err = parse_idx_images(&bytes).unwrap_err();

        assert!(matches!(err, PipelineError::Corrupt { .. }));
    }

    #[test]
    fn rejects_truncated_idx_images() {
        let mut bytes = idx_header(2051, &[3, 2, 2]);
        bytes.extend([0u8; 8]);

        assert!(parse_idx_images(&bytes).is_err());
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    /// Bytes that barely compress, so a truncated stream ends mid-payload.
    fn noise(len: usize) -> Vec<u8> {
        let mut state = 0x2545_f491_u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    fn cifar_archive(payload: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(payload.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "cifar-batches/data_batch_1.bin", payload)
            .unwrap();

        gzip(&builder.into_inner().unwrap())
    }

    #[test]
    fn gunzipped_file_is_written_whole() {
        let dir = tempdir().unwrap();
        let file_name = dir.path().join(TRAIN_LABELS);
        let payload = noise(4096);

        write_gunzipped(&gzip(&payload), &file_name).unwrap();

        assert_eq!(std::fs::read(&file_name).unwrap(), payload);
        assert!(!dir.path().join(format!("{TRAIN_LABELS}.part")).exists());
    }

    #[test]
    fn truncated_gzip_leaves_no_cached_file() {
        let dir = tempdir().unwrap();
        let file_name = dir.path().join(TRAIN_IMAGES);
        let compressed = gzip(&noise(64 * 1024));

        let result = write_gunzipped(&compressed[..compressed.len() / 2], &file_name);

        assert!(matches!(result, Err(PipelineError::Io(_))));
        assert!(!file_name.exists());
        assert!(!dir.path().join(format!("{TRAIN_IMAGES}.part")).exists());
    }

    #[test]
    fn archive_is_moved_under_root_once_unpacked() {
        let root = tempdir().unwrap();
        let payload = noise(2048);

        unpack_archive(&cifar_archive(&payload), root.path(), "cifar-batches").unwrap();

        let unpacked = root.path().join("cifar-batches").join("data_batch_1.bin");
        assert_eq!(std::fs::read(unpacked).unwrap(), payload);
        assert!(!root.path().join("cifar-batches.part").exists());
    }

    #[test]
    fn truncated_archive_leaves_no_cached_dir() {
        let root = tempdir().unwrap();
        let archive = cifar_archive(&noise(64 * 1024));

        let result = unpack_archive(&archive[..archive.len() / 2], root.path(), "cifar-batches");

        assert!(result.is_err());
        assert!(!root.path().join("cifar-batches").exists());
        assert!(!root.path().join("cifar-batches.part").exists());
    }

    #[test]
    fn oversized_idx_header_is_corrupt() {
        let mut bytes = idx_header(2051, &[u32::MAX; 3]);
        bytes.extend([0u8; 8]);

        assert!(matches!(
            parse_idx_images(&bytes),
            Err(PipelineError::Corrupt { .. })
        ));

        let mut bytes = idx_header(2049, &[u32::MAX]);
        bytes.extend([0u8; 4]);

        assert!(matches!(
            parse_idx_labels(&bytes),
            Err(PipelineError::Corrupt { .. })
        ));
    }

    #[test]
    fn parses_idx_labels() {
        let mut bytes = idx_header(2049, &[4]);
        bytes.extend([7u8, 0, 9, 3]);

        assert_eq!(parse_idx_labels(&bytes).unwrap(), vec![7, 0, 9, 3]);
    }

    fn cifar_record(labels: &[u8]) -> Vec<u8> {
        let mut record = labels.to_vec();
        // red plane = 1, green plane = 2, blue plane = 3
        for channel in 1..=3u8 {
            record.extend(std::iter::repeat(channel).take(1024));
        }
        record
    }

    #[test]
    fn cifar_pixels_are_channels_last() {
        let bytes = cifar_record(&[6]);
        let (mut pixels, mut labels) = (Vec::new(), Vec::new());

        parse_cifar_records(&bytes, LabelMode::Single, &mut pixels, &mut labels).unwrap();

        assert_eq!(labels, vec![6]);
        assert_eq!(pixels.len(), 3072);
        assert_eq!(&pixels[..6], &[1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn cifar_100_label_mode_selects_column() {
        let mut bytes = cifar_record(&[4, 73]);
        bytes.extend(cifar_record(&[11, 2]));

        let (mut pixels, mut coarse) = (Vec::new(), Vec::new());
        parse_cifar_records(&bytes, LabelMode::Coarse, &mut pixels, &mut coarse).unwrap();
        let (mut pixels, mut fine) = (Vec::new(), Vec::new());
        parse_cifar_records(&bytes, LabelMode::Fine, &mut pixels, &mut fine).unwrap();

        assert_eq!(coarse, vec![4, 11]);
        assert_eq!(fine, vec![73, 2]);
        assert_eq!(pixels.len(), 2 * 3072);
    }

    #[test]
    fn cifar_rejects_partial_records() {
        let bytes = vec![0u8; 3072];
        let (mut pixels, mut labels) = (Vec::new(), Vec::new());

        let result = parse_cifar_records(&bytes, LabelMode::Single, &mut pixels, &mut labels);

        assert!(matches!(result, Err(PipelineError::Corrupt { .. })));
    }

    #[test]
    fn in_memory_source_returns_its_splits() {
        let train = RawSplit::new(vec![0; 784], [28, 28, 1], vec![3]);
        let test = RawSplit::new(vec![1; 784], [28, 28, 1], vec![5]);
        let source = InMemorySource::new(train.clone(), test.clone());

        let (loaded_train, loaded_test) = source.load(&DatasetId::DigitGrayscale.spec()).unwrap();

        assert_eq!(loaded_train, train);
        assert_eq!(loaded_test, test);
    }

    #[test]
    fn download_source_uses_given_root() {
        let source = DownloadSource::new("/tmp/datasets");
        assert_eq!(source.root(), Path::new("/tmp/datasets"));
    }
}
