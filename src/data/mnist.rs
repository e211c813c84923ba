use super::DataError;
use super::download::fetch_gz_file;
use crate::backend::Element;
use burn::data::dataset::{
    Dataset, InMemDataset,
    transform::{Mapper, MapperDataset},
};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

// CVDF mirror of http://yann.lecun.com/exdb/mnist/
const URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";
const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

// IDX magic numbers: 0x08 element type (unsigned byte) followed by the
// dimension count (3 for images, 1 for labels).
const IMAGES_MAGIC: u32 = 0x0803;
const LABELS_MAGIC: u32 = 0x0801;

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;

/// MNIST item.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MnistItem {
    /// Image as a flat array of floats.
    /// Each value is a brightness, in between 0.0 and 255.0.
    ///
    /// # Shape
    /// [HEIGHT * WIDTH]
    pub image: Vec<Element>,

    /// Label of the image.
    /// Each value is in between 0 and 9.
    pub label: u8,
}

#[derive(Deserialize, Debug, Clone)]
struct MnistItemRaw {
    pub image_bytes: Vec<u8>,
    pub label: u8,
}

struct BytesToImage;

impl Mapper<MnistItemRaw, MnistItem> for BytesToImage {
    /// Convert a raw MNIST item (image bytes) to a MNIST item (float array image).
    fn map(&self, item: &MnistItemRaw) -> MnistItem {
        debug_assert_eq!(item.image_bytes.len(), WIDTH * HEIGHT);

        let image: Vec<Element> = item
            .image_bytes
            .iter()
            .map(|brightness| {
                let element: Element = (*brightness).as_();
                element
            })
            .collect();

        MnistItem {
            image,
            label: item.label,
        }
    }
}

type MappedDataset = MapperDataset<InMemDataset<MnistItemRaw>, BytesToImage, MnistItemRaw>;

/// The MNIST dataset consists of 70,000 28x28 black-and-white images in 10 classes (one for each
/// digit), with 7,000 images per class. There are 60,000 training images and 10,000 test images.
///
/// The data is downloaded from the web from the [CVDF mirror](https://github.com/cvdfoundation/mnist),
/// then cached under `~/.cache/burn-digits/mnist/`.
pub struct MnistDataset {
    dataset: MappedDataset,
}

impl Dataset<MnistItem> for MnistDataset {
    fn get(&self, index: usize) -> Option<MnistItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl MnistDataset {
    /// Creates the train split, downloading it when not cached yet.
    pub fn train() -> Result<Self, DataError> {
        Self::new("train")
    }

    /// Creates the test split, downloading it when not cached yet.
    pub fn test() -> Result<Self, DataError> {
        Self::new("test")
    }

    fn new(split: &str) -> Result<Self, DataError> {
        let root = Self::download(split)?;
        Self::from_dir(&root, split)
    }

    /// Loads a split from IDX files already on disk.
    ///
    /// MNIST is tiny so it is loaded in-memory:
    /// train images (u8): 28 * 28 * 60000 = 47.04Mb,
    /// test images (u8): 28 * 28 * 10000 = 7.84Mb.
    pub fn from_dir(root: &Path, split: &str) -> Result<Self, DataError> {
        let (images_file, labels_file) = split_files(split);
        let images = Self::read_images(&root.join(images_file))?;
        let labels = Self::read_labels(&root.join(labels_file))?;

        if images.len() != labels.len() {
            return Err(DataError::format(
                root,
                format!(
                    "{} images but {} labels in the {split} split",
                    images.len(),
                    labels.len()
                ),
            ));
        }

        let items: Vec<_> = images
            .into_iter()
            .zip(labels)
            .map(|(image_bytes, label)| MnistItemRaw { image_bytes, label })
            .collect();

        let dataset = InMemDataset::new(items);
        let dataset = MapperDataset::new(dataset, BytesToImage);

        Ok(Self { dataset })
    }

    /// Download the split files into the cache directory, skipping files
    /// that are already present.
    fn download(split: &str) -> Result<PathBuf, DataError> {
        let cache_dir = dirs::home_dir()
            .expect("Could not get home directory")
            .join(".cache")
            .join("burn-digits");
        let split_dir = cache_dir.join("mnist").join(split);

        if !split_dir.exists() {
            create_dir_all(&split_dir)?;
        }

        let (images_file, labels_file) = split_files(split);
        fetch_gz_file(URL, images_file, &split_dir)?;
        fetch_gz_file(URL, labels_file, &split_dir)?;

        Ok(split_dir)
    }

    /// Read an IDX image file. Each image is a vector of `WIDTH * HEIGHT` bytes.
    fn read_images(path: &Path) -> Result<Vec<Vec<u8>>, DataError> {
        let mut f = File::open(path)?;

        let magic = read_be_u32(&mut f, path)?;
        if magic != IMAGES_MAGIC {
            return Err(DataError::format(
                path,
                format!("image magic number is {magic:#06x}, expected {IMAGES_MAGIC:#06x}"),
            ));
        }
        let size = read_be_u32(&mut f, path)? as usize;
        let rows = read_be_u32(&mut f, path)? as usize;
        let cols = read_be_u32(&mut f, path)? as usize;
        if (rows, cols) != (HEIGHT, WIDTH) {
            return Err(DataError::format(
                path,
                format!("images are {rows}x{cols}, expected {HEIGHT}x{WIDTH}"),
            ));
        }

        let mut buf_images = vec![0u8; WIDTH * HEIGHT * size];
        let _ = f.seek(SeekFrom::Start(16))?;
        f.read_exact(&mut buf_images)
            .map_err(|_| DataError::format(path, format!("truncated payload, header claims {size} images")))?;

        Ok(buf_images
            .chunks(WIDTH * HEIGHT)
            .map(|chunk| chunk.to_vec())
            .collect())
    }

    /// Read an IDX label file. Each label is a byte.
    fn read_labels(path: &Path) -> Result<Vec<u8>, DataError> {
        let mut f = File::open(path)?;

        let magic = read_be_u32(&mut f, path)?;
        if magic != LABELS_MAGIC {
            return Err(DataError::format(
                path,
                format!("label magic number is {magic:#06x}, expected {LABELS_MAGIC:#06x}"),
            ));
        }
        let size = read_be_u32(&mut f, path)? as usize;

        let mut buf_labels = vec![0u8; size];
        let _ = f.seek(SeekFrom::Start(8))?;
        f.read_exact(&mut buf_labels)
            .map_err(|_| DataError::format(path, format!("truncated payload, header claims {size} labels")))?;

        Ok(buf_labels)
    }
}

fn split_files(split: &str) -> (&'static str, &'static str) {
    match split {
        "train" => (TRAIN_IMAGES, TRAIN_LABELS),
        "test" => (TEST_IMAGES, TEST_LABELS),
        _ => panic!("Invalid split specified {split}"),
    }
}

fn read_be_u32(f: &mut File, path: &Path) -> Result<u32, DataError> {
    let mut buf = [0u8; 4];
    f.read_exact(&mut buf)
        .map_err(|_| DataError::format(path, "file shorter than its header"))?;
    Ok(u32::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use temp_dir::TempDir;

    fn write_idx_images(dir: &Path, name: &str, images: &[Vec<u8>]) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&IMAGES_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&(images.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&(HEIGHT as u32).to_be_bytes());
        bytes.extend_from_slice(&(WIDTH as u32).to_be_bytes());
        for image in images {
            bytes.extend_from_slice(image);
        }
        File::create(dir.join(name))
            .unwrap()
            .write_all(&bytes)
            .unwrap();
    }

    fn write_idx_labels(dir: &Path, name: &str, labels: &[u8]) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        bytes.extend_from_slice(labels);
        File::create(dir.join(name))
            .unwrap()
            .write_all(&bytes)
            .unwrap();
    }

    fn image_filled_with(value: u8) -> Vec<u8> {
        vec![value; WIDTH * HEIGHT]
    }

    #[test]
    fn parses_a_synthetic_split() {
        let dir = TempDir::new().unwrap();
        write_idx_images(
            dir.path(),
            TEST_IMAGES,
            &[image_filled_with(0), image_filled_with(255)],
        );
        write_idx_labels(dir.path(), TEST_LABELS, &[7, 2]);

        let dataset = MnistDataset::from_dir(dir.path(), "test").unwrap();
        assert_eq!(dataset.len(), 2);

        let first = dataset.get(0).unwrap();
        assert_eq!(first.label, 7);
        assert_eq!(first.image.len(), WIDTH * HEIGHT);
        assert_eq!(first.image[0], AsPrimitive::<Element>::as_(0u8));

        let second = dataset.get(1).unwrap();
        assert_eq!(second.label, 2);
        assert_eq!(
            second.image[WIDTH * HEIGHT - 1],
            AsPrimitive::<Element>::as_(255u8)
        );

        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        // label magic in an image file
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&(HEIGHT as u32).to_be_bytes());
        bytes.extend_from_slice(&(WIDTH as u32).to_be_bytes());
        bytes.extend_from_slice(&image_filled_with(0));
        File::create(dir.path().join(TEST_IMAGES))
            .unwrap()
            .write_all(&bytes)
            .unwrap();
        write_idx_labels(dir.path(), TEST_LABELS, &[0]);

        let err = MnistDataset::from_dir(dir.path(), "test").map(|_| ()).unwrap_err();
        assert!(matches!(err, DataError::Format { .. }));
    }

    #[test]
    fn rejects_truncated_payload() {
        let dir = TempDir::new().unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&IMAGES_MAGIC.to_be_bytes());
        // header claims two images, payload holds one
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&(HEIGHT as u32).to_be_bytes());
        bytes.extend_from_slice(&(WIDTH as u32).to_be_bytes());
        bytes.extend_from_slice(&image_filled_with(1));
        File::create(dir.path().join(TEST_IMAGES))
            .unwrap()
            .write_all(&bytes)
            .unwrap();
        write_idx_labels(dir.path(), TEST_LABELS, &[0, 1]);

        let err = MnistDataset::from_dir(dir.path(), "test").map(|_| ()).unwrap_err();
        assert!(matches!(err, DataError::Format { .. }));
    }

    #[test]
    fn rejects_count_mismatch() {
        let dir = TempDir::new().unwrap();
        write_idx_images(dir.path(), TEST_IMAGES, &[image_filled_with(3)]);
        write_idx_labels(dir.path(), TEST_LABELS, &[1, 2, 3]);

        let err = MnistDataset::from_dir(dir.path(), "test").map(|_| ()).unwrap_err();
        assert!(matches!(err, DataError::Format { .. }));
    }
}
