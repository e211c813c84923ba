use crate::data::{HEIGHT, MnistItem, WIDTH};
use burn::data::dataset::Dataset;
use image::GrayImage;
use num_traits::AsPrimitive;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

/// Saves the first `count` dataset items as grayscale PNGs under `out_dir`.
///
/// The notebook-style "look at a few digits" step: each file is named after
/// its index and label, e.g. `digit_0003_label_7.png`.
pub fn save_samples<D>(dataset: &D, count: usize, out_dir: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>>
where
    D: Dataset<MnistItem> + ?Sized,
{
    fs::create_dir_all(out_dir)?;

    let count = count.min(dataset.len());
    let mut paths = Vec::with_capacity(count);
    for index in 0..count {
        let item = dataset.get(index).expect("index is below the dataset length");
        let path = out_dir.join(format!("digit_{index:0>4}_label_{}.png", item.label));
        save_item(&item, &path)?;
        log::info!("sample {index} (label {}) saved to {path:?}", item.label);
        paths.push(path);
    }

    Ok(paths)
}

/// Renders one 28x28 item to a PNG file.
pub fn save_item(item: &MnistItem, path: &Path) -> Result<(), Box<dyn Error>> {
    // brightness values are already in [0, 255]
    let pixels: Vec<u8> = item
        .image
        .iter()
        .map(|brightness| {
            let value: f32 = (*brightness).as_();
            value.clamp(0.0, 255.0) as u8
        })
        .collect();

    let img = GrayImage::from_raw(WIDTH as u32, HEIGHT as u32, pixels)
        .expect("pixel buffer matches the image dimensions");
    img.save(path)?;

    Ok(())
}
