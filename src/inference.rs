use crate::cli::AppArgs;
use crate::data::{MnistBatcher, MnistDataset, MnistItem};
use crate::model::{Cnn, CnnConfig};
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use std::error::Error;

/// Predicts the digit for a single item with an already-loaded model.
pub fn predict<B: Backend>(model: &Cnn<B>, item: MnistItem, device: &B::Device) -> u8 {
    let batch = MnistBatcher::default().batch(vec![item], device);
    let output = model.forward(batch.images);
    let predicted = output.argmax(1).flatten::<1>(0, 1).into_scalar();

    predicted.elem::<i64>() as u8
}

/// Loads the persisted model and predicts the test item at `index`, logging
/// predicted vs. expected label. Returns the prediction.
pub fn infer<B: Backend>(
    model_config: &CnnConfig,
    device: B::Device,
    app_args: &AppArgs,
    index: usize,
) -> Result<u8, Box<dyn Error>> {
    let model: Cnn<B> = app_args
        .load_model(model_config, &device)
        .expect("No saved model in the artifacts directory; run --train first");

    let dataset = MnistDataset::test()?;
    let item = test_item(&dataset, index)?;
    let expected = item.label;

    let predicted = predict(&model, item, &device);
    log::info!("test item {index}: predicted {predicted}, expected {expected}");

    Ok(predicted)
}

fn test_item(dataset: &impl Dataset<MnistItem>, index: usize) -> Result<MnistItem, Box<dyn Error>> {
    dataset.get(index).ok_or_else(|| {
        log::error!("no test item at index {index}");
        format!(
            "no test item at index {index}, the test split holds {} items",
            dataset.len()
        )
        .into()
    })
}
