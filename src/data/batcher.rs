use super::mnist::{HEIGHT, MnistItem, WIDTH};
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

// Normalize: scale between [0,1] and make the mean=0 and std=1
// values mean=0.1307,std=0.3081 are from the PyTorch MNIST example
// https://github.com/pytorch/examples/blob/54f4572509891883a947411fd7239237dd2a39c3/mnist/main.py#L122
const MEAN: f32 = 0.1307;
const STD: f32 = 0.3081;

#[derive(Clone, Default)]
pub struct MnistBatcher {}

#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// The input feature is the brightness, z-score normalized (mean=0.0, stddev=1.0).
    ///
    /// The mappings are:
    ///
    /// * `z = (value / 255 - mean) / stddev`,
    /// * `value = (z * stddev + mean) * 255`.
    ///
    /// # Shape
    /// [batch_size, 1, HEIGHT, WIDTH]
    pub images: Tensor<B, 4>,
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, MnistItem, MnistBatch<B>> for MnistBatcher {
    fn batch(&self, items: Vec<MnistItem>, device: &B::Device) -> MnistBatch<B> {
        let (items_image, items_label): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|item| (item.image, item.label))
            .unzip();

        let images = items_image
            .into_iter()
            // single channel, so the channel dim is 1
            .map(|image| TensorData::new(image, [1, 1, HEIGHT, WIDTH]).convert::<B::FloatElem>())
            .map(|data| Tensor::<B, 4>::from_data(data, device))
            .map(|tensor| ((tensor / 255) - MEAN) / STD)
            .collect();

        let targets = items_label
            .into_iter()
            .map(|label: u8| {
                Tensor::<B, 1, Int>::from_data([(label as i64).elem::<B::IntElem>()], device)
            })
            .collect();

        let images = Tensor::cat(images, 0);
        let targets = Tensor::cat(targets, 0);

        MnistBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Element;
    use num_traits::AsPrimitive;

    type TestBackend = burn::backend::NdArray<Element>;

    fn item(brightness: u8, label: u8) -> MnistItem {
        MnistItem {
            image: vec![brightness.as_(); WIDTH * HEIGHT],
            label,
        }
    }

    #[test]
    fn batch_has_cnn_input_shapes() {
        let device = Default::default();
        let batch: MnistBatch<TestBackend> =
            MnistBatcher::default().batch(vec![item(0, 5), item(255, 0), item(128, 9)], &device);

        assert_eq!(batch.images.dims(), [3, 1, HEIGHT, WIDTH]);
        assert_eq!(batch.targets.dims(), [3]);
    }

    #[test]
    fn batch_is_z_score_normalized() {
        let device = Default::default();
        let batch: MnistBatch<TestBackend> =
            MnistBatcher::default().batch(vec![item(0, 1), item(255, 2)], &device);

        let pixels = batch.images.into_data().to_vec::<f32>().unwrap();
        let black = (0.0 - MEAN) / STD;
        let white = (1.0 - MEAN) / STD;
        assert!((pixels[0] - black).abs() < 1e-4);
        assert!((pixels[WIDTH * HEIGHT] - white).abs() < 1e-4);
    }

    #[test]
    fn batch_keeps_label_order() {
        let device = Default::default();
        let batch: MnistBatch<TestBackend> =
            MnistBatcher::default().batch(vec![item(1, 3), item(2, 1), item(3, 4)], &device);

        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![3, 1, 4]);
    }
}
