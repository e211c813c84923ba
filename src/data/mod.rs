pub mod batcher;
pub mod download;
pub mod mnist;

pub use batcher::{MnistBatch, MnistBatcher};
pub use mnist::{HEIGHT, MnistDataset, MnistItem, WIDTH};

/// Errors raised while fetching or decoding the dataset.
///
/// Everything past this point (tensor shapes, autograd, the optimizer) is
/// burn's responsibility and panics with burn's own messages.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("failed to download {url}")]
    Download {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed IDX file {path}: {reason}")]
    Format { path: String, reason: String },
}

impl DataError {
    pub(crate) fn format(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}
