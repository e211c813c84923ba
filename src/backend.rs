use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// Pixel/weight element type. MNIST brightness values fit f16, which halves
/// the stored model size.
#[cfg(feature = "f16")]
pub type Element = burn::tensor::f16;
#[cfg(not(feature = "f16"))]
pub type Element = f32;

#[cfg(feature = "ndarray")]
pub type MainBackend = burn::backend::NdArray<Element>;
#[cfg(all(
    any(feature = "tch-cpu", feature = "tch-gpu"),
    not(feature = "ndarray")
))]
pub type MainBackend = burn::backend::LibTorch<Element>;
#[cfg(all(
    any(feature = "wgpu", feature = "metal"),
    not(any(feature = "ndarray", feature = "tch-cpu", feature = "tch-gpu"))
))]
pub type MainBackend = burn::backend::Wgpu<Element, i32>;
#[cfg(all(
    feature = "cuda",
    not(any(
        feature = "ndarray",
        feature = "tch-cpu",
        feature = "tch-gpu",
        feature = "wgpu",
        feature = "metal"
    ))
))]
pub type MainBackend = burn::backend::Cuda<Element, i32>;

/// Picks the device the selected backend should run on.
pub trait MainDevice: Backend {
    fn main_device() -> <Self as Backend>::Device {
        Default::default()
    }
}

#[cfg(any(
    feature = "ndarray",
    feature = "tch-cpu",
    all(any(feature = "wgpu", feature = "metal"), not(feature = "tch-gpu")),
    all(
        feature = "cuda",
        not(any(feature = "tch-gpu", feature = "wgpu", feature = "metal"))
    )
))]
impl MainDevice for MainBackend {}

#[cfg(all(
    feature = "tch-gpu",
    not(any(feature = "ndarray", feature = "tch-cpu")),
    not(target_os = "macos")
))]
impl MainDevice for MainBackend {
    fn main_device() -> <Self as Backend>::Device {
        burn::backend::libtorch::LibTorchDevice::Cuda(0)
    }
}
#[cfg(all(
    feature = "tch-gpu",
    not(any(feature = "ndarray", feature = "tch-cpu")),
    target_os = "macos"
))]
impl MainDevice for MainBackend {
    fn main_device() -> <Self as Backend>::Device {
        burn::backend::libtorch::LibTorchDevice::Mps
    }
}

pub type MainAutoBackend = burn::backend::Autodiff<MainBackend>;
impl MainDevice for MainAutoBackend {
    fn main_device() -> <Self as Backend>::Device {
        <<Self as AutodiffBackend>::InnerBackend as MainDevice>::main_device()
    }
}

#[cfg(not(any(
    feature = "ndarray",
    feature = "tch-cpu",
    feature = "tch-gpu",
    feature = "wgpu",
    feature = "metal",
    feature = "cuda"
)))]
mod err {
    std::compile_error!(
        "No backend selected. Please check burn-digits/Cargo.toml for the available backend features."
    );

    // pretend to fall back to ndarray (to avoid too many other unrelated errors)
    pub type MainBackend = burn::backend::NdArray<super::Element>;
    impl super::MainDevice for MainBackend {}
}
#[cfg(not(any(
    feature = "ndarray",
    feature = "tch-cpu",
    feature = "tch-gpu",
    feature = "wgpu",
    feature = "metal",
    feature = "cuda"
)))]
pub use err::*;
