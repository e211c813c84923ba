use crate::model::{Cnn, CnnConfig};
use crate::training::TrainingConfig;
use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::record::{CompactRecorder, FileRecorder, Recorder};
use burn::{prelude::*, tensor::backend::AutodiffBackend};
use std::path::{Path, PathBuf};

pub const HELP: &str = "\
burn-digits

An MNIST digit-classification walkthrough: download the dataset, train a small
convolutional network, and measure test accuracy. Model weights, optimizer
state, and configurations are persisted in an artifacts directory.

USAGE:
    burn-digits [OPTIONS]

When no mode option is given, the whole walkthrough runs in order: dump a few
sample images, train, then evaluate on the test split.

BEHAVIOR OVERVIEW
- If --training-config or --model-config is given, the corresponding config is
  loaded from the specified file and saved to the artifacts directory
  (overwriting any existing file). Otherwise the program attempts to load the
  config from the artifacts directory; if absent, the default is created and
  saved.
- Model and optimizer records are loaded from the artifacts directory when
  present, so re-running --train resumes from the previous state.
- With --remove-artifacts, existing model and optimizer records are deleted
  before training (only meaningful together with --train).

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    -t, --train                 Run the training loop
    -e, --evaluate              Measure loss and accuracy over the test split
    -i, --infer <INDEX>         Predict the test item at INDEX with the saved model
    -s, --show-samples <N>      Save the first N test digits as PNG files
    -r, --remove-artifacts      Delete existing model and optimizer records before training
    -c, --training-config <PATH>
                                Load the training configuration from this file
    -m, --model-config <PATH>   Load the model configuration from this file
    -a, --artifacts-path <PATH>
                                Directory where configurations, model weights, and optimizer
                                state are saved and loaded. Created when missing.
                                Defaults to a newly created temporary directory (path is printed).
";

#[derive(Debug)]
pub struct AppArgs {
    pub train: bool,
    pub evaluate: bool,
    pub infer: Option<usize>,
    pub show_samples: Option<usize>,
    pub remove_artifacts: bool,
    pub training_config: Option<PathBuf>,
    pub model_config: Option<PathBuf>,
    pub artifacts_path: PathBuf,
}

impl AppArgs {
    pub fn parse() -> Result<Self, pico_args::Error> {
        Self::from_args(pico_args::Arguments::from_env())
    }

    fn from_args(mut pargs: pico_args::Arguments) -> Result<Self, pico_args::Error> {
        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{HELP}");
            std::process::exit(0);
        }

        let args = AppArgs {
            infer: pargs.opt_value_from_str(["-i", "--infer"])?,
            show_samples: pargs.opt_value_from_str(["-s", "--show-samples"])?,
            training_config: pargs.opt_value_from_os_str(["-c", "--training-config"], parse_path)?,
            model_config: pargs.opt_value_from_os_str(["-m", "--model-config"], parse_path)?,
            artifacts_path: pargs
                .opt_value_from_os_str(["-a", "--artifacts-path"], parse_path)?
                .unwrap_or_else(|| {
                    // e.g. /tmp/burn-digits-abcd-0
                    let name = format!("{}-", std::env!("CARGO_PKG_NAME"));
                    let tmp = temp_dir::TempDir::with_prefix(name)
                        .expect("Failed to create the temporary directory")
                        .dont_delete_on_drop();
                    let path = tmp.path();
                    println!("new artifacts directory: {path:?}");
                    path.into()
                }),
            // must parse flags after values
            train: pargs.contains(["-t", "--train"]),
            evaluate: pargs.contains(["-e", "--evaluate"]),
            remove_artifacts: pargs.contains(["-r", "--remove-artifacts"]),
        };

        let remaining = pargs.finish();
        if !remaining.is_empty() {
            return Err(pico_args::Error::ArgumentParsingFailed {
                cause: format!("unused arguments: {remaining:?}"),
            });
        }

        Ok(args)
    }

    /// No mode option selected: run the full walkthrough.
    pub fn is_full_walkthrough(&self) -> bool {
        !self.train && !self.evaluate && self.infer.is_none() && self.show_samples.is_none()
    }

    pub fn create_artifact_dir(&self) {
        create_artifact_dir(&self.artifacts_path, self.remove_artifacts && self.train)
    }

    pub fn save_training_config(&self, training_config: &TrainingConfig) {
        let path = self.training_config_path();
        log::info!("saving training config into {path:?}");
        training_config
            .save(&path)
            .expect("Failed to save the training config");
    }

    /// Explicit config file, else the artifacts directory, else `None`.
    pub fn load_training_config(&self) -> Option<TrainingConfig> {
        load_config(self.training_config.as_deref(), &self.training_config_path())
    }

    pub fn save_model_config(&self, model_config: &CnnConfig) {
        let path = self.model_config_path();
        log::info!("saving model config into {path:?}");
        model_config
            .save(&path)
            .expect("Failed to save the model config");
    }

    pub fn load_model_config(&self) -> Option<CnnConfig> {
        load_config(self.model_config.as_deref(), &self.model_config_path())
    }

    pub fn save_model<B: Backend>(&self, model: &Cnn<B>) {
        let path = self.artifacts_path.join(MODEL_NAME);
        let path_ext = path.with_added_extension(file_extension::<B>());
        log::info!("saving model to {path_ext:?}");
        model
            .clone()
            .save_file(path, &CompactRecorder::new()) // ext added automatically
            .expect("Failed to save the model");
    }

    pub fn load_model<B: Backend>(
        &self,
        model_config: &CnnConfig,
        device: &B::Device,
    ) -> Option<Cnn<B>> {
        let path = self.artifacts_path.join(MODEL_NAME);
        let path_ext = path.with_added_extension(file_extension::<B>());
        if !path_ext.exists() {
            return None;
        }
        log::info!("loading model from {path_ext:?}");
        let model = model_config
            .init(device)
            .load_file(path, &CompactRecorder::new(), device) // ext added automatically
            .expect("Failed to load the saved model");
        Some(model)
    }

    pub fn load_or_init_model<B: Backend>(
        &self,
        model_config: &CnnConfig,
        device: &B::Device,
    ) -> Cnn<B> {
        self.load_model(model_config, device).unwrap_or_else(|| {
            log::info!("initializing a new model");
            let model = model_config.init(device);
            self.save_model(&model);
            model
        })
    }

    pub fn save_optim<AutoB, AutoM>(&self, optim: &impl Optimizer<AutoM, AutoB>)
    where
        AutoB: AutodiffBackend,
        AutoM: AutodiffModule<AutoB>,
    {
        let path = self.artifacts_path.join(OPTIM_NAME);
        let path_ext = path.with_added_extension(file_extension::<AutoB>());
        log::info!("saving optimizer state to {path_ext:?}");
        let record = optim.to_record();
        CompactRecorder::new()
            .record(record, path) // ext added automatically
            .expect("Failed to save the optimizer state");
    }

    pub fn load_optim_record<AutoB, AutoM, Optim>(
        &self,
        optim: Optim,
        device: &AutoB::Device,
    ) -> Optim
    where
        AutoB: AutodiffBackend,
        AutoM: AutodiffModule<AutoB>,
        Optim: Optimizer<AutoM, AutoB>,
    {
        let path = self.artifacts_path.join(OPTIM_NAME);
        let path_ext = path.with_added_extension(file_extension::<AutoB>());
        if !path_ext.exists() {
            return optim;
        }
        log::info!("loading optimizer state from {path_ext:?}");
        let record = CompactRecorder::new()
            .load(path, device) // ext added automatically
            .expect("Failed to load the optimizer state");
        optim.load_record(record)
    }

    fn training_config_path(&self) -> PathBuf {
        self.artifacts_path
            .join(TRAINING_CONFIG_NAME)
            .with_added_extension("json")
    }

    fn model_config_path(&self) -> PathBuf {
        self.artifacts_path
            .join(MODEL_CONFIG_NAME)
            .with_added_extension("json")
    }
}

pub const TRAINING_CONFIG_NAME: &str = "training_config";
pub const MODEL_CONFIG_NAME: &str = "model_config";
pub const MODEL_NAME: &str = "model";
pub const OPTIM_NAME: &str = "optim";

fn parse_path(s: &std::ffi::OsStr) -> Result<PathBuf, &'static str> {
    Ok(s.into())
}

fn file_extension<B: Backend>() -> &'static str {
    <CompactRecorder as FileRecorder<B>>::file_extension()
}

fn load_config<C: Config>(explicit: Option<&Path>, stored: &Path) -> Option<C> {
    if let Some(path) = explicit {
        log::info!("loading config from {path:?}");
        let config = C::load(path).expect("Failed to load the config file");
        return Some(config);
    }
    if stored.exists() {
        log::info!("loading config from {stored:?}");
        let config = C::load(stored).expect("Failed to load the stored config");
        return Some(config);
    }
    None
}

/// Create the directory holding the model, optimizer, and config files.
pub fn create_artifact_dir(artifact_dir: &Path, remove_records: bool) {
    std::fs::create_dir_all(artifact_dir).ok();
    if remove_records {
        for name in [MODEL_NAME, OPTIM_NAME] {
            let path = artifact_dir.join(name).with_added_extension("mpk");
            if path.exists() {
                log::info!("removing {path:?}");
                std::fs::remove_file(&path).expect("failed to remove a stale record");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Element;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::{Adam, AdamConfig, GradientsParams, adaptor::OptimizerAdaptor};
    use std::ffi::OsString;
    use temp_dir::TempDir;

    type TestBackend = NdArray<Element>;
    type TestAutoBackend = Autodiff<TestBackend>;

    fn parse(args: &[&str]) -> AppArgs {
        let args: Vec<OsString> = args.iter().map(OsString::from).collect();
        AppArgs::from_args(pico_args::Arguments::from_vec(args)).unwrap()
    }

    fn args_in(dir: &Path) -> AppArgs {
        AppArgs {
            train: true,
            evaluate: false,
            infer: None,
            show_samples: None,
            remove_artifacts: false,
            training_config: None,
            model_config: None,
            artifacts_path: dir.to_path_buf(),
        }
    }

    #[test]
    fn no_mode_flags_means_full_walkthrough() {
        let args = parse(&["--artifacts-path", "/tmp/burn-digits-test"]);
        assert!(args.is_full_walkthrough());
        assert_eq!(args.artifacts_path, PathBuf::from("/tmp/burn-digits-test"));
    }

    #[test]
    fn mode_flags_are_parsed() {
        let args = parse(&[
            "--train",
            "--evaluate",
            "--infer",
            "42",
            "--show-samples",
            "8",
            "--remove-artifacts",
            "--artifacts-path",
            "/tmp/burn-digits-test",
        ]);
        assert!(args.train);
        assert!(args.evaluate);
        assert_eq!(args.infer, Some(42));
        assert_eq!(args.show_samples, Some(8));
        assert!(args.remove_artifacts);
        assert!(!args.is_full_walkthrough());
    }

    #[test]
    fn unused_arguments_are_rejected() {
        let args: Vec<OsString> = ["--train", "stray"].iter().map(OsString::from).collect();
        let result = AppArgs::from_args(pico_args::Arguments::from_vec(args));
        assert!(result.is_err());
    }

    #[test]
    fn persisted_model_predicts_like_the_original() {
        let dir = TempDir::new().unwrap();
        let args = args_in(dir.path());
        let device = Default::default();

        let model: Cnn<TestBackend> = CnnConfig::new().init(&device);
        args.save_model(&model);

        let loaded: Cnn<TestBackend> = args.load_model(&CnnConfig::new(), &device).unwrap();

        let images = Tensor::<TestBackend, 4>::ones([2, 1, 28, 28], &device);
        let original = model.forward(images.clone()).into_data();
        let reloaded = loaded.forward(images).into_data();
        assert_eq!(
            original.to_vec::<Element>().unwrap(),
            reloaded.to_vec::<Element>().unwrap()
        );
    }

    fn grads_of(
        model: &Cnn<TestAutoBackend>,
        device: &<TestAutoBackend as Backend>::Device,
    ) -> GradientsParams {
        let images = Tensor::<TestAutoBackend, 4>::ones([2, 1, 28, 28], device);
        let loss = model.forward(images).sum();
        GradientsParams::from_grads(loss.backward(), model)
    }

    #[test]
    fn optimizer_state_round_trips() {
        let dir = TempDir::new().unwrap();
        let args = args_in(dir.path());
        let device = Default::default();

        let model: Cnn<TestAutoBackend> = CnnConfig::new().with_dropout(0.0).init(&device);
        let mut optim: OptimizerAdaptor<Adam, Cnn<TestAutoBackend>, TestAutoBackend> =
            AdamConfig::new().init();

        // one step so the record carries per-parameter Adam state
        let model = optim.step(1e-3, model.clone(), grads_of(&model, &device));
        args.save_optim(&optim);

        let mut restored: OptimizerAdaptor<Adam, Cnn<TestAutoBackend>, TestAutoBackend> =
            args.load_optim_record(AdamConfig::new().init(), &device);

        // identical optimizer state must move the weights identically
        let stepped = optim.step(1e-3, model.clone(), grads_of(&model, &device));
        let restored_step = restored.step(1e-3, model.clone(), grads_of(&model, &device));

        let images = Tensor::<TestAutoBackend, 4>::ones([1, 1, 28, 28], &device);
        let a = stepped.forward(images.clone()).sum().into_scalar().elem::<f32>();
        let b = restored_step.forward(images).sum().into_scalar().elem::<f32>();
        assert_eq!(a, b);
    }

    #[test]
    fn removing_artifacts_keeps_configs() {
        let dir = TempDir::new().unwrap();
        let mut args = args_in(dir.path());
        args.remove_artifacts = true;
        let device = Default::default();

        args.save_training_config(&TrainingConfig::new(AdamConfig::new()));
        args.save_model_config(&CnnConfig::new());
        let model: Cnn<TestBackend> = CnnConfig::new().init(&device);
        args.save_model(&model);

        args.create_artifact_dir();

        let reloaded: Option<Cnn<TestBackend>> = args.load_model(&CnnConfig::new(), &device);
        assert!(reloaded.is_none());
        assert!(args.load_training_config().is_some());
        assert!(args.load_model_config().is_some());
    }

    #[test]
    fn records_survive_removal_when_not_training() {
        let dir = TempDir::new().unwrap();
        let mut args = args_in(dir.path());
        args.train = false;
        args.remove_artifacts = true;
        let device = Default::default();

        let model: Cnn<TestBackend> = CnnConfig::new().init(&device);
        args.save_model(&model);

        args.create_artifact_dir();

        let reloaded: Option<Cnn<TestBackend>> = args.load_model(&CnnConfig::new(), &device);
        assert!(reloaded.is_some());
    }
}
