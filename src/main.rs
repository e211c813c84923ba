use burn::optim::AdamConfig;
use burn_digits::backend::{MainAutoBackend, MainBackend, MainDevice};
use burn_digits::cli::AppArgs;
use burn_digits::data::MnistDataset;
use burn_digits::model::CnnConfig;
use burn_digits::training::{self, TrainingConfig};
use burn_digits::{inference, visualize};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app_args = AppArgs::parse()?;
    app_args.create_artifact_dir();

    // explicit config file, else the stored one, else defaults; whatever is
    // chosen ends up persisted in the artifacts directory
    let training_config = app_args
        .load_training_config()
        .unwrap_or_else(|| TrainingConfig::new(AdamConfig::new()));
    app_args.save_training_config(&training_config);

    let model_config = app_args.load_model_config().unwrap_or_else(CnnConfig::new);
    app_args.save_model_config(&model_config);

    let walkthrough = app_args.is_full_walkthrough();

    if walkthrough || app_args.show_samples.is_some() {
        let count = app_args.show_samples.unwrap_or(8);
        let dataset = MnistDataset::test()?;
        visualize::save_samples(&dataset, count, &app_args.artifacts_path.join("samples"))?;
    }

    if walkthrough || app_args.train {
        let device = MainAutoBackend::main_device();
        training::train::<MainAutoBackend>(&training_config, &model_config, device, &app_args)?;
    }

    if walkthrough || app_args.evaluate {
        let device = MainBackend::main_device();
        let accuracy =
            training::evaluate::<MainBackend>(&training_config, &model_config, device, &app_args)?;
        log::info!("test accuracy: {accuracy:.2}%");
    }

    if let Some(index) = app_args.infer {
        let device = MainBackend::main_device();
        inference::infer::<MainBackend>(&model_config, device, &app_args, index)?;
    }

    Ok(())
}
