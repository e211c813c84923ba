use crate::cli::AppArgs;
use crate::data::{DataError, MnistBatch, MnistBatcher, MnistDataset};
use crate::model::{Cnn, CnnConfig};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder, Progress},
    module::AutodiffModule,
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    prelude::*,
    tensor::backend::AutodiffBackend,
    train::metric::{AccuracyMetric, Adaptor, LossMetric, Metric, MetricMetadata, Numeric},
};
use std::sync::Arc;

#[derive(Config)]
pub struct TrainingConfig {
    pub optimizer: AdamConfig,
    /// One full pass over the training split is enough to pass 95% test
    /// accuracy with the default model.
    #[config(default = 1)]
    pub num_epochs: usize,
    #[config(default = 64)]
    pub batch_size: usize,
    #[config(default = 2)]
    pub num_workers: usize,
    #[config(default = 1e-3)]
    pub lr: f64,
    #[config(default = 42)]
    pub seed: u64,
    /// Batches between training-progress log lines.
    #[config(default = 50)]
    pub log_interval: usize,
}

type Dataloader<B> = Arc<dyn DataLoader<B, MnistBatch<B>> + 'static>;

type CnnOptimizer<AutoB> = OptimizerAdaptor<Adam, Cnn<AutoB>, AutoB>;

/// Trains the classifier, persisting model/optimizer/config artifacts after
/// every epoch. Resumes from previously saved records when they exist.
pub fn train<AutoB: AutodiffBackend>(
    training_config: &TrainingConfig,
    model_config: &CnnConfig,
    device: AutoB::Device,
    app_args: &AppArgs,
) -> Result<Cnn<AutoB>, DataError> {
    AutoB::seed(training_config.seed);

    // load (or init and save) model and optimizer state
    let mut model: Cnn<AutoB> = app_args.load_or_init_model(model_config, &device);
    let optim = training_config.optimizer.init();
    let mut optim: CnnOptimizer<AutoB> = app_args.load_optim_record(optim, &device);

    let batcher = MnistBatcher::default();

    let dataloader_train = DataLoaderBuilder::new(batcher.clone())
        .batch_size(training_config.batch_size)
        .shuffle(training_config.seed)
        .num_workers(training_config.num_workers)
        .build(MnistDataset::train()?);
    let dataloader_valid = DataLoaderBuilder::new(batcher)
        .batch_size(training_config.batch_size)
        .num_workers(training_config.num_workers)
        .build(MnistDataset::test()?);

    let training_num_items = dataloader_train.num_items();

    let mut metric_meta = MetricMetadata {
        progress: Progress::new(0, training_num_items),
        epoch: 1,
        epoch_total: training_config.num_epochs,
        iteration: 0,
        lr: Some(training_config.lr),
    };

    log::info!("running a small initial validation...");
    epoch_valid::<AutoB::InnerBackend>(
        Arc::clone(&dataloader_valid),
        model.valid(),
        training_config,
        metric_meta.epoch,
        Some(10),
    );

    log::info!("starting training...");
    for epoch in 1..training_config.num_epochs + 1 {
        metric_meta.epoch = epoch;

        model = epoch_train::<AutoB>(
            Arc::clone(&dataloader_train),
            model,
            training_config,
            &mut optim,
            &mut metric_meta,
        );

        // save assets
        app_args.save_model(&model);
        app_args.save_optim(&optim);

        log::info!("running full validation...");
        epoch_valid::<AutoB::InnerBackend>(
            Arc::clone(&dataloader_valid),
            model.valid(),
            training_config,
            metric_meta.epoch,
            None,
        );
    }
    log::info!("training finished");

    Ok(model)
}

/// One pass over the training split: forward, cross-entropy loss, backward,
/// optimizer step, per-batch metric updates.
pub fn epoch_train<AutoB: AutodiffBackend>(
    dataloader_train: Dataloader<AutoB>,
    mut model: Cnn<AutoB>,
    training_config: &TrainingConfig,
    optim: &mut CnnOptimizer<AutoB>,
    metric_meta: &mut MetricMetadata,
) -> Cnn<AutoB> {
    let mut loss_metric = LossMetric::<AutoB>::new();
    let mut acc_metric = AccuracyMetric::<AutoB>::new();

    let batches_total = dataloader_train.num_items() / training_config.batch_size + 1;

    for (b, batch) in dataloader_train.iter().enumerate() {
        let [batch_size, _, _, _] = batch.images.dims();

        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += batch_size;

        let output = model.forward_classification(batch);
        acc_metric.update(&output.adapt(), metric_meta);
        loss_metric.update(&output.adapt(), metric_meta);

        // backward pass and one optimizer step
        let grads = output.loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optim.step(training_config.lr, model, grads);

        if (b + 1) % training_config.log_interval == 0 {
            log::info!(
                "epoch {}/{}, batch {:0>4}/{}, loss {:.4}, acc {:0>6.2}%",
                metric_meta.epoch,
                metric_meta.epoch_total,
                b + 1,
                batches_total,
                loss_metric.value(),
                acc_metric.value(),
            );
        }
    }

    log::info!(
        "epoch {}/{}, train loss {:.4}, train acc {:0>6.2}%",
        metric_meta.epoch,
        metric_meta.epoch_total,
        loss_metric.value(),
        acc_metric.value(),
    );

    model
}

/// One forward-only pass over a split, reporting average loss and accuracy.
/// Returns the accuracy in percent.
pub fn epoch_valid<B: Backend>(
    dataloader_valid: Dataloader<B>,
    valid_model: Cnn<B>,
    training_config: &TrainingConfig,
    epoch: usize,
    batch_limit: Option<usize>,
) -> f64 {
    let batch_limit = batch_limit.unwrap_or(usize::MAX);
    let valid_num_items = dataloader_valid.num_items();
    let mut metric_meta = MetricMetadata {
        progress: Progress::new(0, valid_num_items),
        epoch,
        epoch_total: training_config.num_epochs,
        iteration: 0,
        lr: Some(training_config.lr),
    };

    let mut loss_metric = LossMetric::<B>::new();
    let mut acc_metric = AccuracyMetric::<B>::new();

    for batch in dataloader_valid.iter().take(batch_limit) {
        let [batch_size, _, _, _] = batch.images.dims();

        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += batch_size;

        let output = valid_model.forward_classification(batch);
        acc_metric.update(&output.adapt(), &metric_meta);
        loss_metric.update(&output.adapt(), &metric_meta);
    }

    log::info!(
        "epoch {}/{}, valid loss {:.4}, valid acc {:0>6.2}%",
        metric_meta.epoch,
        metric_meta.epoch_total,
        loss_metric.value(),
        acc_metric.value(),
    );

    acc_metric.value()
}

/// Measures loss and accuracy of the persisted model over the whole test
/// split, without touching the autodiff backend.
pub fn evaluate<B: Backend>(
    training_config: &TrainingConfig,
    model_config: &CnnConfig,
    device: B::Device,
    app_args: &AppArgs,
) -> Result<f64, DataError> {
    let model: Cnn<B> = app_args
        .load_model(model_config, &device)
        .expect("No saved model in the artifacts directory; run --train first");

    let dataloader_test = DataLoaderBuilder::new(MnistBatcher::default())
        .batch_size(training_config.batch_size)
        .num_workers(training_config.num_workers)
        .build(MnistDataset::test()?);

    let accuracy = epoch_valid::<B>(dataloader_test, model, training_config, 1, None);
    Ok(accuracy)
}
