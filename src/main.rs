use classifier_pipeline::{run, source::DownloadSource, PipelineConfig, PipelineError};

#[cfg(not(feature = "wgpu"))]
use burn::backend::ndarray::{NdArray, NdArrayDevice};
#[cfg(feature = "wgpu")]
use burn::backend::wgpu::{Wgpu, WgpuDevice};
use burn::backend::Autodiff;

/// Dataset to classify: mnist_d, mnist_f, cifar_10, cifar_100_f or cifar_100_c.
const DATASET: &str = "cifar_100_f";
/// Strategy to run: guesser, tf_net or tf_conv.
const ALGORITHM: &str = "tf_conv";

#[cfg(not(feature = "wgpu"))]
type Backend = Autodiff<NdArray>;
#[cfg(feature = "wgpu")]
type Backend = Autodiff<Wgpu>;

#[cfg(not(feature = "wgpu"))]
fn device() -> NdArrayDevice {
    NdArrayDevice::Cpu
}

#[cfg(feature = "wgpu")]
fn device() -> WgpuDevice {
    WgpuDevice::default()
}

fn launch() -> Result<(), PipelineError> {
    let config = PipelineConfig::from_ids(DATASET, ALGORITHM)?;
    let source = DownloadSource::default();
    log::info!("Dataset cache: {}", source.root().display());

    run::<Backend>(&config, &source, &device())?;

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = launch() {
        log::error!("{err}");
        std::process::exit(1);
    }
}
