use anyhow::Result;
use clap::Parser;
use focal_cli::{
    ManifestPipeline, PipelineOptions,
    args::ManifestArgs,
    config::{apply_cli_overrides, load_settings},
    detector::load_yunet,
};
use focal_utils::{configure_telemetry, init_logging};
use log::info;

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = ManifestArgs::parse();

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );

    let options = PipelineOptions::from_settings(&settings)?;
    info!(
        "Building manifest for {} -> {}",
        options.asset_root.display(),
        options.output_path.display()
    );

    let mut pipeline = ManifestPipeline::new(options);
    let summary = pipeline.run(|| load_yunet(&settings))?;
    println!("{summary}");
    Ok(())
}
