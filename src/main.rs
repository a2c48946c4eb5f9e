use anyhow::{Context, Result};
use open_energy_forecast::{config, data, forecast, interactive, ml, telemetry, PipelineError};
use config::Config;
use data::DataLoader;
use forecast::{feature_overview, ForecastPipeline, PersistenceBaseline};
use interactive::Prompter;
use std::io::{self, BufRead, Write};
use telemetry::init_tracing;
use tracing::{info, warn};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load()?;
    init_tracing(&cfg.telemetry);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut prompter = Prompter::new(stdin.lock(), stdout.lock());

    let location = match cfg.data.location {
        Some(location) => location,
        None => prompter.location_choice()?,
    };

    prompter.say(format!("Step 1: Loading data from {}...", location))?;
    let (table, summary) = DataLoader::new(&cfg.data.dir).load(location)?;
    prompter.say(format!("Total dataset size: {} rows", summary.rows))?;
    if let Some((start, end)) = summary.time_range {
        prompter.say(format!("Dataset time range: {} to {}", start, end))?;
    }

    prompter.say("\nStep 2: Persistence baseline on the full table...")?;
    let persistence = PersistenceBaseline.series(&table)?;
    let baseline = forecast::evaluate(
        forecast::MetricReport::default(),
        &persistence.y_true,
        &persistence.y_pred,
        PersistenceBaseline::NAME,
    )?;
    prompter.say(baseline.render(Some(PersistenceBaseline::NAME)))?;

    prompter.say("Step 3: Training and evaluating models...")?;
    let pipeline = ForecastPipeline::new(cfg.pipeline_options());
    let run = pipeline.run(&table).context("forecast pipeline failed")?;
    for failure in &run.failures {
        prompter.say(format!("Skipped model {}: {}", failure.name, failure.error))?;
    }
    prompter.say(run.report.render(None))?;

    let window = run.comparison(cfg.report.comparison_window)?;
    prompter.say(format!(
        "Step 4: Last {} test points (actual vs predicted)",
        window.len()
    ))?;
    prompter.say(window.render_table())?;

    if let Some(path) = &cfg.report.comparison_csv {
        window.write_csv(path)?;
        info!(path = %path.display(), "comparison written");
    }
    if let Some(path) = &cfg.report.metrics_json {
        std::fs::write(path, run.report.to_json()?)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
        info!(path = %path.display(), "metrics written");
    }

    prompter.say("All tasks completed successfully!")?;

    if prompter.confirm("\nWould you like to enter interactive prediction mode?")? {
        interactive_mode(&mut prompter, &run.predictor, &table)?;
    }

    Ok(())
}

fn interactive_mode<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    predictor: &ml::Predictor,
    table: &open_energy_forecast::domain::MeasurementTable,
) -> Result<()> {
    prompter.show_feature_overview(&feature_overview(table))?;

    loop {
        match prompter.weather_parameters() {
            Ok(mut parameters) => loop {
                match predictor.predict_all_from_parameters(&parameters) {
                    Ok(predictions) => {
                        prompter.say("\n=== One-Hour Ahead Power Predictions ===")?;
                        for (name, value) in &predictions {
                            prompter.say(format!("{} Model: {:.4}", name.to_uppercase(), value))?;
                        }
                        break;
                    }
                    Err(PipelineError::MissingFeature { feature }) => {
                        prompter.say(format!("A value for '{}' is required.", feature))?;
                        let feature = feature.parse().context("unknown feature name")?;
                        let value = prompter.feature_until_valid(feature)?;
                        parameters.insert(feature.to_string(), value);
                    }
                    Err(error) => {
                        prompter.say(format!("Error making prediction: {}", error))?;
                        break;
                    }
                }
            },
            Err(error) => {
                warn!(%error, "invalid input");
                prompter.say(format!("Error making prediction: {:#}", error))?;
            }
        }

        if !prompter.confirm("\nMake another prediction?")? {
            return Ok(());
        }
    }
}
