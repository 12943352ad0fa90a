use std::fs;
use std::path::PathBuf;

use imbalance_features::{
    init_logging, log_app_start, log_config_selected, log_run_complete, logging_config_from_env,
    missing_values_summary, read_observation_csv, run_pipeline_to_schema, write_feature_csv,
    PipelineConfig,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let mut args = std::env::args().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        return Err("usage: build_features <input.csv> <output.csv>".into());
    };
    let input = PathBuf::from(input);
    let output = PathBuf::from(output);

    let cfg = match std::env::var("IMBF_PIPELINE_CONFIG") {
        Ok(path) => {
            let path = PathBuf::from(path);
            log_config_selected("file", Some(&path));
            PipelineConfig::from_json_str(&fs::read_to_string(&path)?)?
        }
        Err(_) => {
            log_config_selected("default", None);
            PipelineConfig::default()
        }
    };

    let raw = read_observation_csv(&input)?;
    println!("{}", missing_values_summary(&raw, "raw input"));

    let (enriched, report, schema) = run_pipeline_to_schema(&raw, &cfg)?;
    println!("{}", missing_values_summary(&enriched, "features"));

    write_feature_csv(&enriched, &output)?;
    log_run_complete(&output, &report, &schema);
    println!(
        "Wrote {} rows x {} columns to {} (schema v{} {})",
        report.output_rows,
        report.output_columns,
        output.display(),
        schema.version,
        schema.fingerprint
    );
    if report.unclassified_spread_rows > 0 {
        println!(
            "{} rows had no spread regime and took position {}",
            report.unclassified_spread_rows, cfg.unclassified_position
        );
    }

    Ok(())
}
