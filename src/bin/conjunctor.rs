use anyhow::{anyhow, bail, Context, Result};
use camino::Utf8PathBuf;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use conjunctor::{
    close_pairs::WindowParams,
    constants::{
        DEFAULT_DIST_WINDOW_KM, DEFAULT_FETCH_TIMEOUT_S, DEFAULT_RADIUS_KM, DEFAULT_RISK_SCALE_KM,
        DEFAULT_STEP_MINUTES, DEFAULT_TCA_WINDOW_S, DEFAULT_WINDOW_HOURS,
    },
    elements::{ElementSource, TleFileSource},
    ground_truth::{DirectoryGroundTruthSource, UnavailableGroundTruth},
    matcher::MatchParams,
    metrics::compute_metrics,
    propagator::Sgp4Propagator,
    risk::RiskScorer,
    screening::{screen, ScreeningParams},
    spatial_index::KdTree,
    storage::{read_match_log, ArtifactStore, JsonlPredictionSource},
    time::parse_utc,
    validator::{Validator, ValidatorConfig},
};

#[derive(Parser)]
#[command(name = "conjunctor")]
#[command(about = "Conjunction screening and validation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Screen a TLE catalog and store the scored predictions
    Screen {
        /// TLE file (2-line or 3-line groups)
        #[arg(long)]
        tle: Utf8PathBuf,
        /// Artifact store root
        #[arg(long, default_value = "data")]
        store: Utf8PathBuf,
        /// Window start (ISO-8601, naive = UTC); defaults to now
        #[arg(long)]
        start: Option<String>,
        #[arg(long, default_value_t = DEFAULT_WINDOW_HOURS)]
        hours: i64,
        #[arg(long, default_value_t = DEFAULT_STEP_MINUTES)]
        step_min: i64,
        #[arg(long, default_value_t = DEFAULT_RADIUS_KM)]
        radius_km: f64,
        /// Risk distance scale (km)
        #[arg(long, default_value_t = DEFAULT_RISK_SCALE_KM)]
        scale_km: f64,
        /// Only screen the first N objects of the catalog
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Validate stored predictions against ground truth
    Validate {
        #[arg(long, default_value = "data")]
        store: Utf8PathBuf,
        /// Window start (ISO-8601)
        #[arg(long, requires = "end", conflicts_with = "days")]
        start: Option<String>,
        /// Window end (ISO-8601)
        #[arg(long, requires = "start")]
        end: Option<String>,
        /// Validate the last N days, ending now
        #[arg(long, default_value_t = 1)]
        days: i64,
        #[arg(long, default_value_t = DEFAULT_TCA_WINDOW_S)]
        tca_window_s: i64,
        /// Distance tolerance (km); a negative value disables the check
        #[arg(long, default_value_t = DEFAULT_DIST_WINDOW_KM, allow_negative_numbers = true)]
        dist_window_km: f64,
        /// Directory of CDM files (KVN or JSON); without it the run is degraded
        #[arg(long)]
        cdm_dir: Option<Utf8PathBuf>,
        #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_S)]
        fetch_timeout_s: u64,
    },

    /// Recompute metrics from a persisted run log
    Metrics {
        #[arg(long)]
        match_log: Utf8PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Screen {
            tle,
            store,
            start,
            hours,
            step_min,
            radius_km,
            scale_km,
            limit,
        } => {
            let mut source = TleFileSource::new(&tle);
            if let Some(n) = limit {
                source = source.with_limit(n);
            }
            let catalog = source
                .load()
                .with_context(|| format!("loading elements from {tle}"))?;

            let start = match start {
                Some(s) => parse_utc(&s)?,
                None => Utc::now(),
            };
            let duration = checked(Duration::try_hours(hours), "hours", hours)?;
            if start.checked_add_signed(duration).is_none() {
                bail!("--hours {hours} runs past the representable time range");
            }
            let params = ScreeningParams {
                window: WindowParams::builder()
                    .start(start)
                    .duration(duration)
                    .step(checked(Duration::try_minutes(step_min), "step-min", step_min)?)
                    .radius_km(radius_km)
                    .build()?,
                scorer: RiskScorer::new(scale_km)?,
            };

            let propagator = Sgp4Propagator::with_catalog(&catalog);
            let outcome = screen(&catalog, &params, &propagator, &KdTree);
            if outcome.diagnostics.propagation_failures > 0 {
                warn!(
                    failures = outcome.diagnostics.propagation_failures,
                    "some samples could not be propagated"
                );
            }

            let path = ArtifactStore::new(store).write_predictions(&outcome.predictions, Utc::now())?;
            info!(objects = catalog.len(), predictions = outcome.predictions.len(), %path, "screening done");
            println!("{path}");
        }

        Commands::Validate {
            store,
            start,
            end,
            days,
            tca_window_s,
            dist_window_km,
            cdm_dir,
            fetch_timeout_s,
        } => {
            let (start, end) = window(start, end, days)?;
            let params = MatchParams::builder()
                .tca_window_s(tca_window_s)
                .dist_window_km((dist_window_km >= 0.0).then_some(dist_window_km))
                .build()?;

            let store = ArtifactStore::new(store);
            let config = ValidatorConfig::new(store.clone())
                .with_fetch_timeout(std::time::Duration::from_secs(fetch_timeout_s));
            let predictions = JsonlPredictionSource::new(store);

            let result = match cdm_dir {
                Some(dir) => Validator::new(config, predictions, DirectoryGroundTruthSource::new(&dir))
                    .run(start, end, &params),
                None => Validator::new(
                    config,
                    predictions,
                    UnavailableGroundTruth::new("no CDM directory configured"),
                )
                .run(start, end, &params),
            };

            match result {
                Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                Err(failure) => {
                    if let Some(report) = &failure.report {
                        println!("{}", serde_json::to_string_pretty(report)?);
                    }
                    return Err(failure.into());
                }
            }
        }

        Commands::Metrics { match_log } => {
            let results = read_match_log(&match_log)
                .with_context(|| format!("reading match log {match_log}"))?;
            println!("{}", serde_json::to_string_pretty(&compute_metrics(&results))?);
        }
    }

    Ok(())
}

fn window(
    start: Option<String>,
    end: Option<String>,
    days: i64,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    match (start, end) {
        (Some(s), Some(e)) => Ok((parse_utc(&s)?, parse_utc(&e)?)),
        _ => {
            if days <= 0 {
                bail!("--days must be > 0, got {days}");
            }
            let end = Utc::now();
            let start = end
                .checked_sub_signed(checked(Duration::try_days(days), "days", days)?)
                .ok_or_else(|| anyhow!("--days {days} reaches before the representable time range"))?;
            Ok((start, end))
        }
    }
}

fn checked(delta: Option<Duration>, flag: &str, value: i64) -> Result<Duration> {
    delta.ok_or_else(|| anyhow!("--{flag} {value} is out of range"))
}

#[cfg(test)]
mod conjunctor_cli_test {
    use super::*;

    #[test]
    fn test_out_of_range_spans_are_rejected() {
        assert!(checked(Duration::try_hours(i64::MAX), "hours", i64::MAX).is_err());
        assert!(checked(Duration::try_minutes(i64::MIN), "step-min", i64::MIN).is_err());
        assert_eq!(
            checked(Duration::try_hours(12), "hours", 12).unwrap(),
            Duration::hours(12)
        );

        assert!(window(None, None, i64::MAX).is_err());
        assert!(window(None, None, 100_000_000_000).is_err());
        assert!(window(None, None, 0).is_err());

        let (start, end) = window(None, None, 2).unwrap();
        assert_eq!(end - start, Duration::days(2));
    }

    #[test]
    fn test_explicit_window() {
        let (start, end) = window(
            Some("2025-11-08T00:00:00Z".into()),
            Some("2025-11-09".into()),
            1,
        )
        .unwrap();
        assert_eq!(end - start, Duration::days(1));
    }
}
