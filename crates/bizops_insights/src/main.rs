use std::path::PathBuf;
use std::sync::Arc;

use bizops_client::BizClient;
use bizops_client::config::Config;
use bizops_client::http_client::ReqwestBizClient;
use bizops_insights::domains::competitor::import_prices_file;
use bizops_insights::{
    ActivityService, CompetitorPriceMap, DateRange, InsightsSettings, LoggingMiddleware,
    ProfitService, RemoteEstimator,
};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "bizops-insights")]
#[command(about = "Profit, competitor pricing and daily activity from the business reports API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Report window; dates are passed to the backend as `YYYY-MM-DD`.
#[derive(Debug, Default, PartialEq, Args)]
struct RangeArgs {
    /// First day included
    #[arg(long)]
    from: Option<String>,

    /// Last day included
    #[arg(long)]
    to: Option<String>,
}

impl From<RangeArgs> for DateRange {
    fn from(args: RangeArgs) -> Self {
        DateRange::new(args.from, args.to)
    }
}

#[derive(Debug, PartialEq, Subcommand)]
enum Command {
    /// Per-product margins, price gaps and portfolio KPIs
    Profit {
        #[command(flatten)]
        range: RangeArgs,

        /// Maximum number of sales rows requested from the report
        #[arg(long)]
        limit: Option<u32>,

        /// Percentage of revenue assumed as cost when the catalog has none
        #[arg(long)]
        fallback_pct: Option<f64>,

        /// Competitor price sheet (.csv or .xlsx)
        #[arg(long)]
        competitors: Option<PathBuf>,

        /// Estimate competitor prices with the local model
        #[arg(long)]
        estimate: bool,
    },

    /// Inventory and sales activity bucketed by day
    Activity {
        #[command(flatten)]
        range: RangeArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_env = bizops_insights::init_tracing();
    tracing::debug!(%log_env, "bizops-insights: log filter");

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let settings = InsightsSettings::from_env()?;
    let client: Arc<dyn BizClient> =
        Arc::new(LoggingMiddleware::new(ReqwestBizClient::from_config(&config)));

    let output = match cli.command {
        Command::Profit {
            range,
            limit,
            fallback_pct,
            competitors,
            estimate,
        } => {
            let service = ProfitService::new(client, settings);
            let options = service.options(fallback_pct);
            let mut report = service
                .analyze(&range.into(), limit, options, None)
                .await?;

            let mut prices = CompetitorPriceMap::new();
            let mut imported = None;
            if let Some(path) = &competitors {
                let (map, summary) = import_prices_file(path)?;
                prices.merge(map);
                imported = Some(summary);
            }
            let mut estimated = None;
            if estimate {
                let remote = RemoteEstimator::from_config(&config.llm);
                let (map, summary) = service
                    .estimate_prices(&report, Some(&remote), config.llm.timeout)
                    .await;
                prices.merge(map);
                estimated = Some(summary);
            }
            if !prices.is_empty() {
                report.apply_competitor_prices(&prices);
            }

            json!({
                "report": report,
                "competitorImport": imported,
                "competitorEstimate": estimated,
            })
        }
        Command::Activity { range } => {
            let buckets = ActivityService::new(client)
                .day_activity(&range.into())
                .await?;
            json!({ "days": buckets })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("bizops-insights").chain(args.iter().copied()))
    }

    #[test]
    fn parses_profit_flags() {
        let cli = parse(&[
            "profit",
            "--from",
            "2025-01-01",
            "--fallback-pct",
            "45",
            "--competitors",
            "prices.csv",
            "--estimate",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::Profit {
                range: RangeArgs {
                    from: Some("2025-01-01".into()),
                    to: None,
                },
                limit: None,
                fallback_pct: Some(45.0),
                competitors: Some(PathBuf::from("prices.csv")),
                estimate: true,
            }
        );
    }

    #[test]
    fn parses_activity_range() {
        let cli = parse(&["activity", "--to", "2025-02-01"]).unwrap();
        let Command::Activity { range } = cli.command else {
            panic!("expected activity");
        };
        assert_eq!(
            DateRange::from(range),
            DateRange::new(None, Some("2025-02-01".into()))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["report"]).is_err());
        assert!(parse(&["profit", "--from"]).is_err());
        assert!(parse(&["profit", "--fallback-pct", "lots"]).is_err());
        assert!(parse(&["profit", "--limit", "-3"]).is_err());
        assert!(parse(&["activity", "--estimate"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
