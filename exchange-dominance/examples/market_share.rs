use chrono::Duration;
use exchange_dominance::{
    AnalyzerConfig, VolumeAnalyzer,
    share::{AggregationMode, average_share, regional_share},
};
use tracing::error;

#[tokio::main]
async fn main() {
    // Initialise INFO Tracing log subscriber
    init_logging();

    let ticker = std::env::args().nth(1).unwrap_or_else(|| "SOL".to_string());
    let days = std::env::args()
        .nth(2)
        .and_then(|days| days.parse::<u32>().ok())
        .unwrap_or(30);

    let mut analyzer = match VolumeAnalyzer::new(AnalyzerConfig::from_env()) {
        Ok(analyzer) => analyzer,
        Err(error) => {
            error!(%error, "failed to initialise analyzer");
            return;
        }
    };

    println!("\n════════════════════════════════════════════════════════════");
    println!("EXCHANGE DOMINANCE: {ticker}, last {days} days");
    println!("════════════════════════════════════════════════════════════");

    let price = analyzer.current_price(&ticker).await;
    println!("Current price: ${price:.4}");

    let dataset = match analyzer.fetch_historical(&ticker, days).await {
        Ok(dataset) => dataset,
        Err(error) => {
            error!(%error, "invalid request");
            return;
        }
    };

    let Some((first, last)) = dataset.date_range() else {
        println!("No data available for {ticker}");
        print_errors(&analyzer, &dataset);
        return;
    };

    let totals = dataset.product_totals();
    println!("Range: {first} → {last}");
    println!(
        "Total volume: ${:.0} (spot ${:.0}, perp ${:.0})",
        totals.total_usd(),
        totals.spot_usd,
        totals.perpetual_usd
    );

    let rows = analyzer.market_share_by_mode(&dataset, AggregationMode::SpotAndPerp);

    println!("\n7-day average share (spot + perp)");
    for average in average_share(&rows, last - Duration::days(6)) {
        println!("  {:<12} {:>6.2}%", average.key, average.share_pct);
    }

    println!("\nKR vs Non-KR on {last}");
    for regional in regional_share(&rows)
        .into_iter()
        .filter(|regional| regional.date == last)
    {
        println!(
            "  {:<8} ${:>16.0} {:>6.2}%",
            regional.region, regional.volume_usd, regional.share_pct
        );
    }

    let snapshot = analyzer.fetch_24h_volume(&ticker).await;
    println!("\nRolling 24h volume");
    for volume in &snapshot.exchanges {
        println!(
            "  {:<12} ${:>16.0} {:>6.2}%",
            volume.exchange,
            volume.total_volume_usd(),
            snapshot.share_pct(volume.exchange)
        );
    }

    print_errors(&analyzer, &dataset);
}

fn print_errors(analyzer: &VolumeAnalyzer, dataset: &exchange_dominance::dataset::HistoricalDataset) {
    let missing = analyzer.missing_exchanges(dataset);
    if missing.is_empty() {
        return;
    }

    println!("\nMissing exchanges");
    for missing in missing {
        println!("  {:<12} {}", missing.exchange, missing.reason);
        println!("  {:<12} {}", "", missing.guidance);
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        // Filter messages based on the INFO level
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        // Use colored output in debug mode
        .with_ansi(cfg!(debug_assertions))
        // Install this Tracing subscriber as global default
        .init()
}
