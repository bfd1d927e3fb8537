use std::path::PathBuf;

use clap::{Parser, Subcommand};

use opponent_cache::aggregate::OpponentProfile;
use opponent_cache::config::{CacheConfig, CacheVariant};
use opponent_cache::persist::CacheStore;
use opponent_cache::query::QueryService;
use opponent_cache::stats::{CacheStatistics, win_rate};

#[derive(Debug, Parser)]
#[command(name = "opponent_cache")]
#[command(about = "Cached opponent history for one tracked player")]
struct Cli {
    #[arg(long, value_enum, default_value_t = CacheVariant::All)]
    variant: CacheVariant,

    /// Overrides OPPONENT_CACHE_FILE.
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Overrides OPPONENT_DATA_DIR.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild the cache from the source files.
    Refresh,
    Stats,
    Search {
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    Top {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    Frequent {
        #[arg(short, long, default_value_t = 2)]
        min_games: u32,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    Range {
        #[arg(long)]
        min: f64,
        #[arg(long)]
        max: f64,
    },
    Title {
        #[arg(short, long)]
        title: String,
    },
    Upsets,
    /// Per-tournament opponent lists for the selected tournaments.
    Breakdown,
}

fn main() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut cfg = CacheConfig::from_env();
    if let Some(dir) = cli.data_dir {
        cfg.data_dir = dir;
    }
    if let Some(cache) = cli.cache {
        cfg.cache_file = Some(cache);
    }

    let store = CacheStore::open(cfg.spec_for(cli.variant));
    let mut svc = QueryService::new(store);
    run(&mut svc, cli.command);
}

fn run(svc: &mut QueryService, command: Command) {
    match command {
        Command::Refresh => {
            println!("Refreshing opponent cache...");
            if svc.store_mut().force_refresh() {
                let stats = svc.statistics();
                println!(
                    "Cache refreshed: {} opponents from {} games",
                    stats.total_opponents, stats.total_games
                );
            } else {
                println!("Failed to refresh cache");
            }
        }
        Command::Stats => print_statistics(&svc.statistics()),
        Command::Search { query, limit } => {
            let Some(query) = query.filter(|q| !q.trim().is_empty()) else {
                println!("Please provide a search query with --query");
                return;
            };
            let hits = svc.search(&query);
            println!("\n=== SEARCH RESULTS FOR '{query}' ===");
            if hits.is_empty() {
                println!("No opponents found");
                return;
            }
            print_profiles(hits.into_iter().take(limit));
        }
        Command::Top { limit } => {
            println!("\n=== TOP {limit} OPPONENTS BY RATING ===");
            print_profiles(svc.top_by_rating(limit));
        }
        Command::Frequent { min_games, limit } => {
            println!("\n=== FREQUENT OPPONENTS ({min_games}+ games) ===");
            print_profiles(svc.frequent(min_games).into_iter().take(limit));
        }
        Command::Range { min, max } => {
            println!("\n=== OPPONENTS RATED {min:.0}-{max:.0} ===");
            print_profiles(svc.by_rating_range(min, max));
        }
        Command::Title { title } => {
            println!("\n=== {} OPPONENTS ===", title.to_uppercase());
            print_profiles(svc.by_title(&title));
        }
        Command::Upsets => {
            println!("\n=== UPSET VICTORIES ===");
            for p in svc.upset_victories() {
                println!("Beat {} ({:.0}) - {} time(s)", p.name, p.avg_rating, p.upset_victories);
            }
        }
        Command::Breakdown => {
            println!("\n=== TOURNAMENT BREAKDOWN ===");
            for (i, t) in svc.store().tournament_breakdown().iter().enumerate() {
                println!("\n{}. {} ({})", i + 1, t.tournament_name, t.date);
                println!(
                    "   Score: {} | Opponents: {} | Rating change: {:+}",
                    t.score,
                    t.opponents.len(),
                    t.rating_change
                );
                for opp in &t.opponents {
                    println!("   R{}: {} ({}) - {}", opp.round, opp.name, opp.rating, opp.result);
                }
            }
        }
    }
}

fn print_statistics(stats: &CacheStatistics) {
    println!("\n=== OPPONENT CACHE STATISTICS ===");
    println!("Total opponents: {}", stats.total_opponents);
    println!("Total games: {}", stats.total_games);
    println!(
        "Record: {}W-{}L-{}D",
        stats.total_wins, stats.total_losses, stats.total_draws
    );
    println!("Win percentage: {:.1}%", stats.win_percentage);
    println!("Average opponent rating: {:.0}", stats.avg_opponent_rating);
    println!("Upset victories: {} ({:.1}% of games vs higher-rated)", stats.upset_victories, stats.upset_rate);
    println!(
        "Last updated: {}",
        stats.last_updated.as_deref().unwrap_or("Never")
    );

    println!("\nRating distribution:");
    for band in stats.rating_distribution.iter().rev() {
        println!("  {}: {} opponents", band.label, band.count);
    }
    if stats.title_distribution.len() > 1 {
        println!("\nTitles:");
        for (title, count) in &stats.title_distribution {
            println!("  {title}: {count} opponents");
        }
    }
}

fn print_profiles<'a>(profiles: impl IntoIterator<Item = &'a OpponentProfile>) {
    for (i, p) in profiles.into_iter().enumerate() {
        let title = p.title.as_deref().map(|t| format!(" ({t})")).unwrap_or_default();
        println!("{:2}. {}{} ({:.0})", i + 1, p.name, title, p.avg_rating);
        println!(
            "    Games: {} | Record: {}W-{}L-{}D | Win rate: {:.1}% | Last faced: {}",
            p.total_games,
            p.wins_against,
            p.losses_against,
            p.draws_against,
            win_rate(p),
            p.last_faced
        );
    }
}
