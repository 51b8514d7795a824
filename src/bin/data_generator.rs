use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Write synthetic Batting.csv and Master.csv files for local runs
#[derive(Parser)]
#[command(name = "data_generator")]
struct Args {
    /// Output directory
    #[arg(long, default_value = "data/baseball")]
    out: PathBuf,

    /// Number of distinct players
    #[arg(long, default_value = "5000")]
    players: usize,

    /// First season
    #[arg(long, default_value = "1871")]
    first_year: i64,

    /// Last season, inclusive
    #[arg(long, default_value = "2015")]
    last_year: i64,

    /// Batting rows per season
    #[arg(long, default_value = "700")]
    rows_per_year: usize,

    #[arg(long, default_value = "42")]
    seed: u64,
}

const LAST_NAMES: [&str; 12] = [
    "smith", "jones", "barnes", "white", "spalding", "mcvey", "wright", "ruth", "cobb", "young",
    "mathews", "gehrig",
];
const FIRST_NAMES: [&str; 10] = [
    "ross", "deacon", "al", "cal", "george", "ty", "cy", "lou", "james", "john",
];
const STATES: [&str; 16] = [
    "CA", "PA", "NY", "OH", "IL", "TX", "FL", "MO", "MA", "AL", "NJ", "GA", "MI", "NC", "VA", "WA",
];
const OTHER_COUNTRIES: [(&str, &str); 4] = [
    ("D.R.", "Santo Domingo"),
    ("Venezuela", "Zulia"),
    ("CAN", "ON"),
    ("P.R.", ""),
];
const TEAMS: [(&str, &str); 6] = [
    ("BS1", "NA"),
    ("CH1", "NA"),
    ("NY1", "NL"),
    ("BOS", "AL"),
    ("CHN", "NL"),
    ("NYA", "AL"),
];

fn main() -> Result<()> {
    let args = Args::parse();
    anyhow::ensure!(args.players > 0, "--players must be at least 1");
    anyhow::ensure!(args.last_year >= args.first_year, "--last-year is before --first-year");
    let mut rng = StdRng::seed_from_u64(args.seed);
    fs::create_dir_all(&args.out)
        .with_context(|| format!("cannot create {}", args.out.display()))?;

    let master_path = args.out.join("Master.csv");
    let mut master = BufWriter::new(File::create(&master_path)?);
    writeln!(master, "playerID,birthYear,birthCountry,birthState,nameFirst,nameLast")?;

    let mut ids = Vec::with_capacity(args.players);
    for i in 0..args.players {
        let last = LAST_NAMES[rng.random_range(0..LAST_NAMES.len())];
        let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
        let id = format!(
            "{}{}{:04}",
            &last[..last.len().min(5)],
            &first[..first.len().min(2)],
            i
        );
        let (country, state) = if rng.random_bool(0.85) {
            ("USA", STATES[rng.random_range(0..STATES.len())])
        } else {
            OTHER_COUNTRIES[rng.random_range(0..OTHER_COUNTRIES.len())]
        };
        let birth_year = args.first_year - 20 + rng.random_range(0..=(args.last_year - args.first_year));
        writeln!(
            master,
            "{},{},{},{},{},{}",
            id, birth_year, country, state, first, last
        )?;
        ids.push(id);
    }
    master.flush()?;

    let batting_path = args.out.join("Batting.csv");
    let mut batting = BufWriter::new(File::create(&batting_path)?);
    writeln!(batting, "playerID,yearID,stint,teamID,lgID,G,AB,R,H")?;

    let mut rows = 0usize;
    for year in args.first_year..=args.last_year {
        for _ in 0..args.rows_per_year {
            let id = &ids[rng.random_range(0..ids.len())];
            let (team, league) = TEAMS[rng.random_range(0..TEAMS.len())];
            let games = rng.random_range(1..=162);
            let at_bats = rng.random_range(0..=games * 4);
            let hits = rng.random_range(0..=at_bats / 3);
            // early seasons have gaps in the run totals
            let runs = if year < 1880 && rng.random_bool(0.02) {
                String::new()
            } else {
                rng.random_range(0..=hits.max(1)).min(150).to_string()
            };
            writeln!(
                batting,
                "{},{},{},{},{},{},{},{},{}",
                id,
                year,
                rng.random_range(1..=2),
                team,
                league,
                games,
                at_bats,
                runs,
                hits
            )?;
            rows += 1;
        }
    }
    batting.flush()?;

    println!(
        "Generated {} players in {} and {} batting rows in {}",
        ids.len(),
        master_path.display(),
        rows,
        batting_path.display()
    );
    Ok(())
}
