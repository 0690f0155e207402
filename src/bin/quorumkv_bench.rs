//! CLI entry point for quorumkv-bench: a latency-measuring exercising
//! client.  Issues sequential puts and gets against one node and reports
//! max/min/average latency plus the failure rate per operation.

use clap::Parser;
use quorumkv::server::{ApiResponse, PutRequest};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "quorumkv-bench", about = "QuorumKV latency benchmark client")]
struct Cli {
    /// Base URL of the node to exercise, e.g. http://127.0.0.1:9401
    #[arg(short, long)]
    target: String,

    /// Number of put/get iterations.
    #[arg(short, long, default_value_t = 1000)]
    iterations: usize,

    /// Key prefix; each iteration writes `<prefix>-<i>`.
    #[arg(long, default_value = "bench")]
    key_prefix: String,
}

/// Latency and failure counts for one operation type.
#[derive(Default)]
struct OpStats {
    latencies: Vec<Duration>,
    failures: usize,
}

impl OpStats {
    fn record(&mut self, elapsed: Duration, success: bool) {
        self.latencies.push(elapsed);
        if !success {
            self.failures += 1;
        }
    }

    fn report(&self, op: &str) {
        if self.latencies.is_empty() {
            println!("{op}: no samples");
            return;
        }
        let max = self.latencies.iter().max().unwrap();
        let min = self.latencies.iter().min().unwrap();
        let total: Duration = self.latencies.iter().sum();
        let avg = total / self.latencies.len() as u32;
        let success_pct =
            100.0 * (self.latencies.len() - self.failures) as f64 / self.latencies.len() as f64;
        println!(
            "{op}: max={:.2}ms min={:.2}ms avg={:.2}ms failures={} success={:.1}%",
            max.as_secs_f64() * 1000.0,
            min.as_secs_f64() * 1000.0,
            avg.as_secs_f64() * 1000.0,
            self.failures,
            success_pct,
        );
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let mut puts = OpStats::default();
    let mut gets = OpStats::default();

    for i in 0..cli.iterations {
        let key = format!("{}-{}", cli.key_prefix, i);
        let url = format!("{}/v1/keys/{}", cli.target, key);

        let body = PutRequest {
            value: format!("value-{i}"),
        };
        let start = Instant::now();
        let success = match client.put(&url).json(&body).send().await {
            Ok(response) => response
                .json::<ApiResponse>()
                .await
                .map(|r| r.success)
                .unwrap_or(false),
            Err(_) => false,
        };
        puts.record(start.elapsed(), success);

        let start = Instant::now();
        let success = match client.get(&url).send().await {
            Ok(response) => response
                .json::<ApiResponse>()
                .await
                .map(|r| r.success)
                .unwrap_or(false),
            Err(_) => false,
        };
        gets.record(start.elapsed(), success);
    }

    println!("target={} iterations={}", cli.target, cli.iterations);
    puts.report("put");
    gets.report("get");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}
