//! RPC test client: correctness and load harness.
//!
//! Four modes selected with `-t/--test`:
//!
//! - `basic`: named request/response cases with expected results,
//! - `concurrency`: fixed task count, fixed requests per task,
//! - `stress`: duration-bounded load at a concurrency cap,
//! - `interactive`: a small REPL (`call`, `stats`, `connect`,
//!   `disconnect`, `help`, `quit`).
//!
//! Basic mode runs the built-in suite by default; `--cases <file>` loads
//! a custom JSON list of cases instead, and `--random <N>` appends N
//! generated echo cases with randomized payloads.
//!
//! The aggregate report prints to stdout and can be written as JSON with
//! `-o/--output`. Exits 0 on a clean run, 1 when cases fail or the run
//! cannot complete.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use wirecall::{ErrorCode, Response, RpcClient, RpcConfig};

#[derive(Parser)]
#[command(name = "test-client", about = "Test harness for a wirecall RPC server")]
struct Cli {
    /// Server host.
    #[arg(short = 's', long = "server", default_value = "127.0.0.1")]
    server: String,

    /// Server port (overrides the configured one).
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Test mode to run.
    #[arg(short = 't', long = "test", value_enum, default_value = "basic")]
    test: TestMode,

    /// Configuration file (key=value).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// JSON file with a custom list of test cases (basic mode).
    #[arg(long = "cases")]
    cases: Option<PathBuf>,

    /// Append N generated echo cases with random payloads (basic mode).
    #[arg(long = "random", value_name = "N")]
    random: Option<usize>,

    /// Write the aggregate report to this file as JSON.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Print each request's outcome.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TestMode {
    Basic,
    Concurrency,
    Stress,
    Interactive,
}

/// One named request/response check. Custom suites deserialize from a
/// JSON array of these.
#[derive(Debug, Clone, Deserialize)]
struct TestCase {
    name: String,
    method: String,
    /// JSON-text params sent with the call.
    #[serde(default)]
    params: String,
    /// Expected result, compared structurally when both sides parse as
    /// JSON. Absent means any result is accepted.
    #[serde(default)]
    expected: Option<String>,
    #[serde(default = "default_case_timeout")]
    timeout_ms: u32,
    #[serde(default = "default_should_succeed")]
    should_succeed: bool,
}

fn default_case_timeout() -> u32 {
    5000
}

fn default_should_succeed() -> bool {
    true
}

/// Aggregate results across a run.
#[derive(Debug, Default, Serialize)]
struct TestReport {
    total: u64,
    passed: u64,
    failed: u64,
    timeouts: u64,
    min_response_ms: f64,
    max_response_ms: f64,
    avg_response_ms: f64,
    elapsed_secs: f64,
    throughput_per_sec: f64,
}

impl TestReport {
    fn from_samples(outcomes: &[(bool, bool, f64)], elapsed: Duration) -> Self {
        let mut report = TestReport {
            min_response_ms: f64::MAX,
            elapsed_secs: elapsed.as_secs_f64(),
            ..TestReport::default()
        };
        for &(passed, timed_out, ms) in outcomes {
            report.total += 1;
            if passed {
                report.passed += 1;
            } else {
                report.failed += 1;
            }
            if timed_out {
                report.timeouts += 1;
            }
            report.min_response_ms = report.min_response_ms.min(ms);
            report.max_response_ms = report.max_response_ms.max(ms);
            report.avg_response_ms += (ms - report.avg_response_ms) / report.total as f64;
        }
        if report.total == 0 {
            report.min_response_ms = 0.0;
        }
        if report.elapsed_secs > 0.0 {
            report.throughput_per_sec = report.total as f64 / report.elapsed_secs;
        }
        report
    }

    fn print(&self, title: &str) {
        println!("=== {} ===", title);
        println!("total:       {}", self.total);
        println!("passed:      {}", self.passed);
        println!("failed:      {}", self.failed);
        println!("timeouts:    {}", self.timeouts);
        if self.total > 0 {
            println!(
                "success:     {:.1}%",
                self.passed as f64 / self.total as f64 * 100.0
            );
            println!("min/avg/max: {:.2} / {:.2} / {:.2} ms",
                self.min_response_ms, self.avg_response_ms, self.max_response_ms);
            println!("throughput:  {:.1} req/s", self.throughput_per_sec);
        }
    }
}

fn basic_cases() -> Vec<TestCase> {
    vec![
        TestCase {
            name: "echo_test".to_owned(),
            method: "echo".to_owned(),
            params: r#"{"message":"Hello RPC!"}"#.to_owned(),
            expected: Some(r#"{"message":"Hello RPC!"}"#.to_owned()),
            timeout_ms: 5000,
            should_succeed: true,
        },
        TestCase {
            name: "add_test".to_owned(),
            method: "add".to_owned(),
            params: r#"{"a":10,"b":20}"#.to_owned(),
            expected: Some(r#"{"result":30}"#.to_owned()),
            timeout_ms: 3000,
            should_succeed: true,
        },
        TestCase {
            name: "invalid_method".to_owned(),
            method: "nonexistent".to_owned(),
            params: "{}".to_owned(),
            expected: None,
            timeout_ms: 5000,
            should_succeed: false,
        },
    ]
}

/// Load a custom suite: a JSON array of [`TestCase`] objects.
fn load_cases(path: &PathBuf) -> Result<Vec<TestCase>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("parsing test cases in {}", path.display()))
}

/// Small xorshift generator seeded from the clock and the process id;
/// plenty for varying test payloads.
struct TestRng(u64);

impl TestRng {
    fn new() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let pid = u64::from(std::process::id());
        Self((nanos.wrapping_mul(0x517c_c1b7_2722_0a95) ^ pid) | 1)
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn alphanumeric(&mut self, len: usize) -> String {
        const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        (0..len)
            .map(|_| CHARS[(self.next() % CHARS.len() as u64) as usize] as char)
            .collect()
    }
}

/// Generate echo cases with randomized payloads; each expects its own
/// params back.
fn random_cases(count: usize) -> Vec<TestCase> {
    let mut rng = TestRng::new();
    (0..count)
        .map(|i| {
            let len = 8 + (rng.next() % 24) as usize;
            let message = rng.alphanumeric(len);
            let params = format!(r#"{{"message":"{}"}}"#, message);
            TestCase {
                name: format!("random_{}", i),
                method: "echo".to_owned(),
                params: params.clone(),
                expected: Some(params),
                timeout_ms: 5000,
                should_succeed: true,
            }
        })
        .collect()
}

fn case_passes(case: &TestCase, response: &Response) -> bool {
    if response.is_success() != case.should_succeed {
        return false;
    }
    match (case.expected.as_deref(), response.result()) {
        (Some(expected), Some(result)) => json_equal(expected, result),
        (Some(_), None) => false,
        (None, _) => true,
    }
}

/// Compare two JSON texts structurally, falling back to string equality.
fn json_equal(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(a),
        serde_json::from_str::<serde_json::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

async fn run_basic(client: &RpcClient, cases: &[TestCase], verbose: bool) -> TestReport {
    let started = Instant::now();
    let mut outcomes = Vec::new();

    for case in cases {
        let call_started = Instant::now();
        let response = client
            .call(&case.method, &case.params, case.timeout_ms)
            .await;
        let ms = call_started.elapsed().as_secs_f64() * 1000.0;

        let passed = case_passes(case, &response);
        let timed_out = response.error_code() == ErrorCode::TimeoutError;
        if verbose || !passed {
            println!(
                "[{}] {} {} in {:.2} ms ({:?})",
                if passed { "PASS" } else { "FAIL" },
                case.name,
                if response.is_success() { "succeeded" } else { "failed" },
                ms,
                response.error_code(),
            );
        }
        outcomes.push((passed, timed_out, ms));
    }

    TestReport::from_samples(&outcomes, started.elapsed())
}

async fn run_concurrency(
    client: Arc<RpcClient>,
    tasks: usize,
    requests_per_task: usize,
    timeout_ms: u32,
    verbose: bool,
) -> TestReport {
    let started = Instant::now();
    let mut workers = Vec::new();

    for task_id in 0..tasks {
        let client = client.clone();
        workers.push(tokio::spawn(async move {
            let mut outcomes = Vec::with_capacity(requests_per_task);
            for i in 0..requests_per_task {
                let params = format!(r#"{{"message":"task {} request {}"}}"#, task_id, i);
                let call_started = Instant::now();
                let response = client.call("echo", &params, timeout_ms).await;
                let ms = call_started.elapsed().as_secs_f64() * 1000.0;
                outcomes.push((
                    response.is_success(),
                    response.error_code() == ErrorCode::TimeoutError,
                    ms,
                ));
            }
            outcomes
        }));
    }

    let mut outcomes = Vec::new();
    for worker in workers {
        match worker.await {
            Ok(mut batch) => outcomes.append(&mut batch),
            Err(e) => eprintln!("worker failed: {}", e),
        }
    }

    if verbose {
        println!("{} workers x {} requests completed", tasks, requests_per_task);
    }
    TestReport::from_samples(&outcomes, started.elapsed())
}

async fn run_stress(
    client: Arc<RpcClient>,
    duration: Duration,
    concurrency: usize,
    timeout_ms: u32,
) -> TestReport {
    let started = Instant::now();
    let deadline = started + duration;
    let mut workers = Vec::new();

    for task_id in 0..concurrency {
        let client = client.clone();
        workers.push(tokio::spawn(async move {
            let mut outcomes = Vec::new();
            let mut i = 0usize;
            while Instant::now() < deadline {
                let params = format!(r#"{{"message":"stress {} {}"}}"#, task_id, i);
                let call_started = Instant::now();
                let response = client.call("echo", &params, timeout_ms).await;
                let ms = call_started.elapsed().as_secs_f64() * 1000.0;
                outcomes.push((
                    response.is_success(),
                    response.error_code() == ErrorCode::TimeoutError,
                    ms,
                ));
                i += 1;
            }
            outcomes
        }));
    }

    let mut outcomes = Vec::new();
    for worker in workers {
        if let Ok(mut batch) = worker.await {
            outcomes.append(&mut batch);
        }
    }
    TestReport::from_samples(&outcomes, started.elapsed())
}

async fn run_interactive(client: &RpcClient, timeout_ms: u32) -> Result<()> {
    println!("interactive mode; type 'help' for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print!("rpc> ");
    std::io::stdout().flush().ok();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "quit" | "exit" => break,
            "help" => {
                println!("  call <method> <params>  invoke a method");
                println!("  stats                   show client counters");
                println!("  connect                 connect to the server");
                println!("  disconnect              drop the connection");
                println!("  quit                    leave");
            }
            "stats" => {
                let stats = client.stats();
                println!(
                    "total {} success {} error {} timeout {} avg {:.2} ms",
                    stats.total, stats.success, stats.error, stats.timeout, stats.avg_response_ms
                );
            }
            "connect" => match client.connect().await {
                Ok(()) => println!("connected"),
                Err(e) => println!("connect failed: {}", e),
            },
            "disconnect" => {
                client.disconnect().await;
                println!("disconnected");
            }
            _ if line.starts_with("call") => {
                let mut parts = line.splitn(3, char::is_whitespace);
                parts.next();
                let Some(method) = parts.next() else {
                    println!("usage: call <method> <params>");
                    print!("rpc> ");
                    std::io::stdout().flush().ok();
                    continue;
                };
                let params = parts.next().unwrap_or("").trim();
                let response = client.call(method, params, timeout_ms).await;
                match response.result() {
                    Some(result) => println!("{}", result),
                    None => println!(
                        "error {}: {}",
                        response.error_code().as_i32(),
                        response.error_message().unwrap_or_default()
                    ),
                }
            }
            other => println!("unknown command: {}", other),
        }
        print!("rpc> ");
        std::io::stdout().flush().ok();
    }
    Ok(())
}

fn write_report(path: &PathBuf, report: &TestReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    println!("report written to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RpcConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RpcConfig::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(if cli.verbose { "debug" } else { "warn" }))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let timeout_ms = config.timeout_ms;
    let client = Arc::new(RpcClient::from_config(cli.server.clone(), &config));

    let report = match cli.test {
        TestMode::Basic => {
            let mut cases = match &cli.cases {
                Some(path) => load_cases(path)?,
                None => basic_cases(),
            };
            if let Some(count) = cli.random {
                cases.extend(random_cases(count));
            }
            Some(run_basic(&client, &cases, cli.verbose).await)
        }
        TestMode::Concurrency => {
            Some(run_concurrency(client.clone(), 10, 100, timeout_ms, cli.verbose).await)
        }
        TestMode::Stress => {
            Some(run_stress(client.clone(), Duration::from_secs(30), 50, timeout_ms).await)
        }
        TestMode::Interactive => {
            run_interactive(&client, timeout_ms).await?;
            None
        }
    };

    if let Some(report) = report {
        report.print(match cli.test {
            TestMode::Basic => "basic test results",
            TestMode::Concurrency => "concurrency test results",
            TestMode::Stress => "stress test results",
            TestMode::Interactive => unreachable!(),
        });
        if let Some(path) = &cli.output {
            write_report(path, &report)?;
        }
        if report.failed > 0 {
            std::process::exit(1);
        }
    }

    Ok(())
}
