//! Contended create_booking latency. Not a pass/fail benchmark: prints
//! percentiles for uncontended, same-table, and mixed workloads.
//!
//! Run with `cargo bench --bench contention`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, NaiveTime};

use maitred::model::*;
use maitred::{BookingEngine, Config, NotifyHub};

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len().max(1) as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().map(|d| d.as_secs_f64()).unwrap_or(0.0) * 1000.0,
    );
}

fn bench_config() -> Config {
    let dir = std::env::temp_dir().join(format!("maitred_bench_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    Config {
        data_dir: PathBuf::from(dir),
        lock_timeout: Duration::from_secs(10),
        ..Config::default()
    }
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn request(table_id: TableId, date: NaiveDate, range: TimeRange) -> BookingRequest {
    BookingRequest {
        table_id,
        date,
        range,
        guest: GuestInfo {
            name: "Bench".into(),
            phone: "555-0100".into(),
            occasion: None,
        },
        party_size: 2,
        source: BookingSource::Api,
    }
}

/// Sequential bookings, each on its own date: no lock contention, measures
/// the journal + sheet write floor.
async fn phase1_sequential(engine: &BookingEngine, table: &Table) {
    let mut latencies = Vec::with_capacity(500);
    let base = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
    for i in 0..500u64 {
        let date = base.checked_add_days(Days::new(i)).unwrap();
        let started = Instant::now();
        engine
            .create_booking(request(table.id, date, TimeRange::new(t(18, 0), t(19, 0))), Actor::guest())
            .await
            .expect("uncontended create");
        latencies.push(started.elapsed());
    }
    print_latency("phase 1: sequential, distinct dates", &mut latencies);
}

/// All workers hammer one (table, date): worst-case serialization. Each
/// worker books a distinct non-overlapping slot so every attempt succeeds
/// after waiting its turn.
async fn phase2_single_key(engine: Arc<BookingEngine>, table: &Table) {
    let date = NaiveDate::from_ymd_opt(2031, 6, 1).unwrap();
    let mut handles = Vec::new();
    for w in 0..48u32 {
        let engine = engine.clone();
        let table_id = table.id;
        handles.push(tokio::spawn(async move {
            let start_min = 8 * 60 + w * 15;
            let range = TimeRange::new(
                NaiveTime::from_num_seconds_from_midnight_opt(start_min * 60, 0).unwrap(),
                NaiveTime::from_num_seconds_from_midnight_opt((start_min + 15) * 60, 0).unwrap(),
            );
            let started = Instant::now();
            let result = engine
                .create_booking(request(table_id, date, range), Actor::guest())
                .await;
            (started.elapsed(), result.is_ok())
        }));
    }

    let mut latencies = Vec::new();
    let mut ok = 0;
    for handle in handles {
        let (latency, success) = handle.await.unwrap();
        latencies.push(latency);
        if success {
            ok += 1;
        }
    }
    println!("  {ok}/48 succeeded on one (table, date) key");
    print_latency("phase 2: 48 workers, one lock key", &mut latencies);
}

/// Mixed workload: workers spread over 10 tables, moderate contention.
async fn phase3_mixed(engine: Arc<BookingEngine>, tables: &[Table]) {
    let date = NaiveDate::from_ymd_opt(2031, 7, 1).unwrap();
    let mut handles = Vec::new();
    for w in 0..100u32 {
        let engine = engine.clone();
        let table_id = tables[(w as usize) % tables.len()].id;
        handles.push(tokio::spawn(async move {
            let start_min = 10 * 60 + (w / 10) * 30;
            let range = TimeRange::new(
                NaiveTime::from_num_seconds_from_midnight_opt(start_min * 60, 0).unwrap(),
                NaiveTime::from_num_seconds_from_midnight_opt((start_min + 30) * 60, 0).unwrap(),
            );
            let started = Instant::now();
            let _ = engine
                .create_booking(request(table_id, date, range), Actor::guest())
                .await;
            started.elapsed()
        }));
    }

    let mut latencies = Vec::new();
    for handle in handles {
        latencies.push(handle.await.unwrap());
    }
    print_latency("phase 3: 100 workers, 10 tables", &mut latencies);
}

fn main() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(8)
        .enable_all()
        .build()
        .expect("build runtime");

    runtime.block_on(async {
        let cfg = bench_config();
        let engine = Arc::new(
            BookingEngine::open_in_process(&cfg, Arc::new(NotifyHub::new()))
                .expect("open engine"),
        );

        let mut tables = Vec::new();
        for i in 0..10 {
            tables.push(
                engine
                    .register_table(format!("T{i}"), None, 4, TableShape::Round)
                    .await
                    .expect("register table"),
            );
        }

        println!("maitred contention bench");
        phase1_sequential(&engine, &tables[0]).await;
        phase2_single_key(engine.clone(), &tables[1]).await;
        phase3_mixed(engine.clone(), &tables).await;

        let _ = std::fs::remove_dir_all(&cfg.data_dir);
    });
}
