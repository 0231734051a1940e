use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal_macros::dec;
use ulid::Ulid;

use parkease::engine::{Engine, EngineError};
use parkease::model::*;
use parkease::notify::NotifyHub;

const HOUR: Ms = MS_PER_HOUR;
const OWNER: UserId = 1;
/// 2030-01-01T00:00:00Z
const BASE: Ms = 1_893_456_000_000;

fn engine(label: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("parkease_bench_{label}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let hub = Arc::new(NotifyHub::new());
    // Keep a subscriber alive so notifications are delivered, not dropped.
    let mut rx = hub.subscribe();
    tokio::spawn(async move { while rx.recv().await.is_ok() {} });
    Arc::new(Engine::new(dir.join("bench.wal"), hub).expect("engine start failed"))
}

async fn list(engine: &Engine, ids: impl IntoIterator<Item = ResourceId>) {
    for id in ids {
        engine
            .create_resource(id, OWNER, ResourceSpec::new(RatePlans::hourly(dec!(50)).with_daily(dec!(400))))
            .await
            .unwrap();
    }
}

fn request(resource_id: ResourceId, requester_id: UserId, start: Ms, end: Ms) -> BookingRequest {
    BookingRequest {
        resource_id,
        requester_id,
        start,
        end,
        vehicle: Vehicle::default(),
        special_requests: None,
        payment_method: "card".into(),
    }
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential() {
    let engine = engine("seq");
    list(&engine, [1]).await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let s = BASE + (i as Ms) * HOUR;
        let t = Instant::now();
        engine
            .create_reservation(request(1, 2, s, s + HOUR))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("booking latency", &mut latencies);
}

async fn phase2_concurrent() {
    let engine = engine("concurrent");
    let n_tasks: u64 = 10;
    let n_per_task = 200;
    list(&engine, 0..n_tasks).await;

    let start = Instant::now();
    let handles: Vec<_> = (0..n_tasks)
        .map(|rid| {
            let engine = engine.clone();
            tokio::spawn(async move {
                for j in 0..n_per_task {
                    let s = BASE + (j as Ms) * HOUR;
                    engine
                        .create_reservation(request(rid, 2, s, s + HOUR))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for h in futures::future::join_all(handles).await {
        h.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_contention() {
    let engine = engine("contention");
    list(&engine, [1]).await;

    let contenders = 200;
    let slots = 20;
    let start = Instant::now();
    let handles: Vec<_> = (0..contenders)
        .map(|i| {
            let engine = engine.clone();
            let s = BASE + ((i % slots) as Ms) * HOUR;
            tokio::spawn(async move {
                let t = Instant::now();
                let result = engine
                    .create_reservation(request(1, 100 + i as UserId, s, s + HOUR))
                    .await;
                (result, t.elapsed())
            })
        })
        .collect();

    let mut won = 0;
    let mut conflicts = 0;
    let mut latencies = Vec::with_capacity(contenders);
    for h in futures::future::join_all(handles).await {
        let (result, elapsed) = h.unwrap();
        latencies.push(elapsed);
        match result {
            Ok(_) => won += 1,
            Err(EngineError::SlotConflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(won, slots, "every slot must be booked exactly once");
    println!(
        "  {contenders} requests for {slots} slots: {won} booked, {conflicts} conflicts in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    print_latency("contended booking latency", &mut latencies);
}

async fn phase4_read_under_load() {
    let engine = engine("reads");
    list(&engine, [1, 2]).await;
    for i in 0..200 {
        let s = BASE + (i as Ms) * HOUR;
        engine.create_reservation(request(1, 2, s, s + HOUR)).await.unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let written = Arc::new(AtomicUsize::new(0));
    let writer = {
        let engine = engine.clone();
        let stop = stop.clone();
        let written = written.clone();
        tokio::spawn(async move {
            let mut i: Ms = 0;
            while !stop.load(Ordering::Relaxed) {
                let s = BASE + i * HOUR;
                if engine.create_reservation(request(2, 3, s, s + HOUR)).await.is_ok() {
                    written.fetch_add(1, Ordering::Relaxed);
                }
                i += 1;
            }
        })
    };

    let n_readers = 10;
    let reads_per_reader = 500;
    let readers: Vec<_> = (0..n_readers)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let mut latencies = Vec::with_capacity(reads_per_reader);
                for i in 0..reads_per_reader {
                    let s = BASE + ((i % 250) as Ms) * HOUR;
                    let t = Instant::now();
                    engine.is_available(1, s, s + 2 * HOUR).await.unwrap();
                    latencies.push(t.elapsed());
                }
                latencies
            })
        })
        .collect();

    let mut all_latencies = Vec::new();
    for h in futures::future::join_all(readers).await {
        all_latencies.extend(h.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    let _ = writer.await;

    println!("  background writer committed {} bookings", written.load(Ordering::Relaxed));
    print_latency("availability query", &mut all_latencies);
}

async fn phase5_reminder_sweep() {
    let engine = engine("sweep");
    let n: u64 = 500;
    list(&engine, 0..n).await;
    let now = BASE;
    for rid in 0..n {
        let s = now + 10 * 60_000;
        let r = engine
            .create_reservation(request(rid, 2, s, s + HOUR))
            .await
            .unwrap();
        engine
            .update_status(r.id, OWNER, ReservationStatus::Confirmed)
            .await
            .unwrap();
    }

    let t = Instant::now();
    let sent = engine.sweep_reminders(now).await;
    println!(
        "  swept {n} resources, {sent} reminders in {:.2}ms",
        t.elapsed().as_secs_f64() * 1000.0
    );
}

#[tokio::main]
async fn main() {
    println!("=== parkease stress benchmark ===\n");

    println!("[phase 1] sequential booking throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent booking throughput");
    phase2_concurrent().await;

    println!("\n[phase 3] contended slots");
    phase3_contention().await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load().await;

    println!("\n[phase 5] reminder sweep");
    phase5_reminder_sweep().await;

    println!("\n=== done ===");
}
