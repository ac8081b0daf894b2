use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, Utc};
use ulid::Ulid;

use rentcal::directory::InMemoryDirectory;
use rentcal::engine::{Engine, EngineError, ReservationRequest};
use rentcal::model::*;
use rentcal::notify::NotifyHub;

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

fn tomorrow() -> NaiveDate {
    Utc::now().date_naive() + Days::new(1)
}

fn contact(i: usize) -> ContactDetails {
    ContactDetails {
        name: Some(format!("Guest {i}")),
        email: Some(format!("guest{i}@example.com")),
        phone: Some("+351 210 000 000".into()),
        country: None,
    }
}

/// Two-night stay starting `slot * 3` days after tomorrow. Slots never overlap.
fn stay(property_id: PropertyId, slot: u64, i: usize) -> ReservationRequest {
    let start = tomorrow() + Days::new(slot * 3);
    ReservationRequest {
        property_id,
        start,
        end: start + Days::new(2),
        contact: contact(i),
    }
}

fn setup(n: usize) -> (Arc<Engine>, Vec<PropertyId>) {
    let dir = std::env::temp_dir().join(format!("rentcal_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("create bench dir");
    let directory = Arc::new(InMemoryDirectory::new());
    let mut properties = Vec::new();
    for i in 0..n {
        let property = Property {
            id: Ulid::new(),
            price: 50 + i as u64 * 10,
            listing: ListingKind::Rent,
            status: PropertyStatus::Available,
        };
        properties.push(property.id);
        directory.put_property(property);
    }
    let engine = Engine::new(dir.join("rentcal.wal"), directory, Arc::new(NotifyHub::new()))
        .expect("open engine");
    println!("  created {n} properties in {}", dir.display());
    (Arc::new(engine), properties)
}

async fn phase1_sequential(engine: &Engine, property_id: PropertyId) {
    let n = 200;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();
    for i in 0..n {
        let t = Instant::now();
        engine
            .create_reservation(stay(property_id, i as u64, i), None)
            .await
            .expect("sequential booking");
        latencies.push(t.elapsed());
    }
    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("create_reservation", &mut latencies);
}

/// Every task races for the same dates on every property: one winner each.
async fn phase2_contended(engine: &Arc<Engine>, properties: &[PropertyId]) {
    let tasks_per_property = 20;
    let won = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let mut handles = Vec::new();
    for &property_id in properties {
        for i in 0..tasks_per_property {
            let engine = engine.clone();
            let won = won.clone();
            let conflicts = conflicts.clone();
            handles.push(tokio::spawn(async move {
                match engine.create_reservation(stay(property_id, 250, i), None).await {
                    Ok(_) => {
                        won.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(EngineError::Conflict(_)) => {
                        conflicts.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => eprintln!("  unexpected error: {e}"),
                }
            }));
        }
    }
    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let won = won.load(Ordering::Relaxed);
    println!(
        "  {} requests over {} properties in {:.2}s: {won} won, {} conflicts",
        properties.len() * tasks_per_property,
        properties.len(),
        elapsed.as_secs_f64(),
        conflicts.load(Ordering::Relaxed),
    );
    if won != properties.len() {
        println!("  !! expected exactly one winner per property, got {won}");
    }
}

/// Availability checks while writers keep booking on other properties.
async fn phase3_read_under_load(engine: &Arc<Engine>, properties: &[PropertyId]) {
    let (read_target, writers) = match properties.split_first() {
        Some(split) => split,
        None => return,
    };
    let writes_per_task = 100;
    let start = Instant::now();

    let mut writer_handles = Vec::new();
    for (w, &property_id) in writers.iter().enumerate() {
        let engine = engine.clone();
        writer_handles.push(tokio::spawn(async move {
            for i in 0..writes_per_task {
                let slot = 260 + i as u64;
                let _ = engine.create_reservation(stay(property_id, slot, w), None).await;
            }
        }));
    }

    let mut reader_handles = Vec::new();
    for r in 0..8 {
        let engine = engine.clone();
        let property_id = *read_target;
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for i in 0..250u64 {
                let from = tomorrow() + Days::new((i + r) % 600);
                let window = Interval::new(from, from + Days::new(7));
                let t = Instant::now();
                let _ = engine.check_availability(property_id, window, None).await;
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut latencies = Vec::new();
    for h in reader_handles {
        if let Ok(mut l) = h.await {
            latencies.append(&mut l);
        }
    }
    for h in writer_handles {
        let _ = h.await;
    }
    println!("  writers done in {:.2}s", start.elapsed().as_secs_f64());
    print_latency("check_availability", &mut latencies);
}

async fn phase4_compaction(engine: &Engine) {
    let appends = engine.wal_appends_since_compact().await;
    let start = Instant::now();
    match engine.compact_journal().await {
        Ok(()) => println!(
            "  compacted {appends} appends in {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        ),
        Err(e) => println!("  compaction failed: {e}"),
    }
}

#[tokio::main]
async fn main() {
    let n_properties: usize = std::env::var("RENTCAL_BENCH_PROPERTIES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(32);

    println!("=== rentcal stress benchmark ===\n");

    println!("[setup]");
    let (engine, properties) = setup(n_properties.max(2));

    println!("\n[phase 1] sequential booking throughput");
    phase1_sequential(&engine, properties[0]).await;

    println!("\n[phase 2] contended bookings");
    phase2_contended(&engine, &properties).await;

    println!("\n[phase 3] availability latency under write load");
    phase3_read_under_load(&engine, &properties).await;

    println!("\n[phase 4] journal compaction");
    phase4_compaction(&engine).await;

    println!("\n=== benchmark complete ===");
}
