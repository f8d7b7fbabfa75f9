use buffer_pool_manager::LruBufferPoolManager;
use clap::Parser;
use common::api::{BufferPoolManager, PageGuard};
use common::disk_manager::FileDiskManager;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of frames in the buffer pool
    #[arg(short, long, default_value_t = 100)]
    pool_size: usize,

    /// Number of pages to write and read
    #[arg(short, long, default_value_t = 1000)]
    num_pages: usize,

    /// Path of the database file
    #[arg(short, long, default_value = "benchmark.db")]
    db_file: String,
}

fn main() {
    let args = Args::parse();
    println!("Measuring buffer pool throughput.");
    println!(
        "Pool size: {} frames, workload: {} pages",
        args.pool_size, args.num_pages
    );

    let disk_manager = match FileDiskManager::new(&args.db_file) {
        Ok(dm) => Arc::new(dm),
        Err(e) => {
            eprintln!("Failed to create disk manager: {}", e);
            return;
        }
    };

    let pool = LruBufferPoolManager::new(args.pool_size, disk_manager);

    let write_time = run_write_benchmark(&pool, args.num_pages);
    let read_time = run_read_benchmark(&pool, args.num_pages);

    println!("\n--- Benchmark Results ---");
    println!("| Workload          | Time            |");
    println!("|-------------------|-----------------|");
    println!("| Sequential write  | {:<15?} |", write_time);
    println!("| Sequential read   | {:<15?} |", read_time);

    if let Err(e) = std::fs::remove_file(&args.db_file) {
        eprintln!("Failed to remove {}: {}", args.db_file, e);
    }
}

fn run_write_benchmark(pool: &dyn BufferPoolManager, num_pages: usize) -> Duration {
    let start = Instant::now();
    for _ in 0..num_pages {
        match pool.new_page() {
            Ok(mut page) => {
                let page_id = page.page_id();
                page[0] = page_id as u8;
            }
            Err(e) => {
                eprintln!("Failed to create new page: {}", e);
                return Duration::ZERO;
            }
        }
    }
    if let Err(e) = pool.flush_all_pages() {
        eprintln!("Failed to flush: {}", e);
    }
    start.elapsed()
}

fn run_read_benchmark(pool: &dyn BufferPoolManager, num_pages: usize) -> Duration {
    let start = Instant::now();
    for page_id in 0..num_pages {
        if let Err(e) = pool.fetch_page(page_id) {
            eprintln!("Failed to fetch page {}: {}", page_id, e);
        }
    }
    start.elapsed()
}
