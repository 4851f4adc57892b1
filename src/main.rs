use std::sync::Arc;

use log::info;

use pagedb::{BPlusTree, BufferPoolManager, DiskManager, PageId, StorageConfig};

fn main() -> pagedb::Result<()> {
    env_logger::init();

    println!("pagedb - a page-oriented storage engine");
    println!("=======================================\n");

    let db_path = std::env::temp_dir().join(format!("pagedb-demo-{}.db", std::process::id()));
    let config = StorageConfig::default().with_pool_size(10).with_max_keys(3);

    let disk_manager = Arc::new(DiskManager::new(&db_path)?);
    info!("opened {}", db_path.display());

    let bpm = Arc::new(BufferPoolManager::with_config(&config, disk_manager));
    println!(
        "Created buffer pool with {} frames ({:?} replacement)\n",
        bpm.pool_size(),
        config.policy
    );

    let mut index = BPlusTree::<i32>::new("demo", Arc::clone(&bpm), config.max_keys)?;
    for (i, key) in [10, 20, 5, 15].into_iter().enumerate() {
        let record = PageId::new(100 + i as i32);
        index.insert(key, record)?;
        println!("Inserted {} -> {}", key, record);
    }

    println!("\nTree (height {}, {} nodes):", index.height(), index.node_count());
    print!("{}", index.dump_tree());

    println!("\nsearch(15) = {:?}", index.search(&15)?);
    println!("search(7)  = {:?}", index.search(&7)?);
    println!("range [5, 15] = {:?}", index.range_search(&5, &15)?);

    index.delete(&10)?;
    println!("after delete(10): keys = {:?}", index.all_keys());

    bpm.flush_all_pages()?;

    let stats = bpm.stats();
    println!(
        "\nBuffer pool: {} hits, {} misses ({:.1}% hit rate)",
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0
    );
    println!(
        "Disk: {} pages, {} reads, {} writes",
        bpm.disk_manager().get_num_pages(),
        bpm.disk_manager().get_num_reads(),
        bpm.disk_manager().get_num_writes()
    );

    drop(index);
    drop(bpm);
    std::fs::remove_file(&db_path).ok();
    println!("\nDemo completed successfully!");
    Ok(())
}
