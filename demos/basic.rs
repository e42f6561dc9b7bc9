use std::{fs::File, io::Write};

use mempool::{Pool, PoolOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn log_alloc(kind: &str, addr: *mut u8, size: usize) {
    println!("{kind}: requested {size} bytes, received {addr:?}");
}

fn main() -> mempool::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut opts = PoolOptions::new();
    opts.size(4096);
    let mut pool = Pool::with_options(&opts)?;
    println!("{pool:?}");

    let addr = pool.alloc(100)?;
    log_alloc("aligned", addr.as_ptr(), 100);

    let addr = pool.alloc_unaligned(13)?;
    log_alloc("unaligned", addr.as_ptr(), 13);

    let large = pool.alloc(5000)?;
    log_alloc("large", large.as_ptr(), 5000);

    println!("freed large: {}", pool.free_large(large));
    println!("freed again: {}", pool.free_large(large));

    pool.reset();
    let addr = pool.alloc(100)?;
    log_alloc("after reset", addr.as_ptr(), 100);

    let path = std::env::temp_dir().join("mempool-demo.txt");
    let mut file = File::create(&path).expect("create demo file");
    let entry = pool.register_cleanup(path.as_os_str().len())?;
    entry.data_mut().copy_from_slice(path.as_os_str().as_encoded_bytes());
    entry.set_handler(move |data: &mut [u8]| {
        let _ = writeln!(file, "closed by pool cleanup");
        println!("cleanup: closing {}", String::from_utf8_lossy(data));
    });

    println!("{pool:?}");
    pool.destroy();

    Ok(())
}
