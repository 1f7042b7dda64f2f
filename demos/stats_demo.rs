use clap::Parser;
use ctrl_table::HashTable;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Number of keys to insert. Defaults to the table's load limit.
    #[arg(short = 'n', long = "count")]
    count: Option<usize>,

    /// Fraction of the inserted keys to remove afterwards.
    #[arg(short = 'r', long = "remove_fraction", default_value_t = 0.25)]
    remove_fraction: f64,

    /// Use string keys instead of u64 keys.
    #[arg(short = 's', long = "strings")]
    strings: bool,
}

fn report<K, V>(table: &HashTable<K, V>) {
    println!(
        "Final load factor: {:.2}%",
        (table.len() as f64 / table.capacity() as f64) * 100.0
    );
    table.probe_histogram().print();
    table.debug_stats().print();
}

fn run<K: ctrl_table::KeyHash + Clone>(args: &Args, make_key: impl Fn(u64) -> K) {
    let mut table: HashTable<K, u64> = HashTable::with_capacity(args.target_capacity);
    println!("Actual capacity: {}", table.capacity());

    let count = args.count.unwrap_or(table.capacity() * 3 / 4);
    let mut rng = SmallRng::from_os_rng();
    let keys = (0..count)
        .map(|_| make_key(rng.random::<u64>()))
        .collect::<Vec<K>>();

    for (i, key) in keys.iter().enumerate() {
        table.put(key.clone(), i as u64);
    }
    println!(
        "Inserted {} values into table (capacity {})",
        table.len(),
        table.capacity()
    );
    report(&table);

    let removals = (count as f64 * args.remove_fraction.clamp(0.0, 1.0)) as usize;
    let removed = keys
        .iter()
        .take(removals)
        .filter(|key| table.remove(*key))
        .count();
    println!();
    println!("Removed {removed} values, leaving {} tombstones", table.tombstones());
    report(&table);

    table.shrink_to_fit();
    println!();
    println!("After shrink_to_fit: capacity {}", table.capacity());
    report(&table);
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    if args.strings {
        run(&args, |key| format!("key_{:016X}", key));
    } else {
        run(&args, |key| key);
    }
}
