use core::hash::Hash;
use core::hint::black_box;

use criterion::AxisScale;
use criterion::BatchSize;
use criterion::Criterion;
use criterion::PlotConfiguration;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use ctrl_table::HashTable as CtrlHashTable;
use ctrl_table::KeyHash;
use hashbrown::HashMap as HashbrownMap;
use rand::Rng;
use rand::SeedableRng;
use rand::distr;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand_distr::Zipf;

trait BenchKey: KeyHash + Hash + Clone {
    fn new(key: u64) -> Self;
}

impl BenchKey for u64 {
    fn new(key: u64) -> Self {
        black_box(key)
    }
}

impl BenchKey for String {
    fn new(key: u64) -> Self {
        black_box(format!("key_{:016X}", key))
    }
}

const SIZES: &[usize] = &[
    (1 << 10),
    (1 << 12),
    (1 << 14),
    (1 << 16),
    (1 << 18),
];

fn random_keys<K: BenchKey>(count: usize) -> Vec<K> {
    let mut rng = SmallRng::from_os_rng();
    (0..count).map(|_| K::new(rng.random::<u64>())).collect()
}

fn bench_insert<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("insert_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = random_keys::<K>(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("ctrl_table/{size}"), |b| {
            b.iter_batched(
                || {
                    let mut keys = keys.clone();
                    keys.shuffle(&mut SmallRng::from_os_rng());
                    keys
                },
                |keys| {
                    let mut table = CtrlHashTable::with_capacity(16);
                    for (i, key) in keys.into_iter().enumerate() {
                        black_box(table.put(key, i as u64));
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || {
                    let mut keys = keys.clone();
                    keys.shuffle(&mut SmallRng::from_os_rng());
                    keys
                },
                |keys| {
                    let mut table = HashbrownMap::with_capacity(16);
                    for (i, key) in keys.into_iter().enumerate() {
                        black_box(table.insert(key, i as u64));
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_insert_preallocated<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!(
        "insert_preallocated_{}",
        core::any::type_name::<K>()
    ));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = random_keys::<K>(size);
        // Room for `size` entries without crossing the load factor.
        let slots = size / 3 * 4 + 16;

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("ctrl_table/{size}"), |b| {
            b.iter_batched(
                || keys.clone(),
                |keys| {
                    let mut table = CtrlHashTable::with_capacity(slots);
                    for (i, key) in keys.into_iter().enumerate() {
                        black_box(table.put(key, i as u64));
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || keys.clone(),
                |keys| {
                    let mut table = HashbrownMap::with_capacity(size);
                    for (i, key) in keys.into_iter().enumerate() {
                        black_box(table.insert(key, i as u64));
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_find_hit_miss<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("find_hit_miss_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        // Even keys are stored, odd keys miss.
        let stored = (0..size * 2)
            .step_by(2)
            .map(|key| K::new(key as u64))
            .collect::<Vec<K>>();
        let probes = (0..size * 2).map(|key| K::new(key as u64)).collect::<Vec<K>>();

        let ctrl_table = stored
            .iter()
            .cloned()
            .zip(0u64..)
            .collect::<CtrlHashTable<K, u64>>();
        let hashbrown_table = stored
            .iter()
            .cloned()
            .zip(0u64..)
            .collect::<HashbrownMap<K, u64>>();

        group.throughput(Throughput::Elements(probes.len() as u64));
        group.bench_function(format!("ctrl_table/{size}"), |b| {
            b.iter_batched(
                || {
                    let mut probes = probes.clone();
                    probes.shuffle(&mut SmallRng::from_os_rng());
                    probes
                },
                |probes| {
                    for key in probes.iter() {
                        black_box(ctrl_table.get(key));
                    }
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || {
                    let mut probes = probes.clone();
                    probes.shuffle(&mut SmallRng::from_os_rng());
                    probes
                },
                |probes| {
                    for key in probes.iter() {
                        black_box(hashbrown_table.get(key));
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_find_after_removals<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!(
        "find_after_removals_{}",
        core::any::type_name::<K>()
    ));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = random_keys::<K>(size);

        let mut ctrl_table = keys
            .iter()
            .cloned()
            .zip(0u64..)
            .collect::<CtrlHashTable<K, u64>>();
        let mut hashbrown_table = keys
            .iter()
            .cloned()
            .zip(0u64..)
            .collect::<HashbrownMap<K, u64>>();

        // Every other key becomes a tombstone that later lookups probe past.
        for key in keys.iter().step_by(2) {
            ctrl_table.remove(key);
            hashbrown_table.remove(key);
        }

        group.throughput(Throughput::Elements(keys.len() as u64));
        group.bench_function(format!("ctrl_table/{size}"), |b| {
            b.iter(|| {
                for key in keys.iter() {
                    black_box(ctrl_table.get(key));
                }
            })
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter(|| {
                for key in keys.iter() {
                    black_box(hashbrown_table.get(key));
                }
            })
        });
    }

    group.finish();
}

fn bench_remove<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("remove_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = random_keys::<K>(size);
        let ctrl_table = keys
            .iter()
            .cloned()
            .zip(0u64..)
            .collect::<CtrlHashTable<K, u64>>();
        let hashbrown_table = keys
            .iter()
            .cloned()
            .zip(0u64..)
            .collect::<HashbrownMap<K, u64>>();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("ctrl_table/{size}"), |b| {
            b.iter_batched(
                || ctrl_table.clone(),
                |mut table| {
                    for key in keys.iter() {
                        black_box(table.remove(key));
                    }
                    black_box(table)
                },
                BatchSize::LargeInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || hashbrown_table.clone(),
                |mut table| {
                    for key in keys.iter() {
                        black_box(table.remove(key));
                    }
                    black_box(table)
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_churn<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("churn_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        // Each key appears twice: the first sighting inserts, the second removes.
        let operations = (0..size as u64)
            .flat_map(|key| [K::new(key), K::new(key)])
            .collect::<Vec<K>>();

        group.throughput(Throughput::Elements(operations.len() as u64));
        group.bench_function(format!("ctrl_table/{size}"), |b| {
            b.iter_batched(
                || {
                    let mut operations = operations.clone();
                    operations.shuffle(&mut SmallRng::from_os_rng());
                    operations
                },
                |operations| {
                    let mut table = CtrlHashTable::with_capacity(16);
                    for key in operations {
                        if !table.remove(&key) {
                            table.put(key, 0u64);
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || {
                    let mut operations = operations.clone();
                    operations.shuffle(&mut SmallRng::from_os_rng());
                    operations
                },
                |operations| {
                    let mut table = HashbrownMap::with_capacity(16);
                    for key in operations {
                        if table.remove(&key).is_none() {
                            table.insert(key, 0u64);
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[derive(Clone, Copy)]
enum Operation {
    Find,
    Insert,
    Remove,
}

fn bench_mixed_zipf<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("mixed_zipf_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    const KEY_SPACE_MULTIPLIER: f32 = 2.0;

    for &size in SIZES[..=MAX_SIZE].iter() {
        let mut rng = SmallRng::from_os_rng();
        let insert_distr = Zipf::new(size as f32 - 1.0, 1.0).unwrap();
        let lookup_distr = Zipf::new(size as f32 * KEY_SPACE_MULTIPLIER - 1.0, 1.0).unwrap();

        // Half lookups, a quarter inserts and a quarter removals, with keys
        // drawn up front so both tables see the same sequence.
        let operations = (0..size * 3)
            .map(|_| {
                let choice: f64 = rng.sample(distr::Uniform::new(0.0, 1.0).unwrap());
                if choice < 0.5 {
                    (Operation::Find, K::new(rng.sample(lookup_distr) as u64))
                } else if choice < 0.75 {
                    (Operation::Insert, K::new(rng.sample(insert_distr) as u64))
                } else {
                    (Operation::Remove, K::new(rng.sample(lookup_distr) as u64))
                }
            })
            .collect::<Vec<(Operation, K)>>();

        group.throughput(Throughput::Elements(operations.len() as u64));
        group.bench_function(format!("ctrl_table/{size}"), |b| {
            b.iter_batched(
                || operations.clone(),
                |operations| {
                    let mut table = CtrlHashTable::with_capacity(16);
                    for (operation, key) in operations {
                        match operation {
                            Operation::Find => {
                                black_box(table.get(&key));
                            }
                            Operation::Insert => {
                                black_box(table.put(key, 0u64));
                            }
                            Operation::Remove => {
                                black_box(table.remove(&key));
                            }
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || operations.clone(),
                |operations| {
                    let mut table = HashbrownMap::with_capacity(16);
                    for (operation, key) in operations {
                        match operation {
                            Operation::Find => {
                                black_box(table.get(&key));
                            }
                            Operation::Insert => {
                                black_box(table.insert(key, 0u64));
                            }
                            Operation::Remove => {
                                black_box(table.remove(&key));
                            }
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_iteration<K: BenchKey, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("iteration_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = random_keys::<K>(size);
        let ctrl_table = keys
            .iter()
            .cloned()
            .zip(0u64..)
            .collect::<CtrlHashTable<K, u64>>();
        let hashbrown_table = keys
            .iter()
            .cloned()
            .zip(0u64..)
            .collect::<HashbrownMap<K, u64>>();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("ctrl_table/{size}"), |b| {
            b.iter(|| black_box(ctrl_table.values().sum::<u64>()))
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter(|| black_box(hashbrown_table.values().sum::<u64>()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert::<u64, 4>,
    bench_insert::<String, 4>,
    bench_insert_preallocated::<u64, 4>,
    bench_insert_preallocated::<String, 4>,
    bench_find_hit_miss::<u64, 4>,
    bench_find_hit_miss::<String, 4>,
    bench_find_after_removals::<u64, 4>,
    bench_find_after_removals::<String, 4>,
    bench_remove::<u64, 4>,
    bench_remove::<String, 4>,
    bench_churn::<u64, 4>,
    bench_churn::<String, 4>,
    bench_mixed_zipf::<u64, 4>,
    bench_mixed_zipf::<String, 4>,
    bench_iteration::<u64, 3>,
    bench_iteration::<String, 3>,
);

criterion_main!(benches);
