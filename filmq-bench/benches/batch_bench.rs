//! Record reading and batch construction benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use filmq_client::{BatchBuilder, CsvRecordReader, RecordSource};
use std::collections::VecDeque;
use std::io::Cursor;

fn ratings_csv(rows: usize) -> String {
    let mut csv = String::from("userId,movieId,rating,timestamp\n");
    for i in 0..rows {
        csv.push_str(&format!("{},{},{}.5,1260759144\n", i % 700, i % 9000, i % 5));
    }
    csv
}

fn bench_csv_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("csv_read");

    for rows in [1000, 10000] {
        let csv = ratings_csv(rows);

        group.throughput(Throughput::Bytes(csv.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &csv, |b, csv| {
            b.iter(|| {
                let mut reader = CsvRecordReader::new(Cursor::new(csv.as_bytes()));
                let mut count = 0;
                while let Some(record) = reader.next_record().unwrap() {
                    black_box(record);
                    count += 1;
                }
                count
            });
        });
    }

    group.finish();
}

fn bench_batch_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_build");
    let records: VecDeque<String> = (0..10000)
        .map(|i| format!("{},{},4.5,1260759144", i % 700, i))
        .collect();

    for max_records in [10, 100, 1000] {
        group.throughput(Throughput::Elements(records.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(max_records),
            &records,
            |b, records| {
                b.iter(|| {
                    let mut source = records.clone();
                    let mut builder = BatchBuilder::new(max_records, 8 * 1024);
                    loop {
                        let batch = builder.build(&mut source).unwrap();
                        if batch.is_final {
                            break black_box(batch);
                        }
                        black_box(batch);
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_csv_read, bench_batch_build);

criterion_main!(benches);
