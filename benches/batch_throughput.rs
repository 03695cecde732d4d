//! Criterion benchmark of end-to-end batch throughput: build transactions, run them on
//! worker threads against in-memory mock connections, and dispatch every completion on the
//! benchmark thread. Measures queueing and dispatch overhead, not database latency.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sql_txqueue::test_utils::MockConnection;
use sql_txqueue::{CallbackHost, CallbackRef, Database, EngineOptions, Event, Outcome, Query, SourceId, Transaction};

const BATCHES: usize = 200;

#[derive(Default)]
struct Counter(u64);

impl CallbackHost for Counter {
    fn invoke(&mut self, _callback: CallbackRef, _outcome: &Outcome<'_>) {
        self.0 += 1;
    }

    fn invoke_named(&mut self, _source: SourceId, _event: Event, _outcome: &Outcome<'_>) {
        self.0 += 1;
    }
}

fn run_batches(db: &mut Database, statements: usize, host: &mut Counter) {
    let transactions: Vec<Transaction> = (0..BATCHES)
        .map(|b| {
            let tx = Transaction::new();
            for s in 0..statements {
                let query = Query::new(format!("INSERT INTO t VALUES ({b}, {s})"));
                tx.append(&query).expect("append to a fresh transaction");
            }
            tx
        })
        .collect();

    for tx in &transactions {
        tx.start(db).expect("start transaction");
    }
    for tx in &transactions {
        db.wait(tx, false, host).expect("wait for transaction");
    }
    db.poll(host);
}

fn batch_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_throughput");
    for workers in [1, 4] {
        for statements in [1, 8] {
            let options = EngineOptions::new(workers);
            let mut logs = Vec::new();
            let mut db = Database::with_factory(options, |_| {
                let conn = MockConnection::new();
                logs.push(conn.log());
                Ok(conn)
            })
            .expect("start engine");
            group.throughput(Throughput::Elements((BATCHES * statements) as u64));
            group.bench_function(
                BenchmarkId::new(format!("workers={workers}"), statements),
                |b| {
                    let mut host = Counter::default();
                    b.iter(|| {
                        run_batches(&mut db, statements, &mut host);
                        logs.iter().for_each(|log| log.clear());
                    });
                    black_box(host.0);
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, batch_throughput);
criterion_main!(benches);
