use heapql::aggregate::Aggregate;
use heapql::aggregator::AggregateOp;
use heapql::database;
use heapql::fields::{FieldVal, IntField, StringField};
use heapql::operator::{Filter, OpIterator, Predicate, SeqScan};
use heapql::tuple::Tuple;
use heapql::{fields::Op, transaction::TransactionId};

use std::thread;

/// Demo driver: loads `schemas.txt`, inserts a few rows concurrently under
/// the wound-wait lock manager, then runs a small scan/filter/aggregate
/// pipeline over the result and prints it.
fn main() {
    env_logger::init();

    let db = database::get_global_db();

    let mut schema_file_path = std::env::current_dir().unwrap();
    schema_file_path.push("schemas.txt");
    if let Err(e) = db
        .get_catalog()
        .load_schema(schema_file_path.to_str().unwrap())
    {
        log::warn!("no schema loaded ({}); nothing to demo", e);
        return;
    }

    let catalog = db.get_catalog();
    let table = match catalog.get_table_from_name("employees") {
        Some(t) => t,
        None => {
            log::warn!("schemas.txt has no 'employees' table; nothing to demo");
            return;
        }
    };
    let table_id = table.get_id();
    let td = table.get_tuple_desc().clone();

    println!("table id: {}", table_id);
    println!("table name: {:?}", td.get_field_name(0));

    // Insert concurrently from three threads; the wound-wait lock manager
    // aborts the younger transaction on conflict, so each thread retries
    // until its own insert+commit goes through uncontended.
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let db = database::get_global_db();
            let table_id = table_id;
            let td = td.clone();
            thread::spawn(move || loop {
                let tid = TransactionId::new();
                let bp = db.get_buffer_pool();
                let name = format!("Alice_{}", tid.get_tid());
                let mut aborted = false;
                for i in 0..3 {
                    let tuple = Tuple::new(
                        vec![
                            FieldVal::IntField(IntField::new(i)),
                            FieldVal::StringField(StringField::new(name.clone(), 7)),
                        ],
                        &td,
                    );
                    if let Err(e) = bp.insert_tuple(tid, table_id, tuple) {
                        log::info!("insert under {:?} failed: {}", tid, e);
                        let _ = bp.abort_transaction(tid);
                        aborted = true;
                        break;
                    }
                }
                if aborted {
                    thread::sleep(std::time::Duration::from_millis(50));
                    continue;
                }
                if bp.commit_transaction(tid).is_ok() {
                    println!("thread {:?} committed", thread::current().id());
                    break;
                }
                thread::sleep(std::time::Duration::from_millis(50));
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Scan every row, keep only the ones named "Alice_0" (the first
    // transaction's rows, if it happened to be the one whose id is 0),
    // and count them via Aggregate.
    let tid = TransactionId::new();
    let scan = SeqScan::new(table, tid, None).unwrap();
    let mut plan: Box<dyn OpIterator> = Box::new(scan);

    println!("\nall rows:");
    plan.open().unwrap();
    let mut tuple_count = 0;
    while let Some(t) = plan.next().unwrap() {
        println!("tuple: {}", t);
        tuple_count += 1;
    }
    plan.close();
    println!("tuple count: {}", tuple_count);

    let db = database::get_global_db();
    let scan = SeqScan::new(
        db.get_catalog().get_table_from_id(table_id).unwrap(),
        tid,
        None,
    )
    .unwrap();
    let pred = Predicate::new(
        1,
        Op::Like,
        FieldVal::StringField(StringField::new("Alice".to_string(), 5)),
    );
    let filtered = Filter::new(pred, Box::new(scan));
    let mut count_by_name = Aggregate::new(Box::new(filtered), 1, Some(1), AggregateOp::Count).unwrap();
    count_by_name.open().unwrap();
    println!("\ncounts by name:");
    while let Some(t) = count_by_name.next().unwrap() {
        println!("{}", t);
    }
    count_by_name.close();

    db.get_buffer_pool().commit_transaction(tid).unwrap();
}
