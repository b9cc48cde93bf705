use criterion::{black_box, criterion_group, criterion_main, Criterion};
use shale::{
    doc_from_json, DocObject, IdentifierFactory, MetaSnapshot, MutSnapshot, RidGenerator,
    TableRefRegistry, Translator,
};
use serde_json::json;
use std::sync::Arc;

fn sample_doc(i: usize) -> DocObject {
    doc_from_json(json!({
        "id": i as i64,
        "name": format!("client-{i}"),
        "active": i % 2 == 0,
        "address": {"street": "main", "number": i as i64, "geo": {"lat": 1.5, "lon": -3.25}},
        "tags": ["alpha", "beta", "gamma"],
        "orders": [
            {"total": 10.5, "lines": [1, 2, 3]},
            {"total": 99.0, "lines": []}
        ]
    }))
    .unwrap()
}

fn bench_shred(c: &mut Criterion) {
    let docs: Vec<DocObject> = (0..100).map(sample_doc).collect();

    c.bench_function("shred_100_docs_fresh_schema", |b| {
        b.iter(|| {
            let registry = Arc::new(TableRefRegistry::new());
            let rids = RidGenerator::new(Arc::clone(&registry));
            let factory = IdentifierFactory::default();
            let mut overlay = MutSnapshot::new(Arc::new(MetaSnapshot::empty()), 0);
            overlay
                .add_database("db", "db".to_string())
                .unwrap()
                .add_collection("clients", "clients".to_string())
                .unwrap();
            let collection = overlay
                .database_mut("db")
                .unwrap()
                .collection_mut("clients")
                .unwrap();
            let mut translator =
                Translator::new(&factory, rids.scoped("db", "clients"), collection);
            for doc in &docs {
                translator.translate(doc).unwrap();
            }
            black_box(translator.into_collection_data())
        })
    });

    c.bench_function("shred_100_docs_warm_schema", |b| {
        // discovery happens once, iterations only emit rows
        let registry = Arc::new(TableRefRegistry::new());
        let rids = RidGenerator::new(Arc::clone(&registry));
        let factory = IdentifierFactory::default();
        let mut overlay = MutSnapshot::new(Arc::new(MetaSnapshot::empty()), 0);
        overlay
            .add_database("db", "db".to_string())
            .unwrap()
            .add_collection("clients", "clients".to_string())
            .unwrap();
        let collection = overlay
            .database_mut("db")
            .unwrap()
            .collection_mut("clients")
            .unwrap();
        {
            let mut warmup =
                Translator::new(&factory, rids.scoped("db", "clients"), &mut *collection);
            warmup.translate(&docs[0]).unwrap();
            warmup.into_collection_data();
        }
        b.iter(|| {
            let mut translator =
                Translator::new(&factory, rids.scoped("db", "clients"), &mut *collection);
            for doc in &docs {
                translator.translate(doc).unwrap();
            }
            black_box(translator.into_collection_data())
        })
    });
}

criterion_group!(benches, bench_shred);
criterion_main!(benches);
