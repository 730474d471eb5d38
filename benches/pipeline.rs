use criterion::{criterion_group, criterion_main, Criterion};

use std::sync::Arc;

use rulegraph::dsl::ast::Declaration;
use rulegraph::{parse, BoundVar, QueryTranslator, RuleRegistry};

const RULES: &str = r#"
RULE SupplierBlock PRIORITY 100 {
  ON UPDATE(Supplier.status)
  FOR (s:Supplier WHERE s.status IN ["Expired", "Blacklisted", "Suspended"]) {
    FOR (po:PurchaseOrder WHERE po -[orderedFrom]-> s AND po.status == "Open") {
      SET po.status = "RiskLocked";
    }
  }
}
RULE Escalate PRIORITY 50 {
  ON UPDATE(PurchaseOrder.amount)
  FOR (po:PurchaseOrder WHERE po.amount > 10000 AND po.status == "Open") {
    TRIGGER PurchaseOrder.escalate ON po WITH {level: 2};
  }
}
RULE Sweep {
  ON SCAN(PurchaseOrder)
  FOR (po:PurchaseOrder WHERE po.status == "Open" AND po.createdAt IS NOT NULL) {
    SET po.swept = true;
  }
}
"#;

fn bench_parse(c: &mut Criterion) {
    c.bench_function("pipeline/parse_unit", |b| {
        b.iter(|| parse(std::hint::black_box(RULES)).unwrap());
    });
}

fn bench_translate(c: &mut Criterion) {
    let declarations = parse(RULES).unwrap();
    let Declaration::Rule(rule) = &declarations[0] else {
        panic!("expected rule");
    };
    let translator = QueryTranslator::new();
    let bound = vec![BoundVar::new("s", "Supplier", "BP_10001")];

    c.bench_function("pipeline/translate_guard", |b| {
        b.iter(|| {
            translator
                .translate(std::hint::black_box(&rule.body), &bound)
                .unwrap()
        });
    });
}

fn bench_trigger_lookup(c: &mut Criterion) {
    let registry = Arc::new(RuleRegistry::new());
    registry.load_from_text(RULES).unwrap();
    // Pad the bucket so the sort has something to do.
    for i in 0..64 {
        let source = format!(
            "RULE Pad{i} PRIORITY {p} {{ ON UPDATE(Supplier.status) FOR (s:Supplier) {{ SET s.pad = {i}; }} }}",
            p = i % 7
        );
        registry.load_from_text(&source).unwrap();
    }

    c.bench_function("pipeline/trigger_lookup", |b| {
        b.iter(|| registry.rules_for_key(std::hint::black_box("UPDATE|Supplier|status")));
    });
}

criterion_group!(benches, bench_parse, bench_translate, bench_trigger_lookup);
criterion_main!(benches);
