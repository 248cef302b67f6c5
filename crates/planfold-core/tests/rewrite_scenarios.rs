//! End-to-end rewrite scenarios with literal inputs and outputs.

use planfold_core::prune::{
    MemoryCatalog, PartBounds, PartState, PartitionKind, PartitionPart, PartitionScheme,
};
use planfold_core::{rewrite_sql, DbValue, EmptyCatalog, RewriteOptions};
use rstest::rstest;

fn explain(sql: &str) -> String {
    let program = rewrite_sql(
        sql,
        &RewriteOptions {
            plan_cache_entries: 0,
            ..Default::default()
        },
        &EmptyCatalog,
    )
    .expect("sql parses");
    program
        .roots
        .iter()
        .map(|&root| program.graph.print_statement(root))
        .collect::<Vec<_>>()
        .join(";\n")
}

#[test]
fn like_to_between() {
    assert_eq!(
        explain("SELECT s FROM t WHERE s LIKE 'abc%'"),
        "SELECT t.s FROM t WHERE t.s RANGE ('abc' GE_LT 'abd')"
    );
}

#[test]
fn comparison_pair_to_between() {
    assert_eq!(
        explain("SELECT a FROM t WHERE a <= 20 AND a >= 10"),
        "SELECT t.a FROM t WHERE t.a RANGE (10 GE_LE 20)"
    );
}

#[test]
fn equality_reduction_with_transitive_join() {
    assert_eq!(
        explain("SELECT x.a, y.b FROM x, y WHERE x.a = 5 AND x.a = y.b"),
        "SELECT 5, y.b FROM x, y WHERE y.b RANGE (5 EQ_NA) AND \
         x.a RANGE (5 EQ_NA) AND x.a = y.b [TRANSITIVE]"
    );
}

#[test]
fn outer_join_to_inner() {
    let text = explain("SELECT * FROM a LEFT OUTER JOIN b ON a.id = b.id WHERE b.x > 0");
    // The join became inner (and then unordered), so the ON predicate
    // lives in WHERE now.
    assert!(!text.contains("LEFT OUTER"), "got: {text}");
    assert!(!text.contains(" ON "), "got: {text}");
    assert!(text.contains("a.id = b.id"), "got: {text}");
}

#[test]
fn range_intersection_to_false() {
    let program = rewrite_sql(
        "SELECT a FROM t WHERE a BETWEEN 10 AND 20 AND a BETWEEN 30 AND 40",
        &RewriteOptions::default(),
        &EmptyCatalog,
    )
    .unwrap();
    assert!(program.summaries[0].always_false);
    let text = program.graph.print_statement(program.roots[0]);
    assert!(text.contains("WHERE 0"), "got: {text}");
}

#[test]
fn hash_partition_pruning() {
    let mut catalog = MemoryCatalog::new();
    catalog.insert("t", MemoryCatalog::hash("t", "k", 4));
    let program = rewrite_sql(
        "SELECT * FROM t WHERE k = 7",
        &RewriteOptions::default(),
        &catalog,
    )
    .unwrap();
    assert!(program.summaries[0].partition_pruned);
    let text = program.graph.print_statement(program.roots[0]);
    let expected = (DbValue::Int(7).partition_hash() as usize) % 4;
    assert!(
        text.contains(&format!("PARTITIONS (t__p{expected})")),
        "got: {text}"
    );
}

#[test]
fn range_partition_pruning_with_list_catalog() {
    let mut catalog = MemoryCatalog::new();
    catalog.insert(
        "sales",
        PartitionScheme {
            kind: PartitionKind::Range,
            key_attr: "amount".into(),
            parts: vec![
                PartitionPart {
                    name: "sales_small".into(),
                    state: PartState::Active,
                    bounds: PartBounds::Range {
                        min: None,
                        max: Some(DbValue::Int(100)),
                    },
                },
                PartitionPart {
                    name: "sales_large".into(),
                    state: PartState::Active,
                    bounds: PartBounds::Range {
                        min: Some(DbValue::Int(100)),
                        max: None,
                    },
                },
            ],
        },
    );
    let program = rewrite_sql(
        "SELECT * FROM sales WHERE amount > 500",
        &RewriteOptions::default(),
        &catalog,
    )
    .unwrap();
    assert!(program.summaries[0].partition_pruned);
    let text = program.graph.print_statement(program.roots[0]);
    assert!(text.contains("PARTITIONS (sales_large)"), "got: {text}");
}

#[rstest]
#[case("SELECT a FROM t WHERE 5 < a", "t.a RANGE (5 GT_INF)")]
#[case("SELECT a FROM t WHERE a < 10 OR a >= 20", "t.a RANGE (INF_LT 10, 20 GE_INF)")]
#[case("SELECT a FROM t WHERE a IN (1, 3)", "t.a RANGE (1 EQ_NA, 3 EQ_NA)")]
#[case("SELECT s FROM t WHERE s LIKE '%'", "t.s IS NOT NULL")]
#[case("SELECT a FROM t WHERE NOT (a >= 10)", "t.a RANGE (INF_LT 10)")]
fn normalized_where(#[case] sql: &str, #[case] expected_where: &str) {
    let text = explain(sql);
    let where_part = text.split(" WHERE ").nth(1).unwrap_or("");
    assert_eq!(where_part, expected_where, "full: {text}");
}

#[test]
fn snapshot_rewritten_statements() {
    let batch = "\
SELECT s FROM t WHERE s LIKE 'abc%';
SELECT a FROM t WHERE a <= 20 AND a >= 10;
SELECT x.a, y.b FROM x, y WHERE x.a = 5 AND x.a = y.b;
SELECT a FROM t WHERE a IN (SELECT b FROM u);
SELECT a, COUNT(*) FROM t GROUP BY a HAVING a > 1 AND COUNT(*) > 2";
    insta::assert_snapshot!(explain(batch));
}

#[test]
fn update_and_delete_are_rewritten_too() {
    let text = explain("UPDATE t SET a = 1 WHERE b >= 2 AND b <= 3");
    assert!(text.contains("t.b RANGE (2 GE_LE 3)"), "got: {text}");
    let text = explain("DELETE FROM t WHERE a LIKE 'xy%'");
    assert!(text.contains("t.a RANGE ('xy' GE_LT 'xz')"), "got: {text}");
}
