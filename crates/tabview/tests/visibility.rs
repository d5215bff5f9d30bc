use std::time::Duration;

use proptest::prelude::*;
use tabview::{
    ColumnSpec, DefectCollector, EvalContext, EvalPolicy, ExprError, FieldType, NodeId, Nullable,
    Operand, Operator, Tree, TreeBuilder, TreeError, Value, from, new_view, select, where_,
};

fn numbers(defects: &DefectCollector, values: &[Option<i64>]) -> Tree {
    let mut builder = TreeBuilder::new(defects);
    builder
        .add_column(ColumnSpec::new("n", FieldType::Int64))
        .expect("column n");
    builder
        .add_column(ColumnSpec::new("label", FieldType::Utf8).nullable(Nullable::allowed()))
        .expect("column label");
    for (i, value) in values.iter().enumerate() {
        builder
            .push_row(vec![Value::from(*value), Value::from(format!("row {i}"))])
            .expect("row");
    }
    builder.finish()
}

#[test]
fn required_nulls_are_excluded_and_reported() {
    let defects = DefectCollector::new();
    let tree = numbers(&defects, &[Some(1), None, Some(3)]);
    assert_eq!(tree.root().excludes(), vec![false, false, true, false]);

    let report = defects.report(0);
    assert_eq!(report.len(), 2);
    assert_eq!(
        report[1],
        vec![
            "1".to_owned(),
            "2".to_owned(),
            "null value found in non-null field".to_owned()
        ]
    );
}

#[test]
fn unknown_ids_are_errors() {
    let defects = DefectCollector::new();
    let tree = numbers(&defects, &[Some(1)]);
    let n = tree.root().find("n").expect("n");
    assert_eq!(
        n.excluded(NodeId::new(1, 7)),
        Err(TreeError::UnknownId(NodeId::new(1, 7)))
    );
}

#[test]
fn hardened_policy_bounds_evaluation() {
    let defects = DefectCollector::new();
    let tree = numbers(&defects, &[Some(1), Some(2)]);
    let n = tree.root().find("n").expect("n");
    let ctx = EvalContext::new(EvalPolicy::hardened(Duration::from_secs(30)), &defects);
    let applied = Operator::Or {
        left: Box::new(Operator::Gt {
            left: Operand::column(n),
            right: Operand::literal(1_i64),
        }),
        right: Box::new(Operator::False),
    }
    .apply_with(&tree, &ctx)
    .expect("finishes well within the deadline");
    assert_eq!(applied.rows.bool_at(2), Some(true));

    let expired = EvalContext::new(EvalPolicy::hardened(Duration::ZERO), &defects);
    assert_eq!(
        Operator::True.apply_with(&tree, &expired),
        Err(ExprError::DeadlineExceeded)
    );
}

proptest! {
    #[test]
    fn views_fork_and_reset_restores(values in proptest::collection::vec(any::<Option<i64>>(), 1..16), views in 1_usize..4) {
        let defects = DefectCollector::new();
        let tree = numbers(&defects, &values);
        let root = tree.root();
        let n = root.find("n").expect("n");
        let parsed = n.null();
        let parsed_excludes = root.excludes();
        prop_assert_eq!(parsed_excludes.len(), values.len() + 1);

        for expected in 1..=views {
            let predicate = Operator::Gt {
                left: Operand::column(n),
                right: Operand::literal(0_i64),
            };
            let view = new_view([from(root), select(["n"]), where_(predicate)]).expect("view");
            prop_assert_eq!(view.version(), expected);
            prop_assert_eq!(tree.version(), expected);
            prop_assert_eq!(tree.version_count(), expected + 1);

            let label = root.find("label").expect("label");
            prop_assert!(label.null().values().all(|hidden| *hidden));

            // Views are forked from the previous view, so only rows still
            // visible at the time can pass.
            let shown = view.visible_rows();
            for row in &shown {
                let value = &values[*row as usize - 1];
                prop_assert!(matches!(value, Some(v) if *v > 0));
            }
        }

        root.reset();
        prop_assert_eq!(tree.version(), 0);
        prop_assert_eq!(n.null(), parsed);
        prop_assert_eq!(root.excludes(), parsed_excludes);
    }

    #[test]
    fn toggle_round_trips(values in proptest::collection::vec(any::<i64>(), 1..16), flips in proptest::collection::vec(any::<bool>(), 1..16)) {
        let defects = DefectCollector::new();
        let present: Vec<_> = values.iter().copied().map(Some).collect();
        let tree = numbers(&defects, &present);
        let n = tree.root().find("n").expect("n");
        let len = n.null().len();
        for (i, hidden) in flips.iter().enumerate() {
            let id = NodeId::new(1, (i % values.len()) as u32 + 1);
            n.toggle(id, *hidden);
            prop_assert_eq!(n.excluded(id), Ok(*hidden));
            prop_assert_eq!(n.null().len(), len);
        }
    }
}
