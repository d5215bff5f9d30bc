use tabview::{
    ColumnSpec, DefectCollector, EvalContext, EvalPolicy, FieldType, NodeId, Nullable, Operand,
    Operator, RowMap, Tree, TreeBuilder, Value, from, new_view, new_view_with, parse_expr, select,
    where_,
};

fn letters(defects: &DefectCollector) -> Tree {
    let mut builder = TreeBuilder::new(defects);
    builder
        .add_column(ColumnSpec::new("A", FieldType::Utf8).nullable(Nullable::allowed()))
        .expect("column A");
    builder
        .add_column(ColumnSpec::new("B", FieldType::Utf8))
        .expect("column B");
    for (a, b) in [("Test", "One"), ("Foo", "Two"), ("Bar", "Three")] {
        builder
            .push_row(vec![Value::from(a), Value::from(b)])
            .expect("row");
    }
    builder.finish()
}

fn bools(pairs: &[(u32, bool)]) -> RowMap {
    pairs.iter().map(|(row, b)| (*row, Value::Bool(*b))).collect()
}

#[test]
fn gt_over_two_string_columns() {
    let defects = DefectCollector::new();
    let tree = letters(&defects);
    let root = tree.root();
    let applied = Operator::Gt {
        left: Operand::column(root.find("A").expect("A")),
        right: Operand::column(root.find("B").expect("B")),
    }
    .apply(&tree)
    .expect("gt applies");

    assert_eq!(applied.field_type, FieldType::Bool);
    assert_eq!(applied.rows, bools(&[(1, true), (2, false), (3, false)]));
    assert!(defects.is_empty());
}

#[test]
fn view_shows_selected_column_and_accepted_rows() {
    let defects = DefectCollector::new();
    let tree = letters(&defects);
    let root = tree.root();
    let a = root.find("A").expect("A");
    let b = root.find("B").expect("B");
    let predicate = Operator::Gt {
        left: Operand::column(a),
        right: Operand::column(b),
    };

    let view = new_view([select(["A"]), from(root), where_(predicate)]).expect("view");
    assert_eq!(tree.version(), view.version());
    assert_eq!(root.excluded(a.id()), Ok(false));
    assert_eq!(a.excluded(NodeId::new(1, 1)), Ok(false));
    assert_eq!(a.excluded(NodeId::new(1, 2)), Ok(true));
    assert_eq!(a.excluded(NodeId::new(1, 3)), Ok(true));

    // B is not selected, so it no longer takes part in row exclusion.
    assert_eq!(root.excludes(), vec![false; 4]);
}

#[test]
fn null_checks_decide_hidden_rows_before_comparing() {
    let defects = DefectCollector::new();
    let mut builder = TreeBuilder::new(&defects);
    builder
        .add_column(ColumnSpec::new("A", FieldType::Utf8).nullable(Nullable::allowed()))
        .expect("column A");
    for value in [Some("x"), None, Some("z")] {
        builder
            .push_row(vec![Value::from(value)])
            .expect("row");
    }
    let tree = builder.finish();
    let a = Operand::column(tree.root().find("A").expect("A"));

    let is_null = Operator::And {
        left: Box::new(Operator::Eq {
            left: a.clone(),
            right: Operand::null(),
        }),
        right: Box::new(Operator::True),
    }
    .apply(&tree)
    .expect("is null");
    assert_eq!(is_null.rows, bools(&[(1, false), (2, true), (3, false)]));

    let not_null = Operator::And {
        left: Box::new(Operator::Not {
            expr: Box::new(Operator::Eq {
                left: a.clone(),
                right: Operand::null(),
            }),
        }),
        right: Box::new(Operator::True),
    }
    .apply(&tree)
    .expect("not null");
    assert_eq!(not_null.rows, bools(&[(1, true), (2, false), (3, true)]));

    // The hidden null cell is skipped, never dispatched on its tag.
    let compared = Operator::Gt {
        left: a,
        right: Operand::literal("a"),
    }
    .apply(&tree)
    .expect("scan");
    assert_eq!(compared.rows, bools(&[(1, true), (2, false), (3, true)]));
    assert!(defects.is_empty());
}

#[test]
fn excluded_row_is_false_even_against_true() {
    let defects = DefectCollector::new();
    let mut builder = TreeBuilder::new(&defects);
    builder
        .add_column(ColumnSpec::new("A", FieldType::Utf8))
        .expect("column A");
    for value in [Some("x"), None, Some("z")] {
        builder
            .push_row(vec![Value::from(value)])
            .expect("row");
    }
    let tree = builder.finish();
    assert_eq!(tree.root().excludes(), vec![false, false, true, false]);
    assert_eq!(defects.count(), 1);

    let applied = Operator::And {
        left: Box::new(Operator::Eq {
            left: Operand::column(tree.root().find("A").expect("A")),
            right: Operand::null(),
        }),
        right: Box::new(Operator::True),
    }
    .apply(&tree)
    .expect("and applies");
    assert_eq!(applied.rows, bools(&[(1, false), (2, false), (3, false)]));
}

#[test]
fn parsed_predicate_drives_a_view() {
    let defects = DefectCollector::new();
    let mut builder = TreeBuilder::new(&defects);
    builder
        .add_column(ColumnSpec::new("id", FieldType::UInt32).unique())
        .expect("id");
    builder
        .add_column(ColumnSpec::new("score", FieldType::Float64).nullable(Nullable::allowed()))
        .expect("score");
    builder
        .add_column(ColumnSpec::new("day", FieldType::Date))
        .expect("day");
    let rows = [
        (1_u32, Some(71.5), "2019-07-30"),
        (2, None, "2019-08-01"),
        (3, Some(40.0), "2019-08-02"),
        (4, Some(88.0), "2019-08-03"),
    ];
    for (id, score, day) in rows {
        let day = tabview::parse_timestamp(day).expect("valid date");
        builder
            .push_row(vec![
                Value::UInt32(id),
                score.map_or(Value::Null, Value::Float64),
                Value::Timestamp(day),
            ])
            .expect("row");
    }
    let tree = builder.finish();

    let predicate = parse_expr("score > 50 and day >= '2019-08-01'", &tree).expect("parses");
    let ctx = EvalContext::new(EvalPolicy::strict(), &defects);
    let view = new_view_with(
        [from(tree.root()), select(["id", "score"]), where_(predicate)],
        &ctx,
    )
    .expect("view");

    assert_eq!(view.visible_rows(), vec![4]);
    let shown: Vec<_> = view
        .columns()
        .iter()
        .map(|column| column.name().to_owned())
        .collect();
    assert_eq!(shown, vec!["id".to_owned(), "score".to_owned()]);
    assert!(defects.is_empty());

    tree.root().reset();
    assert_eq!(tree.version(), 0);
    assert_eq!(tree.root().excludes(), vec![false; 5]);
}

#[test]
fn row_cells_walk_a_row_in_column_order() {
    let defects = DefectCollector::new();
    let tree = letters(&defects);
    let b2 = tree
        .root()
        .find("B")
        .and_then(|b| b.find_by_id(NodeId::new(2, 2)))
        .expect("B row 2");
    let row: Vec<String> = tree
        .row_cells(b2.idx())
        .expect("row")
        .iter()
        .map(|cell| cell.value().to_string())
        .collect();
    assert_eq!(row, vec!["Foo".to_owned(), "Two".to_owned()]);
}
