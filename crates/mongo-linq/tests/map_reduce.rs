use mongo_bson::{doc, Bson};
use mongo_linq::{
    Expr, FieldDeclaration, MapReduceMapFunctionBuilder, MapReduceReduceFunctionBuilder, QueryError,
    QueryTranslator, Queryable,
};

fn field(name: &str) -> Expr {
    Expr::field("t0", name)
}

// ---- Map function

#[test]
fn no_group_keys_emit_a_constant_key() {
    let fields = vec![FieldDeclaration::new("Count", Expr::count_rows())];
    let js = MapReduceMapFunctionBuilder::new().build(&fields, &[]).unwrap();
    assert_eq!(js.as_str(), r#"function() { emit(1, {"Count": 1}); }"#);
}

#[test]
fn several_group_keys_emit_an_object() {
    let fields = vec![
        FieldDeclaration::new("Total", Expr::sum(field("Score"))),
        FieldDeclaration::new("Best", Expr::max(field("Score"))),
    ];
    let js = MapReduceMapFunctionBuilder::new()
        .build(&fields, &[field("Age"), field("City")])
        .unwrap();
    assert_eq!(
        js.as_str(),
        r#"function() { emit({"Age": this.Age, "City": this.City}, {"Total": this.Score, "Best": this.Score}); }"#
    );
}

#[test]
fn keys_collect_every_field_a_group_expression_reads() {
    let fields = vec![FieldDeclaration::new("Lowest", Expr::min(field("Age") * 2))];
    let js = MapReduceMapFunctionBuilder::new()
        .build(&fields, &[field("Age") / 10])
        .unwrap();
    assert_eq!(js.as_str(), r#"function() { emit(this.Age, {"Lowest": (this.Age * 2)}); }"#);
}

#[test]
fn no_aggregates_emit_a_constant_value() {
    let fields = vec![FieldDeclaration::new("Age", field("Age"))];
    let js = MapReduceMapFunctionBuilder::new().build(&fields, &[field("Age")]).unwrap();
    assert_eq!(js.as_str(), "function() { emit(this.Age, 1); }");
}

#[test]
fn unrenderable_arguments_are_not_supported() {
    let fields = vec![FieldDeclaration::new("Total", Expr::sum(-field("Score")))];
    let err = MapReduceMapFunctionBuilder::new().build(&fields, &[]).unwrap_err();
    assert!(matches!(err, QueryError::NotSupported(_)));
}

// ---- Reduce function

#[test]
fn reduce_folds_each_aggregate() {
    let fields = vec![
        FieldDeclaration::new("Count", Expr::count_rows()),
        FieldDeclaration::new("Low", Expr::min(field("Age"))),
        FieldDeclaration::new("High", Expr::max(field("Age"))),
    ];
    let js = MapReduceReduceFunctionBuilder::new().build(&fields).unwrap();
    assert_eq!(
        js.as_str(),
        "function(key, values) { var result = values[0]; for (var i = 1; i < values.length; i++) { \
         result.Count += values[i].Count; \
         result.Low = Math.min(result.Low, values[i].Low); \
         result.High = Math.max(result.High, values[i].High); } return result; }"
    );
}

// ---- Grouped queries

#[test]
fn grouped_queries_carry_map_and_reduce_functions() {
    let query = Queryable::documents("tests", "people")
        .filter(|p| p.member("Active").equal(true))
        .group_by(
            |p| vec![p.member("Age")],
            |p| {
                vec![
                    ("Count".to_owned(), Expr::count_rows()),
                    ("Total".to_owned(), Expr::sum(p.member("Score"))),
                ]
            },
        );
    let compiled = QueryTranslator::default().translate(&query).unwrap();

    assert_eq!(compiled.query, doc! { "Active" => true });
    assert!(compiled.fields.is_empty());
    assert!(compiled.is_map_reduce());
    let map = compiled.map_function.clone().unwrap();
    assert_eq!(
        map.as_str(),
        r#"function() { emit(this.Age, {"Count": 1, "Total": this.Score}); }"#
    );

    let command = compiled.map_reduce_command().unwrap();
    assert_eq!(command.get_str("mapreduce"), Some("people"));
    assert_eq!(command.get("map"), Some(&Bson::JavaScriptCode(map.0)));
    assert_eq!(command.get_document("query"), Some(&doc! { "Active" => true }));
}

#[test]
fn grouping_below_the_outermost_query_is_not_supported() {
    let query = Queryable::documents("tests", "people")
        .group_by(|p| vec![p.member("Age")], |_| vec![("Count".to_owned(), Expr::count_rows())])
        .take(5);
    let err = QueryTranslator::default().translate(&query).unwrap_err();
    assert!(matches!(err, QueryError::NotSupported(_)));
}
