//! Property-based tests for translation: range filters come out the same
//! however they are written, and orderings hoist in priority order.

use mongo_bson::doc;
use mongo_linq::{Expr, QueryTranslator, Queryable};
use proptest::prelude::*;

fn people() -> Queryable {
    Queryable::documents("tests", "people")
}

fn field_name() -> impl Strategy<Value = String> {
    "[A-Z][a-zA-Z]{0,8}"
}

proptest! {
    #[test]
    fn range_filters_are_form_independent(low in -1000i32..1000, span in 1i32..1000) {
        let high = low + span;
        let expected = doc! { "Age" => doc! { "$gt" => low, "$lt" => high } };
        let translator = QueryTranslator::default();

        let direct = translator
            .translate(&people().filter(|p| p.clone().member("Age").gt(low).and(p.member("Age").lt(high))))
            .unwrap();
        prop_assert_eq!(&direct.query, &expected);

        let mirrored = translator
            .translate(&people().filter(|p| Expr::from(low).lt(p.clone().member("Age")).and(Expr::from(high).gt(p.member("Age")))))
            .unwrap();
        prop_assert_eq!(&mirrored.query, &expected);

        let holder = Expr::constant(doc! { "Low" => low, "High" => high });
        let via_members = translator
            .translate(&people().filter(|p| {
                p.clone()
                    .member("Age")
                    .gt(holder.clone().member("Low"))
                    .and(p.member("Age").lt(holder.member("High")))
            }))
            .unwrap();
        prop_assert_eq!(&via_members.query, &expected);
    }

    #[test]
    fn orderings_hoist_in_priority_order(
        names in prop::collection::vec(field_name(), 1..5),
        skip in 0i32..50,
        take in 1i32..50,
    ) {
        let mut query = people().order_by(|p| p.member(names[0].clone()));
        for name in &names[1..] {
            query = query.then_by(|p| p.member(name.clone()));
        }
        let compiled = QueryTranslator::default()
            .translate(&query.skip(skip).take(take))
            .unwrap();

        // A repeated field keeps the position of its last ordering.
        let mut unique: Vec<&String> = Vec::new();
        for name in names.iter().rev() {
            if !unique.contains(&name) {
                unique.insert(0, name);
            }
        }
        let keys: Vec<&String> = compiled.order.keys().collect();
        prop_assert_eq!(keys, unique);
        prop_assert!(compiled.order.values().all(|v| v.as_i32() == Some(1)));
        prop_assert_eq!(compiled.number_to_skip, skip);
        prop_assert_eq!(compiled.number_to_limit, take);
    }
}
