//! Expression strings driven through the adapter.

#[cfg(test)]
mod tests {
    use dynamongo_core::AdapterError;
    use dynamongo_core::expression::{
        ExpressionNames, ExpressionValues, parse_condition, parse_projection, parse_update,
    };
    use dynamongo_model::{AttributeValue, QueryInput, ReturnValues};

    use crate::{memory_adapter, order, order_key, orders_schema, test_table_name};

    fn names() -> ExpressionNames {
        [
            ("#s", "status"),
            ("#t", "total"),
            ("#c", "counters"),
            ("#n", "note"),
            ("#k", "pk"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
    }

    fn values(pairs: &[(&str, AttributeValue)]) -> ExpressionValues {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn test_should_guard_puts_with_condition_expressions() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("expr-put"));
        adapter.create_table(&schema).unwrap();

        let absent = parse_condition("attribute_not_exists(#k)", &names(), &values(&[])).unwrap();
        adapter
            .put(&schema, &order("c1", 1, "open"), Some(&absent))
            .unwrap();
        let again = adapter.put(&schema, &order("c1", 1, "closed"), Some(&absent));
        assert!(matches!(again, Err(AdapterError::ConditionalCheckFailed)));
        assert_eq!(
            adapter.get(&schema, &order_key("c1", 1)).unwrap()["status"],
            AttributeValue::from("open")
        );
    }

    #[test]
    fn test_should_apply_every_update_clause() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("expr-update"));
        adapter.create_table(&schema).unwrap();
        let mut o = order("c1", 1, "open");
        o.insert("counters".to_owned(), AttributeValue::L(vec![AttributeValue::n(1)]));
        o.insert("note".to_owned(), AttributeValue::from("fragile"));
        o.insert("total".to_owned(), AttributeValue::n(10));
        adapter.put(&schema, &o, None).unwrap();

        let vals = values(&[
            (":s", AttributeValue::from("shipped")),
            (":more", AttributeValue::L(vec![AttributeValue::n(2)])),
            (":inc", AttributeValue::n(5)),
            (":open", AttributeValue::from("open")),
        ]);
        let actions = parse_update(
            "SET #s = :s, #c = list_append(#c, :more) REMOVE #n ADD #t :inc",
            &names(),
            &vals,
        )
        .unwrap();
        let condition = parse_condition("#s = :open AND #t < :inc + :inc", &names(), &vals);
        // Arithmetic is not part of the condition grammar.
        assert!(condition.is_err());
        let condition = parse_condition("#s = :open", &names(), &vals).unwrap();

        let outcome = adapter
            .update(
                &schema,
                &order_key("c1", 1),
                &actions,
                Some(&condition),
                ReturnValues::AllNew,
            )
            .unwrap();
        assert!(!outcome.used_fallback());
        let item = outcome.item.unwrap();
        assert_eq!(item["status"], AttributeValue::from("shipped"));
        assert_eq!(
            item["counters"],
            AttributeValue::L(vec![AttributeValue::n(1), AttributeValue::n(2)])
        );
        assert_eq!(item["total"], AttributeValue::n(15));
        assert!(!item.contains_key("note"));
    }

    #[test]
    fn test_should_query_with_parsed_conditions_and_projection() {
        let adapter = memory_adapter();
        let schema = orders_schema(&test_table_name("expr-query"));
        adapter.create_table(&schema).unwrap();
        for sk in 1..=6 {
            let mut o = order("c1", sk, if sk % 2 == 0 { "open" } else { "closed" });
            o.insert("total".to_owned(), AttributeValue::n(sk * 10));
            o.insert(
                "counters".to_owned(),
                AttributeValue::L(vec![AttributeValue::n(sk), AttributeValue::n(sk + 100)]),
            );
            adapter.put(&schema, &o, None).unwrap();
        }

        let vals = values(&[
            (":lo", AttributeValue::n(2)),
            (":p", AttributeValue::from("op")),
            (":min", AttributeValue::n(30)),
        ]);
        let mut names = names();
        names.insert("#sk".to_owned(), "sk".to_owned());
        let range = parse_condition("#sk >= :lo", &names, &vals).unwrap();
        let filter =
            parse_condition("begins_with(#s, :p) AND NOT #t < :min", &names, &vals).unwrap();
        let projection: Vec<String> = parse_projection("#s, #c[1]", &names)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();

        let input = QueryInput::builder()
            .hash_key("c1")
            .range_condition(range)
            .filter(filter)
            .projection(projection)
            .build();
        let page = adapter.query(&schema, &input).unwrap();
        let sks: Vec<AttributeValue> = page.items.iter().map(|i| i["sk"].clone()).collect();
        assert_eq!(sks, vec![AttributeValue::n(4), AttributeValue::n(6)]);
        let first = &page.items[0];
        assert_eq!(first.len(), 4);
        assert!(!first.contains_key("total"));
        assert_eq!(first["counters"], AttributeValue::L(vec![AttributeValue::n(104)]));
    }

    #[test]
    fn test_should_reject_unsupported_forms() {
        let vals = values(&[(":v", AttributeValue::n(1)), (":g", AttributeValue::Ss(vec!["x".to_owned()]))]);
        for condition in ["size(#c) > :v", "#t = #c", "attribute_type(#t, :v)"] {
            let err = parse_condition(condition, &names(), &vals).unwrap_err();
            assert!(
                matches!(err, AdapterError::UnsupportedOperator { .. }),
                "{condition}: {err}"
            );
        }
        for update in ["SET #t = #t + :v", "SET #t = if_not_exists(#t, :v)", "DELETE #s :g"] {
            let err = parse_update(update, &names(), &vals).unwrap_err();
            assert!(
                matches!(err, AdapterError::UnsupportedOperator { .. }),
                "{update}: {err}"
            );
        }
        assert!(matches!(
            parse_condition("#missing = :v", &names(), &vals),
            Err(AdapterError::Expression(_))
        ));
    }
}
