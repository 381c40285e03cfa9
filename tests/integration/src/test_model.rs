//! Typed entities over the adapter.

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use dynamongo_core::{AdapterError, AdapterResult, Model};
    use dynamongo_model::{
        AttributeKind, AttributeSchema, AttributeValue, Item, ModelSchema, Path, QueryInput,
        ScanInput,
    };

    use crate::memory_adapter;

    static TICKETS: LazyLock<ModelSchema> = LazyLock::new(|| {
        ModelSchema::new("tickets", AttributeSchema::new("queue", AttributeKind::String))
            .with_range_key(AttributeSchema::new("number", AttributeKind::Number))
            .with_attribute(AttributeSchema::new("title", AttributeKind::String).aliased("t"))
            .with_attribute(AttributeSchema::new("points", AttributeKind::Number))
    });

    #[derive(Debug, Clone, PartialEq)]
    struct Ticket {
        queue: String,
        number: i64,
        title: String,
        points: Option<i64>,
    }

    impl Ticket {
        fn new(queue: &str, number: i64, title: &str) -> Self {
            Self {
                queue: queue.to_owned(),
                number,
                title: title.to_owned(),
                points: None,
            }
        }
    }

    fn invalid(message: impl Into<String>) -> AdapterError {
        AdapterError::Validation {
            message: message.into(),
        }
    }

    fn number(item: &Item, key: &str) -> AdapterResult<Option<i64>> {
        item.get(key)
            .map(|v| {
                v.as_n()
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| invalid(format!("{key} is not an integer")))
            })
            .transpose()
    }

    impl Model for Ticket {
        fn schema() -> &'static ModelSchema {
            &TICKETS
        }

        fn to_item(&self) -> Item {
            let mut item = Item::from([
                ("queue".to_owned(), AttributeValue::from(self.queue.as_str())),
                ("number".to_owned(), AttributeValue::n(self.number)),
                ("t".to_owned(), AttributeValue::from(self.title.as_str())),
            ]);
            if let Some(points) = self.points {
                item.insert("points".to_owned(), AttributeValue::n(points));
            }
            item
        }

        fn from_item(item: Item) -> AdapterResult<Self> {
            let text = |key: &str| {
                item.get(key)
                    .and_then(AttributeValue::as_s)
                    .map(str::to_owned)
                    .ok_or_else(|| invalid(format!("missing {key}")))
            };
            Ok(Self {
                queue: text("queue")?,
                number: number(&item, "number")?.ok_or_else(|| invalid("missing number"))?,
                title: text("t")?,
                points: number(&item, "points")?,
            })
        }
    }

    #[test]
    fn test_should_round_trip_entities() {
        let adapter = memory_adapter();
        adapter.create_table(Ticket::schema()).unwrap();

        let mut ticket = Ticket::new("ops", 7, "disk full");
        adapter.save(&ticket).unwrap();
        assert_eq!(adapter.load::<Ticket>(&ticket.key()).unwrap(), ticket);
        assert!(
            adapter
                .load_optional::<Ticket>(&Ticket::new("ops", 8, "").key())
                .unwrap()
                .is_none()
        );
        assert!(matches!(
            adapter.load::<Ticket>(&Ticket::new("ops", 8, "").key()),
            Err(AdapterError::ItemNotFound { .. })
        ));

        let mut newer = ticket.clone();
        newer.points = Some(3);
        adapter
            .save_if(&newer, &Path::new("title").eq("disk full"))
            .unwrap();
        let stale = adapter.save_if(&ticket, &Path::new("points").does_not_exist());
        assert!(matches!(stale, Err(AdapterError::ConditionalCheckFailed)));

        adapter.refresh(&mut ticket).unwrap();
        assert_eq!(ticket.points, Some(3));

        assert!(adapter.remove(&ticket).unwrap());
        assert!(!adapter.remove(&ticket).unwrap());
        assert!(matches!(
            adapter.refresh(&mut ticket),
            Err(AdapterError::ItemNotFound { .. })
        ));
    }

    #[test]
    fn test_should_iterate_entities_across_pages() {
        let adapter = memory_adapter();
        adapter.create_table(Ticket::schema()).unwrap();
        for n in 1..=5 {
            adapter.save(&Ticket::new("ops", n, "page")).unwrap();
        }
        adapter.save(&Ticket::new("dev", 1, "other")).unwrap();

        let input = QueryInput::builder().hash_key("ops").limit(2).build();
        let mut tickets = adapter.query_models::<Ticket>(input.clone());
        let first: Vec<i64> = tickets
            .by_ref()
            .take(3)
            .map(|t| t.unwrap().number)
            .collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(tickets.total_yielded(), 3);

        let token = tickets.cursor().unwrap().unwrap();
        let rest: Vec<i64> = adapter
            .query_models::<Ticket>(QueryInput {
                exclusive_start: Some(token),
                ..input
            })
            .map(|t| t.unwrap().number)
            .collect();
        assert_eq!(rest, vec![4, 5]);

        let mut all = adapter.scan_models::<Ticket>(ScanInput::builder().limit(4).build());
        let queues: Vec<String> = all.by_ref().map(|t| t.unwrap().queue).collect();
        assert_eq!(queues.len(), 6);
        assert_eq!(all.total_yielded(), 6);
        assert!(all.last_page_scanned() <= 4);
    }

    #[test]
    fn test_should_stop_on_undecodable_entity() {
        let adapter = memory_adapter();
        adapter.create_table(Ticket::schema()).unwrap();
        adapter.save(&Ticket::new("ops", 1, "fine")).unwrap();
        let mut broken = Ticket::new("ops", 2, "broken").to_item();
        broken.remove("t");
        adapter.put(Ticket::schema(), &broken, None).unwrap();
        adapter.save(&Ticket::new("ops", 3, "fine")).unwrap();

        let results: Vec<_> = adapter
            .query_models::<Ticket>(QueryInput::builder().hash_key("ops").build())
            .collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
