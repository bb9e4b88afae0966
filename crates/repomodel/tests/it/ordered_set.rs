use repomodel::{MemRowStore, ModelError, OrderedSet, Row, RowId, RowStore};

const TABLE: &str = "roles";

fn seeded(names: &[&str]) -> MemRowStore {
    let store = MemRowStore::new();
    {
        let set = OrderedSet::new(&store, TABLE);
        for name in names {
            set.append(Row::new().with("name", *name)).unwrap();
        }
    }
    store
}

fn order(store: &MemRowStore) -> Vec<(String, i64)> {
    OrderedSet::new(store, TABLE)
        .positions()
        .unwrap()
        .into_iter()
        .map(|(id, pos)| {
            let row = store.read_row(TABLE, id).unwrap().unwrap();
            (row.get("name").unwrap().render(), pos.unwrap())
        })
        .collect()
}

fn id_of(store: &MemRowStore, name: &str) -> RowId {
    store
        .select(&repomodel::Query::table(TABLE).filter("name", name))
        .unwrap()[0]
        .id
        .unwrap()
}

fn expected(pairs: &[(&str, i64)]) -> Vec<(String, i64)> {
    pairs.iter().map(|(n, p)| (n.to_string(), *p)).collect()
}

#[test]
fn test_move_example() {
    let store = seeded(&["A", "B", "C", "D"]);
    let set = OrderedSet::new(&store, TABLE);
    assert_eq!(set.move_to(id_of(&store, "D"), 2).unwrap(), 2);
    assert_eq!(
        order(&store),
        expected(&[("A", 1), ("D", 2), ("B", 3), ("C", 4)])
    );
}

#[test]
fn test_insert_example() {
    let store = seeded(&["A", "B", "C", "D"]);
    let set = OrderedSet::new(&store, TABLE);
    let placed = set.insert_at(Row::new().with("name", "E"), 1).unwrap();
    assert_eq!(placed.position, 1);
    assert_eq!(
        order(&store),
        expected(&[("E", 1), ("A", 2), ("B", 3), ("C", 4), ("D", 5)])
    );
}

#[test]
fn test_move_down_and_clamp() {
    let store = seeded(&["A", "B", "C", "D"]);
    let set = OrderedSet::new(&store, TABLE);
    set.move_to(id_of(&store, "A"), 3).unwrap();
    assert_eq!(
        order(&store),
        expected(&[("B", 1), ("C", 2), ("A", 3), ("D", 4)])
    );

    assert_eq!(set.move_to(id_of(&store, "D"), -5).unwrap(), 1);
    assert_eq!(
        order(&store),
        expected(&[("D", 1), ("B", 2), ("C", 3), ("A", 4)])
    );
}

#[test]
fn test_target_past_last_position_is_rejected() {
    let store = seeded(&["A", "B"]);
    let set = OrderedSet::new(&store, TABLE);
    let last = set.last_position().unwrap();
    assert!(matches!(
        set.move_to(id_of(&store, "A"), last + 1),
        Err(ModelError::Argument(_))
    ));
    // new rows may go one past the end
    set.insert_at(Row::new().with("name", "C"), last + 1).unwrap();
    assert_eq!(order(&store), expected(&[("A", 1), ("B", 2), ("C", 3)]));
}

#[test]
fn test_gaps_and_duplicates_are_repaired() {
    let store = MemRowStore::new();
    for (name, pos) in [("A", 3), ("B", 3), ("C", 7)] {
        store
            .write_row(TABLE, &Row::new().with("name", name).with("position", pos))
            .unwrap();
    }
    store
        .write_row(TABLE, &Row::new().with("name", "D"))
        .unwrap();

    let set = OrderedSet::new(&store, TABLE);
    assert!(matches!(
        set.verify(),
        Err(ModelError::OrderingViolation { .. })
    ));
    assert_eq!(set.fix_positions().unwrap(), 4);
    set.verify().unwrap();
    assert_eq!(
        order(&store),
        expected(&[("A", 1), ("B", 2), ("C", 3), ("D", 4)])
    );
    assert_eq!(set.fix_positions().unwrap(), 0);
}

#[test]
fn test_failed_batch_leaves_store_untouched() {
    let store = seeded(&["A", "B", "C", "D"]);
    let before = store.snapshot();

    store.fail_after(1);
    let set = OrderedSet::new(&store, TABLE);
    assert!(matches!(
        set.move_to(id_of(&store, "D"), 1),
        Err(ModelError::Store(_))
    ));
    assert_eq!(store.snapshot(), before);

    set.move_to(id_of(&store, "D"), 1).unwrap();
    assert_eq!(
        order(&store),
        expected(&[("D", 1), ("A", 2), ("B", 3), ("C", 4)])
    );
}

/// Small deterministic generator so the sequence is reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

#[test]
fn test_random_sequences_stay_dense() {
    let store = seeded(&["r0", "r1", "r2"]);
    let set = OrderedSet::new(&store, TABLE);
    let mut rng = Lcg(7);
    let mut count = 3u64;

    for step in 0..300 {
        let last = set.last_position().unwrap();
        match rng.next(4) {
            0 => {
                let target = rng.next(count + 1) as i64 + 1;
                set.insert_at(Row::new().with("name", format!("n{}", step)), target)
                    .unwrap();
                count += 1;
            }
            1 => {
                set.append(Row::new().with("name", format!("a{}", step)))
                    .unwrap();
                count += 1;
            }
            _ => {
                let ids: Vec<RowId> = set.positions().unwrap().iter().map(|(id, _)| *id).collect();
                let id = ids[rng.next(ids.len() as u64) as usize];
                let target = rng.next(last as u64 + 2) as i64 - 1;
                let moved = set.move_to(id, target).unwrap();
                assert_eq!(moved, target.max(1));
            }
        }

        set.verify().unwrap();
        assert_eq!(set.positions().unwrap().len() as u64, count);
        assert_eq!(set.last_position().unwrap(), count as i64);
    }
}
