//! Concrete merge scenarios with known outcomes.
//!
//! Each scenario starts from an empty collection with a page size of 2 and
//! lists the pages and live events in arrival order. The scenarios build on
//! each other: a later one replays the steps of the earlier ones first.

use rowsync_core::ChangeEvent;
use rowsync_store::{CollectionStore, RowCollection};

use crate::fixtures::TestRow;

/// One arrival at the collection store.
#[derive(Debug, Clone)]
pub enum Step {
    Page(Vec<TestRow>),
    Live(ChangeEvent<TestRow>),
}

/// A merge scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub steps: Vec<Step>,
    /// The collection after the last step, in order.
    pub expected: Vec<TestRow>,
}

fn first_page() -> Step {
    Step::Page(TestRow::many([1, 2]))
}

fn insert(id: u64) -> Step {
    Step::Live(ChangeEvent::insert(TestRow::new(id)))
}

/// All scenarios, in dependency order.
pub fn all_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "first page then live insert prepends",
            steps: vec![first_page(), insert(3)],
            expected: TestRow::many([3, 1, 2]),
        },
        Scenario {
            name: "live update replaces in place",
            steps: vec![
                first_page(),
                insert(3),
                Step::Live(ChangeEvent::update(TestRow::named(1, "X"))),
            ],
            expected: vec![TestRow::new(3), TestRow::named(1, "X"), TestRow::new(2)],
        },
        Scenario {
            name: "live delete removes",
            steps: vec![
                first_page(),
                insert(3),
                Step::Live(ChangeEvent::update(TestRow::named(1, "X"))),
                Step::Live(ChangeEvent::delete(TestRow::new(2))),
            ],
            expected: vec![TestRow::new(3), TestRow::named(1, "X")],
        },
        Scenario {
            name: "live insert wins over the page carrying the same row",
            steps: vec![
                first_page(),
                insert(3),
                Step::Live(ChangeEvent::update(TestRow::named(1, "X"))),
                Step::Live(ChangeEvent::delete(TestRow::new(2))),
                insert(4),
                Step::Page(TestRow::many([4, 5])),
            ],
            expected: vec![
                TestRow::new(4),
                TestRow::new(3),
                TestRow::named(1, "X"),
                TestRow::new(5),
            ],
        },
    ]
}

/// Replay a scenario against a fresh store.
pub fn run_scenario(scenario: &Scenario) -> Vec<TestRow> {
    let store = CollectionStore::new();
    for step in &scenario.steps {
        match step.clone() {
            Step::Page(rows) => {
                store.apply_snapshot_page(rows);
            }
            Step::Live(event) => {
                store.apply_live_event(event);
            }
        }
    }
    store.current_rows().as_ref().clone()
}

/// Replay every scenario: `(name, matches, rows as debug text)`.
pub fn verify_all_scenarios() -> Vec<(String, bool, String)> {
    all_scenarios()
        .iter()
        .map(|scenario| {
            let rows = run_scenario(scenario);
            let matches = rows == scenario.expected;
            (scenario.name.to_string(), matches, format!("{:?}", rows))
        })
        .collect()
}
