use proptest::prelude::*;
use std::collections::BTreeSet;

/// Action names drawn from a small alphabet so generated sets overlap often
pub fn action_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "send_email",
        "notify_slack",
        "update_campaign",
        "archive",
        "audit",
        "webhook",
    ])
    .prop_map(str::to_string)
}

pub fn action_set_strategy() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(action_name_strategy(), 0..=6)
}

/// A sequence of reconcile targets
pub fn reconcile_sequence_strategy() -> impl Strategy<Value = Vec<BTreeSet<String>>> {
    prop::collection::vec(action_set_strategy(), 1..8)
}
