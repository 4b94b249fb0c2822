use convslice_core::config::Settings;
use convslice_core::conversation::{normalize, Conversation, NormalizeOptions};
use convslice_core::ranges::{resolve_ranges, Endpoint, EndpointPolicy, RangeRequest, RangeSpec};
use convslice_core::writer::{plan_slices, PlanOptions};
use proptest::prelude::*;
use serde_json::{json, Value};

fn conversation(len: usize) -> Conversation {
    let messages: Vec<_> = (0..len)
        .map(|i| json!({"id": format!("msg_{i:03}"), "role": "user", "content": format!("line {i}")}))
        .collect();
    normalize(json!({ "messages": messages }), &NormalizeOptions::default()).unwrap()
}

/// `[0,b1], [b1+1,b2], ..., [bk+1,len-1]`
fn expected_pairs(len: usize, boundaries: &[usize]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let mut start = 0;
    for &b in boundaries {
        pairs.push((start, b));
        start = b + 1;
    }
    if start < len {
        pairs.push((start, len - 1));
    }
    pairs
}

/// Message ids of every planned slice, in sequence order
fn planned_ids(conv: &Conversation, request: &RangeRequest, policy: EndpointPolicy) -> Vec<Vec<String>> {
    let ranges = resolve_ranges(conv, request, policy).unwrap();
    plan_slices(conv, &ranges, &Settings::default(), PlanOptions::default())
        .unwrap()
        .into_iter()
        .map(|plan| {
            let doc: Value = serde_json::from_slice(&plan.bytes).unwrap();
            doc["messages"]
                .as_array()
                .unwrap()
                .iter()
                .map(|m| m["id"].as_str().unwrap().to_string())
                .collect()
        })
        .collect()
}

fn arb_cuts() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (2usize..60).prop_flat_map(|len| {
        (
            Just(len),
            prop::collection::btree_set(0..len, 0..6).prop_map(|set| set.into_iter().collect()),
        )
    })
}

proptest! {
    /// Property: numeric, id-pair and boundary forms of the same cuts give identical slices
    #[test]
    fn prop_range_forms_agree((len, boundaries) in arb_cuts()) {
        let conv = conversation(len);
        let pairs = expected_pairs(len, &boundaries);

        let numeric = RangeRequest::Explicit(
            pairs
                .iter()
                .map(|(s, e)| format!("{s}:{e}").parse::<RangeSpec>().unwrap())
                .collect(),
        );
        let by_id = RangeRequest::Explicit(
            pairs
                .iter()
                .map(|(s, e)| format!("id:msg_{s:03}:id:msg_{e:03}").parse::<RangeSpec>().unwrap())
                .collect(),
        );
        let by_boundary = RangeRequest::Boundaries {
            boundaries: boundaries.iter().map(|b| Endpoint::Index(*b)).collect(),
            names: Vec::new(),
        };

        let a = planned_ids(&conv, &numeric, EndpointPolicy::Any);
        let b = planned_ids(&conv, &by_id, EndpointPolicy::IdsOnly);
        let c = planned_ids(&conv, &by_boundary, EndpointPolicy::Any);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(&a, &c);
    }

    /// Property: boundary slices concatenate back to the original message order
    #[test]
    fn prop_boundary_slices_reassemble((len, boundaries) in arb_cuts()) {
        let conv = conversation(len);
        let request = RangeRequest::Boundaries {
            boundaries: boundaries.iter().map(|b| Endpoint::Index(*b)).collect(),
            names: Vec::new(),
        };
        let joined: Vec<String> = planned_ids(&conv, &request, EndpointPolicy::Any)
            .into_iter()
            .flatten()
            .collect();
        let original: Vec<String> = conv.messages.iter().map(|m| m.id.clone()).collect();
        prop_assert_eq!(joined, original);
    }

    /// Property: every resolved range yields exactly its messages, with no overlap
    #[test]
    fn prop_slices_cover_exactly_their_ranges((len, boundaries) in arb_cuts()) {
        let conv = conversation(len);
        let request = RangeRequest::Boundaries {
            boundaries: boundaries.iter().map(|b| Endpoint::Index(*b)).collect(),
            names: Vec::new(),
        };
        let ranges = resolve_ranges(&conv, &request, EndpointPolicy::Any).unwrap();
        for (i, a) in ranges.iter().enumerate() {
            for b in ranges.iter().skip(i + 1) {
                prop_assert!(!a.overlaps(b));
            }
        }
        let slices = planned_ids(&conv, &request, EndpointPolicy::Any);
        for (range, ids) in ranges.iter().zip(&slices) {
            let expected: Vec<String> = range.indices().map(|i| format!("msg_{i:03}")).collect();
            prop_assert_eq!(ids, &expected);
        }
    }
}
