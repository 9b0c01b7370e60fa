#![forbid(unsafe_code)]

#[cfg(test)]
mod tests {
    use cascade_chain::plan::plan_passes;
    use cascade_chain::{flatten, ChainNode, PassRole, StateTag};

    fn demo_tree() -> Vec<ChainNode<&'static str>> {
        vec![
            ChainNode::Filter("bgra"),
            ChainNode::SaveMarker {
                tag: StateTag::new("orig"),
                filter: "save",
            },
            ChainNode::Group(vec![
                ChainNode::Filter("a"),
                ChainNode::Group(vec![ChainNode::Filter("b")]),
            ]),
            ChainNode::Blend {
                tag: StateTag::new("orig"),
                filter: "blend",
            },
        ]
    }

    /// Determinism contract:
    /// flattening the same tree twice yields the same merged sequence, and
    /// planning the same roles twice yields the same schedule.
    #[test]
    fn flatten_and_plan_are_deterministic_for_same_tree() {
        let tree = demo_tree();

        let m1 = flatten(&tree);
        let m2 = flatten(&tree);
        assert_eq!(m1, m2, "merged order must be stable");

        let roles: Vec<PassRole> = m1.into_iter().map(|m| m.role).collect();
        let p1 = plan_passes(&roles);
        let p2 = plan_passes(&roles);
        assert_eq!(p1, p2, "schedule must be stable");
    }

    /// Grouping contract: nesting is transparent to execution order.
    #[test]
    fn flatten_is_associative_over_grouping() {
        let nested = vec![ChainNode::Group(vec![
            ChainNode::Group(vec![ChainNode::Filter("a"), ChainNode::Filter("b")]),
            ChainNode::Filter("c"),
        ])];
        let flat = vec![
            ChainNode::Filter("a"),
            ChainNode::Filter("b"),
            ChainNode::Filter("c"),
        ];

        let roles = |tree: &[ChainNode<&str>]| -> Vec<PassRole> {
            flatten(tree).into_iter().map(|m| m.role).collect()
        };

        assert_eq!(roles(&nested), roles(&flat));
        assert_eq!(plan_passes(&roles(&nested)), plan_passes(&roles(&flat)));
    }
}
