/// Plan rewrite passes run before clause emission
///
/// WHERE merging: consecutive Where steps with no intervening step are
/// AND-merged into one clause. A step whose condition contains a
/// ConnectedTo is never merged; it lowers to its own MATCH clause during
/// emission, which naturally separates the surrounding filters.

use crate::ast::{Condition, Step, WhereStep};

/// Rewrite `alias: None` references to the step's own target so a merged
/// condition keeps filtering the node it was written against
fn pin_target(condition: Condition, target: &str) -> Condition {
    match condition {
        Condition::Compare {
            alias,
            property,
            op,
            value,
        } => Condition::Compare {
            alias: Some(alias.unwrap_or_else(|| target.to_string())),
            property,
            op,
            value,
        },
        Condition::EdgeExists {
            alias,
            edge_types,
            direction,
        } => Condition::EdgeExists {
            alias: Some(alias.unwrap_or_else(|| target.to_string())),
            edge_types,
            direction,
        },
        Condition::ConnectedTo {
            alias,
            edge_type,
            direction,
            node_id,
        } => Condition::ConnectedTo {
            alias: Some(alias.unwrap_or_else(|| target.to_string())),
            edge_type,
            direction,
            node_id,
        },
        Condition::And { conditions } => Condition::And {
            conditions: conditions.into_iter().map(|c| pin_target(c, target)).collect(),
        },
        Condition::Or { conditions } => Condition::Or {
            conditions: conditions.into_iter().map(|c| pin_target(c, target)).collect(),
        },
        Condition::Not { conditions } => Condition::Not {
            conditions: conditions.into_iter().map(|c| pin_target(c, target)).collect(),
        },
    }
}

/// AND-merge runs of consecutive Where steps
pub fn merge_where_steps(steps: Vec<Step>) -> Vec<Step> {
    let mut out: Vec<Step> = Vec::with_capacity(steps.len());
    let mut run: Vec<WhereStep> = Vec::new();

    fn flush(run: &mut Vec<WhereStep>, out: &mut Vec<Step>) {
        match run.len() {
            0 => {}
            1 => out.push(Step::Where(run.pop().expect("len checked"))),
            _ => {
                let target = run[0].target.clone();
                let conditions = run
                    .drain(..)
                    .map(|w| {
                        let t = w.target.clone();
                        pin_target(w.condition, &t)
                    })
                    .collect();
                out.push(Step::Where(WhereStep {
                    target,
                    condition: Condition::And { conditions },
                }));
            }
        }
    }

    for step in steps {
        match step {
            Step::Where(w) if !w.condition.contains_connected_to() => run.push(w),
            Step::Where(w) => {
                // ConnectedTo steps never merge, in either direction
                flush(&mut run, &mut out);
                out.push(Step::Where(w));
            }
            other => {
                flush(&mut run, &mut out);
                out.push(other);
            }
        }
    }
    flush(&mut run, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CompareOp, Direction};
    use serde_json::json;

    fn where_step(target: &str, condition: Condition) -> Step {
        Step::Where(WhereStep {
            target: target.into(),
            condition,
        })
    }

    #[test]
    fn test_consecutive_wheres_merge() {
        let steps = vec![
            Step::Match {
                alias: "n0".into(),
                label: "user".into(),
            },
            where_step("n0", Condition::eq("name", json!("Alice"))),
            where_step("n0", Condition::compare("age", CompareOp::Gt, json!(18))),
        ];

        let merged = merge_where_steps(steps);
        assert_eq!(merged.len(), 2);
        match &merged[1] {
            Step::Where(w) => match &w.condition {
                Condition::And { conditions } => assert_eq!(conditions.len(), 2),
                other => panic!("expected And, got {other:?}"),
            },
            other => panic!("expected Where, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_pins_each_condition_to_its_target() {
        let steps = vec![
            where_step("n0", Condition::eq("name", json!("a"))),
            where_step("n1", Condition::eq("title", json!("b"))),
        ];

        let merged = merge_where_steps(steps);
        match &merged[0] {
            Step::Where(w) => match &w.condition {
                Condition::And { conditions } => {
                    assert!(matches!(
                        &conditions[0],
                        Condition::Compare { alias: Some(a), .. } if a == "n0"
                    ));
                    assert!(matches!(
                        &conditions[1],
                        Condition::Compare { alias: Some(a), .. } if a == "n1"
                    ));
                }
                other => panic!("expected And, got {other:?}"),
            },
            other => panic!("expected Where, got {other:?}"),
        }
    }

    #[test]
    fn test_connected_to_is_never_merged() {
        let steps = vec![
            where_step("n0", Condition::eq("name", json!("a"))),
            where_step("n0", Condition::connected_to("authored", Direction::Out, "p1")),
            where_step("n0", Condition::eq("age", json!(2))),
        ];

        let merged = merge_where_steps(steps);
        // three separate Where steps survive
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_intervening_step_breaks_the_run() {
        let steps = vec![
            where_step("n0", Condition::eq("a", json!(1))),
            Step::Distinct,
            where_step("n0", Condition::eq("b", json!(2))),
        ];

        let merged = merge_where_steps(steps);
        assert_eq!(merged.len(), 3);
    }
}
