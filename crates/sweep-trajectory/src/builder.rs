//! Exploration builder
//!
//! Pure functions turning named value-lists into the equal-length
//! sequences a trajectory explores. No side effects on any trajectory;
//! the caller hands the resulting [`ExplorationPlan`] to
//! `Trajectory::explore` or `Trajectory::expand`.

use crate::error::ExplorationError;
use indexmap::IndexMap;
use sweep_tree::Value;

/// Equal-length value lists plus the implied run count
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorationPlan {
    values: IndexMap<String, Vec<Value>>,
    length: usize,
}

impl ExplorationPlan {
    /// Number of runs this plan implies
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the plan is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|s| s.as_str())
    }

    /// Sequence for one name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.values.get(name).map(|v| v.as_slice())
    }

    /// Iterate (name, sequence) pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Consume into the underlying map
    #[must_use]
    pub fn into_values(self) -> IndexMap<String, Vec<Value>> {
        self.values
    }
}

fn reject_empty(lists: &IndexMap<String, Vec<Value>>) -> Result<(), ExplorationError> {
    for (name, values) in lists {
        if values.is_empty() {
            return Err(ExplorationError::EmptyValues(name.clone()));
        }
    }
    Ok(())
}

/// Cartesian product, each name its own co-varying group
///
/// # Errors
/// [`ExplorationError::EmptyValues`] for an empty list.
pub fn cartesian(
    lists: IndexMap<String, Vec<Value>>,
) -> Result<ExplorationPlan, ExplorationError> {
    let groups: Vec<Vec<String>> = lists.keys().map(|k| vec![k.clone()]).collect();
    cartesian_grouped(lists, &groups)
}

/// Cartesian product over co-varying groups
///
/// Groups are ordered left to right; the right-most group varies fastest.
/// All lists inside one group must share length; the run count is the
/// product of the group lengths.
///
/// # Errors
/// [`ExplorationError::BadGrouping`] when the groups do not partition the
/// names; [`ExplorationError::GroupLengthMismatch`] for intra-group length
/// drift; [`ExplorationError::EmptyValues`] for an empty list.
pub fn cartesian_grouped(
    lists: IndexMap<String, Vec<Value>>,
    groups: &[Vec<String>],
) -> Result<ExplorationPlan, ExplorationError> {
    reject_empty(&lists)?;

    let mut seen: Vec<&str> = Vec::new();
    for group in groups {
        for name in group {
            if !lists.contains_key(name) || seen.contains(&name.as_str()) {
                return Err(ExplorationError::BadGrouping(name.clone()));
            }
            seen.push(name);
        }
    }
    if seen.len() != lists.len() {
        for name in lists.keys() {
            if !seen.contains(&name.as_str()) {
                return Err(ExplorationError::BadGrouping(name.clone()));
            }
        }
    }

    let mut group_lens: Vec<usize> = Vec::with_capacity(groups.len());
    for group in groups {
        let lengths: Vec<usize> = group
            .iter()
            .filter_map(|name| lists.get(name).map(Vec::len))
            .collect();
        let Some(&first) = lengths.first() else {
            continue; // empty groups contribute nothing
        };
        if lengths.iter().any(|&l| l != first) {
            return Err(ExplorationError::GroupLengthMismatch {
                group: group.clone(),
                lengths,
            });
        }
        group_lens.push(first);
    }

    let total: usize = group_lens.iter().product();

    // stride of a group = product of the lengths right of it
    let mut strides = vec![1_usize; group_lens.len()];
    for i in (0..group_lens.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * group_lens[i + 1];
    }

    let mut out: IndexMap<String, Vec<Value>> = lists
        .keys()
        .map(|k| (k.clone(), Vec::with_capacity(total)))
        .collect();

    let nonempty: Vec<&Vec<String>> = groups.iter().filter(|g| !g.is_empty()).collect();
    for run in 0..total {
        for (gi, group) in nonempty.iter().enumerate() {
            let pick = (run / strides[gi]) % group_lens[gi];
            for name in group.iter() {
                if let (Some(seq), Some(src)) = (out.get_mut(name), lists.get(name)) {
                    seq.push(src[pick].clone());
                }
            }
        }
    }

    Ok(ExplorationPlan {
        values: out,
        length: total,
    })
}

/// Identity mode: pass lists through unchanged
///
/// # Errors
/// [`ExplorationError::LengthMismatch`] unless every list already shares
/// one length; [`ExplorationError::EmptyValues`] for an empty list.
pub fn zip(lists: IndexMap<String, Vec<Value>>) -> Result<ExplorationPlan, ExplorationError> {
    reject_empty(&lists)?;
    let mut expected: Option<usize> = None;
    for (name, values) in &lists {
        match expected {
            None => expected = Some(values.len()),
            Some(len) if len != values.len() => {
                return Err(ExplorationError::LengthMismatch {
                    name: name.clone(),
                    expected: len,
                    actual: values.len(),
                });
            }
            Some(_) => {}
        }
    }
    let length = expected.unwrap_or(0);
    Ok(ExplorationPlan {
        values: lists,
        length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&v| Value::from(v)).collect()
    }

    fn lists(pairs: &[(&str, &[i64])]) -> IndexMap<String, Vec<Value>> {
        pairs
            .iter()
            .map(|(name, values)| ((*name).to_string(), ints(values)))
            .collect()
    }

    #[test]
    fn cartesian_right_most_varies_fastest() {
        let plan = cartesian(lists(&[("x", &[1, 2]), ("y", &[3, 4])])).unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.get("x").unwrap(), ints(&[1, 1, 2, 2]).as_slice());
        assert_eq!(plan.get("y").unwrap(), ints(&[3, 4, 3, 4]).as_slice());
    }

    #[test]
    fn cartesian_three_lists() {
        let plan = cartesian(lists(&[("a", &[0, 1]), ("b", &[0, 1]), ("c", &[0, 1])])).unwrap();
        assert_eq!(plan.len(), 8);
        // 'a' is the slowest axis, 'c' the fastest
        assert_eq!(plan.get("a").unwrap()[0..4], ints(&[0, 0, 0, 0])[..]);
        assert_eq!(plan.get("c").unwrap()[0..4], ints(&[0, 1, 0, 1])[..]);
    }

    #[test]
    fn cartesian_grouped_co_varies() {
        let plan = cartesian_grouped(
            lists(&[("x", &[1, 2]), ("y", &[10, 20]), ("z", &[5, 6, 7])]),
            &[
                vec!["x".to_string(), "y".to_string()],
                vec!["z".to_string()],
            ],
        )
        .unwrap();
        assert_eq!(plan.len(), 6);
        assert_eq!(plan.get("x").unwrap(), ints(&[1, 1, 1, 2, 2, 2]).as_slice());
        assert_eq!(
            plan.get("y").unwrap(),
            ints(&[10, 10, 10, 20, 20, 20]).as_slice()
        );
        assert_eq!(plan.get("z").unwrap(), ints(&[5, 6, 7, 5, 6, 7]).as_slice());
    }

    #[test]
    fn cartesian_grouped_length_mismatch() {
        let result = cartesian_grouped(
            lists(&[("x", &[1, 2]), ("y", &[10, 20, 30])]),
            &[vec!["x".to_string(), "y".to_string()]],
        );
        assert!(matches!(
            result,
            Err(ExplorationError::GroupLengthMismatch { .. })
        ));
    }

    #[test]
    fn cartesian_grouped_rejects_partial_groupings() {
        let result = cartesian_grouped(
            lists(&[("x", &[1]), ("y", &[2])]),
            &[vec!["x".to_string()]],
        );
        assert!(matches!(result, Err(ExplorationError::BadGrouping(_))));

        let result = cartesian_grouped(
            lists(&[("x", &[1])]),
            &[vec!["x".to_string()], vec!["ghost".to_string()]],
        );
        assert!(matches!(result, Err(ExplorationError::BadGrouping(_))));
    }

    #[test]
    fn zip_requires_equal_lengths() {
        let plan = zip(lists(&[("x", &[1, 2, 3]), ("y", &[4, 5, 6])])).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.get("x").unwrap(), ints(&[1, 2, 3]).as_slice());

        let result = zip(lists(&[("x", &[1, 2]), ("y", &[4])]));
        assert!(matches!(
            result,
            Err(ExplorationError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn empty_lists_rejected_everywhere() {
        let result = cartesian(lists(&[("x", &[])]));
        assert!(matches!(result, Err(ExplorationError::EmptyValues(_))));

        let result = zip(lists(&[("x", &[])]));
        assert!(matches!(result, Err(ExplorationError::EmptyValues(_))));
    }

    #[test]
    fn plan_iteration_order_is_declaration_order() {
        let plan = cartesian(lists(&[("b", &[1]), ("a", &[2])])).unwrap();
        let names: Vec<_> = plan.names().collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
