//! Tree ↔ store mapping
//!
//! One leaf per parameter/link, one leaf per result item. Node kind and
//! bookkeeping travel in leaf attributes so a store round-trips without a
//! side schema.

use sweep_storage::LeafData;
use sweep_tree::{LinkNode, NodeMeta, ParameterNode, ResultNode};

/// Attribute: node kind tag (`parameter`, `result`, `link`)
pub(crate) const ATTR_NODE_KIND: &str = "node_kind";
/// Attribute: value kind of a parameter leaf
pub(crate) const ATTR_VALUE_KIND: &str = "value_kind";
/// Attribute: node comment
pub(crate) const ATTR_COMMENT: &str = "comment";
/// Attribute: JSON-encoded explored sequence
pub(crate) const ATTR_EXPLORED: &str = "explored";
/// Attribute: JSON-encoded annotation map
pub(crate) const ATTR_ANNOTATIONS: &str = "annotations";
/// Attribute: full name of the result node owning this item leaf
pub(crate) const ATTR_OWNER: &str = "owner";

/// Restore comment/annotations from loaded leaf attributes
pub(crate) fn apply_meta_attrs(
    meta: &mut NodeMeta,
    attrs: &indexmap::IndexMap<String, String>,
) {
    if let Some(comment) = attrs.get(ATTR_COMMENT) {
        meta.comment = comment.clone();
    }
    if let Some(json) = attrs.get(ATTR_ANNOTATIONS) {
        if let Ok(annotations) = serde_json::from_str(json) {
            meta.annotations = annotations;
        }
    }
}

fn meta_attrs(data: LeafData, meta: &NodeMeta) -> LeafData {
    let mut data = data;
    if !meta.comment.is_empty() {
        data = data.with_attr(ATTR_COMMENT, meta.comment.clone());
    }
    if !meta.annotations.is_empty() {
        if let Ok(json) = serde_json::to_string(&meta.annotations) {
            data = data.with_attr(ATTR_ANNOTATIONS, json);
        }
    }
    data
}

/// Leaf for a parameter node (default value + explored sequence attr)
pub(crate) fn parameter_leaf(param: &ParameterNode) -> LeafData {
    let mut data = LeafData::new(param.default_value().clone())
        .with_attr(ATTR_NODE_KIND, "parameter")
        .with_attr(ATTR_VALUE_KIND, param.kind().to_string());
    if let Some(values) = param.explored() {
        if let Ok(json) = serde_json::to_string(values) {
            data = data.with_attr(ATTR_EXPLORED, json);
        }
    }
    meta_attrs(data, &param.meta)
}

/// Leaf path + payload for one item of a result node
///
/// The item keyed by the node's own short name lands at the node's full
/// name; other items nest one segment deeper.
pub(crate) fn result_item_leaf(
    result: &ResultNode,
    item_key: &str,
    value: &sweep_tree::Value,
) -> (String, LeafData) {
    let full = result.meta.full_name.to_string();
    let path = if item_key == result.meta.name {
        full.clone()
    } else {
        format!("{full}.{item_key}")
    };
    let data = meta_attrs(
        LeafData::new(value.clone())
            .with_attr(ATTR_NODE_KIND, "result")
            .with_attr(ATTR_OWNER, full),
        &result.meta,
    );
    (path, data)
}

/// Leaf for a link node (target path as payload)
pub(crate) fn link_leaf(link: &LinkNode) -> LeafData {
    meta_attrs(
        LeafData::new(sweep_tree::Value::from(link.target.clone()))
            .with_attr(ATTR_NODE_KIND, "link"),
        &link.meta,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use sweep_tree::{NodePath, Value};

    #[test]
    fn parameter_leaf_carries_exploration() {
        let mut param = ParameterNode::new(
            NodePath::from_str("parameters.x").unwrap(),
            Value::from(1_i64),
        );
        param
            .set_explored(vec![Value::from(1_i64), Value::from(2_i64)])
            .unwrap();

        let leaf = parameter_leaf(&param);
        assert_eq!(leaf.value, Value::from(1_i64));
        assert_eq!(leaf.attrs.get(ATTR_NODE_KIND).unwrap(), "parameter");
        let explored: Vec<Value> =
            serde_json::from_str(leaf.attrs.get(ATTR_EXPLORED).unwrap()).unwrap();
        assert_eq!(explored.len(), 2);
    }

    #[test]
    fn result_item_paths() {
        let mut result = ResultNode::new(NodePath::from_str("results.summary").unwrap());
        result.set_item("summary", Value::from(1_i64));
        result.set_item("extra", Value::from(2_i64));

        let (path, _) = result_item_leaf(&result, "summary", &Value::from(1_i64));
        assert_eq!(path, "results.summary");
        let (path, data) = result_item_leaf(&result, "extra", &Value::from(2_i64));
        assert_eq!(path, "results.summary.extra");
        assert_eq!(data.attrs.get(ATTR_OWNER).unwrap(), "results.summary");
    }
}
